//! # Snapshot — Line-Delimited JSON State Dumps
//!
//! Serializes the full metric set as one JSON object per line (not a JSON
//! array) and reads it back line by line. A malformed line fails the whole
//! read; there is no partial recovery.
//!
//! ## Atomic Writes
//!
//! Snapshot files are written to a `.tmp` sibling and renamed over the target,
//! so a crash mid-write leaves the previous snapshot intact. The parent
//! directory is created on demand.
//!
//! A missing snapshot file reads as an empty set (fresh start).

use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use crate::error::Result;
use crate::metric::Metric;

/// Encode `records` as newline-delimited JSON.
pub fn encode(records: &[Metric]) -> Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(records.len() * 64);
    for record in records {
        serde_json::to_writer(&mut buf, record)?;
        buf.push(b'\n');
    }
    Ok(buf)
}

/// Decode newline-delimited JSON. Blank lines are skipped.
pub fn decode(bytes: &[u8]) -> Result<Vec<Metric>> {
    let mut records = Vec::new();
    for line in BufReader::new(bytes).lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        records.push(serde_json::from_str(&line)?);
    }
    Ok(records)
}

/// Overwrite `path` with a snapshot of `records`.
pub fn write_file(path: &Path, records: &[Metric]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let data = encode(records)?;
    let tmp = path.with_extension("tmp");
    {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(&data)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Read a snapshot file; a file that does not exist yields no records.
pub fn read_file(path: &Path) -> Result<Vec<Metric>> {
    match fs::read(path) {
        Ok(bytes) => decode(&bytes),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(e.into()),
    }
}
