//! # File Repository — In-Memory Store with Snapshot Persistence
//!
//! Wraps [`MemoryRepository`] and mirrors its contents into a line-delimited
//! JSON file (see [`crate::snapshot`]).
//!
//! ## Persistence Modes
//!
//! | `interval` | Behaviour |
//! |------------|-----------|
//! | `0` | every successful `set`/`updates` rewrites the file before the write is committed |
//! | `> 0` | [`FileRepository::spawn_snapshot_task`] rewrites the file on a fixed schedule |
//!
//! In synchronous mode a failed file write rejects the whole call and leaves
//! memory untouched.
//!
//! ## Restore
//!
//! [`FileRepository::restore`] replays the snapshot through the normal merge
//! path with checksum verification off, re-signing each record with the
//! configured key. A record that cannot be merged is logged and skipped.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::memory::MemoryRepository;
use super::{Repository, Trust};
use crate::checksum::Signer;
use crate::error::Result;
use crate::metric::{Metric, MetricType};
use crate::snapshot;

#[derive(Debug)]
pub struct FileRepository {
    memory: MemoryRepository,
    path: PathBuf,
    interval: Duration,
}

impl FileRepository {
    pub fn new(path: impl Into<PathBuf>, interval: Duration, signer: Signer) -> Self {
        FileRepository {
            memory: MemoryRepository::new(signer),
            path: path.into(),
            interval,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_synchronous(&self) -> bool {
        self.interval.is_zero()
    }

    /// Load the snapshot file into memory. Returns how many records were
    /// restored; a missing file restores nothing.
    pub fn restore(&self) -> Result<usize> {
        let records = snapshot::read_file(&self.path)?;
        let mut restored = 0;
        for record in records {
            let id = record.id.clone();
            match self.memory.apply(vec![record], Trust::Trusted, |_| Ok(())) {
                Ok(_) => restored += 1,
                Err(e) => warn!(id = %id, error = %e, "skipping unrestorable snapshot record"),
            }
        }
        info!(path = %self.path.display(), restored, "snapshot restored");
        Ok(restored)
    }

    /// Write the current state to the snapshot file.
    pub fn flush(&self) -> Result<()> {
        self.memory
            .with_records(|records| snapshot::write_file(&self.path, records))?;
        debug!(path = %self.path.display(), "snapshot written");
        Ok(())
    }

    /// Periodic flush loop for interval mode. Returns `None` in synchronous
    /// mode. The task flushes once more when `cancel` fires.
    pub fn spawn_snapshot_task(
        self: &Arc<Self>,
        cancel: CancellationToken,
    ) -> Option<JoinHandle<()>> {
        if self.is_synchronous() {
            return None;
        }
        let repo = Arc::clone(self);
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(
                tokio::time::Instant::now() + repo.interval,
                repo.interval,
            );
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = repo.flush() {
                            warn!(error = %e, "periodic snapshot failed");
                        }
                    }
                }
            }
            if let Err(e) = repo.flush() {
                warn!(error = %e, "final snapshot failed");
            }
        }))
    }

    fn persist_hook(&self) -> impl FnOnce(&[Metric]) -> Result<()> + '_ {
        move |records| {
            if self.is_synchronous() {
                snapshot::write_file(&self.path, records)
            } else {
                Ok(())
            }
        }
    }
}

#[async_trait]
impl Repository for FileRepository {
    async fn set(&self, metric: Metric) -> Result<Metric> {
        self.memory.set_with(metric, self.persist_hook())
    }

    async fn get(&self, id: &str, mtype: &MetricType) -> Result<Metric> {
        self.memory.find(id, mtype)
    }

    async fn get_all(&self) -> Result<Vec<Metric>> {
        Ok(self.memory.all())
    }

    async fn updates(&self, batch: Vec<Metric>) -> Result<Vec<Metric>> {
        self.memory.apply(batch, Trust::Verify, self.persist_hook())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
