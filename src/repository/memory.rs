//! In-memory backend.
//!
//! Records live in a `Vec` scanned by `(id, type)`; expected cardinality is
//! tens of metrics. A single mutex guards the whole read-modify-write of
//! every operation. Writes are staged on a copy and only swapped in once every
//! record in the call merged and the optional persist hook succeeded, which is
//! what makes `updates` all-or-nothing.

use async_trait::async_trait;
use std::sync::Mutex;

use super::{merge, Repository, Trust};
use crate::checksum::Signer;
use crate::error::{Result, StoreError};
use crate::lock_or_recover;
use crate::metric::{Metric, MetricType};

#[derive(Debug)]
pub struct MemoryRepository {
    records: Mutex<Vec<Metric>>,
    signer: Signer,
}

impl MemoryRepository {
    pub fn new(signer: Signer) -> Self {
        MemoryRepository {
            records: Mutex::new(Vec::new()),
            signer,
        }
    }

    /// Merge `batch` under the lock. `persist` sees the staged collection and
    /// can veto the commit by returning an error.
    pub(crate) fn apply<F>(&self, batch: Vec<Metric>, trust: Trust, persist: F) -> Result<Vec<Metric>>
    where
        F: FnOnce(&[Metric]) -> Result<()>,
    {
        let mut records = lock_or_recover(&self.records);
        let mut staged = records.clone();
        let mut stored = Vec::with_capacity(batch.len());
        for metric in batch {
            stored.push(merge(&mut staged, metric, &self.signer, trust)?);
        }
        persist(&staged)?;
        *records = staged;
        Ok(stored)
    }

    /// Run `f` on the current collection while holding the lock.
    pub(crate) fn with_records<T>(&self, f: impl FnOnce(&[Metric]) -> T) -> T {
        let records = lock_or_recover(&self.records);
        f(&records)
    }

    pub(crate) fn find(&self, id: &str, mtype: &MetricType) -> Result<Metric> {
        self.with_records(|records| {
            records
                .iter()
                .find(|m| m.id == id && &m.mtype == mtype)
                .cloned()
                .ok_or_else(|| StoreError::NotFound {
                    id: id.to_string(),
                    mtype: mtype.to_string(),
                })
        })
    }

    pub(crate) fn all(&self) -> Vec<Metric> {
        self.with_records(|records| records.to_vec())
    }

    pub(crate) fn set_with<F>(&self, metric: Metric, persist: F) -> Result<Metric>
    where
        F: FnOnce(&[Metric]) -> Result<()>,
    {
        let mut stored = self.apply(vec![metric], Trust::Verify, persist)?;
        // apply returns exactly one record per input
        Ok(stored.remove(0))
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn set(&self, metric: Metric) -> Result<Metric> {
        self.set_with(metric, |_| Ok(()))
    }

    async fn get(&self, id: &str, mtype: &MetricType) -> Result<Metric> {
        self.find(id, mtype)
    }

    async fn get_all(&self) -> Result<Vec<Metric>> {
        Ok(self.all())
    }

    async fn updates(&self, batch: Vec<Metric>) -> Result<Vec<Metric>> {
        self.apply(batch, Trust::Verify, |_| Ok(()))
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
