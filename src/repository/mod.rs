//! # Repository — Backend-Agnostic Metric Storage
//!
//! One interface, three interchangeable backends:
//!
//! - [`memory::MemoryRepository`]: volatile, a linear `Vec` behind a mutex
//! - [`file::FileRepository`]: memory plus a line-delimited JSON snapshot
//! - [`postgres::PgRepository`]: one row per metric id in PostgreSQL
//!
//! ## Write Semantics
//!
//! Every write goes through the same steps regardless of backend:
//!
//! 1. Reject unknown types and records without the payload field for their type.
//! 2. Verify the checksum against the record *as sent* (before accumulation).
//! 3. Merge: gauges overwrite, counters add the incoming delta to the stored one.
//! 4. Re-sign the merged record so that reads return a matching checksum.
//! 5. Persist.
//!
//! [`Repository::updates`] is atomic: any rejected record aborts the batch and
//! nothing from it is kept.

pub mod file;
pub mod memory;
pub mod postgres;

use async_trait::async_trait;

use crate::checksum::Signer;
use crate::error::Result;
use crate::metric::{Metric, MetricType};

#[async_trait]
pub trait Repository: Send + Sync {
    /// Validate, verify, merge, persist; returns the stored record.
    async fn set(&self, metric: Metric) -> Result<Metric>;

    /// Exact `(id, type)` lookup; `StoreError::NotFound` when absent.
    async fn get(&self, id: &str, mtype: &MetricType) -> Result<Metric>;

    /// Copy of every stored record.
    async fn get_all(&self) -> Result<Vec<Metric>>;

    /// `set` semantics for every record, all-or-nothing.
    async fn updates(&self, batch: Vec<Metric>) -> Result<Vec<Metric>>;

    /// Liveness of the backing store.
    async fn ping(&self) -> Result<()>;
}

/// Whether a merge verifies the incoming checksum. Records replayed from our
/// own snapshot file are trusted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Trust {
    Verify,
    Trusted,
}

/// Merge `incoming` into `records` by linear scan on `(id, type)`.
pub(crate) fn merge(
    records: &mut Vec<Metric>,
    mut incoming: Metric,
    signer: &Signer,
    trust: Trust,
) -> Result<Metric> {
    incoming.validate()?;
    if trust == Trust::Verify {
        signer.verify(&incoming)?;
    }

    match records.iter_mut().find(|m| m.same_key(&incoming)) {
        Some(existing) => {
            match existing.mtype {
                MetricType::Gauge => existing.value = incoming.value,
                MetricType::Counter => {
                    let total = existing
                        .delta
                        .unwrap_or(0)
                        .saturating_add(incoming.delta.unwrap_or(0));
                    existing.delta = Some(total);
                }
                MetricType::Other(_) => {}
            }
            existing.hash = signer.sign(existing);
            Ok(existing.clone())
        }
        None => {
            incoming.hash = signer.sign(&incoming);
            records.push(incoming.clone());
            Ok(incoming)
        }
    }
}
