//! # Agent — Collect, Batch, Sign, and Ship Metrics
//!
//! The agent is a four-stage pipeline of tokio tasks sharing one
//! [`CancellationToken`]:
//!
//! ```text
//! RuntimeCollector ─┐ (poll_interval)
//!                   ├─► SampleBuffer ─► merge (report_interval) ─► mpsc(rate_limit) ─► N sender workers ─► POST /updates/
//! HostCollector ────┘ (poll_interval)
//! ```
//!
//! ## Stages
//!
//! - **Collect**: each collector overwrites its slot in the [`SampleBuffer`].
//!   A failing collector logs and skips the tick.
//! - **Merge**: concatenates the latest samples, skips empty batches, signs
//!   every metric and enqueues the batch. The queue is bounded at
//!   `rate_limit`; a full queue blocks the merge stage, which is the only
//!   backpressure mechanism. Nothing is dropped on the agent side.
//! - **Send**: `rate_limit` workers share the receiver. A failed send is
//!   logged and dropped (at-most-once delivery).
//!
//! ## Shutdown
//!
//! Cancelling the token stops the collectors and the merge stage. Dropping
//! the merge stage's sender closes the queue; workers drain what is already
//! queued and exit. Workers still running after `shutdown_grace` are aborted.

pub mod collector;
pub mod sender;

use anyhow::{bail, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio::task::JoinSet;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::checksum::Signer;
use crate::metric::Metric;
use collector::{Collector, SampleBuffer};
use sender::BatchSender;

/// Resolved agent settings.
#[derive(Clone, Debug)]
pub struct AgentConfig {
    pub address: String,
    pub report_interval: Duration,
    pub poll_interval: Duration,
    pub key: String,
    pub rate_limit: usize,
    pub shutdown_grace: Duration,
}

impl Default for AgentConfig {
    fn default() -> Self {
        AgentConfig {
            address: "localhost:8080".to_string(),
            report_interval: Duration::from_secs(10),
            poll_interval: Duration::from_secs(2),
            key: String::new(),
            rate_limit: 3,
            shutdown_grace: Duration::from_secs(5),
        }
    }
}

/// Counters shared by the pipeline stages, logged at shutdown.
#[derive(Debug, Default)]
pub struct PipelineStats {
    pub enqueued: AtomicU64,
    pub sent: AtomicU64,
    pub failed: AtomicU64,
}

pub struct Agent {
    config: AgentConfig,
    buffer: Arc<SampleBuffer>,
    stats: Arc<PipelineStats>,
}

type BatchQueue = Arc<AsyncMutex<mpsc::Receiver<Vec<Metric>>>>;

impl Agent {
    pub fn new(config: AgentConfig) -> Self {
        Agent {
            config,
            buffer: Arc::new(SampleBuffer::new()),
            stats: Arc::new(PipelineStats::default()),
        }
    }

    pub fn buffer(&self) -> Arc<SampleBuffer> {
        Arc::clone(&self.buffer)
    }

    pub fn stats(&self) -> Arc<PipelineStats> {
        Arc::clone(&self.stats)
    }

    /// Run the pipeline until `cancel` fires, then drain and return.
    pub async fn run(
        self,
        collectors: Vec<Box<dyn Collector>>,
        sender: Arc<dyn BatchSender>,
        cancel: CancellationToken,
    ) -> Result<()> {
        if self.config.poll_interval.is_zero() || self.config.report_interval.is_zero() {
            bail!(
                "poll and report intervals must be non-zero (poll {:?}, report {:?})",
                self.config.poll_interval,
                self.config.report_interval
            );
        }
        let workers = self.config.rate_limit.max(1);
        let (tx, rx) = mpsc::channel::<Vec<Metric>>(workers);
        let queue: BatchQueue = Arc::new(AsyncMutex::new(rx));

        info!(
            address = %self.config.address,
            poll_interval = ?self.config.poll_interval,
            report_interval = ?self.config.report_interval,
            workers,
            signing = !self.config.key.is_empty(),
            "agent started"
        );

        let mut stages = JoinSet::new();
        for collector in collectors {
            stages.spawn(collect_loop(
                collector,
                Arc::clone(&self.buffer),
                self.config.poll_interval,
                cancel.clone(),
            ));
        }
        stages.spawn(merge_loop(
            Arc::clone(&self.buffer),
            Signer::new(&self.config.key),
            tx,
            self.config.report_interval,
            Arc::clone(&self.stats),
            cancel.clone(),
        ));

        let mut senders = JoinSet::new();
        for worker in 0..workers {
            senders.spawn(send_worker(
                worker,
                Arc::clone(&queue),
                Arc::clone(&sender),
                Arc::clone(&self.stats),
            ));
        }

        cancel.cancelled().await;
        while let Some(joined) = stages.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "pipeline stage ended abnormally");
            }
        }

        let drained = tokio::time::timeout(self.config.shutdown_grace, async {
            while senders.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            warn!(grace = ?self.config.shutdown_grace, "sender workers still busy, aborting");
            senders.abort_all();
        }

        info!(
            enqueued = self.stats.enqueued.load(Ordering::Relaxed),
            sent = self.stats.sent.load(Ordering::Relaxed),
            failed = self.stats.failed.load(Ordering::Relaxed),
            "agent stopped"
        );
        Ok(())
    }
}

async fn collect_loop(
    mut collector: Box<dyn Collector>,
    buffer: Arc<SampleBuffer>,
    period: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }
        match collector.collect() {
            Ok(metrics) => {
                debug!(collector = collector.name(), count = metrics.len(), "sample collected");
                buffer.store(collector.kind(), metrics);
            }
            Err(e) => warn!(collector = collector.name(), error = %e, "collection failed, skipping tick"),
        }
    }
    debug!(collector = collector.name(), "collector stopped");
}

async fn merge_loop(
    buffer: Arc<SampleBuffer>,
    signer: Signer,
    tx: mpsc::Sender<Vec<Metric>>,
    period: Duration,
    stats: Arc<PipelineStats>,
    cancel: CancellationToken,
) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let pending = buffer.merge();
        if pending.metrics.is_empty() {
            debug!("nothing collected yet, skipping report");
            continue;
        }
        let mut batch = pending.metrics;
        for metric in &mut batch {
            metric.hash = signer.sign(metric);
        }
        let size = batch.len();

        tokio::select! {
            _ = cancel.cancelled() => break,
            sent = tx.send(batch) => {
                if sent.is_err() {
                    warn!("batch queue closed, stopping merge stage");
                    break;
                }
            }
        }
        buffer.acknowledge(pending.polls);
        stats.enqueued.fetch_add(1, Ordering::Relaxed);
        debug!(metrics = size, "batch enqueued");
    }
    debug!("merge stage stopped");
}

async fn send_worker(
    worker: usize,
    queue: BatchQueue,
    sender: Arc<dyn BatchSender>,
    stats: Arc<PipelineStats>,
) {
    loop {
        let next = {
            let mut rx = queue.lock().await;
            rx.recv().await
        };
        let Some(batch) = next else { break };
        match sender.send(&batch).await {
            Ok(()) => {
                stats.sent.fetch_add(1, Ordering::Relaxed);
                debug!(worker, metrics = batch.len(), "batch sent");
            }
            Err(e) => {
                stats.failed.fetch_add(1, Ordering::Relaxed);
                warn!(worker, error = %e, "failed to send batch, dropping it");
            }
        }
    }
    debug!(worker, "sender worker stopped");
}
