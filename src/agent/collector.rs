//! # Collectors — Sampling Agent and Host Telemetry
//!
//! Two collectors feed the agent pipeline, each on its own ticker:
//!
//! | Collector | Kind | Metrics | Source |
//! |-----------|------|---------|--------|
//! | [`RuntimeCollector`] | runtime | `ResidentMemory`, `VirtualMemory`, `ProcessCPUUsage`, `DiskReadBytes`, `DiskWrittenBytes`, `Uptime`, `RandomValue` | `sysinfo` process stats for the agent itself, `rand` |
//! | [`HostCollector`] | host | `TotalMemory`, `FreeMemory`, `CPUutilization1..N` | `sysinfo` system stats |
//!
//! Every sample replaces the previous one of the same kind in the
//! [`SampleBuffer`]; intermediate samples between two reports are dropped.
//! The buffer also counts runtime polls and reports the count as the
//! `PollCount` counter, decremented only once a batch carrying it has been
//! enqueued.

use anyhow::{anyhow, bail, Result};
use std::sync::Mutex;
use sysinfo::{Pid, ProcessesToUpdate, System};

use crate::lock_or_recover;
use crate::metric::Metric;

/// Which buffer slot a collector's samples overwrite.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SampleKind {
    Runtime,
    Host,
}

pub trait Collector: Send {
    fn name(&self) -> &str;

    fn kind(&self) -> SampleKind;

    /// Take one sample. An error skips this tick's contribution.
    fn collect(&mut self) -> Result<Vec<Metric>>;
}

// ── Runtime ─────────────────────────────────────────────────────

pub struct RuntimeCollector {
    sys: System,
    pid: Pid,
}

impl RuntimeCollector {
    pub fn new() -> Result<Self> {
        let pid = sysinfo::get_current_pid().map_err(|e| anyhow!("cannot determine own pid: {}", e))?;
        Ok(RuntimeCollector {
            sys: System::new(),
            pid,
        })
    }
}

impl Collector for RuntimeCollector {
    fn name(&self) -> &str {
        "runtime"
    }

    fn kind(&self) -> SampleKind {
        SampleKind::Runtime
    }

    fn collect(&mut self) -> Result<Vec<Metric>> {
        self.sys
            .refresh_processes(ProcessesToUpdate::Some(&[self.pid]), true);
        let process = self
            .sys
            .process(self.pid)
            .ok_or_else(|| anyhow!("process {} not visible", self.pid))?;
        let disk = process.disk_usage();

        Ok(vec![
            Metric::gauge("ResidentMemory", process.memory() as f64),
            Metric::gauge("VirtualMemory", process.virtual_memory() as f64),
            Metric::gauge("ProcessCPUUsage", process.cpu_usage() as f64),
            Metric::gauge("DiskReadBytes", disk.total_read_bytes as f64),
            Metric::gauge("DiskWrittenBytes", disk.total_written_bytes as f64),
            Metric::gauge("Uptime", process.run_time() as f64),
            Metric::gauge("RandomValue", rand::random::<f64>()),
        ])
    }
}

// ── Host ────────────────────────────────────────────────────────

pub struct HostCollector {
    sys: System,
}

impl HostCollector {
    pub fn new() -> Self {
        HostCollector { sys: System::new() }
    }
}

impl Default for HostCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl Collector for HostCollector {
    fn name(&self) -> &str {
        "host"
    }

    fn kind(&self) -> SampleKind {
        SampleKind::Host
    }

    fn collect(&mut self) -> Result<Vec<Metric>> {
        self.sys.refresh_memory();
        self.sys.refresh_cpu_usage();

        let total = self.sys.total_memory();
        if total == 0 {
            bail!("host memory statistics unavailable");
        }

        let mut metrics = vec![
            Metric::gauge("TotalMemory", total as f64),
            Metric::gauge("FreeMemory", self.sys.available_memory() as f64),
        ];
        for (i, cpu) in self.sys.cpus().iter().enumerate() {
            metrics.push(Metric::gauge(
                format!("CPUutilization{}", i + 1),
                cpu.cpu_usage() as f64,
            ));
        }
        Ok(metrics)
    }
}

// ── Buffer ──────────────────────────────────────────────────────

#[derive(Default)]
struct Samples {
    runtime: Vec<Metric>,
    host: Vec<Metric>,
    polls: i64,
}

/// Latest sample of each kind plus the pending poll count.
#[derive(Default)]
pub struct SampleBuffer {
    inner: Mutex<Samples>,
}

/// A merged batch and the number of polls its `PollCount` accounts for.
#[derive(Debug, Default)]
pub struct PendingBatch {
    pub metrics: Vec<Metric>,
    pub polls: i64,
}

impl SampleBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the latest sample of `kind`. Runtime samples count as a poll.
    /// Non-finite gauges are dropped; the server refuses them.
    pub fn store(&self, kind: SampleKind, mut metrics: Vec<Metric>) {
        metrics.retain(|m| m.value.map_or(true, f64::is_finite));
        let mut samples = lock_or_recover(&self.inner);
        match kind {
            SampleKind::Runtime => {
                samples.runtime = metrics;
                samples.polls = samples.polls.saturating_add(1);
            }
            SampleKind::Host => samples.host = metrics,
        }
    }

    /// Concatenate both latest samples. Empty when nothing has been
    /// collected yet.
    pub fn merge(&self) -> PendingBatch {
        let samples = lock_or_recover(&self.inner);
        if samples.runtime.is_empty() && samples.host.is_empty() {
            return PendingBatch::default();
        }
        let mut metrics = Vec::with_capacity(samples.runtime.len() + samples.host.len() + 1);
        metrics.extend(samples.runtime.iter().cloned());
        if samples.polls > 0 {
            metrics.push(Metric::counter("PollCount", samples.polls));
        }
        metrics.extend(samples.host.iter().cloned());
        PendingBatch {
            metrics,
            polls: samples.polls,
        }
    }

    /// Subtract the polls reported by an enqueued batch. Polls recorded after
    /// the merge stay pending.
    pub fn acknowledge(&self, polls: i64) {
        let mut samples = lock_or_recover(&self.inner);
        samples.polls = samples.polls.saturating_sub(polls).max(0);
    }

    pub fn pending_polls(&self) -> i64 {
        lock_or_recover(&self.inner).polls
    }
}
