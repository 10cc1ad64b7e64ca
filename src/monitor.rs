//! monitor.rs
//! Non-blocking dispatch diagnostics.
//! - global atomic counters for each stage of the dispatch pipeline
//! - bounded lock-free ring of recent late-message drops; when the ring is
//!   full the record is counted as dropped rather than ever blocking the
//!   recording thread
//! - per-control-index sent/stale counters for narrowing down which controls
//!   lag under load

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crossbeam_queue::ArrayQueue;
use dashmap::DashMap;

use crate::message::{ControlIndex, ControlValue};

/// Capacity of the recent late-drop ring.
const LATE_RING_CAPACITY: usize = 256;

/// One staleness drop: the dropped message's identity and the age observed at
/// filter time.
#[derive(Debug, Clone)]
pub struct LateDrop {
    pub control_index: ControlIndex,
    pub control_value: ControlValue,
    pub age: Duration,
}

/// Point-in-time copy of the monitor counters. Individual loads are relaxed;
/// the snapshot is consistent enough for diagnostics, not a transaction.
#[derive(Debug, Default, Clone)]
pub struct MonitorSnapshot {
    pub enqueued: u64,
    pub drained: u64,
    pub transmitted: u64,
    pub stale_drops: u64,
    pub capacity_drops: u64,
    pub transmit_failures: u64,
    pub rejected: u64,
    pub dropped_warnings: u64,
}

#[derive(Debug, Default)]
struct ControlCounters {
    sent: AtomicU64,
    stale: AtomicU64,
}

/// Shared diagnostics sink for producers and the dispatch worker. All record
/// paths are lock-free and never block the caller.
pub struct DispatchMonitor {
    enqueued: AtomicU64,
    drained: AtomicU64,
    transmitted: AtomicU64,
    stale_drops: AtomicU64,
    capacity_drops: AtomicU64,
    transmit_failures: AtomicU64,
    rejected: AtomicU64,
    late_ring: ArrayQueue<LateDrop>,
    dropped_warnings: AtomicU64,
    per_control: DashMap<ControlIndex, ControlCounters>,
}

impl DispatchMonitor {
    pub fn new() -> Self {
        Self::with_late_capacity(LATE_RING_CAPACITY)
    }

    /// Monitor with a custom late-drop ring size.
    pub fn with_late_capacity(capacity: usize) -> Self {
        Self {
            enqueued: AtomicU64::new(0),
            drained: AtomicU64::new(0),
            transmitted: AtomicU64::new(0),
            stale_drops: AtomicU64::new(0),
            capacity_drops: AtomicU64::new(0),
            transmit_failures: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            late_ring: ArrayQueue::new(capacity),
            dropped_warnings: AtomicU64::new(0),
            per_control: DashMap::new(),
        }
    }

    pub fn record_enqueued(&self) {
        self.enqueued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_drained(&self, count: usize) {
        self.drained.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_transmitted(&self, control_index: ControlIndex) {
        self.transmitted.fetch_add(1, Ordering::Relaxed);
        self.per_control
            .entry(control_index)
            .or_default()
            .sent
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Records a staleness drop together with the observed age. The warning
    /// lands in the bounded ring; on overflow only the drop counter grows.
    pub fn record_stale(
        &self,
        control_index: ControlIndex,
        control_value: ControlValue,
        age: Duration,
    ) {
        self.stale_drops.fetch_add(1, Ordering::Relaxed);
        self.per_control
            .entry(control_index)
            .or_default()
            .stale
            .fetch_add(1, Ordering::Relaxed);

        let warning = LateDrop {
            control_index,
            control_value,
            age,
        };
        if self.late_ring.push(warning).is_err() {
            self.dropped_warnings.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_capacity_drop(&self) {
        self.capacity_drops.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_transmit_failure(&self) {
        self.transmit_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Drains and returns the recorded late-drop warnings, oldest first.
    pub fn take_late_drops(&self) -> Vec<LateDrop> {
        let mut out = Vec::new();
        while let Some(drop) = self.late_ring.pop() {
            out.push(drop);
        }
        out
    }

    /// (sent, stale) counts for one control index; zeros when never seen.
    pub fn control_counts(&self, control_index: ControlIndex) -> (u64, u64) {
        match self.per_control.get(&control_index) {
            Some(counters) => (
                counters.sent.load(Ordering::Relaxed),
                counters.stale.load(Ordering::Relaxed),
            ),
            None => (0, 0),
        }
    }

    pub fn snapshot(&self) -> MonitorSnapshot {
        MonitorSnapshot {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            drained: self.drained.load(Ordering::Relaxed),
            transmitted: self.transmitted.load(Ordering::Relaxed),
            stale_drops: self.stale_drops.load(Ordering::Relaxed),
            capacity_drops: self.capacity_drops.load(Ordering::Relaxed),
            transmit_failures: self.transmit_failures.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            dropped_warnings: self.dropped_warnings.load(Ordering::Relaxed),
        }
    }
}

impl Default for DispatchMonitor {
    fn default() -> Self {
        Self::new()
    }
}
