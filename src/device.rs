//! device.rs
//! Device lifecycle: the long-lived owner of the event queue, the dispatch
//! thread, and the monitor.
//! - `start` opens the gateway, then spawns the dispatch worker
//! - producers feed the device through `enqueue` or a cloned `Producer`
//! - `shutdown` sets the stop flag, wakes the worker and joins it; with an
//!   idle queue this completes within one wait-timeout interval
//! - dropping the device runs `shutdown`, so the queue can never be freed
//!   under a live worker

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, error, info};
use thiserror::Error;
use thread_priority::{ThreadBuilderExt, ThreadPriority};

use crate::gateway::{GatewayError, TransmitGateway};
use crate::message::{ControlIndex, ControlValue};
use crate::monitor::DispatchMonitor;
use crate::packet::DEFAULT_PACKET_CAPACITY;
use crate::queue::EventQueue;
use crate::worker::DispatchWorker;

/// Interval for the worker's timed wait. Bounds shutdown latency even when
/// the wakeup signal is missed.
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(2);

/// Messages older than this when the worker reaches them are dropped.
pub const DEFAULT_STALENESS_THRESHOLD: Duration = Duration::from_millis(2);

const WORKER_THREAD_NAME: &str = "midi-dispatch";

/// Tunables for one device. `Default` gives: 2s wait interval, 2ms staleness
/// threshold, 512-byte batches, channel 0, one transmission per message, no
/// thread placement.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    pub wait_timeout: Duration,
    pub staleness_threshold: Duration,
    pub packet_capacity: usize,
    /// MIDI channel carried in the status byte (0..=15).
    pub channel: u8,
    /// Pack every fresh message of a claimed batch into one transmission
    /// instead of transmitting each alone.
    pub coalesce: bool,
    /// Spawn the dispatch thread with maximum OS priority.
    pub elevate_priority: bool,
    /// Pin the dispatch thread to this core index, when present.
    pub pin_to_core: Option<usize>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            wait_timeout: DEFAULT_WAIT_TIMEOUT,
            staleness_threshold: DEFAULT_STALENESS_THRESHOLD,
            packet_capacity: DEFAULT_PACKET_CAPACITY,
            channel: 0,
            coalesce: false,
            elevate_priority: false,
            pin_to_core: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum StartError {
    #[error("gateway open failed: {0}")]
    Gateway(#[from] GatewayError),
    #[error("could not spawn dispatch thread: {0}")]
    WorkerSpawn(#[from] std::io::Error),
}

/// A running dispatcher. Owns the queue, the monitor and the worker thread
/// handle; releasing it joins the worker first.
pub struct Device {
    queue: Arc<EventQueue>,
    stop: Arc<AtomicBool>,
    monitor: Arc<DispatchMonitor>,
    worker: Option<JoinHandle<()>>,
}

impl Device {
    /// Opens the gateway on the calling thread, then starts the dispatch
    /// worker. The gateway moves into the worker and is closed by it when
    /// the worker exits.
    pub fn start(
        mut gateway: Box<dyn TransmitGateway>,
        config: DispatchConfig,
    ) -> Result<Self, StartError> {
        gateway.open()?;

        let queue = Arc::new(EventQueue::new());
        let stop = Arc::new(AtomicBool::new(false));
        let monitor = Arc::new(DispatchMonitor::new());
        let worker = DispatchWorker::new(
            queue.clone(),
            stop.clone(),
            gateway,
            monitor.clone(),
            &config,
        );

        let pin = config.pin_to_core;
        let builder = thread::Builder::new().name(WORKER_THREAD_NAME.to_string());
        let handle = if config.elevate_priority {
            builder.spawn_with_priority(ThreadPriority::Max, move |_| {
                if let Some(core) = pin {
                    pin_dispatch_thread(core);
                }
                worker.run();
            })?
        } else {
            builder.spawn(move || {
                if let Some(core) = pin {
                    pin_dispatch_thread(core);
                }
                worker.run();
            })?
        };

        info!(
            "[Device] dispatch worker started (wait {:?}, staleness threshold {:?})",
            config.wait_timeout, config.staleness_threshold
        );

        Ok(Self {
            queue,
            stop,
            monitor,
            worker: Some(handle),
        })
    }

    /// Producer entry point. Never blocks on the worker; once shutdown has
    /// begun the message is rejected and counted instead of queued.
    pub fn enqueue(&self, control_index: ControlIndex, control_value: ControlValue) {
        submit(&self.queue, &self.stop, &self.monitor, control_index, control_value);
    }

    /// Cloneable handle for producer threads that should not borrow the
    /// device itself.
    pub fn producer(&self) -> Producer {
        Producer {
            queue: self.queue.clone(),
            stop: self.stop.clone(),
            monitor: self.monitor.clone(),
        }
    }

    pub fn monitor(&self) -> &DispatchMonitor {
        &self.monitor
    }

    /// Shared handle to the monitor, usable after the device is gone.
    pub fn monitor_handle(&self) -> Arc<DispatchMonitor> {
        self.monitor.clone()
    }

    /// Messages queued but not yet claimed by the worker.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Stops the worker and joins it. Later calls return immediately.
    /// Messages still queued when the flag is seen are discarded.
    pub fn shutdown(&mut self) {
        let handle = match self.worker.take() {
            Some(handle) => handle,
            None => return,
        };

        self.stop.store(true, Ordering::Relaxed);
        self.queue.wake();

        match handle.join() {
            Ok(()) => info!("[Device] closed down device"),
            Err(_) => error!("[Device] dispatch thread panicked during shutdown"),
        }
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Producer-side handle to a device. Clones share the same queue, stop flag
/// and monitor.
#[derive(Clone)]
pub struct Producer {
    queue: Arc<EventQueue>,
    stop: Arc<AtomicBool>,
    monitor: Arc<DispatchMonitor>,
}

impl Producer {
    pub fn enqueue(&self, control_index: ControlIndex, control_value: ControlValue) {
        submit(&self.queue, &self.stop, &self.monitor, control_index, control_value);
    }
}

fn submit(
    queue: &EventQueue,
    stop: &AtomicBool,
    monitor: &DispatchMonitor,
    control_index: ControlIndex,
    control_value: ControlValue,
) {
    if stop.load(Ordering::Relaxed) {
        monitor.record_rejected();
        debug!(
            "[Device] rejecting control {} value {}: shutting down",
            control_index, control_value
        );
        return;
    }

    queue.enqueue(control_index, control_value);
    monitor.record_enqueued();
}

fn pin_dispatch_thread(core: usize) {
    let core_ids = core_affinity::get_core_ids().unwrap_or_default();
    if let Some(core_id) = core_ids.get(core) {
        if core_affinity::set_for_current(*core_id) {
            info!("[Device] dispatch thread pinned to core {}", core);
        } else {
            error!("[Device] failed to pin dispatch thread to core {}", core);
        }
    } else {
        error!("[Device] core {} not found in available system cores", core);
    }
}
