//! worker.rs
//! Dispatch worker: the single consumer behind the event queue.
//! - waits on the queue with a periodic timeout so a set stop flag is seen
//!   within one interval even if the wakeup signal is missed
//! - claims the whole backlog in one drain and walks it in arrival order
//! - drops messages older than the staleness threshold instead of sending
//!   them late, and logs the observed latency
//! - batches surviving messages through the packet builder and hands the
//!   bytes to the transmit gateway

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use log::{debug, warn};

use crate::device::DispatchConfig;
use crate::gateway::TransmitGateway;
use crate::message::{ControlIndex, ControlMessage};
use crate::monitor::DispatchMonitor;
use crate::packet::{PacketBuilder, encode_control_change};
use crate::queue::{EventQueue, WaitOutcome};

/// Consumer loop state. Owned by the dispatch thread once `run` is called;
/// constructed by the device, or directly when embedding the loop in a
/// caller-managed thread.
pub struct DispatchWorker {
    queue: Arc<EventQueue>,
    stop: Arc<AtomicBool>,
    gateway: Box<dyn TransmitGateway>,
    monitor: Arc<DispatchMonitor>,
    builder: PacketBuilder,
    in_flight: Vec<ControlIndex>,
    wait_timeout: Duration,
    staleness_threshold: Duration,
    channel: u8,
    coalesce: bool,
}

impl DispatchWorker {
    /// The gateway must already be open; the worker only transmits and closes.
    pub fn new(
        queue: Arc<EventQueue>,
        stop: Arc<AtomicBool>,
        gateway: Box<dyn TransmitGateway>,
        monitor: Arc<DispatchMonitor>,
        config: &DispatchConfig,
    ) -> Self {
        Self {
            queue,
            stop,
            gateway,
            monitor,
            builder: PacketBuilder::new(config.packet_capacity),
            in_flight: Vec::new(),
            wait_timeout: config.wait_timeout,
            staleness_threshold: config.staleness_threshold,
            channel: config.channel,
            coalesce: config.coalesce,
        }
    }

    /// Consumer loop: wait, claim the backlog, dispatch, repeat until the
    /// stop flag is set. Messages still queued when the flag is seen are
    /// discarded, not transmitted. Closes the gateway on the way out.
    pub fn run(mut self) {
        debug!("[Dispatch] worker up");

        while !self.stop.load(Ordering::Relaxed) {
            if let WaitOutcome::TimedOut = self.queue.wait_for_work(self.wait_timeout) {
                continue;
            }

            let claimed = self.queue.drain_all();
            if claimed.is_empty() {
                // Woken for shutdown, or a racing drain already took the work.
                continue;
            }

            self.monitor.record_drained(claimed.len());
            self.dispatch_batch(claimed);
        }

        self.gateway.close();
        debug!("[Dispatch] stopped.");
    }

    /// Walks one claimed batch in arrival order: stale messages are dropped
    /// and counted, fresh ones are encoded and transmitted. In coalescing
    /// mode survivors share one transmission; otherwise each goes out alone.
    ///
    /// Public so embedders can drive the filter and transmit stages from a
    /// thread of their own instead of `run`.
    pub fn dispatch_batch(&mut self, claimed: Vec<ControlMessage>) {
        for message in claimed {
            let age = message.age();
            if age > self.staleness_threshold {
                warn!(
                    "[Dispatch] control message latency of {}ms detected, dropping control {} value {}",
                    age.as_millis(),
                    message.control_index,
                    message.control_value
                );
                self.monitor
                    .record_stale(message.control_index, message.control_value, age);
                continue;
            }

            self.append(&message);
            if !self.coalesce {
                self.flush();
            }
        }

        // Coalescing leaves the tail of the batch in the builder.
        self.flush();
    }

    /// Encodes one message into the builder. A full builder is flushed and
    /// the entry retried once; an entry that cannot fit even an empty
    /// builder is dropped and counted.
    fn append(&mut self, message: &ControlMessage) {
        let entry = encode_control_change(self.channel, message);
        if self.builder.append(&entry).is_ok() {
            self.in_flight.push(message.control_index);
            return;
        }

        self.flush();
        match self.builder.append(&entry) {
            Ok(()) => self.in_flight.push(message.control_index),
            Err(err) => {
                warn!(
                    "[Dispatch] {}; dropping control {} value {}",
                    err, message.control_index, message.control_value
                );
                self.monitor.record_capacity_drop();
            }
        }
    }

    /// Hands the batched bytes to the gateway and resets the builder. A
    /// failed transmission drops the batch and the loop moves on; there is
    /// no retry.
    fn flush(&mut self) {
        if self.builder.is_empty() {
            return;
        }

        match self.gateway.transmit(self.builder.batch()) {
            Ok(()) => {
                for control_index in self.in_flight.drain(..) {
                    self.monitor.record_transmitted(control_index);
                }
            }
            Err(err) => {
                warn!(
                    "[Dispatch] transmit failed, dropping batch of {} entries: {}",
                    self.builder.batch().entries(),
                    err
                );
                self.monitor.record_transmit_failure();
                self.in_flight.clear();
            }
        }

        self.builder.reset();
    }
}
