//! gateway.rs
//! Output transport seam: the dispatcher hands finished transmission batches
//! to a `TransmitGateway` and otherwise knows nothing about the transport.
//! - `open` failures are fatal at device startup; `transmit` failures are
//!   logged and skipped, never retried (a retried control value would itself
//!   already be stale by the retry)
//! - `NullGateway` discards batches; `ChannelGateway` forwards batch bytes
//!   over a bounded crossbeam channel for tests and in-process consumers

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam::channel::{Receiver, Sender, bounded};
use thiserror::Error;

use crate::packet::TransmissionBatch;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("gateway open failed: {0}")]
    OpenFailed(String),
    #[error("transmit failed: {0}")]
    TransmitFailed(String),
    #[error("gateway is not open")]
    NotOpen,
}

/// Contract for the output transport.
///
/// The dispatch worker owns its gateway exclusively, so implementations never
/// need internal locking for the dispatcher's sake.
pub trait TransmitGateway: Send {
    /// Establishes the transport. Called once from `Device::start`; the
    /// device refuses to start when this fails.
    fn open(&mut self) -> Result<(), GatewayError>;

    /// Synchronously delivers one batch; must return promptly. The dispatcher
    /// resets its own packet builder between batches, so implementations must
    /// not require any flush of their own between calls.
    fn transmit(&mut self, batch: &TransmissionBatch) -> Result<(), GatewayError>;

    /// Releases the transport. The worker calls this once when its loop
    /// exits; implementations must also release resources on plain drop.
    fn close(&mut self);
}

/// Discards every batch. Benchmark and demo sink.
#[derive(Debug, Default)]
pub struct NullGateway {
    open: bool,
    transmitted: Arc<AtomicU64>,
}

impl NullGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared counter of accepted batches; stays readable after the gateway
    /// has moved into the worker thread.
    pub fn transmitted_handle(&self) -> Arc<AtomicU64> {
        self.transmitted.clone()
    }
}

impl TransmitGateway for NullGateway {
    fn open(&mut self) -> Result<(), GatewayError> {
        self.open = true;
        Ok(())
    }

    fn transmit(&mut self, _batch: &TransmissionBatch) -> Result<(), GatewayError> {
        if !self.open {
            return Err(GatewayError::NotOpen);
        }
        self.transmitted.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn close(&mut self) {
        self.open = false;
    }
}

/// Forwards each batch's serialized bytes over a bounded crossbeam channel.
///
/// `new(capacity)` hands back the gateway and the receiving end together.
/// `transmit` never blocks: a full or disconnected channel is reported as a
/// transmit failure and the batch is dropped, keeping the dispatch thread
/// real-time safe.
pub struct ChannelGateway {
    tx: Sender<Vec<u8>>,
    open: bool,
}

impl ChannelGateway {
    pub fn new(capacity: usize) -> (Self, Receiver<Vec<u8>>) {
        let (tx, rx) = bounded(capacity);
        (Self { tx, open: false }, rx)
    }
}

impl TransmitGateway for ChannelGateway {
    fn open(&mut self) -> Result<(), GatewayError> {
        self.open = true;
        Ok(())
    }

    fn transmit(&mut self, batch: &TransmissionBatch) -> Result<(), GatewayError> {
        if !self.open {
            return Err(GatewayError::NotOpen);
        }
        self.tx
            .try_send(batch.bytes().to_vec())
            .map_err(|e| GatewayError::TransmitFailed(format!("channel send: {e}")))
    }

    fn close(&mut self) {
        self.open = false;
    }
}
