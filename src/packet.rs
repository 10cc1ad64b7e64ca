//! packet.rs
//! Transmission batch assembly: a bounded buffer of serialized control entries.
//! - fixed capacity (default 512 bytes, the size the hardware path allocates)
//! - overflow is a recoverable `CapacityExceeded`, never a process abort
//! - the builder is reset after every transmission, so it is always either
//!   empty or mid-fill, never carried across sends

use thiserror::Error;

use crate::message::ControlMessage;

/// Default batch capacity in bytes.
pub const DEFAULT_PACKET_CAPACITY: usize = 512;

/// Bytes occupied by one serialized control entry.
pub const CONTROL_ENTRY_LEN: usize = 3;

/// Status byte for a control-change message on channel 0.
const CONTROL_CHANGE_STATUS: u8 = 0xB0;

/// Serializes one control message as a control-change triple
/// `[status | channel, control, value]` on the given channel.
///
/// Data bytes are masked to 7 bits so an out-of-range value can never be
/// mistaken for a status byte downstream; the channel is masked to 4 bits.
pub fn encode_control_change(channel: u8, message: &ControlMessage) -> [u8; CONTROL_ENTRY_LEN] {
    [
        CONTROL_CHANGE_STATUS | (channel & 0x0F),
        message.control_index & 0x7F,
        message.control_value & 0x7F,
    ]
}

/// An entry did not fit into the batch. Previously appended entries are left
/// untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("batch capacity exceeded: entry of {entry_len} bytes, {available} bytes free")]
pub struct CapacityExceeded {
    pub entry_len: usize,
    pub available: usize,
}

/// One bounded-capacity buffer of serialized control entries, handed to the
/// transmit gateway as a unit.
#[derive(Debug)]
pub struct TransmissionBatch {
    buf: Vec<u8>,
    capacity: usize,
    entries: usize,
}

impl TransmissionBatch {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
            capacity,
            entries: 0,
        }
    }

    /// Serialized contents in append order.
    pub fn bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Number of entries appended since the last reset.
    pub fn entries(&self) -> usize {
        self.entries
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Fixed byte capacity of this batch.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes still free before the batch is full.
    pub fn remaining(&self) -> usize {
        self.capacity - self.buf.len()
    }

    fn push(&mut self, entry: &[u8]) -> Result<(), CapacityExceeded> {
        if entry.len() > self.remaining() {
            return Err(CapacityExceeded {
                entry_len: entry.len(),
                available: self.remaining(),
            });
        }
        self.buf.extend_from_slice(entry);
        self.entries += 1;
        Ok(())
    }

    fn clear(&mut self) {
        self.buf.clear();
        self.entries = 0;
    }
}

/// Accumulates serialized control entries into the current transmission batch.
///
/// Owned exclusively by the dispatch worker; requires no locking.
#[derive(Debug)]
pub struct PacketBuilder {
    batch: TransmissionBatch,
}

impl PacketBuilder {
    pub fn new(capacity: usize) -> Self {
        Self {
            batch: TransmissionBatch::with_capacity(capacity),
        }
    }

    /// Appends one pre-serialized entry. On overflow the batch is left exactly
    /// as it was before the call.
    pub fn append(&mut self, entry: &[u8]) -> Result<(), CapacityExceeded> {
        self.batch.push(entry)
    }

    /// The batch built so far, ready to hand to a gateway.
    pub fn batch(&self) -> &TransmissionBatch {
        &self.batch
    }

    pub fn is_empty(&self) -> bool {
        self.batch.is_empty()
    }

    /// Clears the batch for the next fill. Capacity and allocation are kept.
    pub fn reset(&mut self) {
        self.batch.clear();
    }
}

impl Default for PacketBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_PACKET_CAPACITY)
    }
}
