//! message.rs
//! Control message data model: one discrete (index, value) parameter update.
//! - carries the 7-bit MIDI control-change ranges (controls 0..120, values 0..128)
//! - `enqueued_at` is stamped at construction; the dispatch worker ages messages against it

use std::time::{Duration, Instant};

/// MIDI control selector, valid range `0..CONTROL_INDEX_LIMIT`.
pub type ControlIndex = u8;

/// MIDI control value, valid range `0..CONTROL_VALUE_LIMIT`.
pub type ControlValue = u8;

/// Exclusive upper bound for control indices. Indices 120..=127 are channel
/// mode messages in MIDI and must not be emitted as controls.
pub const CONTROL_INDEX_LIMIT: u8 = 120;

/// Exclusive upper bound for 7-bit control values.
pub const CONTROL_VALUE_LIMIT: u8 = 128;

/// A single pending control update. Immutable once constructed; owned by the
/// event queue until the dispatch worker claims it.
#[derive(Debug, Clone)]
pub struct ControlMessage {
    pub control_index: ControlIndex,
    pub control_value: ControlValue,
    /// Monotonic timestamp taken when the message entered the system.
    pub enqueued_at: Instant,
}

impl ControlMessage {
    /// Builds a message stamped with the current time.
    ///
    /// Range violations are caught in debug builds; release builds rely on
    /// the 7-bit masking applied at serialization (see `packet.rs`).
    pub fn new(control_index: ControlIndex, control_value: ControlValue) -> Self {
        debug_assert!(
            control_index < CONTROL_INDEX_LIMIT,
            "control index {control_index} out of range"
        );
        debug_assert!(
            control_value < CONTROL_VALUE_LIMIT,
            "control value {control_value} out of range"
        );
        Self {
            control_index,
            control_value,
            enqueued_at: Instant::now(),
        }
    }

    /// Elapsed time since the message was enqueued.
    #[inline]
    pub fn age(&self) -> Duration {
        self.enqueued_at.elapsed()
    }
}
