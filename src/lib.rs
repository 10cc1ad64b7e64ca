//! # midi_dispatch
//! Real-time control message dispatcher. Producers enqueue control changes
//! from any thread; a single dispatch worker drains the queue, drops
//! anything stale, and pushes the rest through a bounded packet builder to a
//! transmit gateway.
//!
//! ## Pipeline
//! - **Producers:** call [`Device::enqueue`] (or a cloned [`Producer`]) at any
//!   time between `start` and `shutdown`.
//! - **Event queue:** mutex-guarded FIFO with a condition variable; the
//!   worker claims the whole backlog in one drain.
//! - **Staleness filter:** messages older than 2ms (configurable) are dropped
//!   and logged instead of sent late.
//! - **Packet builder:** fixed-capacity batch of 3-byte control-change
//!   entries, reset after every transmission.
//! - **Transmit gateway:** pluggable output seam ([`TransmitGateway`]).
//!
//! ## Concurrency
//! - One consumer thread per device, joined on shutdown (`Drop` included).
//! - Atomic stop flag checked at every wake; the periodic timed wait bounds
//!   shutdown latency even if a wakeup is missed.
//! - Diagnostics are lock-free (atomic counters, bounded ring, sharded map)
//!   and never block producers or the worker.

pub mod device;
pub mod gateway;
pub mod message;
pub mod monitor;
pub mod packet;
pub mod queue;
pub mod worker;

pub use device::{
    DEFAULT_STALENESS_THRESHOLD, DEFAULT_WAIT_TIMEOUT, Device, DispatchConfig, Producer,
    StartError,
};
pub use gateway::{ChannelGateway, GatewayError, NullGateway, TransmitGateway};
pub use message::{
    CONTROL_INDEX_LIMIT, CONTROL_VALUE_LIMIT, ControlIndex, ControlMessage, ControlValue,
};
pub use monitor::{DispatchMonitor, LateDrop, MonitorSnapshot};
pub use packet::{
    CONTROL_ENTRY_LEN, CapacityExceeded, DEFAULT_PACKET_CAPACITY, PacketBuilder,
    TransmissionBatch, encode_control_change,
};
pub use queue::{EventQueue, WaitOutcome};
pub use worker::DispatchWorker;
