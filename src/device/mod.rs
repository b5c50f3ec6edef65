//! Virtual packet device subsystem.
//!
//! # Data Flow
//! ```text
//! engine write(bufs, offset)
//!     → loopback.rs (copy each buffer into an owned packet, one batch per call)
//!     → queue.rs (bounded FIFO, blocks the writer when full)
//!     → loopback.rs (next read copies the batch into caller buffers)
//!     → engine read(bufs, sizes, offset)
//! ```
//!
//! # Design Decisions
//! - The device is synchronous: engines call it from blocking threads
//! - Close is the only way to unblock a pending read or write
//! - Nothing handed to `write` is aliased after the call returns

pub mod loopback;
pub mod queue;

use thiserror::Error;

pub use loopback::LoopDevice;

/// MTU advertised when the caller passes a non-positive value.
pub const DEFAULT_MTU: usize = 1420;

/// Advisory number of packets an engine should move per call.
pub const DEFAULT_BATCH_SIZE: usize = 128;

/// Number of batches the loopback holds before writers block.
pub const DEFAULT_QUEUE_CAPACITY: usize = 128_000;

/// One read or write worth of packets.
pub type Batch = Vec<Vec<u8>>;

/// Lifecycle notifications emitted by a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// The interface is up and ready for traffic.
    Up,
}

/// Errors returned by device reads and writes.
///
/// The device never retries on the caller's behalf.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceError {
    /// The device was closed before or during the call.
    #[error("io: read/write on closed pipe")]
    Closed,

    /// A queued packet does not fit in the destination buffer.
    #[error("packet too large for buffer ({len} bytes, {capacity} available)")]
    PacketTooLarge { len: usize, capacity: usize },
}

/// A network interface as seen by the protocol engine.
pub trait PacketDevice: Send + Sync {
    /// Block until a batch is available and copy it into `bufs` at `offset`.
    ///
    /// Returns the number of packets delivered; `sizes[i]` holds the length of packet `i`.
    fn read(
        &self,
        bufs: &mut [&mut [u8]],
        sizes: &mut [usize],
        offset: usize,
    ) -> Result<usize, DeviceError>;

    /// Queue `bufs[i][offset..]` for every buffer as a single batch.
    fn write(&self, bufs: &[&[u8]], offset: usize) -> Result<usize, DeviceError>;

    fn mtu(&self) -> usize;

    fn name(&self) -> &str;

    fn batch_size(&self) -> usize {
        DEFAULT_BATCH_SIZE
    }

    /// Close the device. Calling it again is a no-op.
    fn close(&self);
}
