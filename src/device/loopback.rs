//! Loopback packet device.
//!
//! Every batch written to the device becomes the next batch read from it,
//! which lets a protocol engine run without a kernel interface.

use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;

use super::queue::BoundedQueue;
use super::{Batch, DeviceError, Event, PacketDevice, DEFAULT_MTU, DEFAULT_QUEUE_CAPACITY};
use crate::observability::metrics;

const EVENT_BUFFER: usize = 10;

/// Sender half is dropped on close so the stream ends.
struct EventStream {
    tx: Option<mpsc::Sender<Event>>,
    rx: Option<mpsc::Receiver<Event>>,
}

/// An in-memory interface that echoes writes back as reads.
pub struct LoopDevice {
    name: String,
    mtu: Mutex<usize>,
    queue: BoundedQueue<Batch>,
    events: Mutex<EventStream>,
}

impl LoopDevice {
    /// Create a device with the default queue capacity.
    ///
    /// A non-positive `mtu` is replaced by [`DEFAULT_MTU`].
    pub fn create(name: impl Into<String>, mtu: i32) -> Self {
        Self::with_capacity(name, mtu, DEFAULT_QUEUE_CAPACITY)
    }

    /// Create a device whose queue holds at most `capacity` batches.
    pub fn with_capacity(name: impl Into<String>, mtu: i32, capacity: usize) -> Self {
        let mtu = usize::try_from(mtu)
            .ok()
            .filter(|mtu| *mtu > 0)
            .unwrap_or(DEFAULT_MTU);

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        // Fresh channel with spare capacity.
        let _ = tx.try_send(Event::Up);

        let device = Self {
            name: name.into(),
            mtu: Mutex::new(mtu),
            queue: BoundedQueue::new(capacity),
            events: Mutex::new(EventStream {
                tx: Some(tx),
                rx: Some(rx),
            }),
        };

        tracing::debug!(
            device = %device.name,
            mtu,
            queue_capacity = device.queue.capacity(),
            "Loop device created"
        );
        device
    }

    /// Take the event stream. Only the first call returns it.
    ///
    /// The stream yields [`Event::Up`] and ends once the device is closed.
    pub fn take_events(&self) -> Option<mpsc::Receiver<Event>> {
        self.lock_events().rx.take()
    }

    pub fn set_mtu(&self, mtu: usize) {
        *self.mtu.lock().unwrap_or_else(PoisonError::into_inner) = mtu;
    }

    pub fn is_closed(&self) -> bool {
        self.queue.is_closed()
    }

    fn lock_events(&self) -> MutexGuard<'_, EventStream> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl PacketDevice for LoopDevice {
    /// Oversized packets are detected before any buffer is touched, so a
    /// failed call leaves every caller slot as it was. The batch is consumed.
    fn read(
        &self,
        bufs: &mut [&mut [u8]],
        sizes: &mut [usize],
        offset: usize,
    ) -> Result<usize, DeviceError> {
        let batch = self.queue.pop().map_err(|_| DeviceError::Closed)?;
        metrics::record_queue_depth(self.queue.len());

        let count = batch.len().min(bufs.len()).min(sizes.len());

        for (packet, buf) in batch.iter().zip(bufs.iter()).take(count) {
            let capacity = buf.len().saturating_sub(offset);
            if offset > buf.len() || packet.len() > capacity {
                tracing::debug!(
                    device = %self.name,
                    len = packet.len(),
                    capacity,
                    "Dropping batch with oversized packet"
                );
                return Err(DeviceError::PacketTooLarge {
                    len: packet.len(),
                    capacity,
                });
            }
        }

        for ((packet, buf), size) in batch
            .iter()
            .zip(bufs.iter_mut())
            .zip(sizes.iter_mut())
            .take(count)
        {
            buf[offset..offset + packet.len()].copy_from_slice(packet);
            *size = packet.len();
        }

        metrics::record_packets_read(count);
        Ok(count)
    }

    fn write(&self, bufs: &[&[u8]], offset: usize) -> Result<usize, DeviceError> {
        if self.queue.is_closed() {
            return Err(DeviceError::Closed);
        }

        let batch: Batch = bufs
            .iter()
            .map(|buf| buf.get(offset..).unwrap_or(&[]).to_vec())
            .collect();

        self.queue.push(batch).map_err(|_| DeviceError::Closed)?;
        metrics::record_packets_written(bufs.len());
        metrics::record_queue_depth(self.queue.len());
        Ok(bufs.len())
    }

    fn mtu(&self) -> usize {
        *self.mtu.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn close(&self) {
        if self.queue.close() {
            self.lock_events().tx.take();
            tracing::debug!(device = %self.name, "Loop device closed");
        }
    }
}

impl Drop for LoopDevice {
    fn drop(&mut self) {
        self.close();
    }
}
