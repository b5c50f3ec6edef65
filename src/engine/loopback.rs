//! Stand-in engine for the loop device.
//!
//! Behaves like an engine with no peers configured: every packet read from
//! the device is dropped. Control requests store and report settings.

use std::collections::BTreeMap;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::io::BufReader;
use tokio::net::UnixStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use super::Engine;
use crate::control::protocol::{self, ProtocolError, Request};
use crate::device::{DeviceError, Event, LoopDevice, PacketDevice};

pub struct LoopbackEngine {
    device: Arc<LoopDevice>,
    events: Mutex<Option<mpsc::Receiver<Event>>>,
    settings: Mutex<BTreeMap<String, String>>,
    done: watch::Sender<bool>,
}

impl LoopbackEngine {
    pub fn new(device: Arc<LoopDevice>) -> Arc<Self> {
        let events = device.take_events();
        let (done, _) = watch::channel(false);
        Arc::new(Self {
            device,
            events: Mutex::new(events),
            settings: Mutex::new(BTreeMap::new()),
            done,
        })
    }

    /// Start the event reader and the packet pump.
    ///
    /// The returned handle finishes when the device closes. A panicking
    /// pump marks the engine completed.
    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        if let Some(mut events) = lock(&self.events).take() {
            let name = self.device.name().to_string();
            tokio::spawn(async move {
                while let Some(event) = events.recv().await {
                    match event {
                        Event::Up => tracing::debug!(device = %name, "Interface up requested"),
                    }
                }
            });
        }

        let engine = Arc::clone(self);
        tokio::spawn(async move {
            let pump = Arc::clone(&engine);
            match tokio::task::spawn_blocking(move || pump.pump()).await {
                Ok(()) => {}
                Err(e) if e.is_panic() => {
                    tracing::error!(error = %e, "Packet pump failed");
                    engine.mark_completed();
                }
                // Runtime shutdown before the pump was scheduled.
                Err(_) => tracing::debug!("Packet pump cancelled"),
            }
        })
    }

    /// Current settings, sorted by key.
    pub fn settings(&self) -> Vec<(String, String)> {
        lock(&self.settings)
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Signal that the engine has stopped on its own.
    pub fn mark_completed(&self) {
        self.done.send_replace(true);
    }

    fn apply(&self, pairs: Vec<(String, String)>) {
        let mut settings = lock(&self.settings);
        for (key, value) in pairs {
            tracing::debug!(key = %key, "Setting updated");
            settings.insert(key, value);
        }
    }

    fn pump(&self) {
        let batch = self.device.batch_size();
        let mut storage = vec![vec![0u8; self.device.mtu()]; batch];
        let mut sizes = vec![0usize; batch];

        loop {
            let mut bufs: Vec<&mut [u8]> = storage.iter_mut().map(Vec::as_mut_slice).collect();
            match self.device.read(&mut bufs, &mut sizes, 0) {
                Ok(count) => {
                    tracing::trace!(packets = count, "No peer configured, dropping packets");
                }
                Err(DeviceError::Closed) => {
                    tracing::debug!("Packet pump stopping");
                    return;
                }
                Err(e) => tracing::warn!(error = %e, "Failed to read from loop device"),
            }
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Engine for LoopbackEngine {
    async fn serve_control(&self, stream: UnixStream) -> io::Result<()> {
        let (read, mut write) = stream.into_split();
        let mut reader = BufReader::new(read);

        loop {
            match protocol::read_request(&mut reader).await {
                Ok(None) => return Ok(()),
                Ok(Some(Request::Get)) => {
                    let settings = self.settings();
                    protocol::write_response(&mut write, &settings, 0).await?;
                }
                Ok(Some(Request::Set(pairs))) => {
                    self.apply(pairs);
                    protocol::write_response(&mut write, &[], 0).await?;
                }
                Err(ProtocolError::Io(e)) => return Err(e),
                Err(e) => {
                    tracing::debug!(error = %e, "Rejecting control request");
                    protocol::write_response(&mut write, &[], e.errno()).await?;
                    return Ok(());
                }
            }
        }
    }

    fn completed(&self) -> impl std::future::Future<Output = ()> + Send + 'static {
        let mut done = self.done.subscribe();
        async move {
            // An error means the sender is gone, which also ends the engine.
            let _ = done.wait_for(|done| *done).await;
        }
    }

    fn close(&self) {
        self.device.close();
        self.mark_completed();
    }
}
