use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{select, TrySendError};
use thiserror::Error;

use super::snapshot_bridge::{SnapshotBridge, TrackSummary};

pub type SubscriberId = u64;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("subscriber disconnected")]
    Disconnected,
    #[error("subscriber is not keeping up")]
    Lagging,
}

/// Receiving end of the push channel.
///
/// `deliver` runs on the broadcaster thread and must not block; a failed
/// delivery unsubscribes the receiver.
pub trait Subscriber: Send {
    fn deliver(&self, summary: &TrackSummary) -> Result<(), DeliveryError>;
}

impl Subscriber for crossbeam_channel::Sender<TrackSummary> {
    fn deliver(&self, summary: &TrackSummary) -> Result<(), DeliveryError> {
        self.try_send(summary.clone()).map_err(|e| match e {
            TrySendError::Full(_) => DeliveryError::Lagging,
            TrySendError::Disconnected(_) => DeliveryError::Disconnected,
        })
    }
}

/// Fans the latest track summary out to every registered subscriber on a
/// fixed cadence.
pub struct Broadcaster {
    bridge: Arc<SnapshotBridge>,
    subscribers: Mutex<BTreeMap<SubscriberId, Box<dyn Subscriber>>>,
    next_id: AtomicU64,
}

impl Broadcaster {
    pub fn new(bridge: Arc<SnapshotBridge>) -> Self {
        Self {
            bridge,
            subscribers: Mutex::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn subscribe(&self, subscriber: impl Subscriber + 'static) -> SubscriberId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.lock().insert(id, Box::new(subscriber));
        log::info!("Subscriber {id} connected");
        id
    }

    /// Returns whether `id` was still registered.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let removed = self.lock().remove(&id).is_some();
        if removed {
            log::info!("Subscriber {id} disconnected");
        }
        removed
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().len()
    }

    /// Take one summary and offer it to every subscriber. Subscribers whose
    /// delivery fails are dropped; the rest are unaffected.
    ///
    /// Returns the number of successful deliveries.
    pub fn broadcast_once(&self) -> usize {
        let summary = self.bridge.summary();
        let mut subscribers = self.lock();

        subscribers.retain(|id, subscriber| match subscriber.deliver(&summary) {
            Ok(()) => true,
            Err(e) => {
                log::debug!("Dropping subscriber {id}: {e}");
                false
            }
        });
        subscribers.len()
    }

    /// Run `broadcast_once` every `interval` on a dedicated thread until the
    /// returned handle is stopped or dropped.
    pub fn spawn(self: Arc<Self>, interval: Duration) -> std::io::Result<BroadcastHandle> {
        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(0);
        let ticker = crossbeam_channel::tick(interval);

        let thread = std::thread::Builder::new()
            .name("broadcaster".into())
            .spawn(move || loop {
                select! {
                    recv(ticker) -> _ => {
                        self.broadcast_once();
                    }
                    recv(stop_rx) -> _ => break,
                }
            })?;

        Ok(BroadcastHandle {
            stop: Some(stop_tx),
            thread: Some(thread),
        })
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<SubscriberId, Box<dyn Subscriber>>> {
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Stops the broadcaster thread when stopped or dropped.
pub struct BroadcastHandle {
    stop: Option<crossbeam_channel::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl BroadcastHandle {
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        // Dropping the sender disconnects the stop channel.
        self.stop.take();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for BroadcastHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}
