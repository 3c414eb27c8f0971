//! Change feed of connected device ids

use catalogue_transport::DeviceTransport;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};
use uuid::Uuid;

/// Subscriber handle; the receiver yields sorted device id snapshots
pub struct Subscription {
    pub id: Uuid,
    pub receiver: mpsc::Receiver<Vec<String>>,
}

/// Pushes the connected device set to every subscriber
pub struct ChangeNotifier {
    transport: Arc<dyn DeviceTransport>,
    subscribers: Mutex<HashMap<Uuid, mpsc::Sender<Vec<String>>>>,
    buffer: usize,
}

impl ChangeNotifier {
    pub fn new(transport: Arc<dyn DeviceTransport>, buffer: usize) -> Self {
        Self {
            transport,
            subscribers: Mutex::new(HashMap::new()),
            buffer: buffer.max(1),
        }
    }

    async fn snapshot(&self) -> Vec<String> {
        self.transport
            .connected_device_ids()
            .await
            .into_iter()
            .collect()
    }

    /// Register a subscriber with the current snapshot already queued
    pub async fn subscribe(&self) -> Subscription {
        let (tx, receiver) = mpsc::channel(self.buffer);
        let id = Uuid::new_v4();

        // Same lock as publish, so no update can slip in between
        let mut subscribers = self.subscribers.lock().await;
        let snapshot = self.snapshot().await;
        if tx.try_send(snapshot).is_err() {
            warn!(subscriber = %id, "Failed to queue initial snapshot");
        }
        subscribers.insert(id, tx);
        debug!(subscriber = %id, total = subscribers.len(), "Change feed subscriber added");

        Subscription { id, receiver }
    }

    pub async fn unsubscribe(&self, id: Uuid) -> bool {
        let removed = self.subscribers.lock().await.remove(&id).is_some();
        if removed {
            debug!(subscriber = %id, "Change feed subscriber removed");
        }
        removed
    }

    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.lock().await.len()
    }

    /// Send the current snapshot to every subscriber
    pub async fn publish(&self) {
        let mut subscribers = self.subscribers.lock().await;
        let snapshot = self.snapshot().await;

        subscribers.retain(|id, tx| match tx.try_send(snapshot.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(subscriber = %id, "Change feed subscriber lagging, update dropped");
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!(subscriber = %id, "Change feed subscriber closed");
                false
            }
        });

        debug!(
            devices = snapshot.len(),
            subscribers = subscribers.len(),
            "Published device snapshot"
        );
    }
}
