//! In-process device transport
//!
//! Devices are catalogue databases served by an [`ObjectTreeServer`] living
//! in the same process. Connecting, reconnecting and disconnecting them
//! produce the same lifecycle events a networked transport would.

use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info};

use crate::link::ObjectPath;
use crate::response::ReadResponse;
use crate::server::ObjectTreeServer;
use crate::transport::{DeviceEvent, DeviceTransport, TransportError};

#[derive(Default)]
pub struct LocalTransport {
    devices: RwLock<HashMap<String, Arc<ObjectTreeServer>>>,
    listeners: Mutex<Vec<mpsc::UnboundedSender<DeviceEvent>>>,
}

impl LocalTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connect a device, or replace the tree of an already connected one
    ///
    /// Emits `Registered` for a new device and `Updated` otherwise.
    /// Returns true if the device was not connected before.
    pub async fn connect(&self, device_id: impl Into<String>, server: ObjectTreeServer) -> bool {
        let device_id = device_id.into();
        let links = server.links();

        // Emit while holding the write lock so event order matches map order
        let mut devices = self.devices.write().await;
        let is_new = devices
            .insert(device_id.clone(), Arc::new(server))
            .is_none();

        info!(
            device_id = %device_id,
            links = links.len(),
            is_new,
            "Device connected"
        );

        let event = if is_new {
            DeviceEvent::Registered { device_id, links }
        } else {
            DeviceEvent::Updated { device_id, links }
        };
        self.emit(event);
        is_new
    }

    /// Disconnect a device; returns false if it was not connected
    pub async fn disconnect(&self, device_id: &str) -> bool {
        let mut devices = self.devices.write().await;
        if devices.remove(device_id).is_none() {
            return false;
        }

        info!(device_id = %device_id, "Device disconnected");
        self.emit(DeviceEvent::Unregistered {
            device_id: device_id.to_string(),
        });
        true
    }

    pub async fn is_connected(&self, device_id: &str) -> bool {
        self.devices.read().await.contains_key(device_id)
    }

    fn emit(&self, event: DeviceEvent) {
        let mut listeners = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        listeners.retain(|tx| tx.send(event.clone()).is_ok());
        debug!(
            device_id = %event.device_id(),
            listeners = listeners.len(),
            "Delivered device event"
        );
    }
}

#[async_trait]
impl DeviceTransport for LocalTransport {
    async fn read_resource(
        &self,
        device_id: &str,
        path: &str,
    ) -> Result<ReadResponse, TransportError> {
        let path =
            ObjectPath::parse(path).ok_or_else(|| TransportError::InvalidPath(path.to_string()))?;

        let server = self
            .devices
            .read()
            .await
            .get(device_id)
            .cloned()
            .ok_or_else(|| TransportError::DeviceNotConnected(device_id.to_string()))?;

        Ok(server.read(&path).await)
    }

    async fn connected_device_ids(&self) -> BTreeSet<String> {
        self.devices.read().await.keys().cloned().collect()
    }

    fn subscribe(&self) -> mpsc::UnboundedReceiver<DeviceEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }
}
