//! Test helpers shared by the bridge modules

use async_trait::async_trait;
use catalogue_core::{CatalogueInstance, CatalogueSet, FieldValue, ObjectType, SchemaTable};
use catalogue_transport::{
    DeviceEvent, DeviceTransport, LocalTransport, ObjectTreeServer, ReadResponse, TransportError,
};
use serde_json::json;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, Notify};

/// Object tree serving one hyperty per name
pub fn hyperty_server(names: &[&str]) -> ObjectTreeServer {
    let schema = SchemaTable::bundled().unwrap();
    let mut set = CatalogueSet::new();
    for name in names {
        let mut instance = CatalogueInstance::new(ObjectType::Hyperty);
        instance.set_text("uuid", format!("{name}-uuid"));
        instance.set_text("name", *name);
        instance
            .fields
            .insert("hypertyType".to_string(), FieldValue::Json(json!(["comm"])));
        set.entry(ObjectType::Hyperty).or_default().push(instance);
    }
    ObjectTreeServer::new(&schema, &set)
}

/// Local transport that records every read
pub struct CountingTransport {
    inner: Arc<LocalTransport>,
    reads: Mutex<Vec<String>>,
}

impl CountingTransport {
    pub fn new(inner: Arc<LocalTransport>) -> Self {
        Self {
            inner,
            reads: Mutex::new(Vec::new()),
        }
    }

    /// Reads so far, as `<device> <path>`
    pub fn reads(&self) -> Vec<String> {
        self.reads.lock().unwrap().clone()
    }

    pub fn read_count(&self) -> usize {
        self.reads.lock().unwrap().len()
    }
}

#[async_trait]
impl DeviceTransport for CountingTransport {
    async fn read_resource(
        &self,
        device_id: &str,
        path: &str,
    ) -> Result<ReadResponse, TransportError> {
        self.reads
            .lock()
            .unwrap()
            .push(format!("{device_id} {path}"));
        self.inner.read_resource(device_id, path).await
    }

    async fn connected_device_ids(&self) -> BTreeSet<String> {
        self.inner.connected_device_ids().await
    }

    fn subscribe(&self) -> mpsc::UnboundedReceiver<DeviceEvent> {
        self.inner.subscribe()
    }
}

/// Local transport that can hold one read open until released
pub struct GatedTransport {
    inner: Arc<LocalTransport>,
    armed: AtomicBool,
    entered: Notify,
    released: Notify,
}

impl GatedTransport {
    pub fn new(inner: Arc<LocalTransport>) -> Self {
        Self {
            inner,
            armed: AtomicBool::new(false),
            entered: Notify::new(),
            released: Notify::new(),
        }
    }

    /// Hold the next read until [`GatedTransport::release`]
    pub fn hold_next_read(&self) {
        self.armed.store(true, Ordering::SeqCst);
    }

    /// Wait until the held read has started
    pub async fn read_started(&self) {
        self.entered.notified().await;
    }

    pub fn release(&self) {
        self.released.notify_one();
    }
}

#[async_trait]
impl DeviceTransport for GatedTransport {
    async fn read_resource(
        &self,
        device_id: &str,
        path: &str,
    ) -> Result<ReadResponse, TransportError> {
        if self.armed.swap(false, Ordering::SeqCst) {
            self.entered.notify_one();
            self.released.notified().await;
        }
        self.inner.read_resource(device_id, path).await
    }

    async fn connected_device_ids(&self) -> BTreeSet<String> {
        self.inner.connected_device_ids().await
    }

    fn subscribe(&self) -> mpsc::UnboundedReceiver<DeviceEvent> {
        self.inner.subscribe()
    }
}
