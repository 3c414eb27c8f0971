//! Registry of names served by connected devices
//!
//! Maps (object type, name) to the device and object instance serving it.
//! Registration scans read each advertised catalogue object from the device
//! without holding the registry lock; only the final swap of a device's
//! entries is exclusive, so resolvers see either the old or the new set.

use catalogue_core::{ObjectType, SchemaTable};
use catalogue_transport::{DeviceTransport, ObjectLink, ObjectPath, ReadResponse};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Where a registered name is served
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryEntry {
    pub name: String,
    pub object_type: ObjectType,
    pub device_id: String,
    pub object_id: u16,
    pub instance_id: u16,
}

impl RegistryEntry {
    /// `/<deviceId>/<objectId>/<instanceId>`
    pub fn target_path(&self) -> String {
        format!("/{}/{}/{}", self.device_id, self.object_id, self.instance_id)
    }

    /// Path of the instance on its device
    pub fn instance_path(&self) -> ObjectPath {
        ObjectPath {
            object_id: self.object_id,
            instance_id: Some(self.instance_id),
            resource_id: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisteredName {
    pub object_type: ObjectType,
    pub name: String,
}

/// Names a device contributed at its last scan
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceRecord {
    pub device_id: String,
    pub names: Vec<RegisteredName>,
    pub registered_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Default)]
struct RegistryState {
    entries: HashMap<ObjectType, BTreeMap<String, RegistryEntry>>,
    devices: HashMap<String, DeviceRecord>,
    /// Sequence number of the latest event seen per device
    latest: HashMap<String, u64>,
}

impl RegistryState {
    /// Remove the entries a device still owns; returns how many were removed
    fn remove_device(&mut self, device_id: &str) -> Option<DeviceRecord> {
        let record = self.devices.remove(device_id)?;
        let mut removed = 0;

        for registered in &record.names {
            let names = self.entries.entry(registered.object_type).or_default();
            match names.get(&registered.name) {
                Some(entry) if entry.device_id == device_id => {
                    names.remove(&registered.name);
                    removed += 1;
                }
                Some(entry) => debug!(
                    device_id = %device_id,
                    object_type = %registered.object_type,
                    name = %registered.name,
                    owner = %entry.device_id,
                    "Name now served by another device, leaving it"
                ),
                None => warn!(
                    device_id = %device_id,
                    object_type = %registered.object_type,
                    name = %registered.name,
                    "Recorded name missing from registry"
                ),
            }
        }

        debug!(device_id = %device_id, removed, "Removed device entries");
        Some(record)
    }

    fn insert(&mut self, entry: RegistryEntry) {
        let names = self.entries.entry(entry.object_type).or_default();
        if let Some(previous) = names.get(&entry.name) {
            if previous.device_id != entry.device_id {
                info!(
                    object_type = %entry.object_type,
                    name = %entry.name,
                    previous = %previous.device_id,
                    device_id = %entry.device_id,
                    "Name collision, latest registration wins"
                );
            }
        }
        names.insert(entry.name.clone(), entry);
    }
}

/// Name registry shared by the event listener and resolvers
pub struct Registry {
    schema: Arc<SchemaTable>,
    transport: Arc<dyn DeviceTransport>,
    state: RwLock<RegistryState>,
    sequence: AtomicU64,
}

impl Registry {
    pub fn new(schema: Arc<SchemaTable>, transport: Arc<dyn DeviceTransport>) -> Self {
        Self {
            schema,
            transport,
            state: RwLock::new(RegistryState::default()),
            sequence: AtomicU64::new(0),
        }
    }

    /// Index a newly registered device
    ///
    /// Returns the number of names committed, or `None` if a newer event for
    /// the device superseded this scan or the device is gone.
    pub async fn register(&self, device_id: &str, links: &[ObjectLink]) -> Option<usize> {
        self.rebuild(device_id, links, "registered").await
    }

    /// Re-index a device from scratch
    pub async fn update(&self, device_id: &str, links: &[ObjectLink]) -> Option<usize> {
        self.rebuild(device_id, links, "updated").await
    }

    /// Drop every name a device still owns; returns how many names it had recorded
    pub async fn unregister(&self, device_id: &str) -> usize {
        let mut state = self.state.write().await;
        // Any scan still in flight for this device no longer matches
        state.latest.remove(device_id);
        match state.remove_device(device_id) {
            Some(record) => {
                info!(device_id = %device_id, names = record.names.len(), "Device unregistered");
                record.names.len()
            }
            None => {
                debug!(device_id = %device_id, "Unregistered device had no record");
                0
            }
        }
    }

    async fn next_sequence(&self, device_id: &str) -> u64 {
        let seq = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        self.state
            .write()
            .await
            .latest
            .insert(device_id.to_string(), seq);
        seq
    }

    async fn rebuild(&self, device_id: &str, links: &[ObjectLink], event: &str) -> Option<usize> {
        let seq = self.next_sequence(device_id).await;
        let scanned = self.scan(device_id, links).await;

        if !self.transport.connected_device_ids().await.contains(device_id) {
            debug!(device_id = %device_id, event, "Device disconnected during scan, discarding");
            return None;
        }

        let mut state = self.state.write().await;
        if state.latest.get(device_id) != Some(&seq) {
            debug!(device_id = %device_id, event, seq, "Scan superseded by a newer event, discarding");
            return None;
        }

        let now = Utc::now();
        let registered_at = state
            .remove_device(device_id)
            .map(|previous| previous.registered_at)
            .unwrap_or(now);

        // A name served by several instances of one device is recorded once
        let names: Vec<RegisteredName> = scanned
            .iter()
            .map(|entry| RegisteredName {
                object_type: entry.object_type,
                name: entry.name.clone(),
            })
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let count = names.len();

        for entry in scanned {
            state.insert(entry);
        }
        state.devices.insert(
            device_id.to_string(),
            DeviceRecord {
                device_id: device_id.to_string(),
                names,
                registered_at,
                updated_at: now,
            },
        );

        info!(device_id = %device_id, event, names = count, "Device indexed");
        Some(count)
    }

    /// Read each advertised catalogue object and collect its named instances
    async fn scan(&self, device_id: &str, links: &[ObjectLink]) -> Vec<RegistryEntry> {
        let mut entries = Vec::new();

        for object_type in ObjectType::ALL {
            // Only the first link of each type is inspected
            let Some(link) = links.iter().find(|l| l.object_id == object_type.id()) else {
                continue;
            };
            let path = ObjectPath::object(link.object_id).to_string();

            let response = match self.transport.read_resource(device_id, &path).await {
                Ok(response) => response,
                Err(e) => {
                    warn!(device_id = %device_id, path = %path, error = %e, "Registration read failed");
                    continue;
                }
            };
            entries.extend(self.named_instances(device_id, object_type, &path, &response));
        }

        entries
    }

    fn named_instances(
        &self,
        device_id: &str,
        object_type: ObjectType,
        path: &str,
        response: &ReadResponse,
    ) -> Vec<RegistryEntry> {
        let Some(object) = response.object().filter(|_| response.is_success()) else {
            warn!(
                device_id = %device_id,
                path = %path,
                status = ?response.status,
                error = ?response.error_message,
                "Registration read returned no object"
            );
            return Vec::new();
        };

        let Some(name_id) = self.schema.schema_for(object_type).name_resource().map(|r| r.id) else {
            return Vec::new();
        };

        object
            .instances
            .values()
            .filter_map(|instance| {
                let Some(name) = instance.resource(name_id).and_then(|r| r.value.as_str()) else {
                    warn!(
                        device_id = %device_id,
                        object_id = object.id,
                        instance_id = instance.id,
                        "Instance has no text name, not registered"
                    );
                    return None;
                };
                Some(RegistryEntry {
                    name: name.to_string(),
                    object_type,
                    device_id: device_id.to_string(),
                    object_id: object.id,
                    instance_id: instance.id,
                })
            })
            .collect()
    }

    /// Registered names of a type, sorted
    pub async fn names(&self, object_type: ObjectType) -> Vec<String> {
        self.state
            .read()
            .await
            .entries
            .get(&object_type)
            .map(|names| names.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub async fn lookup(&self, object_type: ObjectType, name: &str) -> Option<RegistryEntry> {
        self.state
            .read()
            .await
            .entries
            .get(&object_type)
            .and_then(|names| names.get(name))
            .cloned()
    }

    /// Device records, sorted by device id
    pub async fn devices(&self) -> Vec<DeviceRecord> {
        let state = self.state.read().await;
        let mut devices: Vec<_> = state.devices.values().cloned().collect();
        devices.sort_by(|a, b| a.device_id.cmp(&b.device_id));
        devices
    }

    /// Entries currently served by a device
    pub async fn entries_for(&self, device_id: &str) -> Vec<RegistryEntry> {
        let state = self.state.read().await;
        let mut entries: Vec<_> = state
            .entries
            .values()
            .flat_map(BTreeMap::values)
            .filter(|entry| entry.device_id == device_id)
            .cloned()
            .collect();
        entries.sort_by(|a, b| (a.object_type, &a.name).cmp(&(b.object_type, &b.name)));
        entries
    }
}
