//! Device transport boundary

use async_trait::async_trait;
use std::collections::BTreeSet;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::link::ObjectLink;
use crate::response::ReadResponse;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("device '{0}' is not connected")]
    DeviceNotConnected(String),
    #[error("invalid path '{0}'")]
    InvalidPath(String),
}

/// Device lifecycle event delivered by a transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    Registered {
        device_id: String,
        links: Vec<ObjectLink>,
    },
    Updated {
        device_id: String,
        links: Vec<ObjectLink>,
    },
    Unregistered {
        device_id: String,
    },
}

impl DeviceEvent {
    pub fn device_id(&self) -> &str {
        match self {
            DeviceEvent::Registered { device_id, .. }
            | DeviceEvent::Updated { device_id, .. }
            | DeviceEvent::Unregistered { device_id } => device_id,
        }
    }
}

/// Connection to the set of registered devices
///
/// Events for one device are delivered in the order they happened.
/// `read_resource` takes a path of the form `/object[/instance[/resource]]`.
#[async_trait]
pub trait DeviceTransport: Send + Sync {
    async fn read_resource(&self, device_id: &str, path: &str)
        -> Result<ReadResponse, TransportError>;

    async fn connected_device_ids(&self) -> BTreeSet<String>;

    fn subscribe(&self) -> mpsc::UnboundedReceiver<DeviceEvent>;
}
