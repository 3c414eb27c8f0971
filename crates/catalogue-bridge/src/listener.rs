//! Transport event listener
//!
//! A single task owns the transport's event stream and applies each event
//! to the registry in delivery order.

use catalogue_transport::{DeviceEvent, DeviceTransport};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::notifier::ChangeNotifier;
use crate::registry::Registry;

/// Subscribe to `transport` now and process its events on a spawned task
///
/// The subscription is taken before returning, so devices connected after
/// this call are never missed.
pub fn spawn_listener(
    transport: &dyn DeviceTransport,
    registry: Arc<Registry>,
    notifier: Arc<ChangeNotifier>,
) -> JoinHandle<()> {
    let events = transport.subscribe();
    tokio::spawn(run_listener(events, registry, notifier))
}

pub async fn run_listener(
    mut events: mpsc::UnboundedReceiver<DeviceEvent>,
    registry: Arc<Registry>,
    notifier: Arc<ChangeNotifier>,
) {
    info!("Device event listener started");
    while let Some(event) = events.recv().await {
        handle_event(&registry, &notifier, event).await;
    }
    info!("Device event stream closed, listener stopping");
}

pub async fn handle_event(registry: &Registry, notifier: &ChangeNotifier, event: DeviceEvent) {
    debug!(device_id = %event.device_id(), "Handling device event");
    match event {
        DeviceEvent::Registered { device_id, links } => {
            registry.register(&device_id, &links).await;
            notifier.publish().await;
        }
        DeviceEvent::Updated { device_id, links } => {
            // The connected set is unchanged, nothing to publish
            registry.update(&device_id, &links).await;
        }
        DeviceEvent::Unregistered { device_id } => {
            registry.unregister(&device_id).await;
            notifier.publish().await;
        }
    }
}
