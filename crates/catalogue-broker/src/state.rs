//! Application state management

use anyhow::{Context, Result};
use catalogue_bridge::{spawn_listener, ChangeNotifier, Registry, Resolver};
use catalogue_core::{instance_count, CatalogueLoader, CatalogueSet, SchemaTable};
use catalogue_transport::{LocalTransport, ObjectTreeServer};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::{Config, DatabaseConfig};

/// Shared application state
pub struct AppState {
    pub schema: Arc<SchemaTable>,
    /// In-process devices serving the configured databases
    pub transport: Arc<LocalTransport>,
    pub registry: Arc<Registry>,
    pub resolver: Resolver,
    /// Change feed for WebSocket clients
    pub notifier: Arc<ChangeNotifier>,
    pub config: Config,
}

impl AppState {
    /// Create new application state and start the device event listener
    pub async fn new(config: Config) -> Result<Arc<Self>> {
        let schema = Arc::new(SchemaTable::bundled().context("bundled object schema is invalid")?);
        let transport = Arc::new(LocalTransport::new());

        let registry = Arc::new(Registry::new(schema.clone(), transport.clone()));
        let notifier = Arc::new(ChangeNotifier::new(
            transport.clone(),
            config.broker.event_buffer,
        ));
        let resolver = Resolver::new(schema.clone(), registry.clone(), transport.clone());

        spawn_listener(transport.as_ref(), registry.clone(), notifier.clone());

        Ok(Arc::new(Self {
            schema,
            transport,
            registry,
            resolver,
            notifier,
            config,
        }))
    }

    /// Load a database from disk and connect it, replacing its previous tree
    ///
    /// Returns whether the device was newly connected and how many instances it serves.
    pub async fn connect_database(&self, db: &DatabaseConfig) -> Result<(bool, usize)> {
        let set = load_catalogue(
            self.schema.clone(),
            self.config.catalogue.base_url.clone(),
            db.path.clone(),
        )
        .await?;

        let server = ObjectTreeServer::new(&self.schema, &set);
        let instances = server.instance_count();
        let is_new = self.transport.connect(db.device_id.clone(), server).await;

        info!(
            device_id = %db.device_id,
            path = %db.path.display(),
            instances,
            "Catalogue database connected"
        );
        Ok((is_new, instances))
    }

    /// Connect every configured database; failures are logged and skipped
    pub async fn connect_all(&self) -> usize {
        let mut connected = 0;
        for db in &self.config.databases {
            match self.connect_database(db).await {
                Ok(_) => connected += 1,
                Err(e) => warn!(
                    device_id = %db.device_id,
                    path = %db.path.display(),
                    error = %e,
                    "Failed to connect catalogue database"
                ),
            }
        }
        connected
    }

    pub async fn disconnect_database(&self, device_id: &str) -> bool {
        self.transport.disconnect(device_id).await
    }
}

/// Load a catalogue directory on the blocking pool
pub async fn load_catalogue(
    schema: Arc<SchemaTable>,
    base_url: String,
    path: PathBuf,
) -> Result<CatalogueSet> {
    tokio::task::spawn_blocking(move || load_catalogue_blocking(&schema, base_url, &path))
        .await
        .context("catalogue loader task failed")?
}

pub fn load_catalogue_blocking(
    schema: &SchemaTable,
    base_url: String,
    path: &Path,
) -> Result<CatalogueSet> {
    let set = CatalogueLoader::new(schema, base_url)
        .load(path)
        .with_context(|| format!("failed to load catalogue from {}", path.display()))?;
    info!(
        path = %path.display(),
        instances = instance_count(&set),
        "Catalogue loaded"
    );
    Ok(set)
}
