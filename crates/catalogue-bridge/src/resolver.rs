//! Symbolic path resolution
//!
//! Turns `/.well-known/<type>[/<name>[/<resource>]]` into a live read on
//! the device currently serving `<name>`. Every outcome is a [`Resolution`];
//! failures are carried as [`ResolveError`] diagnostics, never as errors of
//! the lookup itself.

use catalogue_core::loader::SOURCE_PACKAGE_SUFFIX;
use catalogue_core::{ObjectType, SchemaTable};
use catalogue_transport::{DeviceTransport, ReadResponse};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use crate::registry::Registry;

pub const WELL_KNOWN_PREFIX: &str = "/.well-known";

/// Resource segment addressing the source package attached to an instance
pub const SOURCE_PACKAGE_RESOURCE: &str = "sourcepackage";

pub const CONTENT_TYPE_JSON: &str = "application/json";
pub const CONTENT_TYPE_TEXT: &str = "text/plain; charset=utf-8";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("invalid resource type '{segment}', expected one of: {expected}")]
    UnknownType { segment: String, expected: String },

    #[error("invalid resource '{resource}' for {object_type}, valid resources: {valid}")]
    InvalidResource {
        object_type: ObjectType,
        resource: String,
        valid: String,
    },

    #[error("Could not find {object_type} '{name}'")]
    NotFound { object_type: ObjectType, name: String },

    #[error("device '{device_id}' hosting {object_type} '{name}' is no longer connected")]
    DeviceGone {
        device_id: String,
        object_type: ObjectType,
        name: String,
    },

    #[error("read of '{path}' on device '{device_id}' failed: {cause}")]
    ReadFailed {
        device_id: String,
        path: String,
        cause: String,
    },

    #[error("invalid path '{0}'")]
    InvalidPath(String),
}

/// Outcome of resolving a symbolic path
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Usage(String),
    Names(Vec<String>),
    Read(ReadResponse),
    Diagnostic(ResolveError),
}

impl Resolution {
    /// Content type and body of the response
    pub fn into_body(self) -> (&'static str, String) {
        match self {
            Resolution::Usage(text) => (CONTENT_TYPE_TEXT, text),
            Resolution::Names(names) => json_body(&names),
            Resolution::Read(response) => json_body(&response),
            Resolution::Diagnostic(error) => (CONTENT_TYPE_TEXT, error.to_string()),
        }
    }
}

fn json_body<T: Serialize>(value: &T) -> (&'static str, String) {
    match serde_json::to_string(value) {
        Ok(body) => (CONTENT_TYPE_JSON, body),
        Err(e) => (CONTENT_TYPE_TEXT, format!("failed to encode response: {}", e)),
    }
}

fn type_list() -> String {
    ObjectType::ALL
        .iter()
        .map(|t| t.segment())
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn usage() -> String {
    format!(
        "usage: {WELL_KNOWN_PREFIX}/<type>[/<name>[/<resource>]] where <type> is one of: {}",
        type_list()
    )
}

pub struct Resolver {
    schema: Arc<SchemaTable>,
    registry: Arc<Registry>,
    transport: Arc<dyn DeviceTransport>,
}

impl Resolver {
    pub fn new(
        schema: Arc<SchemaTable>,
        registry: Arc<Registry>,
        transport: Arc<dyn DeviceTransport>,
    ) -> Self {
        Self {
            schema,
            registry,
            transport,
        }
    }

    pub async fn resolve(&self, path: &str) -> Resolution {
        let relative = match path.strip_prefix(WELL_KNOWN_PREFIX) {
            Some(rest) if rest.is_empty() || rest.starts_with('/') => rest,
            Some(_) => return Resolution::Diagnostic(ResolveError::InvalidPath(path.to_string())),
            None => path,
        };
        let segments: Vec<&str> = relative.split('/').filter(|s| !s.is_empty()).collect();
        debug!(path = %path, segments = segments.len(), "Resolving");

        let result = match segments.as_slice() {
            [] => return Resolution::Usage(usage()),
            [object_type] => self.names(object_type).await,
            [object_type, name] => self.read(object_type, name, None).await,
            [object_type, name, resource] => self.read(object_type, name, Some(*resource)).await,
            _ => Err(ResolveError::InvalidPath(path.to_string())),
        };

        result.unwrap_or_else(|error| {
            debug!(path = %path, error = %error, "Resolution failed");
            Resolution::Diagnostic(error)
        })
    }

    fn parse_type(segment: &str) -> Result<ObjectType, ResolveError> {
        ObjectType::from_segment(segment).ok_or_else(|| ResolveError::UnknownType {
            segment: segment.to_string(),
            expected: type_list(),
        })
    }

    async fn names(&self, segment: &str) -> Result<Resolution, ResolveError> {
        let object_type = Self::parse_type(segment)?;
        Ok(Resolution::Names(self.registry.names(object_type).await))
    }

    async fn read(
        &self,
        segment: &str,
        name: &str,
        resource: Option<&str>,
    ) -> Result<Resolution, ResolveError> {
        let mut object_type = Self::parse_type(segment)?;
        let mut name = name.to_string();
        let mut resource = resource;

        if resource == Some(SOURCE_PACKAGE_RESOURCE) && object_type != ObjectType::SourcePackage {
            if self.registry.lookup(object_type, &name).await.is_none() {
                return Err(ResolveError::NotFound { object_type, name });
            }
            name = format!("{name}{SOURCE_PACKAGE_SUFFIX}");
            object_type = ObjectType::SourcePackage;
            resource = None;
        }

        let resource_id = match resource {
            Some(resource) => Some(self.resource_id(object_type, resource)?),
            None => None,
        };

        let entry = self
            .registry
            .lookup(object_type, &name)
            .await
            .ok_or_else(|| ResolveError::NotFound {
                object_type,
                name: name.clone(),
            })?;

        if !self
            .transport
            .connected_device_ids()
            .await
            .contains(&entry.device_id)
        {
            warn!(device_id = %entry.device_id, name = %name, "Registry entry points at a disconnected device");
            return Err(ResolveError::DeviceGone {
                device_id: entry.device_id,
                object_type,
                name,
            });
        }

        let mut path = entry.instance_path();
        path.resource_id = resource_id;
        let path = path.to_string();

        match self.transport.read_resource(&entry.device_id, &path).await {
            Ok(response) => Ok(Resolution::Read(response)),
            Err(e) => Err(ResolveError::ReadFailed {
                device_id: entry.device_id,
                path,
                cause: e.to_string(),
            }),
        }
    }

    fn resource_id(&self, object_type: ObjectType, resource: &str) -> Result<u16, ResolveError> {
        let schema = self.schema.schema_for(object_type);
        schema
            .resource_by_name(resource)
            .map(|def| def.id)
            .ok_or_else(|| {
                let mut valid = schema.resource_names();
                if object_type != ObjectType::SourcePackage {
                    valid.push(SOURCE_PACKAGE_RESOURCE);
                }
                ResolveError::InvalidResource {
                    object_type,
                    resource: resource.to_string(),
                    valid: valid.join(", "),
                }
            })
    }
}
