//! Catalogue object schema
//!
//! The object types and their resources are described by an XML
//! object-definition document bundled into the crate. The document is parsed
//! once at startup; any inconsistency in it is fatal because nothing in the
//! catalogue can be validated or served without it.

use quick_xml::de::from_str;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::warn;

use crate::instance::CatalogueInstance;

/// The bundled object-definition document
const BUNDLED_SCHEMA: &str = include_str!("../schema/objects.xml");

/// Resource conventionally holding an instance's display name
pub const NAME_RESOURCE: &str = "name";

#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("Failed to parse object definitions: {0}")]
    ParseError(String),
    #[error("Unknown object type '{0}'")]
    UnknownType(String),
    #[error("Object type {object_type} declared with id {found}, expected {expected}")]
    IdMismatch {
        object_type: ObjectType,
        expected: u16,
        found: u16,
    },
    #[error("Object type {0} is defined more than once")]
    DuplicateType(ObjectType),
    #[error("Object type {0} has no definition")]
    MissingType(ObjectType),
    #[error("Object type {object_type} declares resource {what} more than once")]
    DuplicateResource { object_type: ObjectType, what: String },
    #[error("Object type {0} declares more than one code payload resource")]
    MultipleCodePayloads(ObjectType),
    #[error("Object type {0} has no 'name' resource")]
    MissingNameResource(ObjectType),
    #[error("Resource '{resource}' of {object_type} has unknown kind '{kind}'")]
    UnknownKind {
        object_type: ObjectType,
        resource: String,
        kind: String,
    },
}

/// Catalogue object kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ObjectType {
    #[serde(rename = "hyperty")]
    Hyperty,
    #[serde(rename = "protocolstub")]
    ProtocolStub,
    #[serde(rename = "runtime")]
    Runtime,
    #[serde(rename = "dataschema")]
    DataSchema,
    #[serde(rename = "idp-proxy")]
    IdpProxy,
    #[serde(rename = "sourcepackage")]
    SourcePackage,
}

impl ObjectType {
    pub const ALL: [ObjectType; 6] = [
        ObjectType::Hyperty,
        ObjectType::ProtocolStub,
        ObjectType::Runtime,
        ObjectType::DataSchema,
        ObjectType::IdpProxy,
        ObjectType::SourcePackage,
    ];

    /// Stable numeric object identifier
    pub fn id(self) -> u16 {
        match self {
            ObjectType::Hyperty => 1337,
            ObjectType::ProtocolStub => 1338,
            ObjectType::Runtime => 1339,
            ObjectType::DataSchema => 1340,
            ObjectType::IdpProxy => 1341,
            ObjectType::SourcePackage => 1350,
        }
    }

    /// Path segment used in lookups and on disk
    pub fn segment(self) -> &'static str {
        match self {
            ObjectType::Hyperty => "hyperty",
            ObjectType::ProtocolStub => "protocolstub",
            ObjectType::Runtime => "runtime",
            ObjectType::DataSchema => "dataschema",
            ObjectType::IdpProxy => "idp-proxy",
            ObjectType::SourcePackage => "sourcepackage",
        }
    }

    pub fn from_id(id: u16) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.id() == id)
    }

    pub fn from_segment(segment: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.segment() == segment)
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.segment())
    }
}

impl FromStr for ObjectType {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_segment(s).ok_or_else(|| SchemaError::UnknownType(s.to_string()))
    }
}

/// How a resource value is carried
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    /// Inline text
    String,
    /// Raw JSON value
    Json,
    /// Code payload, may be backed by a file
    Code,
}

/// A single resource of an object type
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceSpec {
    pub id: u16,
    pub name: String,
    pub mandatory: bool,
    pub kind: ResourceKind,
}

/// Ordered resources of one object type
#[derive(Debug, Clone, Serialize)]
pub struct ResourceSchema {
    pub object_type: ObjectType,
    resources: Vec<ResourceSpec>,
}

impl ResourceSchema {
    /// Resources in ascending id order
    pub fn resources(&self) -> &[ResourceSpec] {
        &self.resources
    }

    pub fn resource_by_name(&self, name: &str) -> Option<&ResourceSpec> {
        self.resources.iter().find(|r| r.name == name)
    }

    pub fn resource_by_id(&self, id: u16) -> Option<&ResourceSpec> {
        self.resources.iter().find(|r| r.id == id)
    }

    pub fn resource_names(&self) -> Vec<&str> {
        self.resources.iter().map(|r| r.name.as_str()).collect()
    }

    pub fn mandatory(&self) -> impl Iterator<Item = &ResourceSpec> {
        self.resources.iter().filter(|r| r.mandatory)
    }

    /// The resource that may be backed by a file, if the type has one
    pub fn code_payload(&self) -> Option<&ResourceSpec> {
        self.resources.iter().find(|r| r.kind == ResourceKind::Code)
    }

    /// The display-name resource (present in every type)
    pub fn name_resource(&self) -> Option<&ResourceSpec> {
        self.resource_by_name(NAME_RESOURCE)
    }
}

// XML document structures

#[derive(Debug, Deserialize)]
#[serde(rename = "objects")]
struct ObjectDefinitions {
    #[serde(default)]
    object: Vec<ObjectDefinition>,
}

#[derive(Debug, Deserialize)]
struct ObjectDefinition {
    #[serde(rename = "@name")]
    name: String,
    #[serde(rename = "@id")]
    id: u16,
    #[serde(default)]
    resource: Vec<ResourceDefinition>,
}

#[derive(Debug, Deserialize)]
struct ResourceDefinition {
    #[serde(rename = "@id")]
    id: u16,
    #[serde(rename = "@name")]
    name: String,
    #[serde(rename = "@mandatory", default)]
    mandatory: bool,
    #[serde(rename = "@kind", default = "default_kind")]
    kind: String,
}

fn default_kind() -> String {
    "string".to_string()
}

/// Resource schemas for every object type
#[derive(Debug, Clone)]
pub struct SchemaTable {
    /// Indexed by `ObjectType::index`
    schemas: Vec<ResourceSchema>,
}

impl SchemaTable {
    /// Parse the object definitions bundled with this crate
    pub fn bundled() -> Result<Self, SchemaError> {
        Self::from_xml(BUNDLED_SCHEMA)
    }

    /// Parse and check an object-definition document
    pub fn from_xml(xml: &str) -> Result<Self, SchemaError> {
        let definitions: ObjectDefinitions =
            from_str(xml).map_err(|e| SchemaError::ParseError(e.to_string()))?;

        let mut slots: Vec<Option<ResourceSchema>> = vec![None; ObjectType::ALL.len()];

        for object in definitions.object {
            let object_type = ObjectType::from_str(&object.name)?;
            if object.id != object_type.id() {
                return Err(SchemaError::IdMismatch {
                    object_type,
                    expected: object_type.id(),
                    found: object.id,
                });
            }
            if slots[object_type.index()].is_some() {
                return Err(SchemaError::DuplicateType(object_type));
            }
            slots[object_type.index()] = Some(build_schema(object_type, object.resource)?);
        }

        let mut schemas = Vec::with_capacity(slots.len());
        for (object_type, slot) in ObjectType::ALL.into_iter().zip(slots) {
            schemas.push(slot.ok_or(SchemaError::MissingType(object_type))?);
        }

        Ok(Self { schemas })
    }

    pub fn schema_for(&self, object_type: ObjectType) -> &ResourceSchema {
        &self.schemas[object_type.index()]
    }

    /// Names of mandatory resources the instance does not satisfy
    ///
    /// A code payload resource is satisfied either inline or by an attached
    /// source code reference. A string resource must hold text.
    pub fn missing_fields<'a>(&'a self, instance: &CatalogueInstance) -> Vec<&'a str> {
        self.schema_for(instance.object_type)
            .mandatory()
            .filter(|r| {
                let inline = match instance.fields.get(&r.name) {
                    Some(value) if r.kind == ResourceKind::String => value.as_text().is_some(),
                    Some(_) => true,
                    None => false,
                };
                let by_ref = r.kind == ResourceKind::Code && instance.source_code_ref.is_some();
                !(inline || by_ref)
            })
            .map(|r| r.name.as_str())
            .collect()
    }

    /// Check every mandatory resource is present, logging what is missing
    pub fn validate(&self, instance: &CatalogueInstance) -> bool {
        let missing = self.missing_fields(instance);
        if missing.is_empty() {
            return true;
        }
        warn!(
            object_type = %instance.object_type,
            name = instance.name().unwrap_or("<unnamed>"),
            missing = ?missing,
            "Catalogue instance is missing mandatory fields"
        );
        false
    }
}

fn build_schema(
    object_type: ObjectType,
    definitions: Vec<ResourceDefinition>,
) -> Result<ResourceSchema, SchemaError> {
    let mut ids = HashSet::new();
    let mut names = HashSet::new();
    let mut resources = Vec::with_capacity(definitions.len());

    for def in definitions {
        if !ids.insert(def.id) {
            return Err(SchemaError::DuplicateResource {
                object_type,
                what: format!("id {}", def.id),
            });
        }
        if !names.insert(def.name.clone()) {
            return Err(SchemaError::DuplicateResource {
                object_type,
                what: format!("'{}'", def.name),
            });
        }
        let kind = match def.kind.as_str() {
            "string" => ResourceKind::String,
            "json" => ResourceKind::Json,
            "code" => ResourceKind::Code,
            other => {
                return Err(SchemaError::UnknownKind {
                    object_type,
                    resource: def.name,
                    kind: other.to_string(),
                })
            }
        };
        resources.push(ResourceSpec {
            id: def.id,
            name: def.name,
            mandatory: def.mandatory,
            kind,
        });
    }

    resources.sort_by_key(|r| r.id);

    if resources.iter().filter(|r| r.kind == ResourceKind::Code).count() > 1 {
        return Err(SchemaError::MultipleCodePayloads(object_type));
    }

    let schema = ResourceSchema {
        object_type,
        resources,
    };
    if schema.name_resource().is_none() {
        return Err(SchemaError::MissingNameResource(object_type));
    }
    Ok(schema)
}
