//! Catalogue instances

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use crate::schema::{ObjectType, NAME_RESOURCE};

/// A field value: plain text, or a raw JSON value kept as-is
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    Json(Value),
}

impl FieldValue {
    /// JSON strings become text, anything else is kept raw
    pub fn from_json(value: Value) -> Self {
        match value {
            Value::String(s) => FieldValue::Text(s),
            other => FieldValue::Json(other),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            FieldValue::Json(_) => None,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            FieldValue::Text(s) => Value::String(s.clone()),
            FieldValue::Json(v) => v.clone(),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Text(s) => f.write_str(s),
            FieldValue::Json(v) => write!(f, "{}", v),
        }
    }
}

/// One catalogue object instance
///
/// A non-sourcepackage instance owns at most one source package; a source
/// package may own a reference to the file holding its code payload.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogueInstance {
    pub object_type: ObjectType,
    pub fields: BTreeMap<String, FieldValue>,
    pub source_code_ref: Option<PathBuf>,
    pub source_package: Option<Box<CatalogueInstance>>,
}

impl CatalogueInstance {
    pub fn new(object_type: ObjectType) -> Self {
        Self {
            object_type,
            fields: BTreeMap::new(),
            source_code_ref: None,
            source_package: None,
        }
    }

    /// Display name, if set as text
    pub fn name(&self) -> Option<&str> {
        self.fields.get(NAME_RESOURCE).and_then(FieldValue::as_text)
    }

    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    pub fn set_text(&mut self, name: &str, value: impl Into<String>) {
        self.fields
            .insert(name.to_string(), FieldValue::Text(value.into()));
    }
}

/// Loaded instances grouped by type, in load order within each type
pub type CatalogueSet = BTreeMap<ObjectType, Vec<CatalogueInstance>>;

/// Total number of instances in a set, attached source packages included
pub fn instance_count(set: &CatalogueSet) -> usize {
    set.values()
        .flatten()
        .map(|i| 1 + usize::from(i.source_package.is_some()))
        .sum()
}
