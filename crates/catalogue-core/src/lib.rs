//! Catalogue Core - Object schema, catalogue instances, and instance loading
//!
//! This crate provides the foundational types for the catalogue:
//! - The bundled object schema (object types and their resources)
//! - Catalogue instances with their attached source packages
//! - A loader turning an on-disk instance tree into validated instances

pub mod instance;
pub mod loader;
pub mod schema;

pub use instance::{instance_count, CatalogueInstance, CatalogueSet, FieldValue};
pub use loader::{source_package_url, CatalogueLoader, LoadError};
pub use schema::{
    ObjectType, ResourceKind, ResourceSchema, ResourceSpec, SchemaError, SchemaTable,
    NAME_RESOURCE,
};
