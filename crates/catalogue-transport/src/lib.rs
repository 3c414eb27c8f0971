//! Catalogue Transport - Device events, reads, and an in-process transport
//!
//! This crate defines the boundary between the bridge and the devices
//! hosting catalogue databases:
//! - Lifecycle events (registered, updated, unregistered) with object links
//! - Read responses with object, instance and resource content
//! - An object-tree server and a local transport for in-process databases

pub mod link;
pub mod local;
pub mod response;
pub mod server;
pub mod transport;

pub use link::{parse_link_format, ObjectLink, ObjectPath};
pub use local::LocalTransport;
pub use response::{InstanceNode, Node, ObjectNode, ReadResponse, ResourceNode, ResponseCode};
pub use server::ObjectTreeServer;
pub use transport::{DeviceEvent, DeviceTransport, TransportError};
