//! Catalogue Bridge - Name registry, resolution, and change notification
//!
//! This crate connects catalogue devices to symbolic lookups:
//! - A registry indexing the names each connected device serves
//! - A resolver turning `/.well-known/<type>/<name>` paths into device reads
//! - A change feed of connected device ids
//! - The listener applying transport events to all of the above

pub mod listener;
pub mod notifier;
pub mod registry;
pub mod resolver;

#[cfg(test)]
mod testing;

pub use listener::{handle_event, run_listener, spawn_listener};
pub use notifier::{ChangeNotifier, Subscription};
pub use registry::{DeviceRecord, RegisteredName, Registry, RegistryEntry};
pub use resolver::{Resolution, ResolveError, Resolver, WELL_KNOWN_PREFIX};
