//! Object links and resource paths
//!
//! Devices advertise their objects as CoRE link-format entries
//! (`</1337/0>,</1338/0>`); reads address `/object[/instance[/resource]]`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// An advertised object or object-instance link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectLink {
    pub object_id: u16,
    pub instance_id: Option<u16>,
}

impl ObjectLink {
    pub fn object(object_id: u16) -> Self {
        Self {
            object_id,
            instance_id: None,
        }
    }

    pub fn instance(object_id: u16, instance_id: u16) -> Self {
        Self {
            object_id,
            instance_id: Some(instance_id),
        }
    }

    /// Parse one link-format entry, e.g. `</1337/0>;ct=1543`
    ///
    /// Entries that do not address an object (the root link, resource
    /// links, non-numeric paths) yield `None`.
    pub fn parse(entry: &str) -> Option<Self> {
        let target = entry.trim().split(';').next()?.trim();
        let path = target.strip_prefix('<')?.strip_suffix('>')?;
        match ObjectPath::parse(path)? {
            ObjectPath {
                object_id,
                instance_id,
                resource_id: None,
            } => Some(Self {
                object_id,
                instance_id,
            }),
            _ => None,
        }
    }
}

impl fmt::Display for ObjectLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.instance_id {
            Some(instance) => write!(f, "</{}/{}>", self.object_id, instance),
            None => write!(f, "</{}>", self.object_id),
        }
    }
}

/// Parse a CoRE link-format payload, skipping entries that are not object links
pub fn parse_link_format(payload: &str) -> Vec<ObjectLink> {
    payload.split(',').filter_map(ObjectLink::parse).collect()
}

/// Address of an object, object instance, or resource on a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectPath {
    pub object_id: u16,
    pub instance_id: Option<u16>,
    pub resource_id: Option<u16>,
}

impl ObjectPath {
    pub fn object(object_id: u16) -> Self {
        Self {
            object_id,
            instance_id: None,
            resource_id: None,
        }
    }

    /// Parse `/object[/instance[/resource]]`
    pub fn parse(path: &str) -> Option<Self> {
        let mut ids = path
            .trim_start_matches('/')
            .split('/')
            .map(|segment| segment.parse::<u16>());

        let object_id = ids.next()?.ok()?;
        let instance_id = match ids.next() {
            Some(id) => Some(id.ok()?),
            None => None,
        };
        let resource_id = match ids.next() {
            Some(id) => Some(id.ok()?),
            None => None,
        };
        if ids.next().is_some() {
            return None;
        }
        Some(Self {
            object_id,
            instance_id,
            resource_id,
        })
    }
}

impl fmt::Display for ObjectPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.object_id)?;
        if let Some(instance) = self.instance_id {
            write!(f, "/{}", instance)?;
            if let Some(resource) = self.resource_id {
                write!(f, "/{}", resource)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_link_format() {
        let links = parse_link_format("</>;rt=\"oma.lwm2m\", </1/0>,</1337/0>;ct=1543,</1337/1>,</1350>,<bogus>");
        assert_eq!(
            links,
            vec![
                ObjectLink::instance(1, 0),
                ObjectLink::instance(1337, 0),
                ObjectLink::instance(1337, 1),
                ObjectLink::object(1350),
            ]
        );
    }

    #[test]
    fn test_resource_link_is_not_an_object_link() {
        assert_eq!(ObjectLink::parse("</1337/0/1>"), None);
    }

    #[test]
    fn test_link_display() {
        assert_eq!(ObjectLink::instance(1337, 2).to_string(), "</1337/2>");
        assert_eq!(ObjectLink::object(1350).to_string(), "</1350>");
    }

    #[test]
    fn test_object_path() {
        let path = ObjectPath::parse("/1337/0/1").unwrap();
        assert_eq!(path.object_id, 1337);
        assert_eq!(path.instance_id, Some(0));
        assert_eq!(path.resource_id, Some(1));
        assert_eq!(path.to_string(), "/1337/0/1");

        assert_eq!(ObjectPath::parse("1338").unwrap(), ObjectPath::object(1338));
        assert_eq!(ObjectPath::parse("/1337/x"), None);
        assert_eq!(ObjectPath::parse("/1337/0/1/2"), None);
        assert_eq!(ObjectPath::parse(""), None);
    }
}
