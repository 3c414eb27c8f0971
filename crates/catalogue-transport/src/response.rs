//! Read responses returned by devices

use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Response code of a device read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResponseCode {
    Content,
    NotFound,
    BadRequest,
    InternalServerError,
}

impl ResponseCode {
    pub fn is_success(self) -> bool {
        matches!(self, ResponseCode::Content)
    }

    /// Coarse classification: `success`, `notFound` or `error`
    pub fn kind(self) -> &'static str {
        match self {
            ResponseCode::Content => "success",
            ResponseCode::NotFound => "notFound",
            ResponseCode::BadRequest | ResponseCode::InternalServerError => "error",
        }
    }
}

/// A single resource value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceNode {
    pub id: u16,
    pub value: Value,
}

/// An object instance with its resources, keyed by resource id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceNode {
    pub id: u16,
    #[serde(deserialize_with = "id_keyed")]
    pub resources: BTreeMap<u16, ResourceNode>,
}

impl InstanceNode {
    pub fn resource(&self, id: u16) -> Option<&ResourceNode> {
        self.resources.get(&id)
    }
}

/// An object with all of its instances, keyed by instance id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectNode {
    pub id: u16,
    #[serde(deserialize_with = "id_keyed")]
    pub instances: BTreeMap<u16, InstanceNode>,
}

/// Map keyed by numeric id, accepting the string keys JSON objects carry
///
/// `Node` is untagged, so its input is buffered before a variant is picked
/// and integer map keys are never recovered from the buffered strings.
fn id_keyed<'de, D, V>(deserializer: D) -> Result<BTreeMap<u16, V>, D::Error>
where
    D: Deserializer<'de>,
    V: Deserialize<'de>,
{
    BTreeMap::<String, V>::deserialize(deserializer)?
        .into_iter()
        .map(|(key, value)| {
            key.parse::<u16>()
                .map(|id| (id, value))
                .map_err(|_| {
                    <D::Error as de::Error>::invalid_value(de::Unexpected::Str(&key), &"a u16 id")
                })
        })
        .collect()
}

/// Decoded content of a successful read
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Node {
    Object(ObjectNode),
    Instance(InstanceNode),
    Resource(ResourceNode),
}

/// Result of reading a path on a device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadResponse {
    pub status: ResponseCode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Node>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl ReadResponse {
    pub fn content(node: Node) -> Self {
        Self {
            status: ResponseCode::Content,
            content: Some(node),
            error_message: None,
        }
    }

    pub fn error(status: ResponseCode, message: impl Into<String>) -> Self {
        Self {
            status,
            content: None,
            error_message: Some(message.into()),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::error(ResponseCode::NotFound, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::error(ResponseCode::BadRequest, message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::error(ResponseCode::InternalServerError, message)
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// The object node of a successful object-level read
    pub fn object(&self) -> Option<&ObjectNode> {
        match &self.content {
            Some(Node::Object(object)) => Some(object),
            _ => None,
        }
    }
}
