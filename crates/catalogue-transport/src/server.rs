//! Device-side resource server
//!
//! Serves a loaded catalogue as an object tree: object id, then instance id,
//! then resource id. Instance ids are assigned in load order within each
//! object; source packages attached to owners are served under the
//! sourcepackage object after any standalone packages of the same set.

use catalogue_core::{CatalogueInstance, CatalogueSet, ObjectType, SchemaTable};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{debug, warn};

use crate::link::{ObjectLink, ObjectPath};
use crate::response::{InstanceNode, Node, ObjectNode, ReadResponse, ResourceNode};

#[derive(Debug, Clone)]
enum ServedValue {
    Inline(Value),
    /// Code payload read from disk on every read
    File(PathBuf),
}

type ServedInstance = BTreeMap<u16, ServedValue>;

/// Object tree of one catalogue database
#[derive(Debug, Default)]
pub struct ObjectTreeServer {
    objects: BTreeMap<u16, BTreeMap<u16, ServedInstance>>,
}

impl ObjectTreeServer {
    pub fn new(schema: &SchemaTable, set: &CatalogueSet) -> Self {
        let mut server = Self::default();
        let mut attached = Vec::new();

        for instances in set.values() {
            for instance in instances {
                server.add(schema, instance);
                if let Some(package) = &instance.source_package {
                    attached.push(package.as_ref());
                }
            }
        }
        for package in attached {
            server.add(schema, package);
        }

        debug!(
            objects = server.objects.len(),
            instances = server.instance_count(),
            "Built object tree"
        );
        server
    }

    fn add(&mut self, schema: &SchemaTable, instance: &CatalogueInstance) {
        let resource_schema = schema.schema_for(instance.object_type);
        let mut resources = ServedInstance::new();

        for (field, value) in &instance.fields {
            match resource_schema.resource_by_name(field) {
                Some(resource) => {
                    resources.insert(resource.id, ServedValue::Inline(value.to_json()));
                }
                None => warn!(
                    object_type = %instance.object_type,
                    field = %field,
                    "Field has no resource id, not served"
                ),
            }
        }

        if let (Some(resource), Some(path)) =
            (resource_schema.code_payload(), &instance.source_code_ref)
        {
            resources
                .entry(resource.id)
                .or_insert_with(|| ServedValue::File(path.clone()));
        }

        let object = self.objects.entry(instance.object_type.id()).or_default();
        let Ok(instance_id) = u16::try_from(object.len()) else {
            warn!(
                object_type = %instance.object_type,
                name = instance.name().unwrap_or("<unnamed>"),
                "Instance ids exhausted, not served"
            );
            return;
        };
        object.insert(instance_id, resources);
    }

    /// One link per served instance, in object then instance order
    pub fn links(&self) -> Vec<ObjectLink> {
        self.objects
            .iter()
            .flat_map(|(object_id, instances)| {
                instances
                    .keys()
                    .map(move |instance_id| ObjectLink::instance(*object_id, *instance_id))
            })
            .collect()
    }

    pub fn instance_count(&self) -> usize {
        self.objects.values().map(BTreeMap::len).sum()
    }

    /// Number of served instances of one object type
    pub fn count_of(&self, object_type: ObjectType) -> usize {
        self.objects
            .get(&object_type.id())
            .map(BTreeMap::len)
            .unwrap_or(0)
    }

    /// Read an object, an instance, or a single resource
    pub async fn read(&self, path: &ObjectPath) -> ReadResponse {
        let Some(object) = self.objects.get(&path.object_id) else {
            return ReadResponse::not_found(format!("no object {}", path));
        };

        let Some(instance_id) = path.instance_id else {
            let mut instances = BTreeMap::new();
            for (id, resources) in object {
                match read_instance(*id, resources).await {
                    Ok(node) => {
                        instances.insert(*id, node);
                    }
                    Err(message) => return ReadResponse::internal_error(message),
                }
            }
            return ReadResponse::content(Node::Object(ObjectNode {
                id: path.object_id,
                instances,
            }));
        };

        let Some(resources) = object.get(&instance_id) else {
            return ReadResponse::not_found(format!("no instance {}", path));
        };

        let Some(resource_id) = path.resource_id else {
            return match read_instance(instance_id, resources).await {
                Ok(node) => ReadResponse::content(Node::Instance(node)),
                Err(message) => ReadResponse::internal_error(message),
            };
        };

        let Some(value) = resources.get(&resource_id) else {
            return ReadResponse::not_found(format!("no resource {}", path));
        };

        match materialize(value).await {
            Ok(value) => ReadResponse::content(Node::Resource(ResourceNode {
                id: resource_id,
                value,
            })),
            Err(message) => ReadResponse::internal_error(message),
        }
    }
}

async fn read_instance(id: u16, resources: &ServedInstance) -> Result<InstanceNode, String> {
    let mut nodes = BTreeMap::new();
    for (resource_id, value) in resources {
        let value = materialize(value).await?;
        nodes.insert(
            *resource_id,
            ResourceNode {
                id: *resource_id,
                value,
            },
        );
    }
    Ok(InstanceNode {
        id,
        resources: nodes,
    })
}

async fn materialize(value: &ServedValue) -> Result<Value, String> {
    match value {
        ServedValue::Inline(value) => Ok(value.clone()),
        ServedValue::File(path) => match tokio::fs::read_to_string(path).await {
            Ok(code) => Ok(Value::String(code)),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read code payload");
                Err(format!("failed to read code payload {}: {}", path.display(), e))
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::ResponseCode;
    use catalogue_core::FieldValue;
    use serde_json::json;
    use tempfile::TempDir;

    fn hyperty(name: &str) -> CatalogueInstance {
        let mut instance = CatalogueInstance::new(ObjectType::Hyperty);
        instance.set_text("uuid", format!("{name}-uuid"));
        instance.set_text("name", name);
        instance
            .fields
            .insert("hypertyType".to_string(), FieldValue::Json(json!(["comm"])));
        instance
    }

    fn package(name: &str, code: Option<PathBuf>) -> CatalogueInstance {
        let mut package = CatalogueInstance::new(ObjectType::SourcePackage);
        package.set_text("name", name);
        package.set_text("sourceCodeClassname", "Chat");
        package.set_text("encoding", "UTF-8");
        package.source_code_ref = code;
        package
    }

    fn set_of(instances: Vec<CatalogueInstance>) -> CatalogueSet {
        let mut set = CatalogueSet::new();
        for instance in instances {
            set.entry(instance.object_type).or_default().push(instance);
        }
        set
    }

    #[tokio::test]
    async fn test_links_and_instance_ids() {
        let schema = SchemaTable::bundled().unwrap();
        let mut chat = hyperty("Chat");
        chat.source_package = Some(Box::new(package("Chat-sourcepackage", None)));
        let set = set_of(vec![chat, hyperty("Connector"), package("Standalone", None)]);

        let server = ObjectTreeServer::new(&schema, &set);
        assert_eq!(
            server.links(),
            vec![
                ObjectLink::instance(1337, 0),
                ObjectLink::instance(1337, 1),
                ObjectLink::instance(1350, 0),
                ObjectLink::instance(1350, 1),
            ]
        );
        assert_eq!(server.count_of(ObjectType::SourcePackage), 2);

        let response = server.read(&ObjectPath::parse("/1350/1/1").unwrap()).await;
        assert_eq!(
            response.content,
            Some(Node::Resource(ResourceNode {
                id: 1,
                value: json!("Chat-sourcepackage")
            }))
        );
    }

    #[tokio::test]
    async fn test_instances_beyond_id_space_are_skipped() {
        let schema = SchemaTable::bundled().unwrap();
        let instances = (0..=usize::from(u16::MAX) + 1)
            .map(|i| hyperty(&format!("H{i}")))
            .collect();
        let server = ObjectTreeServer::new(&schema, &set_of(instances));
        assert_eq!(server.count_of(ObjectType::Hyperty), usize::from(u16::MAX) + 1);

        let first = server.read(&ObjectPath::parse("/1337/0/1").unwrap()).await;
        assert_eq!(
            first.content,
            Some(Node::Resource(ResourceNode {
                id: 1,
                value: json!("H0")
            }))
        );
        let last = server.read(&ObjectPath::parse("/1337/65535/1").unwrap()).await;
        assert_eq!(
            last.content,
            Some(Node::Resource(ResourceNode {
                id: 1,
                value: json!("H65535")
            }))
        );
    }

    #[tokio::test]
    async fn test_read_object_and_instance() {
        let schema = SchemaTable::bundled().unwrap();
        let server = ObjectTreeServer::new(&schema, &set_of(vec![hyperty("Chat")]));

        let response = server.read(&ObjectPath::object(1337)).await;
        let object = response.object().unwrap();
        assert_eq!(object.instances.len(), 1);
        assert_eq!(object.instances[&0].resource(1).unwrap().value, json!("Chat"));
        assert_eq!(object.instances[&0].resource(10).unwrap().value, json!(["comm"]));

        let response = server.read(&ObjectPath::parse("/1337/0").unwrap()).await;
        match response.content {
            Some(Node::Instance(instance)) => assert_eq!(instance.resources.len(), 3),
            other => panic!("expected instance node, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_code_payload_read_from_file() {
        let tmp = TempDir::new().unwrap();
        let code = tmp.path().join("sourceCode.js");
        std::fs::write(&code, "class Chat {}").unwrap();

        let schema = SchemaTable::bundled().unwrap();
        let server =
            ObjectTreeServer::new(&schema, &set_of(vec![package("Chat-sourcepackage", Some(code.clone()))]));
        let path = ObjectPath::parse("/1350/0/4").unwrap();

        let response = server.read(&path).await;
        assert!(response.is_success());
        assert_eq!(
            response.content,
            Some(Node::Resource(ResourceNode {
                id: 4,
                value: json!("class Chat {}")
            }))
        );

        std::fs::write(&code, "class Chat2 {}").unwrap();
        let response = server.read(&path).await;
        assert_eq!(
            response.content,
            Some(Node::Resource(ResourceNode {
                id: 4,
                value: json!("class Chat2 {}")
            }))
        );

        std::fs::remove_file(&code).unwrap();
        let response = server.read(&path).await;
        assert_eq!(response.status, ResponseCode::InternalServerError);
        assert!(response.error_message.is_some());
    }

    #[tokio::test]
    async fn test_inline_code_wins_over_file() {
        let schema = SchemaTable::bundled().unwrap();
        let mut inline = package("Inline", Some(PathBuf::from("/nonexistent/sourceCode.js")));
        inline.set_text("sourceCode", "inline()");
        let server = ObjectTreeServer::new(&schema, &set_of(vec![inline]));

        let response = server.read(&ObjectPath::parse("/1350/0/4").unwrap()).await;
        assert!(response.is_success());
    }

    #[tokio::test]
    async fn test_missing_paths() {
        let schema = SchemaTable::bundled().unwrap();
        let server = ObjectTreeServer::new(&schema, &set_of(vec![hyperty("Chat")]));

        for path in ["/1338", "/1337/3", "/1337/0/99"] {
            let response = server.read(&ObjectPath::parse(path).unwrap()).await;
            assert_eq!(response.status, ResponseCode::NotFound, "{}", path);
        }
    }
}
