//! Catalogue instance loader
//!
//! Turns a directory tree into validated catalogue instances:
//!
//! ```text
//! <root>/<type>/<instance>/description.json
//!                          sourcePackage.json   (optional)
//!                          sourceCode*          (optional code payload)
//! ```
//!
//! A bad instance never aborts loading; it is logged and skipped so that its
//! siblings still load.

use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::instance::{CatalogueInstance, CatalogueSet, FieldValue};
use crate::schema::{ObjectType, SchemaTable, NAME_RESOURCE};

/// Descriptor document of an instance directory
pub const DESCRIPTOR_FILE: &str = "description.json";
/// Sibling source package document
pub const SOURCE_PACKAGE_FILE: &str = "sourcePackage.json";
/// File name prefix of a code payload file
pub const CODE_PAYLOAD_PREFIX: &str = "sourceCode";
/// Descriptor key of an inline source package
pub const INLINE_SOURCE_PACKAGE_KEY: &str = "sourcePackage";
/// Appended to the owner's name to name its source package
pub const SOURCE_PACKAGE_SUFFIX: &str = "-sourcepackage";
/// Owner field referencing its source package
pub const SOURCE_PACKAGE_URL_FIELD: &str = "sourcePackageURL";

/// Instance directories with this name hold device defaults, not instances
const DEFAULT_INSTANCE_DIR: &str = "default";

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Catalogue root {0} is not a directory")]
    NotADirectory(PathBuf),
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse {path}: {source}; contents: {raw}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
        raw: String,
    },
    #[error("{path} does not hold a JSON object; contents: {raw}")]
    NotAnObject { path: PathBuf, raw: String },
    #[error("Inline sourcePackage in {0} is not a JSON object")]
    InlinePackageNotAnObject(PathBuf),
}

/// URL under which the source package of an instance is reachable
pub fn source_package_url(base_url: &str, object_type: ObjectType, owner_name: &str) -> String {
    format!(
        "{}/{}/{}/sourcepackage",
        base_url.trim_end_matches('/'),
        object_type,
        owner_name
    )
}

/// Loads catalogue instances from a directory tree
pub struct CatalogueLoader<'a> {
    schema: &'a SchemaTable,
    base_url: String,
}

impl<'a> CatalogueLoader<'a> {
    /// Create a loader; `base_url` prefixes every `sourcePackageURL` it records
    pub fn new(schema: &'a SchemaTable, base_url: impl Into<String>) -> Self {
        Self {
            schema,
            base_url: base_url.into(),
        }
    }

    /// Load every valid instance below `root`
    ///
    /// Only an unreadable root is an error; anything wrong below it is
    /// logged and skipped.
    pub fn load(&self, root: &Path) -> Result<CatalogueSet, LoadError> {
        if !root.is_dir() {
            return Err(LoadError::NotADirectory(root.to_path_buf()));
        }

        let mut set = CatalogueSet::new();

        for type_dir in subdirectories(root) {
            let segment = file_name(&type_dir);
            let Some(object_type) = ObjectType::from_segment(&segment) else {
                warn!(path = %type_dir.display(), "Skipping directory with unknown object type");
                continue;
            };

            for instance_dir in subdirectories(&type_dir) {
                if file_name(&instance_dir) == DEFAULT_INSTANCE_DIR {
                    warn!(
                        path = %instance_dir.display(),
                        "Skipping 'default' instance directory, defaults are device configuration"
                    );
                    continue;
                }

                match self.load_instance(object_type, &instance_dir) {
                    Ok(Some(instance)) => {
                        debug!(
                            object_type = %object_type,
                            name = instance.name().unwrap_or_default(),
                            "Loaded catalogue instance"
                        );
                        set.entry(object_type).or_default().push(instance);
                    }
                    Ok(None) => {}
                    Err(e) => {
                        warn!(path = %instance_dir.display(), error = %e, "Skipping catalogue instance");
                    }
                }
            }
        }

        for (object_type, instances) in &set {
            info!(object_type = %object_type, count = instances.len(), "Loaded catalogue instances");
        }

        Ok(set)
    }

    /// Load a single instance directory
    ///
    /// Returns `Ok(None)` when the instance or its source package fails
    /// validation; both are dropped together.
    pub fn load_instance(
        &self,
        object_type: ObjectType,
        dir: &Path,
    ) -> Result<Option<CatalogueInstance>, LoadError> {
        let mut descriptor = read_document(&dir.join(DESCRIPTOR_FILE))?;
        let inline_package = descriptor.remove(INLINE_SOURCE_PACKAGE_KEY);
        let mut owner = self.instance_from_fields(object_type, descriptor);
        let code_file = find_code_payload(dir);

        if object_type == ObjectType::SourcePackage {
            owner.source_code_ref = code_file;
            return Ok(self.schema.validate(&owner).then_some(owner));
        }

        let owner_name = owner
            .name()
            .map(str::to_string)
            .unwrap_or_else(|| file_name(dir));

        let sibling_path = dir.join(SOURCE_PACKAGE_FILE);
        let package = if sibling_path.is_file() {
            if inline_package.is_some() {
                debug!(
                    path = %dir.display(),
                    "Sibling source package present, ignoring inline one"
                );
            }
            let fields = read_document(&sibling_path)?;
            let package = self.instance_from_fields(ObjectType::SourcePackage, fields);
            if owner.field(SOURCE_PACKAGE_URL_FIELD).is_none() {
                self.record_package_url(&mut owner, &owner_name);
            }
            Some(package)
        } else if let Some(inline) = inline_package {
            let Value::Object(fields) = inline else {
                return Err(LoadError::InlinePackageNotAnObject(dir.join(DESCRIPTOR_FILE)));
            };
            let package = self.instance_from_fields(ObjectType::SourcePackage, fields);
            self.record_package_url(&mut owner, &owner_name);
            Some(package)
        } else {
            None
        };

        let package = package.map(|mut package| {
            package.set_text(NAME_RESOURCE, format!("{owner_name}{SOURCE_PACKAGE_SUFFIX}"));
            package.source_code_ref = code_file.clone();
            package
        });

        if package.is_none() {
            if let Some(path) = &code_file {
                warn!(
                    path = %path.display(),
                    "Ignoring code payload file, instance has no source package"
                );
            }
        }

        let owner_valid = self.schema.validate(&owner);
        let package_valid = package
            .as_ref()
            .map(|p| self.schema.validate(p))
            .unwrap_or(true);

        if !(owner_valid && package_valid) {
            warn!(
                path = %dir.display(),
                object_type = %object_type,
                name = %owner_name,
                owner_valid,
                package_valid,
                "Dropping invalid catalogue instance"
            );
            return Ok(None);
        }

        owner.source_package = package.map(Box::new);
        Ok(Some(owner))
    }

    fn record_package_url(&self, owner: &mut CatalogueInstance, owner_name: &str) {
        let url = source_package_url(&self.base_url, owner.object_type, owner_name);
        owner.set_text(SOURCE_PACKAGE_URL_FIELD, url);
    }

    /// Keep the descriptor keys that name a resource of the type
    fn instance_from_fields(
        &self,
        object_type: ObjectType,
        fields: Map<String, Value>,
    ) -> CatalogueInstance {
        let schema = self.schema.schema_for(object_type);
        let mut instance = CatalogueInstance::new(object_type);
        for (key, value) in fields {
            if schema.resource_by_name(&key).is_some() {
                instance.fields.insert(key, FieldValue::from_json(value));
            } else {
                debug!(object_type = %object_type, field = %key, "Dropping field unknown to schema");
            }
        }
        instance
    }
}

/// Read a JSON document that must hold an object
fn read_document(path: &Path) -> Result<Map<String, Value>, LoadError> {
    let raw = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    match serde_json::from_str::<Value>(&raw) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(LoadError::NotAnObject {
            path: path.to_path_buf(),
            raw,
        }),
        Err(source) => Err(LoadError::Parse {
            path: path.to_path_buf(),
            source,
            raw,
        }),
    }
}

/// Immediate subdirectories in file-name order
fn subdirectories(dir: &Path) -> Vec<PathBuf> {
    WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(path = %dir.display(), error = %e, "Failed to read directory entry");
                None
            }
        })
        .filter(|entry| entry.file_type().is_dir())
        .map(|entry| entry.into_path())
        .collect()
}

/// First file in `dir` whose name starts with the code payload prefix
fn find_code_payload(dir: &Path) -> Option<PathBuf> {
    WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .find(|entry| {
            entry
                .file_name()
                .to_string_lossy()
                .starts_with(CODE_PAYLOAD_PREFIX)
        })
        .map(|entry| entry.into_path())
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    const BASE_URL: &str = "hyperty-catalogue://catalogue.example.org/.well-known";

    fn write_json(dir: &Path, file: &str, value: &Value) {
        std::fs::create_dir_all(dir).unwrap();
        std::fs::write(dir.join(file), serde_json::to_string_pretty(value).unwrap()).unwrap();
    }

    fn hyperty(name: &str) -> Value {
        json!({
            "uuid": format!("{name}-uuid"),
            "name": name,
            "hypertyType": ["comm"],
            "language": "javascript",
        })
    }

    fn package() -> Value {
        json!({
            "sourceCodeClassname": "Chat",
            "encoding": "UTF-8",
        })
    }

    #[test]
    fn test_load_with_sibling_package_and_code_file() {
        let root = TempDir::new().unwrap();
        let dir = root.path().join("hyperty").join("chat");
        write_json(&dir, DESCRIPTOR_FILE, &hyperty("Chat"));
        write_json(&dir, SOURCE_PACKAGE_FILE, &package());
        std::fs::write(dir.join("sourceCode.js"), "class Chat {}").unwrap();

        let schema = SchemaTable::bundled().unwrap();
        let set = CatalogueLoader::new(&schema, BASE_URL).load(root.path()).unwrap();

        let hyperties = &set[&ObjectType::Hyperty];
        assert_eq!(hyperties.len(), 1);
        let chat = &hyperties[0];
        assert_eq!(chat.name(), Some("Chat"));
        assert_eq!(
            chat.field("hypertyType"),
            Some(&FieldValue::Json(json!(["comm"])))
        );
        assert_eq!(
            chat.field(SOURCE_PACKAGE_URL_FIELD).and_then(FieldValue::as_text),
            Some("hyperty-catalogue://catalogue.example.org/.well-known/hyperty/Chat/sourcepackage")
        );

        let package = chat.source_package.as_ref().unwrap();
        assert_eq!(package.object_type, ObjectType::SourcePackage);
        assert_eq!(package.name(), Some("Chat-sourcepackage"));
        assert_eq!(package.source_code_ref, Some(dir.join("sourceCode.js")));
    }

    #[test]
    fn test_inline_package_is_detached() {
        let root = TempDir::new().unwrap();
        let dir = root.path().join("protocolstub").join("vertx");
        let mut descriptor = json!({
            "uuid": "stub-1",
            "name": "VertxProtoStub",
            "sourcePackage": {
                "sourceCodeClassname": "VertxProtoStub",
                "encoding": "base64",
                "sourceCode": "Y29kZQ==",
            },
        });
        descriptor["sourcePackageURL"] = json!("somewhere/else");
        write_json(&dir, DESCRIPTOR_FILE, &descriptor);

        let schema = SchemaTable::bundled().unwrap();
        let set = CatalogueLoader::new(&schema, "http://localhost/.well-known/")
            .load(root.path())
            .unwrap();

        let stub = &set[&ObjectType::ProtocolStub][0];
        assert!(stub.field(INLINE_SOURCE_PACKAGE_KEY).is_none());
        assert_eq!(
            stub.field(SOURCE_PACKAGE_URL_FIELD).and_then(FieldValue::as_text),
            Some("http://localhost/.well-known/protocolstub/VertxProtoStub/sourcepackage")
        );
        let package = stub.source_package.as_ref().unwrap();
        assert_eq!(package.name(), Some("VertxProtoStub-sourcepackage"));
        assert_eq!(
            package.field("sourceCode").and_then(FieldValue::as_text),
            Some("Y29kZQ==")
        );
        assert!(package.source_code_ref.is_none());
    }

    #[test]
    fn test_sibling_package_keeps_declared_url() {
        let root = TempDir::new().unwrap();
        let dir = root.path().join("hyperty").join("chat");
        let mut descriptor = hyperty("Chat");
        descriptor["sourcePackageURL"] = json!("https://cdn.example.org/chat");
        write_json(&dir, DESCRIPTOR_FILE, &descriptor);
        write_json(&dir, SOURCE_PACKAGE_FILE, &package());
        std::fs::write(dir.join("sourceCode.js"), "x").unwrap();

        let schema = SchemaTable::bundled().unwrap();
        let set = CatalogueLoader::new(&schema, BASE_URL).load(root.path()).unwrap();
        let chat = &set[&ObjectType::Hyperty][0];
        assert_eq!(
            chat.field(SOURCE_PACKAGE_URL_FIELD).and_then(FieldValue::as_text),
            Some("https://cdn.example.org/chat")
        );
    }

    #[test]
    fn test_instance_missing_mandatory_field_is_dropped() {
        let root = TempDir::new().unwrap();
        let dir = root.path().join("hyperty").join("chat");
        write_json(&dir, DESCRIPTOR_FILE, &json!({"name": "Chat", "hypertyType": ["comm"]}));

        let schema = SchemaTable::bundled().unwrap();
        let set = CatalogueLoader::new(&schema, BASE_URL).load(root.path()).unwrap();
        assert!(set.get(&ObjectType::Hyperty).map_or(true, Vec::is_empty));
    }

    #[test]
    fn test_non_text_name_is_dropped() {
        let root = TempDir::new().unwrap();
        let mut descriptor = hyperty("Chat");
        descriptor["name"] = json!(42);
        write_json(&root.path().join("hyperty").join("numeric"), DESCRIPTOR_FILE, &descriptor);
        write_json(&root.path().join("hyperty").join("chat"), DESCRIPTOR_FILE, &hyperty("Chat"));

        let schema = SchemaTable::bundled().unwrap();
        let set = CatalogueLoader::new(&schema, BASE_URL).load(root.path()).unwrap();
        let names: Vec<_> = set[&ObjectType::Hyperty].iter().map(|i| i.name()).collect();
        assert_eq!(names, vec![Some("Chat")]);
    }

    #[test]
    fn test_invalid_package_drops_owner() {
        let root = TempDir::new().unwrap();
        let dir = root.path().join("hyperty").join("chat");
        write_json(&dir, DESCRIPTOR_FILE, &hyperty("Chat"));
        // no code payload, neither inline nor as a file
        write_json(&dir, SOURCE_PACKAGE_FILE, &package());

        let schema = SchemaTable::bundled().unwrap();
        let set = CatalogueLoader::new(&schema, BASE_URL).load(root.path()).unwrap();
        assert!(set.get(&ObjectType::Hyperty).is_none());
    }

    #[test]
    fn test_malformed_descriptor_does_not_stop_siblings() {
        let root = TempDir::new().unwrap();
        let bad = root.path().join("hyperty").join("a-broken");
        std::fs::create_dir_all(&bad).unwrap();
        std::fs::write(bad.join(DESCRIPTOR_FILE), "{ not json").unwrap();
        let array = root.path().join("hyperty").join("b-array");
        write_json(&array, DESCRIPTOR_FILE, &json!(["not", "an", "object"]));
        write_json(
            &root.path().join("hyperty").join("c-good"),
            DESCRIPTOR_FILE,
            &hyperty("Good"),
        );

        let schema = SchemaTable::bundled().unwrap();
        let loader = CatalogueLoader::new(&schema, BASE_URL);
        assert!(matches!(
            loader.load_instance(ObjectType::Hyperty, &bad),
            Err(LoadError::Parse { .. })
        ));
        assert!(matches!(
            loader.load_instance(ObjectType::Hyperty, &array),
            Err(LoadError::NotAnObject { .. })
        ));

        let set = loader.load(root.path()).unwrap();
        let names: Vec<_> = set[&ObjectType::Hyperty].iter().map(|i| i.name()).collect();
        assert_eq!(names, vec![Some("Good")]);
    }

    #[test]
    fn test_default_and_unknown_directories_skipped() {
        let root = TempDir::new().unwrap();
        write_json(
            &root.path().join("hyperty").join("default"),
            DESCRIPTOR_FILE,
            &hyperty("Default"),
        );
        write_json(
            &root.path().join("widgets").join("clock"),
            DESCRIPTOR_FILE,
            &hyperty("Clock"),
        );
        write_json(
            &root.path().join("runtime").join("browser"),
            DESCRIPTOR_FILE,
            &json!({"uuid": "rt-1", "name": "Browser", "runtimeType": "browser"}),
        );

        let schema = SchemaTable::bundled().unwrap();
        let set = CatalogueLoader::new(&schema, BASE_URL).load(root.path()).unwrap();
        assert!(set.get(&ObjectType::Hyperty).is_none());
        assert_eq!(set[&ObjectType::Runtime][0].name(), Some("Browser"));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_code_file_without_package_is_ignored() {
        let root = TempDir::new().unwrap();
        let dir = root.path().join("hyperty").join("chat");
        write_json(&dir, DESCRIPTOR_FILE, &hyperty("Chat"));
        std::fs::write(dir.join("sourceCode.js"), "x").unwrap();

        let schema = SchemaTable::bundled().unwrap();
        let set = CatalogueLoader::new(&schema, BASE_URL).load(root.path()).unwrap();
        let chat = &set[&ObjectType::Hyperty][0];
        assert!(chat.source_package.is_none());
        assert!(chat.field(SOURCE_PACKAGE_URL_FIELD).is_none());
    }

    #[test]
    fn test_unknown_fields_dropped() {
        let root = TempDir::new().unwrap();
        let dir = root.path().join("hyperty").join("chat");
        let mut descriptor = hyperty("Chat");
        descriptor["colour"] = json!("blue");
        write_json(&dir, DESCRIPTOR_FILE, &descriptor);

        let schema = SchemaTable::bundled().unwrap();
        let set = CatalogueLoader::new(&schema, BASE_URL).load(root.path()).unwrap();
        assert!(set[&ObjectType::Hyperty][0].field("colour").is_none());
    }

    #[test]
    fn test_loading_twice_is_identical() {
        let root = TempDir::new().unwrap();
        for (i, name) in ["Chat", "Video", "Chat"].into_iter().enumerate() {
            let dir = root.path().join("hyperty").join(format!("{i}-{name}"));
            write_json(&dir, DESCRIPTOR_FILE, &hyperty(name));
        }
        let stub = root.path().join("protocolstub").join("vertx");
        write_json(
            &stub,
            DESCRIPTOR_FILE,
            &json!({
                "uuid": "s",
                "name": "Vertx",
                "sourcePackage": {"sourceCodeClassname": "Vertx", "encoding": "UTF-8", "sourceCode": "x"},
            }),
        );

        let schema = SchemaTable::bundled().unwrap();
        let loader = CatalogueLoader::new(&schema, BASE_URL);
        let first = loader.load(root.path()).unwrap();
        let second = loader.load(root.path()).unwrap();
        assert_eq!(first, second);
        // duplicate names are kept by the loader
        assert_eq!(first[&ObjectType::Hyperty].len(), 3);
    }

    #[test]
    fn test_missing_root_is_an_error() {
        let schema = SchemaTable::bundled().unwrap();
        let loader = CatalogueLoader::new(&schema, BASE_URL);
        assert!(matches!(
            loader.load(Path::new("/nonexistent/catalogue")),
            Err(LoadError::NotADirectory(_))
        ));
    }
}
