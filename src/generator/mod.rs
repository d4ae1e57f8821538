//! # Generator Registry
//!
//! Generators turn one resolved instance into a set of Go files. They are
//! registered per `(class, type)` pair; the build orchestrator looks the pair
//! up for every instance it decides to rebuild.
//!
//! ## Contract
//!
//! A [`Generator`] receives the [`ResolvedInstance`] and a read-only
//! [`GenerationContext`]. It must be deterministic: the same inputs produce
//! byte-identical files, with no timestamps or map-order dependence. Paths in
//! the returned [`FileSet`] are relative to the instance's output directory.
//!
//! Generators may declare a JSON schema for their instance `config` blob;
//! [`Registry::validate_options`] checks every instance against it before any
//! generation starts.
//!
//! ## Built-in classes
//!
//! [`default_module_system`] registers the classes and generators of a
//! gateway:
//!
//! | class        | depends on          | types                          |
//! |--------------|---------------------|--------------------------------|
//! | `client`     |                     | `grpc` `http` `tchannel` `custom` |
//! | `middleware` | `client`            | `default`                      |
//! | `adapter`    | `client`            | `default`                      |
//! | `endpoint`   | `client` `middleware` | `http` `tchannel` (`grpc` declared only) |
//! | `service`    | `endpoint`          | `gateway`                      |

mod client;
mod component;
mod deps;
mod endpoint;
mod gotypes;
mod service;
pub mod templates;

pub use client::{ClientGenerator, Transport};
pub use component::ComponentGenerator;
pub use endpoint::EndpointGenerator;
pub use service::ServiceGenerator;

use crate::config::BuildConfig;
use crate::error::{kind_of, GenError};
use crate::idl::IdlLoader;
use crate::module::{Cardinality, Instance, ModuleClass, ModuleSystem, ResolvedGraph, ResolvedInstance};
use crate::package::{normalize_relative, PackageHelper};
use anyhow::Context;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Version of the generated-code layout. Part of every fingerprint, so bumping
/// it invalidates all cached outputs.
pub const GENERATOR_VERSION: &str = "gatewaygen-go/1";

/// Import path of the Go runtime the generated code links against.
pub const RUNTIME_IMPORT: &str = "github.com/uber/zanzibar/runtime";

/// Files produced for one instance, keyed by normalised relative path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileSet {
    files: BTreeMap<PathBuf, Vec<u8>>,
}

impl FileSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a file. Paths are normalised; escaping paths and duplicates are
    /// rejected.
    pub fn insert(&mut self, path: impl AsRef<Path>, contents: impl Into<Vec<u8>>) -> anyhow::Result<()> {
        let path = path.as_ref();
        let normalised = normalize_relative(path, "instance output directory")?;
        if normalised.as_os_str().is_empty() {
            return Err(GenError::PathEscape {
                path: path.to_path_buf(),
                root: "instance output directory".to_string(),
            }
            .into());
        }
        if self.files.contains_key(&normalised) {
            anyhow::bail!("file {} is generated twice", normalised.display());
        }
        self.files.insert(normalised, contents.into());
        Ok(())
    }

    pub fn get(&self, path: &Path) -> Option<&[u8]> {
        self.files.get(path).map(Vec::as_slice)
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.files.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Relative paths in sorted order.
    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.files.keys().map(PathBuf::as_path)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Path, &[u8])> {
        self.files.iter().map(|(p, c)| (p.as_path(), c.as_slice()))
    }
}

impl IntoIterator for FileSet {
    type Item = (PathBuf, Vec<u8>);
    type IntoIter = std::collections::btree_map::IntoIter<PathBuf, Vec<u8>>;

    fn into_iter(self) -> Self::IntoIter {
        self.files.into_iter()
    }
}

/// Everything a generator may read besides its own instance.
pub struct GenerationContext<'a> {
    pub helper: &'a PackageHelper,
    pub idl: &'a IdlLoader,
    pub graph: &'a ResolvedGraph,
}

impl GenerationContext<'_> {
    /// A resolved dependency of `instance`, by class and name.
    pub fn dependency(
        &self,
        instance: &ResolvedInstance,
        class: &str,
        name: &str,
    ) -> Result<&ResolvedInstance, GenError> {
        instance
            .direct
            .iter()
            .find(|id| id.class == class && id.name == name)
            .and_then(|id| self.graph.get(id))
            .ok_or_else(|| {
                GenError::invalid(
                    instance.instance.base_dir.join(&instance.instance.relative_dir),
                    format!("{class} `{name}` is used but not declared as a dependency"),
                )
            })
    }
}

/// Produces the Go files for instances of one `(class, type)` pair.
pub trait Generator: Send + Sync {
    /// JSON schema for the instance `config` blob, if the generator has one.
    fn options_schema(&self) -> Option<Value> {
        None
    }

    /// Generate the files of one instance. `Ok(None)` means nothing to emit.
    fn generate(
        &self,
        instance: &ResolvedInstance,
        ctx: &GenerationContext<'_>,
    ) -> anyhow::Result<Option<FileSet>>;
}

struct Registered {
    generator: Arc<dyn Generator>,
    schema: Option<jsonschema::Validator>,
}

/// Generators keyed by `(class, type)`.
#[derive(Default)]
pub struct Registry {
    entries: BTreeMap<(String, String), Registered>,
    invocations: AtomicUsize,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `generator` for `class`/`type_name`, declaring the type on the
    /// class. The options schema, if any, is compiled here.
    pub fn register(
        &mut self,
        system: &mut ModuleSystem,
        class: &str,
        type_name: &str,
        generator: Arc<dyn Generator>,
    ) -> anyhow::Result<()> {
        system.declare_type(class, type_name)?;
        let key = (class.to_string(), type_name.to_string());
        if self.entries.contains_key(&key) {
            anyhow::bail!("a generator for {class}/{type_name} is already registered");
        }
        let schema = generator
            .options_schema()
            .map(|schema| {
                jsonschema::validator_for(&schema).map_err(|e| {
                    anyhow::anyhow!("invalid options schema for {class}/{type_name}: {e}")
                })
            })
            .transpose()?;
        self.entries.insert(key, Registered { generator, schema });
        Ok(())
    }

    pub fn has_generator(&self, class: &str, type_name: &str) -> bool {
        self.entries
            .contains_key(&(class.to_string(), type_name.to_string()))
    }

    /// Number of `generate` calls that reached a generator.
    pub fn invocations(&self) -> usize {
        self.invocations.load(Ordering::Relaxed)
    }

    fn entry(&self, class: &str, type_name: &str) -> Option<&Registered> {
        self.entries.get(&(class.to_string(), type_name.to_string()))
    }

    /// Check an instance's config blob against its generator's schema. A
    /// missing `config` is checked as `{}`.
    pub fn validate_options(&self, instance: &Instance) -> Result<(), GenError> {
        let Some(schema) = self
            .entry(instance.class(), &instance.type_name)
            .and_then(|entry| entry.schema.as_ref())
        else {
            return Ok(());
        };
        let empty = Value::Object(Default::default());
        let config = if instance.config.is_null() {
            &empty
        } else {
            &instance.config
        };
        let messages: Vec<String> = schema.iter_errors(config).map(|e| e.to_string()).collect();
        if messages.is_empty() {
            Ok(())
        } else {
            Err(GenError::invalid(
                instance.base_dir.join(&instance.relative_dir),
                format!("config does not match the {} schema: {}", instance.type_name, messages.join("; ")),
            ))
        }
    }

    /// Run the generator for `instance`. Returns `Ok(None)` when no generator
    /// is registered for its type.
    pub fn generate(
        &self,
        instance: &ResolvedInstance,
        ctx: &GenerationContext<'_>,
    ) -> anyhow::Result<Option<FileSet>> {
        let class = instance.instance.class();
        let type_name = &instance.instance.type_name;
        let Some(entry) = self.entry(class, type_name) else {
            warn!(instance = %instance.id(), type_name = %type_name, "no generator registered, skipping");
            return Ok(None);
        };
        self.invocations.fetch_add(1, Ordering::Relaxed);
        debug!(instance = %instance.id(), "generating");
        match entry.generator.generate(instance, ctx) {
            Ok(files) => Ok(Some(files.unwrap_or_default())),
            // Errors that already carry a kind keep it.
            Err(err) if kind_of(&err).is_some() => {
                Err(err.context(format!("generating {}", instance.id())))
            }
            Err(err) => Err(GenError::GeneratorFailed {
                class: class.to_string(),
                type_name: type_name.clone(),
                message: format!("{}: {err:#}", instance.id()),
            }
            .into()),
        }
    }
}

/// The gateway module system with every built-in generator registered and
/// class directories taken from `moduleSearchPaths`.
pub fn default_module_system(config: &BuildConfig) -> anyhow::Result<(ModuleSystem, Registry)> {
    let mut system = ModuleSystem::new();
    system.register_class(ModuleClass::new("client", Cardinality::Multi))?;
    system.register_class(ModuleClass::new("middleware", Cardinality::Multi).depends_on(&["client"]))?;
    system.register_class(ModuleClass::new("adapter", Cardinality::Multi).depends_on(&["client"]))?;
    system.register_class(
        ModuleClass::new("endpoint", Cardinality::Multi).depends_on(&["client", "middleware"]),
    )?;
    system.register_class(ModuleClass::new("service", Cardinality::Multi).depends_on(&["endpoint"]))?;

    let mut registry = Registry::new();
    for transport in [Transport::Grpc, Transport::Http, Transport::TChannel, Transport::Custom] {
        registry.register(
            &mut system,
            "client",
            transport.type_name(),
            Arc::new(ClientGenerator::new(transport)),
        )?;
    }
    registry.register(&mut system, "middleware", "default", Arc::new(ComponentGenerator::middleware()))?;
    registry.register(&mut system, "adapter", "default", Arc::new(ComponentGenerator::adapter()))?;
    registry.register(&mut system, "endpoint", "http", Arc::new(EndpointGenerator::new(true)))?;
    registry.register(&mut system, "endpoint", "tchannel", Arc::new(EndpointGenerator::new(false)))?;
    // gRPC endpoints are accepted in configs but not generated yet.
    system.declare_type("endpoint", "grpc")?;
    registry.register(&mut system, "service", "gateway", Arc::new(ServiceGenerator))?;

    for (class, dirs) in &config.module_search_paths {
        if !system.has_class(class) {
            return Err(GenError::UnknownClass { class: class.clone() })
                .context("moduleSearchPaths names a class that is not registered");
        }
        for dir in dirs {
            system.register_class_dir(class, dir)?;
        }
    }
    Ok((system, registry))
}

/// Append a newline if `text` does not end with one.
pub(crate) fn finish_file(mut text: String) -> Vec<u8> {
    if !text.ends_with('\n') {
        text.push('\n');
    }
    text.into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::module::{InstanceId, PackageInfo};
    use serde_json::json;

    struct Fixed;

    impl Generator for Fixed {
        fn options_schema(&self) -> Option<Value> {
            Some(json!({
                "type": "object",
                "required": ["idlFile"],
                "properties": {"idlFile": {"type": "string"}}
            }))
        }

        fn generate(
            &self,
            _instance: &ResolvedInstance,
            _ctx: &GenerationContext<'_>,
        ) -> anyhow::Result<Option<FileSet>> {
            let mut files = FileSet::new();
            files.insert("a.go", "package a\n")?;
            Ok(Some(files))
        }
    }

    fn instance(config: Value) -> Instance {
        Instance {
            id: InstanceId::new("client", "echo"),
            type_name: "grpc".to_string(),
            base_dir: PathBuf::from("/work"),
            relative_dir: PathBuf::from("clients/echo"),
            config,
            dependencies: Vec::new(),
            raw_config: Vec::new(),
            idl_file: None,
            package: PackageInfo::default(),
        }
    }

    #[test]
    fn test_file_set_rejects_escape_and_duplicates() {
        let mut files = FileSet::new();
        files.insert("./module/dependencies.go", "x").unwrap();
        assert!(files.contains(Path::new("module/dependencies.go")));
        assert!(files.insert("module/dependencies.go", "y").is_err());
        let err = files.insert("../x.go", "z").unwrap_err();
        assert_eq!(kind_of(&err), Some(ErrorKind::PathEscape));
        assert_eq!(files.len(), 1);
    }

    #[test]
    fn test_register_requires_known_class() {
        let mut system = ModuleSystem::new();
        let mut registry = Registry::new();
        let err = registry
            .register(&mut system, "client", "grpc", Arc::new(Fixed))
            .unwrap_err();
        assert_eq!(kind_of(&err), Some(ErrorKind::UnknownClass));

        system
            .register_class(ModuleClass::new("client", Cardinality::Multi))
            .unwrap();
        registry
            .register(&mut system, "client", "grpc", Arc::new(Fixed))
            .unwrap();
        assert!(registry.has_generator("client", "grpc"));
        assert!(system.class("client").unwrap().has_type("grpc"));
        assert!(registry
            .register(&mut system, "client", "grpc", Arc::new(Fixed))
            .is_err());
    }

    #[test]
    fn test_validate_options() {
        let mut system = ModuleSystem::new();
        system
            .register_class(ModuleClass::new("client", Cardinality::Multi))
            .unwrap();
        let mut registry = Registry::new();
        registry
            .register(&mut system, "client", "grpc", Arc::new(Fixed))
            .unwrap();

        assert!(registry
            .validate_options(&instance(json!({"idlFile": "echo.proto"})))
            .is_ok());
        let err = registry
            .validate_options(&instance(json!({"idlFile": 3})))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InstanceInvalid);
        let err = registry.validate_options(&instance(Value::Null)).unwrap_err();
        assert!(err.to_string().contains("idlFile"), "{err}");
    }

    #[test]
    fn test_default_module_system() {
        let config = BuildConfig {
            module_search_paths: BTreeMap::from([(
                "client".to_string(),
                vec![PathBuf::from("clients")],
            )]),
            ..BuildConfig::default()
        };
        let (system, registry) = default_module_system(&config).unwrap();
        let order: Vec<&str> = system
            .class_order()
            .unwrap()
            .iter()
            .map(|c| c.name.as_str())
            .collect();
        assert_eq!(order, ["client", "middleware", "adapter", "endpoint", "service"]);
        assert!(system.class("endpoint").unwrap().has_type("grpc"));
        assert!(!registry.has_generator("endpoint", "grpc"));
        assert!(registry.has_generator("client", "custom"));
        assert_eq!(system.class("client").unwrap().dirs, [PathBuf::from("clients")]);

        let bad = BuildConfig {
            module_search_paths: BTreeMap::from([("widget".to_string(), vec![PathBuf::from("w")])]),
            ..BuildConfig::default()
        };
        let err = default_module_system(&bad).err().unwrap();
        assert_eq!(kind_of(&err), Some(ErrorKind::UnknownClass));
    }
}
