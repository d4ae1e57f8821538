use crate::error::GenError;
use crate::naming::{camel_case, pascal_case};
use crate::package::PackageHelper;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Canonical identity of an instance: `(class, name)`.
///
/// Ordering is lexicographic by class then name, which is the resolver's
/// tie-break order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InstanceId {
    pub class: String,
    pub name: String,
}

impl InstanceId {
    pub fn new(class: &str, name: &str) -> Self {
        Self {
            class: class.to_string(),
            name: name.to_string(),
        }
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.class, self.name)
    }
}

impl FromStr for InstanceId {
    type Err = anyhow::Error;

    /// Parse `class/name`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().split_once('/') {
            Some((class, name)) if !class.is_empty() && !name.is_empty() => {
                Ok(InstanceId::new(class, name))
            }
            _ => anyhow::bail!("expected `class/name`, got `{s}`"),
        }
    }
}

/// On-disk schema of `<class>-config.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    /// Class name to instance names
    #[serde(default)]
    pub dependencies: BTreeMap<String, Vec<String>>,
    /// Opaque to the engine; handed to the generator
    #[serde(default)]
    pub config: Value,
    #[serde(
        rename = "IsExportGenerated",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub is_export_generated: Option<bool>,
}

/// Go package naming derived for an instance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageInfo {
    /// e.g. `echoClient`
    pub package_name: String,
    /// e.g. `echoClientgenerated`
    pub package_alias: String,
    pub generated_package_path: String,
    pub module_package_path: String,
    /// e.g. `NewClient`
    pub export_name: String,
    /// e.g. `Client`
    pub export_type: String,
    /// e.g. `Echo`
    pub qualified_instance_name: String,
    pub is_export_generated: bool,
}

impl PackageInfo {
    pub(crate) fn derive(
        helper: &PackageHelper,
        class: &str,
        name: &str,
        type_name: &str,
        relative_dir: &Path,
        is_export_generated: Option<bool>,
    ) -> Self {
        let package_name = format!("{}{}", camel_case(name), pascal_case(class));
        Self {
            package_alias: format!("{package_name}generated"),
            package_name,
            generated_package_path: helper.generated_package_path(relative_dir),
            module_package_path: helper.module_package_path(relative_dir),
            export_name: format!("New{}", pascal_case(class)),
            export_type: pascal_case(class),
            qualified_instance_name: pascal_case(name),
            is_export_generated: is_export_generated.unwrap_or(type_name != "custom"),
        }
    }
}

/// A configured module read from disk. Immutable once read.
#[derive(Debug, Clone)]
pub struct Instance {
    pub id: InstanceId,
    pub type_name: String,
    /// Absolute config root
    pub base_dir: PathBuf,
    /// Instance directory relative to the config root; also its output subtree
    pub relative_dir: PathBuf,
    pub config: Value,
    /// Declared plus default dependencies, sorted and deduplicated
    pub dependencies: Vec<InstanceId>,
    /// Exact bytes of the config file
    pub raw_config: Vec<u8>,
    /// Absolute IDL path, when the config names one
    pub idl_file: Option<PathBuf>,
    pub package: PackageInfo,
}

impl Instance {
    pub fn class(&self) -> &str {
        &self.id.class
    }

    pub fn name(&self) -> &str {
        &self.id.name
    }

    /// String value of a top-level key of the config blob.
    pub fn config_str(&self, key: &str) -> Option<&str> {
        self.config.get(key).and_then(Value::as_str)
    }

    /// Like [`Instance::config_str`] but failing with `instance-invalid`.
    pub fn require_config_str(&self, key: &str) -> Result<&str, GenError> {
        self.config_str(key).ok_or_else(|| GenError::InstanceInvalid {
            path: self.base_dir.join(&self.relative_dir),
            reason: format!("config.{key} must be a string"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_instance_id_parse_and_order() {
        let id: InstanceId = "client/echo".parse().unwrap();
        assert_eq!(id, InstanceId::new("client", "echo"));
        assert_eq!(id.to_string(), "client/echo");
        assert!("echo".parse::<InstanceId>().is_err());
        assert!("client/".parse::<InstanceId>().is_err());

        let mut ids = vec![
            InstanceId::new("endpoint", "bounce"),
            InstanceId::new("client", "mirror"),
            InstanceId::new("client", "echo"),
        ];
        ids.sort();
        let rendered: Vec<String> = ids.iter().map(ToString::to_string).collect();
        assert_eq!(rendered, ["client/echo", "client/mirror", "endpoint/bounce"]);
    }

    #[test]
    fn test_config_reserialises_semantics() {
        let text = r#"{
            "name": "bounce",
            "type": "http",
            "dependencies": {"client": ["echo", "mirror"]},
            "config": {"endpoints": ["bounce/bounce.yaml"], "extra": {"nested": 1}}
        }"#;
        let parsed: InstanceConfig = serde_json::from_str(text).unwrap();
        let again: InstanceConfig =
            serde_json::from_str(&serde_json::to_string(&parsed).unwrap()).unwrap();
        assert_eq!(parsed, again);
        assert_eq!(again.dependencies["client"], vec!["echo", "mirror"]);
        assert_eq!(again.config["extra"], json!({"nested": 1}));
        assert_eq!(again.is_export_generated, None);
    }

    #[test]
    fn test_dependencies_default_to_empty() {
        let parsed: InstanceConfig =
            serde_json::from_str(r#"{"name": "echo", "type": "grpc"}"#).unwrap();
        assert!(parsed.dependencies.is_empty());
        assert!(parsed.config.is_null());
    }
}
