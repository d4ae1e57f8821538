//! Build configuration for a gateway code generation run
//!
//! A single YAML, JSON or TOML file describes where IDL lives, where generated
//! code goes and which directories hold module instances. Relative paths are
//! resolved against the directory containing the file (the *config root*).

use super::{ConfigStore, Format, DEFAULTS_YAML};
use crate::error::GenError;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Keys that must be present after all layers are merged.
pub const REQUIRED_KEYS: [&str; 4] = [
    "packageRoot",
    "idlRootDir",
    "targetGenDir",
    "moduleSearchPaths",
];

/// Decoded build configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BuildConfig {
    /// Import-path root for generated code, e.g. `github.com/acme/gateway`
    pub package_root: String,
    /// Where IDL files live, relative to the config root
    pub idl_root_dir: PathBuf,
    /// Where generated code is written, relative to the config root
    pub target_gen_dir: PathBuf,
    /// Class name to the directories holding its instances
    pub module_search_paths: BTreeMap<String, Vec<PathBuf>>,
    /// Class name to a subdirectory of `idl_root_dir`
    #[serde(default)]
    pub module_idl_sub_dir: BTreeMap<String, PathBuf>,
    /// Class name to the import path of its wire types
    #[serde(default)]
    pub gen_code_package: BTreeMap<String, String>,
    /// Prefix of recognised IDL annotations
    pub annotation_prefix: String,
    /// File whose contents prefix every generated file
    #[serde(default)]
    pub copyright_header: Option<PathBuf>,
    #[serde(default)]
    pub middleware_config: Option<PathBuf>,
    #[serde(default)]
    pub default_middleware_config: Option<PathBuf>,
    /// Header used by generated endpoints to propagate trace IDs
    pub trace_key: String,
    pub staging_req_header: String,
    pub deputy_req_header: String,
    /// Headers forwarded by default
    #[serde(default)]
    pub default_headers: Vec<String>,
    /// Class name to classes every instance of it depends on
    #[serde(default)]
    pub default_dependencies: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub qps_levels_enabled: bool,
    #[serde(default, alias = "customInitializationEnabled")]
    pub custom_initialisation_enabled: bool,
    /// Emit mock clients and a mock service
    #[serde(default)]
    pub gen_mock: bool,
    /// Multiplier applied to the CPU count for generation workers
    pub parallelize_factor: usize,
    /// Absolute directory of the configuration file
    #[serde(skip)]
    pub config_root: PathBuf,
}

impl BuildConfig {
    /// Load a build configuration with process environment overrides.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        Self::load_with_env(path, |key| std::env::var(key).ok())
    }

    /// Load a build configuration resolving overrides through `lookup`.
    pub fn load_with_env(
        path: &Path,
        lookup: impl Fn(&str) -> Option<String> + 'static,
    ) -> anyhow::Result<Self> {
        if !path.is_file() {
            anyhow::bail!("Build config not found: {}", path.display());
        }
        let store = ConfigStore::builder()
            .contents("defaults", Format::Yaml, DEFAULTS_YAML)
            .file(path)
            .env_lookup(lookup)
            .build()?;
        let config_root = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        let config_root = std::fs::canonicalize(if config_root.as_os_str().is_empty() {
            Path::new(".")
        } else {
            config_root.as_path()
        })
        .with_context(|| format!("Failed to resolve config root of {}", path.display()))?;

        Self::from_store(&store, config_root)
            .with_context(|| format!("Invalid build config {}", path.display()))
    }

    /// Decode from an already merged store.
    pub fn from_store(store: &ConfigStore, config_root: PathBuf) -> anyhow::Result<Self> {
        for key in REQUIRED_KEYS {
            store.must_get(key)?;
        }
        let mut config: BuildConfig = store.decode()?;
        if config.parallelize_factor == 0 {
            return Err(GenError::ConfigTypeMismatch {
                key: "parallelizeFactor".to_string(),
                expected: "positive integer",
                found: "0".to_string(),
            }
            .into());
        }
        config.config_root = config_root;
        Ok(config)
    }

    /// Resolve a path from the config against the config root.
    pub fn resolve(&self, relative: &Path) -> PathBuf {
        self.config_root.join(relative)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{kind_of, ErrorKind};

    const MINIMAL: &str = r#"
packageRoot: github.com/acme/gateway
idlRootDir: idl
targetGenDir: build
moduleSearchPaths:
  client: [clients]
  endpoint: [endpoints]
"#;

    #[test]
    fn test_load_minimal_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("build.yaml");
        std::fs::write(&path, MINIMAL).unwrap();

        let config = BuildConfig::load_with_env(&path, |_| None).unwrap();
        assert_eq!(config.package_root, "github.com/acme/gateway");
        assert_eq!(config.annotation_prefix, "zanzibar");
        assert_eq!(config.parallelize_factor, 2);
        assert!(!config.gen_mock);
        assert_eq!(config.module_search_paths["client"], vec![PathBuf::from("clients")]);
        assert_eq!(
            config.config_root,
            std::fs::canonicalize(dir.path()).unwrap()
        );
        assert_eq!(
            config.resolve(&config.target_gen_dir),
            config.config_root.join("build")
        );
    }

    #[test]
    fn test_missing_required_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("build.yaml");
        std::fs::write(&path, "packageRoot: x\nidlRootDir: idl\ntargetGenDir: build\n").unwrap();

        let err = BuildConfig::load_with_env(&path, |_| None).unwrap_err();
        assert_eq!(kind_of(&err), Some(ErrorKind::ConfigMissingKey));
        assert!(format!("{err:#}").contains("moduleSearchPaths"));
    }

    #[test]
    fn test_type_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("build.json");
        std::fs::write(
            &path,
            r#"{"packageRoot": "x", "idlRootDir": "idl", "targetGenDir": "build",
                "moduleSearchPaths": {"client": ["clients"]}, "genMock": "yes"}"#,
        )
        .unwrap();

        let err = BuildConfig::load_with_env(&path, |_| None).unwrap_err();
        assert_eq!(kind_of(&err), Some(ErrorKind::ConfigTypeMismatch));
    }

    #[test]
    fn test_env_override_table_in_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("build.yaml");
        let text = format!(
            "{MINIMAL}envOverrides:\n  GATEWAY_GEN_MOCK: {{ key: genMock, dataType: bool }}\n"
        );
        std::fs::write(&path, text).unwrap();

        let config = BuildConfig::load_with_env(&path, |k| {
            (k == "GATEWAY_GEN_MOCK").then(|| "true".to_string())
        })
        .unwrap();
        assert!(config.gen_mock);
    }

    #[test]
    fn test_missing_file() {
        assert!(BuildConfig::load_with_env(Path::new("/nope/build.yaml"), |_| None).is_err());
    }
}
