//! Path and import-path derivation for generated code.
//!
//! [`PackageHelper`] turns the relative locations of a [`BuildConfig`] into
//! absolute filesystem paths and Go import paths. Every derived path is
//! normalised lexically; anything that would climb out of its root fails with
//! `path-escape`.

use crate::config::{BuildConfig, Format};
use crate::error::GenError;
use crate::idl::PackageNameResolver;
use crate::naming::camel_case;
use anyhow::Context;
use serde_json::Value;
use std::path::{Component, Path, PathBuf};

/// Normalise a relative path without touching the filesystem.
///
/// `.` components are dropped and `..` pops the previous component. Absolute
/// paths and paths that climb above their starting point are rejected.
pub fn normalize_relative(path: &Path, root: &str) -> Result<PathBuf, GenError> {
    let escape = || GenError::PathEscape {
        path: path.to_path_buf(),
        root: root.to_string(),
    };
    let mut parts: Vec<&std::ffi::OsStr> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::Normal(part) => parts.push(part),
            Component::ParentDir => {
                parts.pop().ok_or_else(escape)?;
            }
            Component::RootDir | Component::Prefix(_) => return Err(escape()),
        }
    }
    Ok(parts.iter().collect())
}

/// Join path components with `/` for use in an import path.
pub fn slash_path(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Resolves every path and import path used during generation.
#[derive(Debug, Clone)]
pub struct PackageHelper {
    config: BuildConfig,
    idl_root: PathBuf,
    target_gen_rel: PathBuf,
    target_gen_dir: PathBuf,
    copyright_header: Vec<u8>,
}

impl PackageHelper {
    pub fn new(config: BuildConfig) -> anyhow::Result<Self> {
        let idl_rel = normalize_relative(&config.idl_root_dir, "config root")
            .context("Invalid idlRootDir")?;
        let target_gen_rel = normalize_relative(&config.target_gen_dir, "config root")
            .context("Invalid targetGenDir")?;
        if target_gen_rel.as_os_str().is_empty() {
            anyhow::bail!("targetGenDir must not be the config root itself");
        }

        let copyright_header = match &config.copyright_header {
            Some(rel) => {
                let path = config.resolve(rel);
                std::fs::read(&path).with_context(|| {
                    format!("Failed to read copyright header {}", path.display())
                })?
            }
            None => Vec::new(),
        };

        Ok(Self {
            idl_root: config.resolve(&idl_rel),
            target_gen_dir: config.resolve(&target_gen_rel),
            target_gen_rel,
            copyright_header,
            config,
        })
    }

    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    /// Absolute directory of the build configuration.
    pub fn config_root(&self) -> &Path {
        &self.config.config_root
    }

    /// Absolute root of the generated tree.
    pub fn code_gen_target_path(&self) -> &Path {
        &self.target_gen_dir
    }

    /// `targetGenDir` relative to the config root, normalised.
    pub fn target_gen_rel(&self) -> &Path {
        &self.target_gen_rel
    }

    pub fn package_root(&self) -> &str {
        self.config.package_root.trim_end_matches('/')
    }

    pub fn idl_root(&self) -> &Path {
        &self.idl_root
    }

    /// Resolve an IDL file named by an instance of `class`.
    pub fn idl_path_for_instance(&self, class: &str, file: &Path) -> Result<PathBuf, GenError> {
        let sub_dir = self
            .config
            .module_idl_sub_dir
            .get(class)
            .cloned()
            .unwrap_or_default();
        let rel = normalize_relative(&sub_dir.join(file), "idl root")?;
        Ok(self.idl_root.join(rel))
    }

    fn idl_relative(&self, idl_path: &Path) -> Result<PathBuf, GenError> {
        let rel = idl_path
            .strip_prefix(&self.idl_root)
            .map_err(|_| GenError::PathEscape {
                path: idl_path.to_path_buf(),
                root: self.idl_root.display().to_string(),
            })?;
        normalize_relative(&rel.with_extension(""), "idl root")
    }

    /// Class whose IDL subdirectory holds `rel`, longest match first.
    fn class_for_idl(&self, rel: &Path) -> Option<&str> {
        self.config
            .module_idl_sub_dir
            .iter()
            .filter(|(_, dir)| rel.starts_with(dir))
            .max_by_key(|(_, dir)| dir.components().count())
            .map(|(class, _)| class.as_str())
    }

    /// Import path of the wire types compiled from `idl_path`.
    pub fn go_package_for_idl(&self, idl_path: &Path) -> Result<String, GenError> {
        let rel = self.idl_relative(idl_path)?;
        let base = self
            .class_for_idl(&rel)
            .and_then(|class| self.config.gen_code_package.get(class))
            .map(|pkg| pkg.trim_end_matches('/').to_string())
            .unwrap_or_else(|| {
                format!(
                    "{}/{}/gen-code",
                    self.package_root(),
                    slash_path(&self.target_gen_rel)
                )
            });
        Ok(format!("{}/{}", base, slash_path(&rel)))
    }

    /// Go identifier used as the import alias of the wire types.
    pub fn type_package_name(&self, idl_path: &Path) -> Result<String, GenError> {
        let rel = self.idl_relative(idl_path)?;
        Ok(camel_case(&slash_path(&rel)))
    }

    /// Import path of an instance's generated package.
    pub fn generated_package_path(&self, instance_dir: &Path) -> String {
        format!(
            "{}/{}/{}",
            self.package_root(),
            slash_path(&self.target_gen_rel),
            slash_path(instance_dir)
        )
    }

    /// Import path of an instance's module-init package.
    pub fn module_package_path(&self, instance_dir: &Path) -> String {
        format!("{}/module", self.generated_package_path(instance_dir))
    }

    pub fn annotation_prefix(&self) -> &str {
        &self.config.annotation_prefix
    }

    /// Bytes prefixed to every generated file. Empty when unset.
    pub fn copyright_header(&self) -> &[u8] {
        &self.copyright_header
    }

    pub fn trace_key(&self) -> &str {
        &self.config.trace_key
    }

    pub fn staging_req_header(&self) -> &str {
        &self.config.staging_req_header
    }

    pub fn deputy_req_header(&self) -> &str {
        &self.config.deputy_req_header
    }

    pub fn default_headers(&self) -> &[String] {
        &self.config.default_headers
    }

    pub fn qps_levels_enabled(&self) -> bool {
        self.config.qps_levels_enabled
    }

    pub fn custom_initialisation_enabled(&self) -> bool {
        self.config.custom_initialisation_enabled
    }

    pub fn gen_mock(&self) -> bool {
        self.config.gen_mock
    }

    /// Middleware definitions, when `middlewareConfig` is set.
    pub fn middleware_config(&self) -> anyhow::Result<Option<Value>> {
        self.load_optional(self.config.middleware_config.as_deref())
    }

    /// Middlewares applied to every endpoint, when `defaultMiddlewareConfig` is set.
    pub fn default_middleware_config(&self) -> anyhow::Result<Option<Value>> {
        self.load_optional(self.config.default_middleware_config.as_deref())
    }

    fn load_optional(&self, rel: Option<&Path>) -> anyhow::Result<Option<Value>> {
        let Some(rel) = rel else {
            return Ok(None);
        };
        let path = self.config.resolve(rel);
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read middleware config {}", path.display()))?;
        let value = match Format::from_path(&path) {
            Format::Json => serde_json::from_str(&text)?,
            Format::Toml => toml::from_str(&text)?,
            Format::Yaml => serde_yaml::from_str(&text)?,
        };
        Ok(Some(value))
    }
}

impl PackageNameResolver for PackageHelper {
    fn type_package_name(&self, idl_path: &Path) -> anyhow::Result<String> {
        Ok(PackageHelper::type_package_name(self, idl_path)?)
    }

    fn type_import_path(&self, idl_path: &Path) -> anyhow::Result<String> {
        Ok(self.go_package_for_idl(idl_path)?)
    }

    fn idl_root(&self) -> &Path {
        &self.idl_root
    }
}
