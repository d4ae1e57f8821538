//! Instance discovery.
//!
//! Classes are visited in class order. For every class directory:
//!
//! - *single* classes read `<dir>/<class>-config.json`;
//! - *multi* classes treat a directory holding the config file as one
//!   instance, otherwise walk its subdirectories (hidden ones skipped) and stop
//!   descending at the first directory that holds a config file.
//!
//! Reading is fail-fast: the first bad directory aborts the whole read.

use super::class::{Cardinality, ModuleClass};
use super::instance::{Instance, InstanceConfig, InstanceId, PackageInfo};
use super::system::ModuleSystem;
use crate::error::GenError;
use crate::package::{normalize_relative, PackageHelper};
use anyhow::Context;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::{DirEntry, WalkDir};

/// Config keys naming the instance's IDL file, first match wins.
const IDL_FILE_KEYS: [&str; 3] = ["idlFile", "thriftFile", "protoFile"];

fn is_hidden(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.starts_with('.'))
}

/// Directories holding an instance config for `class` under `dir`.
fn instance_dirs(class: &ModuleClass, dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let config_name = class.config_file_name();
    if !dir.is_dir() {
        return Err(GenError::InstanceInvalid {
            path: dir.to_path_buf(),
            reason: format!("directory for class `{}` does not exist", class.name),
        }
        .into());
    }
    if dir.join(&config_name).is_file() {
        return Ok(vec![dir.to_path_buf()]);
    }
    if class.cardinality == Cardinality::Single {
        return Err(GenError::InstanceInvalid {
            path: dir.join(&config_name),
            reason: format!("single-instance class `{}` has no config file", class.name),
        }
        .into());
    }

    let mut found = Vec::new();
    let mut walker = WalkDir::new(dir)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_hidden(e));
    while let Some(entry) = walker.next() {
        let entry = entry.with_context(|| format!("Failed to walk {}", dir.display()))?;
        if !entry.file_type().is_dir() {
            continue;
        }
        if entry.path().join(&config_name).is_file() {
            found.push(entry.path().to_path_buf());
            walker.skip_current_dir();
        }
    }
    Ok(found)
}

fn idl_file(
    helper: &PackageHelper,
    class: &str,
    config: &Value,
    config_path: &Path,
) -> Result<Option<PathBuf>, GenError> {
    for key in IDL_FILE_KEYS {
        match config.get(key) {
            None => continue,
            Some(Value::String(file)) => {
                return helper
                    .idl_path_for_instance(class, Path::new(file))
                    .map(Some)
            }
            Some(_) => {
                return Err(GenError::InstanceInvalid {
                    path: config_path.to_path_buf(),
                    reason: format!("config.{key} must be a string"),
                })
            }
        }
    }
    Ok(None)
}

fn read_instance(
    helper: &PackageHelper,
    system: &ModuleSystem,
    class: &ModuleClass,
    instance_dir: &Path,
) -> anyhow::Result<Instance> {
    let config_path = instance_dir.join(class.config_file_name());
    let invalid = |reason: String| GenError::InstanceInvalid {
        path: config_path.clone(),
        reason,
    };

    let raw_config = std::fs::read(&config_path)
        .map_err(|e| invalid(format!("cannot read config: {e}")))?;
    let parsed: InstanceConfig =
        serde_json::from_slice(&raw_config).map_err(|e| invalid(format!("bad JSON: {e}")))?;

    if !class.is_valid_name(&parsed.name) {
        return Err(invalid(format!(
            "instance name `{}` is not valid for class `{}`",
            parsed.name, class.name
        ))
        .into());
    }
    class.check_type(&parsed.type_name)?;

    let mut dependencies = BTreeSet::new();
    for (dep_class, names) in &parsed.dependencies {
        system.class(dep_class)?;
        for name in names {
            dependencies.insert(InstanceId::new(dep_class, name));
        }
    }

    let relative_dir = instance_dir
        .strip_prefix(helper.config_root())
        .map_err(|_| GenError::PathEscape {
            path: instance_dir.to_path_buf(),
            root: "config root".to_string(),
        })?;
    let relative_dir = normalize_relative(relative_dir, "config root")?;
    let idl_file = idl_file(helper, &class.name, &parsed.config, &config_path)?;

    let package = PackageInfo::derive(
        helper,
        &class.name,
        &parsed.name,
        &parsed.type_name,
        &relative_dir,
        parsed.is_export_generated,
    );

    Ok(Instance {
        id: InstanceId::new(&class.name, &parsed.name),
        type_name: parsed.type_name,
        base_dir: helper.config_root().to_path_buf(),
        relative_dir,
        config: parsed.config,
        dependencies: dependencies.into_iter().collect(),
        raw_config,
        idl_file,
        package,
    })
}

/// Read every instance of every class, in class order then directory order.
///
/// `defaultDependencies` from the build config are merged into the declared
/// dependencies: an instance of a key class depends on every instance of each
/// listed class.
pub fn read_instances(system: &ModuleSystem, helper: &PackageHelper) -> anyhow::Result<Vec<Instance>> {
    let mut instances = Vec::new();
    let mut names: BTreeMap<&str, BTreeMap<String, PathBuf>> = BTreeMap::new();

    for class in system.class_order()? {
        let seen = names.entry(class.name.as_str()).or_default();
        let mut class_instances = Vec::new();
        for dir in &class.dirs {
            let abs = helper.config_root().join(dir);
            for instance_dir in instance_dirs(class, &abs)? {
                let instance = read_instance(helper, system, class, &instance_dir)
                    .with_context(|| format!("Failed to read {} instance at {}", class.name, instance_dir.display()))?;
                if let Some(previous) = seen.insert(instance.name().to_string(), instance_dir.clone()) {
                    return Err(GenError::InstanceInvalid {
                        path: instance_dir,
                        reason: format!(
                            "instance name `{}` already used by {}",
                            instance.name(),
                            previous.display()
                        ),
                    }
                    .into());
                }
                class_instances.push(instance);
            }
        }
        class_instances.sort_by(|a, b| a.relative_dir.cmp(&b.relative_dir));
        debug!(class = %class.name, count = class_instances.len(), "read instances");
        instances.extend(class_instances);
    }

    apply_default_dependencies(helper, system, &mut instances)?;
    Ok(instances)
}

fn apply_default_dependencies(
    helper: &PackageHelper,
    system: &ModuleSystem,
    instances: &mut [Instance],
) -> anyhow::Result<()> {
    let defaults = &helper.config().default_dependencies;
    if defaults.is_empty() {
        return Ok(());
    }
    let mut by_class: BTreeMap<String, Vec<InstanceId>> = BTreeMap::new();
    for instance in instances.iter() {
        by_class
            .entry(instance.class().to_string())
            .or_default()
            .push(instance.id.clone());
    }
    for (class, dep_classes) in defaults {
        system.class(class).context("Invalid defaultDependencies")?;
        for dep_class in dep_classes {
            system.class(dep_class).context("Invalid defaultDependencies")?;
        }
    }
    for instance in instances.iter_mut() {
        let Some(dep_classes) = defaults.get(instance.class()) else {
            continue;
        };
        let mut deps: BTreeSet<InstanceId> = instance.dependencies.drain(..).collect();
        for dep_class in dep_classes {
            deps.extend(by_class.get(dep_class).into_iter().flatten().cloned());
        }
        instance.dependencies = deps.into_iter().collect();
    }
    Ok(())
}
