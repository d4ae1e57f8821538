use super::class::ModuleClass;
use crate::error::GenError;
use crate::package::normalize_relative;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// Registry of module classes. Assembled once, read-only during a build.
#[derive(Debug, Clone, Default)]
pub struct ModuleSystem {
    classes: BTreeMap<String, ModuleClass>,
    /// Registration order, the tie-break for class ordering
    registration: Vec<String>,
}

impl ModuleSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_class(&mut self, class: ModuleClass) -> anyhow::Result<()> {
        if self.classes.contains_key(&class.name) {
            anyhow::bail!("module class `{}` is already registered", class.name);
        }
        if !class.dirs.is_empty() {
            anyhow::bail!(
                "module class `{}` must be registered before its directories",
                class.name
            );
        }
        self.registration.push(class.name.clone());
        self.classes.insert(class.name.clone(), class);
        Ok(())
    }

    /// Attach a directory (relative to the config root) to a class.
    ///
    /// Directories are normalised and must be non-empty, must not be the config
    /// root itself, and must not overlap another registered directory.
    pub fn register_class_dir(&mut self, class: &str, dir: &Path) -> anyhow::Result<()> {
        let normalised = normalize_relative(dir, "config root")?;
        if normalised.as_os_str().is_empty() {
            anyhow::bail!(
                "class `{class}` directory `{}` resolves to the config root",
                dir.display()
            );
        }
        for other in self.classes.values() {
            for existing in &other.dirs {
                if existing.starts_with(&normalised) || normalised.starts_with(existing) {
                    anyhow::bail!(
                        "class `{class}` directory `{}` overlaps `{}` of class `{}`",
                        normalised.display(),
                        existing.display(),
                        other.name
                    );
                }
            }
        }
        let entry = self
            .classes
            .get_mut(class)
            .ok_or_else(|| GenError::UnknownClass {
                class: class.to_string(),
            })?;
        entry.dirs.push(normalised);
        Ok(())
    }

    /// Mark a type name as known for a class.
    pub fn declare_type(&mut self, class: &str, type_name: &str) -> Result<(), GenError> {
        let entry = self
            .classes
            .get_mut(class)
            .ok_or_else(|| GenError::UnknownClass {
                class: class.to_string(),
            })?;
        entry.types.insert(type_name.to_string());
        Ok(())
    }

    pub fn class(&self, name: &str) -> Result<&ModuleClass, GenError> {
        self.classes.get(name).ok_or_else(|| GenError::UnknownClass {
            class: name.to_string(),
        })
    }

    pub fn has_class(&self, name: &str) -> bool {
        self.classes.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Classes ordered so that every class follows the classes it depends on.
    ///
    /// Kahn's algorithm over the class graph; among ready classes the one
    /// registered first wins.
    pub fn class_order(&self) -> Result<Vec<&ModuleClass>, GenError> {
        let position: BTreeMap<&str, usize> = self
            .registration
            .iter()
            .enumerate()
            .map(|(i, name)| (name.as_str(), i))
            .collect();

        let mut indegree: BTreeMap<&str, usize> = BTreeMap::new();
        let mut dependents: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for class in self.classes.values() {
            let deps: BTreeSet<&str> = class.depends_on.iter().map(String::as_str).collect();
            for dep in deps.iter().copied() {
                if !self.classes.contains_key(dep) {
                    return Err(GenError::UnknownClass {
                        class: dep.to_string(),
                    });
                }
                dependents.entry(dep).or_default().push(&class.name);
            }
            indegree.insert(&class.name, deps.len());
        }

        let mut ready: BTreeSet<(usize, &str)> = indegree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(name, _)| (position[name], *name))
            .collect();
        let mut order = Vec::with_capacity(self.classes.len());
        while let Some((_, name)) = ready.pop_first() {
            order.push(&self.classes[name]);
            for dependent in dependents.get(name).into_iter().flatten() {
                if let Some(degree) = indegree.get_mut(dependent) {
                    *degree -= 1;
                    if *degree == 0 {
                        ready.insert((position[dependent], *dependent));
                    }
                }
            }
        }

        if order.len() < self.classes.len() {
            let mut cycle: Vec<String> = indegree
                .iter()
                .filter(|(_, degree)| **degree > 0)
                .map(|(name, _)| name.to_string())
                .collect();
            if let Some(first) = cycle.first().cloned() {
                cycle.push(first);
            }
            return Err(GenError::CycleDetected {
                cycle,
                cross_class: false,
            });
        }
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::module::Cardinality;

    fn system() -> ModuleSystem {
        let mut system = ModuleSystem::new();
        system
            .register_class(ModuleClass::new("service", Cardinality::Multi).depends_on(&["endpoint"]))
            .unwrap();
        system
            .register_class(ModuleClass::new("client", Cardinality::Multi))
            .unwrap();
        system
            .register_class(
                ModuleClass::new("endpoint", Cardinality::Multi).depends_on(&["client", "middleware"]),
            )
            .unwrap();
        system
            .register_class(ModuleClass::new("middleware", Cardinality::Multi).depends_on(&["client"]))
            .unwrap();
        system
    }

    #[test]
    fn test_class_order_follows_dependencies() {
        let system = system();
        let order: Vec<&str> = system
            .class_order()
            .unwrap()
            .iter()
            .map(|c| c.name.as_str())
            .collect();
        assert_eq!(order, ["client", "middleware", "endpoint", "service"]);
    }

    #[test]
    fn test_duplicate_class_rejected() {
        let mut system = system();
        assert!(system
            .register_class(ModuleClass::new("client", Cardinality::Single))
            .is_err());
    }

    #[test]
    fn test_class_cycle() {
        let mut system = ModuleSystem::new();
        system
            .register_class(ModuleClass::new("a", Cardinality::Multi).depends_on(&["b"]))
            .unwrap();
        system
            .register_class(ModuleClass::new("b", Cardinality::Multi).depends_on(&["a"]))
            .unwrap();
        let err = system.class_order().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CycleDetected);
    }

    #[test]
    fn test_unknown_class_dependency() {
        let mut system = ModuleSystem::new();
        system
            .register_class(ModuleClass::new("a", Cardinality::Multi).depends_on(&["ghost"]))
            .unwrap();
        assert_eq!(system.class_order().unwrap_err().kind(), ErrorKind::UnknownClass);
    }

    #[test]
    fn test_class_dirs_validated() {
        let mut system = system();
        system.register_class_dir("client", Path::new("./clients/")).unwrap();
        assert_eq!(system.class("client").unwrap().dirs, [Path::new("clients")]);

        assert!(system.register_class_dir("endpoint", Path::new(".")).is_err());
        assert!(system.register_class_dir("endpoint", Path::new("../endpoints")).is_err());
        assert!(system.register_class_dir("endpoint", Path::new("clients/nested")).is_err());
        assert!(system.register_class_dir("ghost", Path::new("ghosts")).is_err());
        system.register_class_dir("endpoint", Path::new("endpoints")).unwrap();
    }
}
