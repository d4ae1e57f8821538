use crate::error::GenError;
use regex::Regex;
use std::collections::BTreeSet;
use std::path::PathBuf;

/// Instance names must be usable as a path segment and a Go identifier seed.
const DEFAULT_NAME_PATTERN: &str = r"^[A-Za-z0-9_][A-Za-z0-9_.\-]*$";

/// How many instances a class directory holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    /// The class directory itself is the one instance
    Single,
    /// Every subdirectory holding a config file is an instance
    Multi,
}

/// A named kind of module.
#[derive(Debug, Clone)]
pub struct ModuleClass {
    pub name: String,
    pub cardinality: Cardinality,
    /// Classes whose instances resolve before this one
    pub depends_on: Vec<String>,
    /// Directories relative to the config root, set from `moduleSearchPaths`
    pub dirs: Vec<PathBuf>,
    /// Known type names. A type may be known without having a generator.
    pub types: BTreeSet<String>,
    name_pattern: Regex,
}

impl ModuleClass {
    pub fn new(name: &str, cardinality: Cardinality) -> Self {
        Self {
            name: name.to_string(),
            cardinality,
            depends_on: Vec::new(),
            dirs: Vec::new(),
            types: BTreeSet::new(),
            name_pattern: default_pattern(),
        }
    }

    pub fn depends_on(mut self, classes: &[&str]) -> Self {
        self.depends_on = classes.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn with_types(mut self, types: &[&str]) -> Self {
        self.types.extend(types.iter().map(|t| t.to_string()));
        self
    }

    /// Override the instance-name pattern.
    pub fn with_name_pattern(mut self, pattern: &str) -> anyhow::Result<Self> {
        self.name_pattern = Regex::new(pattern)?;
        Ok(self)
    }

    /// File name of an instance config, e.g. `client-config.json`.
    pub fn config_file_name(&self) -> String {
        format!("{}-config.json", self.name)
    }

    pub fn is_valid_name(&self, name: &str) -> bool {
        self.name_pattern.is_match(name)
    }

    pub fn has_type(&self, type_name: &str) -> bool {
        self.types.contains(type_name)
    }

    pub(crate) fn check_type(&self, type_name: &str) -> Result<(), GenError> {
        if self.has_type(type_name) {
            Ok(())
        } else {
            Err(GenError::UnknownType {
                class: self.name.clone(),
                type_name: type_name.to_string(),
            })
        }
    }
}

fn default_pattern() -> Regex {
    Regex::new(DEFAULT_NAME_PATTERN).expect("Failed to compile instance name regex")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_name_pattern() {
        let class = ModuleClass::new("client", Cardinality::Multi);
        for ok in ["echo", "echo-v2", "echo_v2", "a.b", "9lives"] {
            assert!(class.is_valid_name(ok), "{ok}");
        }
        for bad in ["", "..", ".hidden", "a/b", "a b"] {
            assert!(!class.is_valid_name(bad), "{bad}");
        }
    }

    #[test]
    fn test_custom_pattern_and_types() {
        let class = ModuleClass::new("service", Cardinality::Single)
            .with_types(&["gateway"])
            .with_name_pattern("^[a-z]+$")
            .unwrap();
        assert!(class.is_valid_name("gateway"));
        assert!(!class.is_valid_name("Gateway"));
        assert_eq!(class.config_file_name(), "service-config.json");
        assert!(class.check_type("gateway").is_ok());
        assert!(class.check_type("grpc").is_err());
    }
}
