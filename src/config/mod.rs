//! Layered key/value configuration store.
//!
//! Sources are merged lowest priority first:
//!
//! 1. baked-in defaults ([`DEFAULTS_YAML`]),
//! 2. configuration files in the order given (later files win),
//! 3. environment overrides from the `{envVar → {key, dataType}}` table,
//! 4. the in-memory seed map, which always wins.
//!
//! Top-level keys of every source become store keys; nested values are kept as
//! structured JSON and can be decoded into any `serde` shape. Once built the
//! store is read-only.

pub mod build;

use crate::error::GenError;
use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

pub use build::BuildConfig;

/// Defaults applied beneath every build configuration.
pub const DEFAULTS_YAML: &str = include_str!("defaults.yaml");

/// Key holding the environment override table inside configuration files.
pub const ENV_OVERRIDES_KEY: &str = "envOverrides";

/// Serialization format of a configuration source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Json,
    Yaml,
    Toml,
}

impl Format {
    /// Pick a format from a file extension. Unknown extensions are read as YAML,
    /// which also accepts JSON documents.
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref()
        {
            Some("json") => Format::Json,
            Some("toml") => Format::Toml,
            _ => Format::Yaml,
        }
    }

    fn parse(self, text: &str) -> Result<Value> {
        let value = match self {
            Format::Json => serde_json::from_str(text)?,
            Format::Yaml => serde_yaml::from_str(text)?,
            Format::Toml => toml::from_str(text)?,
        };
        Ok(value)
    }
}

/// Value type an environment variable is coerced to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    String,
    #[serde(alias = "number")]
    Int,
    Float,
    #[serde(alias = "boolean")]
    Bool,
    Json,
}

/// Target of a single environment override.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvOverride {
    pub key: String,
    pub data_type: DataType,
}

enum Source {
    Contents { origin: String, format: Format, text: String },
    File(PathBuf),
}

type EnvLookup = Box<dyn Fn(&str) -> Option<String>>;

/// Builder collecting the layers of a [`ConfigStore`].
pub struct ConfigStoreBuilder {
    sources: Vec<Source>,
    seed: BTreeMap<String, Value>,
    env_overrides: BTreeMap<String, EnvOverride>,
    env_lookup: EnvLookup,
}

impl Default for ConfigStoreBuilder {
    fn default() -> Self {
        Self {
            sources: Vec::new(),
            seed: BTreeMap::new(),
            env_overrides: BTreeMap::new(),
            env_lookup: Box::new(|key| std::env::var(key).ok()),
        }
    }
}

impl ConfigStoreBuilder {
    /// Add in-memory contents as the next layer. Use this for baked-in defaults.
    pub fn contents(mut self, origin: &str, format: Format, text: &str) -> Self {
        self.sources.push(Source::Contents {
            origin: origin.to_string(),
            format,
            text: text.to_string(),
        });
        self
    }

    /// Add a file layer. Missing files are skipped.
    pub fn file(mut self, path: impl Into<PathBuf>) -> Self {
        self.sources.push(Source::File(path.into()));
        self
    }

    /// Seed a value that takes precedence over every other layer.
    pub fn seed(mut self, key: &str, value: Value) -> Self {
        self.seed.insert(key.to_string(), value);
        self
    }

    /// Map an environment variable onto a store key.
    pub fn env_override(mut self, var: &str, key: &str, data_type: DataType) -> Self {
        self.env_overrides.insert(
            var.to_string(),
            EnvOverride {
                key: key.to_string(),
                data_type,
            },
        );
        self
    }

    /// Replace the environment lookup, mainly for tests.
    pub fn env_lookup(mut self, lookup: impl Fn(&str) -> Option<String> + 'static) -> Self {
        self.env_lookup = Box::new(lookup);
        self
    }

    pub fn build(self) -> Result<ConfigStore> {
        let mut values = BTreeMap::new();

        for source in &self.sources {
            let (origin, object) = match source {
                Source::Contents {
                    origin,
                    format,
                    text,
                } => (
                    origin.clone(),
                    format
                        .parse(text)
                        .with_context(|| format!("Failed to parse config contents {origin}"))?,
                ),
                Source::File(path) => {
                    let text = match std::fs::read_to_string(path) {
                        Ok(text) => text,
                        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                            debug!(path = %path.display(), "config file missing, skipped");
                            continue;
                        }
                        Err(e) => {
                            return Err(e).with_context(|| {
                                format!("Failed to read config file {}", path.display())
                            })
                        }
                    };
                    let value = Format::from_path(path)
                        .parse(&text)
                        .with_context(|| format!("Failed to parse config file {}", path.display()))?;
                    (path.display().to_string(), value)
                }
            };
            match object {
                Value::Object(map) => values.extend(map),
                Value::Null => {}
                other => anyhow::bail!(
                    "Config source {origin} must be a mapping at the top level, found {}",
                    type_name(&other)
                ),
            }
        }

        let mut overrides = match values.get(ENV_OVERRIDES_KEY) {
            Some(table) => BTreeMap::<String, EnvOverride>::deserialize(table).map_err(|e| {
                GenError::ConfigTypeMismatch {
                    key: ENV_OVERRIDES_KEY.to_string(),
                    expected: "mapping of envVar to {key, dataType}",
                    found: e.to_string(),
                }
            })?,
            None => BTreeMap::new(),
        };
        overrides.extend(self.env_overrides);

        for (var, target) in &overrides {
            if let Some(raw) = (self.env_lookup)(var) {
                let value = coerce_env(var, &raw, target.data_type)?;
                debug!(env = %var, key = %target.key, "config key overridden from environment");
                values.insert(target.key.clone(), value);
            }
        }

        values.extend(self.seed);
        Ok(ConfigStore { values })
    }
}

fn coerce_env(var: &str, raw: &str, data_type: DataType) -> Result<Value> {
    let mismatch = |expected: &'static str| GenError::ConfigTypeMismatch {
        key: var.to_string(),
        expected,
        found: format!("{raw:?}"),
    };
    let value = match data_type {
        DataType::String => Value::String(raw.to_string()),
        DataType::Int => Value::from(raw.trim().parse::<i64>().map_err(|_| mismatch("int"))?),
        DataType::Float => Value::from(raw.trim().parse::<f64>().map_err(|_| mismatch("float"))?),
        DataType::Bool => Value::Bool(raw.trim().parse::<bool>().map_err(|_| mismatch("bool"))?),
        DataType::Json => serde_json::from_str(raw).map_err(|_| mismatch("json"))?,
    };
    Ok(value)
}

fn type_name(value: &Value) -> String {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "int",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "mapping",
    }
    .to_string()
}

/// Read-only configuration map with typed lookups.
#[derive(Debug, Clone, Default)]
pub struct ConfigStore {
    values: BTreeMap<String, Value>,
}

impl ConfigStore {
    pub fn builder() -> ConfigStoreBuilder {
        ConfigStoreBuilder::default()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn must_get(&self, key: &str) -> Result<&Value, GenError> {
        self.values.get(key).ok_or_else(|| GenError::ConfigMissingKey {
            key: key.to_string(),
        })
    }

    pub fn get_string(&self, key: &str) -> Result<Option<String>, GenError> {
        self.get(key).map(|v| as_string(key, v)).transpose()
    }

    pub fn must_get_string(&self, key: &str) -> Result<String, GenError> {
        as_string(key, self.must_get(key)?)
    }

    pub fn get_int(&self, key: &str) -> Result<Option<i64>, GenError> {
        self.get(key).map(|v| as_int(key, v)).transpose()
    }

    pub fn must_get_int(&self, key: &str) -> Result<i64, GenError> {
        as_int(key, self.must_get(key)?)
    }

    pub fn get_float(&self, key: &str) -> Result<Option<f64>, GenError> {
        self.get(key).map(|v| as_float(key, v)).transpose()
    }

    pub fn must_get_float(&self, key: &str) -> Result<f64, GenError> {
        as_float(key, self.must_get(key)?)
    }

    pub fn get_bool(&self, key: &str) -> Result<Option<bool>, GenError> {
        self.get(key).map(|v| as_bool(key, v)).transpose()
    }

    pub fn must_get_bool(&self, key: &str) -> Result<bool, GenError> {
        as_bool(key, self.must_get(key)?)
    }

    /// Raw bytes: strings yield their UTF-8 bytes, lists of 0-255 integers are
    /// taken verbatim.
    pub fn must_get_bytes(&self, key: &str) -> Result<Vec<u8>, GenError> {
        let value = self.must_get(key)?;
        match value {
            Value::String(s) => Ok(s.clone().into_bytes()),
            Value::Array(items) => items
                .iter()
                .map(|item| {
                    item.as_u64()
                        .and_then(|n| u8::try_from(n).ok())
                        .ok_or_else(|| mismatch(key, "bytes", value))
                })
                .collect(),
            other => Err(mismatch(key, "bytes", other)),
        }
    }

    /// Decode a single key into a caller-supplied shape.
    pub fn must_get_struct<T: DeserializeOwned>(&self, key: &str) -> Result<T, GenError> {
        let value = self.must_get(key)?;
        T::deserialize(value).map_err(|e| GenError::ConfigTypeMismatch {
            key: key.to_string(),
            expected: std::any::type_name::<T>(),
            found: e.to_string(),
        })
    }

    pub fn get_struct<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, GenError> {
        if self.contains_key(key) {
            self.must_get_struct(key).map(Some)
        } else {
            Ok(None)
        }
    }

    /// Decode the whole store into one shape.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, GenError> {
        let object: Map<String, Value> = self
            .values
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        T::deserialize(Value::Object(object)).map_err(|e| GenError::ConfigTypeMismatch {
            key: "<root>".to_string(),
            expected: std::any::type_name::<T>(),
            found: e.to_string(),
        })
    }

    /// Snapshot of every key, for debugging output.
    pub fn inspect(&self) -> &BTreeMap<String, Value> {
        &self.values
    }
}

fn mismatch(key: &str, expected: &'static str, found: &Value) -> GenError {
    GenError::ConfigTypeMismatch {
        key: key.to_string(),
        expected,
        found: type_name(found),
    }
}

fn as_string(key: &str, value: &Value) -> Result<String, GenError> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| mismatch(key, "string", value))
}

fn as_int(key: &str, value: &Value) -> Result<i64, GenError> {
    value.as_i64().ok_or_else(|| mismatch(key, "int", value))
}

fn as_float(key: &str, value: &Value) -> Result<f64, GenError> {
    value.as_f64().ok_or_else(|| mismatch(key, "float", value))
}

fn as_bool(key: &str, value: &Value) -> Result<bool, GenError> {
    value.as_bool().ok_or_else(|| mismatch(key, "bool", value))
}
