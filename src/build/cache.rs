//! Incremental build cache.
//!
//! One JSON file under the generated-code root records, per instance, the
//! fingerprint of its inputs at the last successful build, the instance's
//! output directory, and the files generated into it:
//!
//! ```json
//! {
//!   "version": 1,
//!   "generatorVersion": "gatewaygen-go/1",
//!   "entries": {
//!     "client/echo": {
//!       "fingerprint": "9f86d0...",
//!       "dir": "clients/echo",
//!       "outputs": ["clients/echo/echo.go", "clients/echo/module/dependencies.go"]
//!     }
//!   }
//! }
//! ```
//!
//! An absent file is an empty cache. A file that does not parse, or was
//! written by another cache or generator version, is reported as
//! `cache-corrupt` and ignored; the next build regenerates everything.

use crate::error::GenError;
use crate::fingerprint::Fingerprint;
use crate::generator::GENERATOR_VERSION;
use crate::module::InstanceId;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Layout version of `cache.json`.
pub const CACHE_VERSION: u32 = 1;

/// Directory under the generated-code root owned by the build.
pub const STATE_DIR: &str = ".gatewaygen";

const CACHE_FILE: &str = "cache.json";

/// What the last successful build produced for one instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub fingerprint: Fingerprint,
    /// Instance output directory, relative to the generated-code root.
    pub dir: PathBuf,
    /// Generated files, relative to the generated-code root.
    pub outputs: Vec<PathBuf>,
}

impl CacheEntry {
    /// Whether every recorded output is still on disk under `root`.
    pub fn outputs_exist(&self, root: &Path) -> bool {
        self.outputs.iter().all(|output| root.join(output).is_file())
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CacheFile {
    version: u32,
    generator_version: String,
    #[serde(default)]
    entries: BTreeMap<String, CacheEntry>,
}

/// In-memory snapshot of the cache file.
#[derive(Debug, Clone)]
pub struct BuildCache {
    path: PathBuf,
    entries: BTreeMap<InstanceId, CacheEntry>,
}

impl BuildCache {
    /// Location of the cache file for a generated-code root.
    pub fn path_for(target_gen_dir: &Path) -> PathBuf {
        target_gen_dir.join(STATE_DIR).join(CACHE_FILE)
    }

    /// An empty cache that will be saved under `target_gen_dir`.
    pub fn empty(target_gen_dir: &Path) -> Self {
        Self {
            path: Self::path_for(target_gen_dir),
            entries: BTreeMap::new(),
        }
    }

    /// Load the cache of `target_gen_dir`. Missing files give an empty cache;
    /// unreadable ones are logged and also give an empty cache.
    pub fn load(target_gen_dir: &Path) -> Self {
        let path = Self::path_for(target_gen_dir);
        if !path.exists() {
            debug!(path = %path.display(), "no build cache");
            return Self::empty(target_gen_dir);
        }
        match Self::read(&path) {
            Ok(entries) => {
                debug!(path = %path.display(), entries = entries.len(), "loaded build cache");
                Self { path, entries }
            }
            Err(err) => {
                warn!(error = %err, "ignoring build cache");
                Self::empty(target_gen_dir)
            }
        }
    }

    /// Strictly read a cache file.
    pub fn read(path: &Path) -> Result<BTreeMap<InstanceId, CacheEntry>, GenError> {
        let corrupt = |message: String| GenError::CacheCorrupt {
            path: path.to_path_buf(),
            message,
        };
        let bytes = fs::read(path).map_err(|e| corrupt(e.to_string()))?;
        let file: CacheFile = serde_json::from_slice(&bytes).map_err(|e| corrupt(e.to_string()))?;
        if file.version != CACHE_VERSION {
            return Err(corrupt(format!(
                "cache version {} is not {CACHE_VERSION}",
                file.version
            )));
        }
        if file.generator_version != GENERATOR_VERSION {
            return Err(corrupt(format!(
                "written by generator {}, this is {GENERATOR_VERSION}",
                file.generator_version
            )));
        }
        file.entries
            .into_iter()
            .map(|(key, entry)| {
                let id = key
                    .parse::<InstanceId>()
                    .map_err(|e| corrupt(format!("bad entry key: {e}")))?;
                Ok((id, entry))
            })
            .collect()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, id: &InstanceId) -> Option<&CacheEntry> {
        self.entries.get(id)
    }

    pub fn insert(&mut self, id: InstanceId, entry: CacheEntry) {
        self.entries.insert(id, entry);
    }

    pub fn remove(&mut self, id: &InstanceId) -> Option<CacheEntry> {
        self.entries.remove(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &InstanceId> {
        self.entries.keys()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Write the cache through a temporary file in the same directory, then
    /// rename it over the old one.
    pub fn save(&self) -> anyhow::Result<()> {
        let dir = self
            .path
            .parent()
            .ok_or_else(|| anyhow::anyhow!("cache path {} has no parent", self.path.display()))?;
        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;

        let file = CacheFile {
            version: CACHE_VERSION,
            generator_version: GENERATOR_VERSION.to_string(),
            entries: self
                .entries
                .iter()
                .map(|(id, entry)| (id.to_string(), entry.clone()))
                .collect(),
        };
        let mut bytes = serde_json::to_vec_pretty(&file)?;
        bytes.push(b'\n');

        let mut temp = tempfile::NamedTempFile::new_in(dir)
            .with_context(|| format!("creating a temporary cache file in {}", dir.display()))?;
        temp.write_all(&bytes)?;
        temp.as_file().sync_all()?;
        temp.persist(&self.path)
            .map_err(|e| e.error)
            .with_context(|| format!("replacing {}", self.path.display()))?;
        debug!(path = %self.path.display(), entries = self.entries.len(), "saved build cache");
        Ok(())
    }
}
