//! # Build Orchestrator
//!
//! Drives one build: read instances, resolve the dependency graph,
//! fingerprint every instance, run the generators of the instances that need
//! it, then stage, format and swap their output directories into place.
//!
//! ## Modes
//!
//! - **Incremental** (default): an instance is *hot*, and skipped, when its
//!   fingerprint matches the cache, its recorded outputs still exist and all
//!   of its transitive dependencies are hot.
//! - **Full**: the cache is ignored and every instance is regenerated.
//! - **Selective**: only the requested instances and everything that depends
//!   on them are candidates. Requested instances are always regenerated;
//!   their dependents follow the incremental rule. Everything else is left
//!   alone on disk and in the cache.
//!
//! ## Atomicity
//!
//! Generated files are written to a staging directory under
//! `targetGenDir/.gatewaygen/`, formatted there, and each instance's output
//! directory is then replaced by a rename. Nothing in the output tree changes
//! until every instance has been generated, written and formatted. The cache
//! is saved last, so an interrupted build is simply redone on the next run.

pub mod cache;

pub use cache::{BuildCache, CacheEntry};

use crate::config::BuildConfig;
use crate::error::GenError;
use crate::fingerprint::{canonical_json, settings_fingerprint, Fingerprint, FingerprintBuilder};
use crate::generator::{default_module_system, FileSet, GenerationContext, Registry, GENERATOR_VERSION};
use crate::idl::{IdlLoader, PackageNameResolver};
use crate::module::{read_instances, InstanceId, ModuleSystem, ResolvedGraph, ResolvedInstance};
use crate::package::{normalize_relative, slash_path, PackageHelper};
use crate::scheduler::{cpu_count, Runner};
use crate::writer::{write_file, FormatterPipeline};
use anyhow::Context;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

/// Lifecycle of one instance within a build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceState {
    Pending,
    Resolving,
    Generating,
    Writing,
    Formatting,
    Done,
    Failed,
}

impl fmt::Display for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InstanceState::Pending => "pending",
            InstanceState::Resolving => "resolving",
            InstanceState::Generating => "generating",
            InstanceState::Writing => "writing",
            InstanceState::Formatting => "formatting",
            InstanceState::Done => "done",
            InstanceState::Failed => "failed",
        };
        f.write_str(s)
    }
}

fn transition(id: &InstanceId, state: InstanceState) {
    match state {
        InstanceState::Generating | InstanceState::Done => {
            info!(class = %id.class, instance = %id.name, state = %state, "instance state")
        }
        InstanceState::Failed => {
            error!(class = %id.class, instance = %id.name, state = %state, "instance state")
        }
        _ => debug!(class = %id.class, instance = %id.name, state = %state, "instance state"),
    }
}

/// What to build.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Ignore the cache and regenerate every candidate.
    pub full: bool,
    /// Restrict the build to these instances and their dependents.
    pub selective: Vec<InstanceId>,
    /// Run the formatter pipeline over staged files.
    pub format: bool,
    /// Worker count; defaults to CPU count times `parallelizeFactor`.
    pub parallelism: Option<usize>,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            full: false,
            selective: Vec::new(),
            format: true,
            parallelism: None,
        }
    }
}

/// Outcome of a successful build. Instance lists are in topological order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildReport {
    pub generated: Vec<InstanceId>,
    pub skipped_hot: Vec<InstanceId>,
    /// Instances whose type has no generator.
    pub skipped_no_generator: Vec<InstanceId>,
    /// Instances that vanished from the configuration since the last build.
    pub removed: Vec<InstanceId>,
    pub files_written: usize,
    /// Generator calls made by this build.
    pub invocations: usize,
}

/// Files produced for one instance, before staging.
struct Generated {
    id: InstanceId,
    dir: PathBuf,
    files: FileSet,
}

/// One instance's staged output.
struct Staged {
    id: InstanceId,
    dir: PathBuf,
    outputs: Vec<PathBuf>,
}

/// Builds the output tree of one configuration.
pub struct Builder {
    helper: Arc<PackageHelper>,
    system: ModuleSystem,
    registry: Arc<Registry>,
    formatter: Arc<FormatterPipeline>,
}

impl Builder {
    /// A builder for the default gateway module system.
    pub fn new(config: BuildConfig) -> anyhow::Result<Self> {
        let (system, registry) = default_module_system(&config)?;
        Self::with_system_and_registry(config, system, registry)
    }

    /// A builder for a custom set of classes and generators.
    pub fn with_system_and_registry(
        config: BuildConfig,
        system: ModuleSystem,
        registry: Registry,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            helper: Arc::new(PackageHelper::new(config)?),
            system,
            registry: Arc::new(registry),
            formatter: Arc::new(FormatterPipeline::go_default()),
        })
    }

    pub fn with_formatter(mut self, formatter: FormatterPipeline) -> Self {
        self.formatter = Arc::new(formatter);
        self
    }

    pub fn helper(&self) -> &PackageHelper {
        &self.helper
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn system(&self) -> &ModuleSystem {
        &self.system
    }

    /// Read and resolve every instance without generating anything.
    pub fn resolve(&self) -> anyhow::Result<ResolvedGraph> {
        let instances = read_instances(&self.system, &self.helper)?;
        for instance in &instances {
            self.registry.validate_options(instance)?;
        }
        let class_order: Vec<String> = self
            .system
            .class_order()?
            .into_iter()
            .map(|class| class.name.clone())
            .collect();
        Ok(ResolvedGraph::resolve(instances, &class_order)?)
    }

    /// Run a build.
    pub fn build(&self, options: &BuildOptions) -> anyhow::Result<BuildReport> {
        let started = Instant::now();
        let mode = if !options.selective.is_empty() {
            "selective"
        } else if options.full {
            "full"
        } else {
            "incremental"
        };
        info!(mode, target = %self.helper.code_gen_target_path().display(), "build started");
        match self.run(options) {
            Ok(report) => {
                info!(
                    mode,
                    generated = report.generated.len(),
                    hot = report.skipped_hot.len(),
                    no_generator = report.skipped_no_generator.len(),
                    removed = report.removed.len(),
                    files = report.files_written,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "build finished"
                );
                Ok(report)
            }
            Err(err) => {
                error!(mode, error = %format!("{err:#}"), "build failed");
                Err(err)
            }
        }
    }

    fn run(&self, options: &BuildOptions) -> anyhow::Result<BuildReport> {
        let invocations_before = self.registry.invocations();
        let graph = Arc::new(self.resolve()?);
        let root = self.helper.code_gen_target_path().to_path_buf();

        let candidates: BTreeSet<InstanceId> = if options.selective.is_empty() {
            graph.order().iter().cloned().collect()
        } else {
            for id in &options.selective {
                if !graph.contains(id) {
                    return Err(GenError::UnknownInstance {
                        class: id.class.clone(),
                        instance: id.name.clone(),
                    }
                    .into());
                }
            }
            graph.reverse_closure(&options.selective)
        };
        let forced: BTreeSet<&InstanceId> = options.selective.iter().collect();
        for id in graph.order().iter().filter(|id| candidates.contains(*id)) {
            transition(id, InstanceState::Pending);
        }

        let loader = Arc::new(IdlLoader::new(
            Arc::clone(&self.helper) as Arc<dyn PackageNameResolver>,
            self.helper.annotation_prefix(),
        ));
        let fingerprints = self.fingerprints(&graph, &loader, &candidates)?;

        // Loaded in full mode too: entries outside a selection must survive.
        let mut cache = BuildCache::load(&root);

        let mut report = BuildReport::default();
        let mut settled: BTreeSet<&InstanceId> = BTreeSet::new();
        let mut to_generate: BTreeSet<InstanceId> = BTreeSet::new();
        for resolved in graph.iter() {
            let id = resolved.id();
            let has_generator = self
                .registry
                .has_generator(resolved.instance.class(), &resolved.instance.type_name);
            if !has_generator {
                settled.insert(id);
                if candidates.contains(id) {
                    warn!(instance = %id, type_name = %resolved.instance.type_name, "no generator registered, skipping");
                    report.skipped_no_generator.push(id.clone());
                }
                continue;
            }
            let hot = match (cache.get(id), fingerprints.get(id)) {
                _ if options.full => false,
                (Some(entry), Some(fingerprint)) => {
                    entry.fingerprint == *fingerprint
                        && entry.outputs_exist(&root)
                        && resolved.closure.iter().all(|dep| settled.contains(dep))
                }
                _ => false,
            };
            if hot {
                settled.insert(id);
            }
            if !candidates.contains(id) {
                continue;
            }
            if hot && !forced.contains(id) {
                debug!(instance = %id, "hot, skipping");
                report.skipped_hot.push(id.clone());
            } else {
                debug!(instance = %id, cached = cache.get(id).is_some(), "cold");
                to_generate.insert(id.clone());
            }
        }

        let generated = self.generate(&graph, &loader, &to_generate, options)?;
        report.generated = generated.iter().map(|g| g.id.clone()).collect();

        let vanished: Vec<InstanceId> = cache.ids().filter(|id| !graph.contains(id)).cloned().collect();
        let mut stale: Vec<(InstanceId, CacheEntry)> = Vec::new();
        for id in vanished {
            if let Some(entry) = cache.remove(&id) {
                report.removed.push(id.clone());
                stale.push((id, entry));
            }
        }
        for id in &report.skipped_no_generator {
            if let Some(entry) = cache.remove(id) {
                stale.push((id.clone(), entry));
            }
        }

        if !generated.is_empty() {
            let state_dir = root.join(cache::STATE_DIR);
            fs::create_dir_all(&state_dir)
                .with_context(|| format!("creating {}", state_dir.display()))?;
            let staging = tempfile::Builder::new()
                .prefix("staging-")
                .tempdir_in(&state_dir)
                .with_context(|| format!("creating a staging directory in {}", state_dir.display()))?;

            let staged = self.stage(staging.path(), generated, options)?;
            swap_in(&root, staging.path(), &staged)?;
            for item in staged {
                report.files_written += item.outputs.len();
                let fingerprint = fingerprints
                    .get(&item.id)
                    .copied()
                    .ok_or_else(|| anyhow::anyhow!("no fingerprint for {}", item.id))?;
                transition(&item.id, InstanceState::Done);
                cache.insert(
                    item.id,
                    CacheEntry {
                        fingerprint,
                        dir: item.dir,
                        outputs: item.outputs,
                    },
                );
            }
        }

        let live: Vec<PathBuf> = cache
            .ids()
            .filter_map(|id| cache.get(id))
            .map(|entry| entry.dir.clone())
            .collect();
        for (id, entry) in stale {
            info!(instance = %id, dir = %entry.dir.display(), "removing stale outputs");
            prune_outputs(&root, &entry, &live);
        }

        cache.save()?;
        report.invocations = self.registry.invocations() - invocations_before;
        Ok(report)
    }

    /// Fingerprint every instance that a candidate can observe: the
    /// candidates and their transitive dependencies.
    fn fingerprints(
        &self,
        graph: &ResolvedGraph,
        loader: &IdlLoader,
        candidates: &BTreeSet<InstanceId>,
    ) -> anyhow::Result<BTreeMap<InstanceId, Fingerprint>> {
        let needed: BTreeSet<&InstanceId> = candidates
            .iter()
            .flat_map(|id| std::iter::once(id).chain(graph.closure(id)))
            .collect();
        let settings = settings_fingerprint(&self.helper)?;
        let mut fingerprints = BTreeMap::new();
        for resolved in graph.iter().filter(|r| needed.contains(r.id())) {
            transition(resolved.id(), InstanceState::Resolving);
            let fingerprint = instance_fingerprint(resolved, &fingerprints, loader, &settings)
                .with_context(|| format!("fingerprinting {}", resolved.id()))?;
            fingerprints.insert(resolved.id().clone(), fingerprint);
        }
        Ok(fingerprints)
    }

    fn parallelism(&self, options: &BuildOptions) -> usize {
        options
            .parallelism
            .unwrap_or_else(|| cpu_count() * self.helper.config().parallelize_factor.max(1))
            .max(1)
    }

    /// Run generators wave by wave; an instance starts only after every
    /// instance it depends on has been generated.
    fn generate(
        &self,
        graph: &Arc<ResolvedGraph>,
        loader: &Arc<IdlLoader>,
        to_generate: &BTreeSet<InstanceId>,
        options: &BuildOptions,
    ) -> anyhow::Result<Vec<Generated>> {
        let parallelism = self.parallelism(options);
        let mut generated = Vec::with_capacity(to_generate.len());
        for (level, wave) in graph.levels().into_iter().enumerate() {
            let wave: Vec<InstanceId> = wave
                .into_iter()
                .filter(|id| to_generate.contains(id))
                .collect();
            if wave.is_empty() {
                continue;
            }
            debug!(level, instances = wave.len(), parallelism, "starting wave");
            let mut runner = Runner::bounded(parallelism * 2, parallelism)?;
            for id in wave {
                let helper = Arc::clone(&self.helper);
                let loader = Arc::clone(loader);
                let graph = Arc::clone(graph);
                let registry = Arc::clone(&self.registry);
                runner.submit(move || {
                    let resolved = graph
                        .get(&id)
                        .ok_or_else(|| anyhow::anyhow!("{id} is not in the resolved graph"))?;
                    transition(&id, InstanceState::Generating);
                    let ctx = GenerationContext {
                        helper: &helper,
                        idl: &loader,
                        graph: &graph,
                    };
                    match registry.generate(resolved, &ctx) {
                        Ok(files) => Ok(Generated {
                            dir: resolved.instance.relative_dir.clone(),
                            files: files.unwrap_or_default(),
                            id,
                        }),
                        Err(err) => {
                            transition(&id, InstanceState::Failed);
                            Err(err)
                        }
                    }
                })?;
            }
            generated.extend(runner.collect()?);
        }
        let positions: BTreeMap<&InstanceId, usize> = graph
            .order()
            .iter()
            .enumerate()
            .map(|(i, id)| (id, i))
            .collect();
        generated.sort_by_key(|g| positions.get(&g.id).copied().unwrap_or(usize::MAX));
        Ok(generated)
    }

    /// Write every instance's files under `staging`, prefixed with the
    /// copyright header, and format them.
    fn stage(
        &self,
        staging: &Path,
        generated: Vec<Generated>,
        options: &BuildOptions,
    ) -> anyhow::Result<Vec<Staged>> {
        let header: Arc<Vec<u8>> = Arc::new(header_prefix(self.helper.copyright_header()));
        let formatter = options.format.then(|| Arc::clone(&self.formatter));
        let mut runner = Runner::fixed_bounded(generated.len().max(1), true)?;
        for item in generated {
            let header = Arc::clone(&header);
            let formatter = formatter.clone();
            let staged_dir = staging.join(&item.dir);
            runner.submit(move || {
                transition(&item.id, InstanceState::Writing);
                fs::create_dir_all(&staged_dir)
                    .with_context(|| format!("creating {}", staged_dir.display()))?;
                let mut written = Vec::with_capacity(item.files.len());
                let mut outputs = Vec::with_capacity(item.files.len());
                for (path, contents) in item.files.iter() {
                    let mut bytes = Vec::with_capacity(header.len() + contents.len());
                    bytes.extend_from_slice(&header);
                    bytes.extend_from_slice(contents);
                    written.push(write_file(&staged_dir, path, &bytes)?);
                    outputs.push(item.dir.join(path));
                }
                if let Some(formatter) = formatter {
                    transition(&item.id, InstanceState::Formatting);
                    formatter
                        .format_files(&written)
                        .with_context(|| format!("formatting {}", item.id))?;
                }
                Ok(Staged {
                    id: item.id,
                    dir: item.dir,
                    outputs,
                })
            })?;
        }
        let mut staged = runner.collect()?;
        staged.sort_by(|a, b| a.dir.cmp(&b.dir));
        Ok(staged)
    }
}

/// Fingerprint of one instance. Dependencies must already be in `known`.
fn instance_fingerprint(
    resolved: &ResolvedInstance,
    known: &BTreeMap<InstanceId, Fingerprint>,
    loader: &IdlLoader,
    settings: &Fingerprint,
) -> anyhow::Result<Fingerprint> {
    let instance = &resolved.instance;
    let raw: Value = serde_json::from_slice(&instance.raw_config)
        .with_context(|| format!("re-reading the config of {}", resolved.id()))?;
    let mut builder = FingerprintBuilder::default()
        .field("generator", GENERATOR_VERSION.as_bytes())
        .field("class", instance.class().as_bytes())
        .field("type", instance.type_name.as_bytes())
        .field("dir", slash_path(&instance.relative_dir).as_bytes())
        .field("config", &canonical_json(&raw));
    for dep in &resolved.closure {
        let fingerprint = known
            .get(dep)
            .ok_or_else(|| anyhow::anyhow!("{dep} was not fingerprinted before {}", resolved.id()))?;
        builder = builder.fingerprint(&dep.to_string(), fingerprint);
    }
    if let Some(idl) = &instance.idl_file {
        builder = builder.fingerprint("idl", &loader.closure_digest(idl)?);
    }
    Ok(builder.fingerprint("settings", settings).finish())
}

/// The copyright header as written at the top of every file.
fn header_prefix(header: &[u8]) -> Vec<u8> {
    let mut prefix = header.to_vec();
    if !prefix.is_empty() && !prefix.ends_with(b"\n") {
        prefix.push(b'\n');
    }
    prefix
}

/// Replace each instance's output directory with its staged copy. The old
/// directory is moved aside inside `staging` and dropped with it.
fn swap_in(root: &Path, staging: &Path, staged: &[Staged]) -> anyhow::Result<()> {
    let trash = staging.join(".replaced");
    fs::create_dir_all(&trash).with_context(|| format!("creating {}", trash.display()))?;
    for (index, item) in staged.iter().enumerate() {
        let source = staging.join(&item.dir);
        let target = root.join(&item.dir);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
        }
        if target.exists() {
            let aside = trash.join(index.to_string());
            fs::rename(&target, &aside)
                .with_context(|| format!("moving {} aside", target.display()))?;
        }
        fs::rename(&source, &target)
            .with_context(|| format!("moving {} into place", target.display()))?;
        debug!(instance = %item.id, dir = %target.display(), "swapped");
    }
    Ok(())
}

/// Delete the recorded outputs of an instance and any directories left
/// empty under its output directory. Paths that leave `root` are ignored, as
/// are paths under `live`, the output directories of current instances.
fn prune_outputs(root: &Path, entry: &CacheEntry, live: &[PathBuf]) {
    let root_label = root.display().to_string();
    let owned = |relative: &Path| live.iter().any(|dir| relative.starts_with(dir));
    for output in &entry.outputs {
        match normalize_relative(output, &root_label) {
            Ok(relative) if owned(&relative) => {
                debug!(path = %relative.display(), "kept, owned by a current instance");
            }
            Ok(relative) if !relative.as_os_str().is_empty() => {
                let path = root.join(relative);
                if path.is_file() {
                    if let Err(err) = fs::remove_file(&path) {
                        warn!(path = %path.display(), error = %err, "could not remove stale output");
                    }
                }
            }
            Ok(_) => {}
            Err(err) => warn!(error = %err, "ignoring cached output path"),
        }
    }
    let dir = match normalize_relative(&entry.dir, &root_label) {
        Ok(dir) if owned(&dir) => return,
        Ok(dir) if !dir.as_os_str().is_empty() => root.join(dir),
        Ok(_) => return,
        Err(err) => {
            warn!(error = %err, "ignoring cached output directory");
            return;
        }
    };
    if !dir.is_dir() {
        return;
    }
    for entry in WalkDir::new(&dir).contents_first(true).into_iter().flatten() {
        if entry.file_type().is_dir() {
            // Fails, and is skipped, while the directory still holds files.
            fs::remove_dir(entry.path()).ok();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_prefix_ends_with_newline() {
        assert_eq!(header_prefix(b""), b"".to_vec());
        assert_eq!(header_prefix(b"// (c) Acme"), b"// (c) Acme\n".to_vec());
        assert_eq!(header_prefix(b"// (c) Acme\n"), b"// (c) Acme\n".to_vec());
    }

    #[test]
    fn test_default_options_format() {
        let options = BuildOptions::default();
        assert!(options.format);
        assert!(!options.full);
        assert!(options.selective.is_empty());
    }

    #[test]
    fn test_prune_removes_outputs_and_empty_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("clients/echo/module")).unwrap();
        fs::write(root.join("clients/echo/echo.go"), b"package echo\n").unwrap();
        fs::write(root.join("clients/echo/module/dependencies.go"), b"package module\n").unwrap();
        fs::write(root.join("clients/echo/notes.txt"), b"hand written\n").unwrap();

        let entry = CacheEntry {
            fingerprint: Fingerprint::of(b"x"),
            dir: PathBuf::from("clients/echo"),
            outputs: vec![
                PathBuf::from("clients/echo/echo.go"),
                PathBuf::from("clients/echo/module/dependencies.go"),
                PathBuf::from("../outside.go"),
            ],
        };
        prune_outputs(root, &entry, &[]);

        assert!(!root.join("clients/echo/echo.go").exists());
        assert!(!root.join("clients/echo/module").exists());
        assert!(root.join("clients/echo/notes.txt").exists());
    }

    #[test]
    fn test_prune_keeps_directories_of_current_instances() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("clients/mirror/module")).unwrap();
        fs::write(root.join("clients/mirror/module/dependencies.go"), b"package module\n").unwrap();
        fs::create_dir_all(root.join("clients/gone")).unwrap();
        fs::write(root.join("clients/gone/gone.go"), b"package gone\n").unwrap();

        let entry = CacheEntry {
            fingerprint: Fingerprint::of(b"x"),
            dir: PathBuf::from("clients/mirror"),
            outputs: vec![
                PathBuf::from("clients/mirror/module/dependencies.go"),
                PathBuf::from("clients/gone/gone.go"),
            ],
        };
        prune_outputs(root, &entry, &[PathBuf::from("clients/mirror")]);

        assert!(root.join("clients/mirror/module/dependencies.go").is_file());
        assert!(!root.join("clients/gone/gone.go").exists());
    }

    #[test]
    fn test_swap_replaces_directory() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("gen");
        let staging = dir.path().join("staging");
        fs::create_dir_all(root.join("clients/echo")).unwrap();
        fs::write(root.join("clients/echo/stale.go"), b"old").unwrap();
        fs::create_dir_all(staging.join("clients/echo")).unwrap();
        fs::write(staging.join("clients/echo/echo.go"), b"new").unwrap();

        let staged = vec![Staged {
            id: InstanceId::new("client", "echo"),
            dir: PathBuf::from("clients/echo"),
            outputs: vec![PathBuf::from("clients/echo/echo.go")],
        }];
        swap_in(&root, &staging, &staged).unwrap();

        assert_eq!(fs::read(root.join("clients/echo/echo.go")).unwrap(), b"new");
        assert!(!root.join("clients/echo/stale.go").exists());
    }
}
