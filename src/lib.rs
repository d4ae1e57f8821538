//! # gatewaygen
//!
//! **gatewaygen** is a module-oriented code generator for an RPC gateway. It
//! reads a tree of instance configurations (clients, middlewares, adapters,
//! endpoints, services), the Thrift or protobuf IDL they reference, and emits a
//! self-contained tree of Go sources: client stubs, endpoint handlers and
//! workflows, per-module dependency wiring, mocks and a service entry point.
//!
//! ## Architecture
//!
//! - **[`config`]** - Layered configuration store and the typed build config
//! - **[`package`]** - Path and import-path derivation
//! - **[`idl`]** - Thrift/proto parsing with a memoized, include-aware cache
//! - **[`module`]** - Class registry, instance discovery and dependency resolution
//! - **[`generator`]** - `(class, type)` generator registry and the default generators
//! - **[`build`]** - Full, incremental and selective builds with atomic staging
//! - **[`scheduler`]** - Bounded worker pool with first-error cancellation
//! - **[`writer`]** - File writes and the extension-keyed formatter pipeline
//!
//! ### Build Flow
//!
//! ```mermaid
//! sequenceDiagram
//!     participant CLI as CLI<br/>(gatewaygen)
//!     participant Config as config::BuildConfig
//!     participant Reader as module::reader
//!     participant Resolver as module::resolver
//!     participant Builder as build::Builder
//!     participant Gen as generator::Registry
//!     participant FS as File System
//!
//!     CLI->>Config: load(--config)
//!     CLI->>Builder: build(options)
//!     Builder->>Reader: read_instances()
//!     Reader-->>Builder: Vec<Instance>
//!     Builder->>Resolver: resolve(instances)
//!     Resolver-->>Builder: ResolvedGraph (waves)
//!     loop every wave
//!         Builder->>Gen: generate(instance) on the scheduler
//!         Gen-->>Builder: FileSet
//!         Builder->>FS: stage, format, swap
//!     end
//!     Builder->>FS: cache.json
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use gatewaygen::build::{BuildOptions, Builder};
//! use gatewaygen::config::BuildConfig;
//! use std::path::Path;
//!
//! let config = BuildConfig::load(Path::new("build.yaml"))?;
//! let report = Builder::new(config)?.build(&BuildOptions::default())?;
//! println!("generated {} instances", report.generated.len());
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod build;
pub mod cli;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod generator;
pub mod idl;
pub mod logging;
pub mod module;
pub mod naming;
pub mod package;
pub mod scheduler;
pub mod writer;

pub use build::{BuildOptions, BuildReport, Builder};
pub use config::BuildConfig;
pub use error::{kind_of, ErrorKind, GenError};
