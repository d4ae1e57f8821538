//! # Module System
//!
//! Classes, instances and the dependency graph between them.
//!
//! A [`ModuleClass`] is a named kind of module (`client`, `endpoint`, ...)
//! with the directories its instances live in. The [`reader`] walks those
//! directories and produces one [`Instance`] per `<class>-config.json`; the
//! [`resolver`] orders instances so that every dependency is generated before
//! its dependents.
//!
//! ```text
//! ModuleSystem ──read_instances──▶ Vec<Instance> ──ResolvedGraph::resolve──▶ ResolvedGraph
//! ```

mod class;
mod instance;
pub mod reader;
pub mod resolver;
mod system;

pub use class::{Cardinality, ModuleClass};
pub use instance::{Instance, InstanceConfig, InstanceId, PackageInfo};
pub use reader::read_instances;
pub use resolver::{ResolvedGraph, ResolvedInstance};
pub use system::ModuleSystem;
