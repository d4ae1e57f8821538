//! # CLI Module
//!
//! Command line front end of the generator, exposed as the `gatewaygen`
//! binary.
//!
//! ## Usage
//!
//! ```bash
//! # Incremental build of everything
//! gatewaygen --config build.yaml
//!
//! # Regenerate everything, ignoring the cache
//! gatewaygen --config build.yaml --full
//!
//! # Rebuild two instances and whatever depends on them
//! gatewaygen --config build.yaml --selective client/echo,client/mirror
//!
//! # Rebuild one instance
//! gatewaygen --config build.yaml --instance echo --type client
//! ```
//!
//! Options:
//! - `--config <FILE>` - Build configuration (YAML, JSON or TOML), required
//! - `--selective <CLASS/NAME,...>` - Restrict the build; repeatable
//! - `--instance <NAME>` with `--type <CLASS>` - Restrict the build to one instance
//! - `--full` - Ignore the incremental cache
//! - `--no-format` - Skip `gofmt`/`goimports`
//! - `--parallelism <N>` - Generator worker count
//! - `--log-level <LEVEL>`, `--log-format <pretty|compact|json>`
//!
//! The process exits with `0` on success and `1` on any error, printing the
//! full error chain.

mod commands;

#[cfg(test)]
mod tests;

pub use commands::{run, run_cli, Cli};
