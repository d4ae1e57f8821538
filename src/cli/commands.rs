use crate::build::{BuildOptions, BuildReport, Builder};
use crate::config::BuildConfig;
use crate::logging::{init_logging, LogConfig, LogFormat};
use crate::module::InstanceId;
use crate::writer::FormatterPipeline;
use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;

/// Command-line interface for gatewaygen
///
/// Reads a build configuration, discovers module instances and renders
/// their Go sources into the configured `targetGenDir`.
#[derive(Debug, Parser)]
#[command(name = "gatewaygen", version)]
#[command(about = "Module-oriented Go code generator for RPC gateways", long_about = None)]
pub struct Cli {
    /// Path to the build configuration file (YAML, JSON or TOML)
    #[arg(short, long)]
    pub config: PathBuf,

    /// Restrict the build to these instances and their dependents
    /// (`class/name`, comma-separated or repeated)
    #[arg(long, num_args = 1.., value_delimiter = ',')]
    pub selective: Vec<InstanceId>,

    /// Restrict the build to one instance; needs `--type`
    #[arg(long, requires = "type_name")]
    pub instance: Option<String>,

    /// Class of the `--instance`
    #[arg(long = "type", requires = "instance")]
    pub type_name: Option<String>,

    /// Ignore the incremental cache and regenerate every candidate
    #[arg(long, default_value_t = false)]
    pub full: bool,

    /// Do not run gofmt/goimports over generated files
    #[arg(long, default_value_t = false)]
    pub no_format: bool,

    /// Number of generator workers (default: CPUs x parallelizeFactor)
    #[arg(long)]
    pub parallelism: Option<usize>,

    /// Log level when RUST_LOG is unset
    #[arg(long, env = "GATEWAYGEN_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Log format: pretty, compact or json
    #[arg(long, env = "GATEWAYGEN_LOG_FORMAT")]
    pub log_format: Option<String>,
}

impl Cli {
    /// Build options selected by the flags.
    pub fn build_options(&self) -> BuildOptions {
        let mut selective = self.selective.clone();
        if let (Some(name), Some(class)) = (&self.instance, &self.type_name) {
            selective.push(InstanceId::new(class, name));
        }
        selective.sort();
        selective.dedup();
        BuildOptions {
            full: self.full,
            selective,
            format: !self.no_format,
            parallelism: self.parallelism,
        }
    }

    fn log_config(&self) -> LogConfig {
        let mut config = LogConfig::from_env();
        if let Some(level) = &self.log_level {
            config.log_level = level.clone();
        }
        if let Some(format) = &self.log_format {
            config.format = LogFormat::parse(format);
        }
        config
    }
}

/// Run one build for parsed arguments.
pub fn run(cli: &Cli) -> anyhow::Result<BuildReport> {
    let config = BuildConfig::load(&cli.config)
        .with_context(|| format!("Failed to load build config {}", cli.config.display()))?;
    let options = cli.build_options();
    let mut builder = Builder::new(config)?;
    if !options.format {
        builder = builder.with_formatter(FormatterPipeline::empty());
    }
    builder.build(&options)
}

/// Parse the process arguments, set up logging and run the build.
///
/// # Errors
///
/// Returns an error if:
/// - The build configuration cannot be loaded
/// - Instances are invalid or their dependencies do not resolve
/// - A generator, a file write or a formatter fails
pub fn run_cli() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _guard = init_logging(&cli.log_config())?;
    let report = run(&cli)?;
    println!(
        "gatewaygen: {} generated, {} unchanged, {} without generator, {} removed, {} files written",
        report.generated.len(),
        report.skipped_hot.len(),
        report.skipped_no_generator.len(),
        report.removed.len(),
        report.files_written,
    );
    Ok(())
}
