//! Unit tests for CLI argument handling

use crate::cli::Cli;
use crate::module::InstanceId;
use clap::Parser;

#[test]
fn test_config_is_required() {
    assert!(Cli::try_parse_from(["gatewaygen"]).is_err());
    let cli = Cli::try_parse_from(["gatewaygen", "--config", "build.yaml"]).unwrap();
    assert_eq!(cli.config.to_string_lossy(), "build.yaml");
    let options = cli.build_options();
    assert!(options.selective.is_empty());
    assert!(options.format);
    assert!(!options.full);
}

#[test]
fn test_selective_comma_separated_and_repeated() {
    let cli = Cli::try_parse_from([
        "gatewaygen",
        "--config",
        "build.yaml",
        "--selective",
        "client/echo,client/mirror",
        "--selective",
        "endpoint/bounce",
    ])
    .unwrap();
    assert_eq!(
        cli.build_options().selective,
        vec![
            InstanceId::new("client", "echo"),
            InstanceId::new("client", "mirror"),
            InstanceId::new("endpoint", "bounce"),
        ]
    );
}

#[test]
fn test_selective_rejects_malformed_ids() {
    let result = Cli::try_parse_from(["gatewaygen", "--config", "b.yaml", "--selective", "echo"]);
    assert!(result.is_err());
}

#[test]
fn test_instance_requires_type() {
    assert!(Cli::try_parse_from(["gatewaygen", "--config", "b.yaml", "--instance", "echo"]).is_err());

    let cli = Cli::try_parse_from([
        "gatewaygen",
        "--config",
        "b.yaml",
        "--instance",
        "echo",
        "--type",
        "client",
        "--selective",
        "client/echo",
    ])
    .unwrap();
    assert_eq!(cli.build_options().selective, vec![InstanceId::new("client", "echo")]);
}

#[test]
fn test_build_flags() {
    let cli = Cli::try_parse_from([
        "gatewaygen",
        "--config",
        "b.yaml",
        "--full",
        "--no-format",
        "--parallelism",
        "3",
    ])
    .unwrap();
    let options = cli.build_options();
    assert!(options.full);
    assert!(!options.format);
    assert_eq!(options.parallelism, Some(3));
}
