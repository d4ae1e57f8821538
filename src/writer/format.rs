use crate::error::GenError;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::debug;

/// Overrides the `gofmt` binary, mainly for tests
pub const GOFMT_BIN_ENV: &str = "GATEWAYGEN_GOFMT_BIN";
/// Overrides the `goimports` binary, mainly for tests
pub const GOIMPORTS_BIN_ENV: &str = "GATEWAYGEN_GOIMPORTS_BIN";

/// Files handed to one formatter process at a time.
const BATCH: usize = 64;

/// One formatter invocation; file paths are appended to `args`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatterCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl FormatterCommand {
    pub fn new(program: impl Into<String>, args: &[&str]) -> Self {
        Self {
            program: program.into(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }

    fn describe(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn run(&self, files: &[&Path]) -> Result<(), GenError> {
        let first = files.first().map(|p| p.to_path_buf()).unwrap_or_default();
        let failed = |message: String| GenError::FormatterFailed {
            command: self.describe(),
            path: first.clone(),
            message,
        };
        let output = Command::new(&self.program)
            .args(&self.args)
            .args(files)
            .output()
            .map_err(|e| failed(format!("cannot start: {e}")))?;
        if !output.status.success() {
            return Err(failed(format!(
                "{}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }
}

/// Post-write formatters keyed by file extension, run in registration order.
#[derive(Debug, Clone, Default)]
pub struct FormatterPipeline {
    by_extension: BTreeMap<String, Vec<FormatterCommand>>,
}

impl FormatterPipeline {
    /// A pipeline that formats nothing.
    pub fn empty() -> Self {
        Self::default()
    }

    /// `gofmt -s -w` then `goimports -w` for `.go` files.
    pub fn go_default() -> Self {
        Self::go_with_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn go_with_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let gofmt = lookup(GOFMT_BIN_ENV).unwrap_or_else(|| "gofmt".to_string());
        let goimports = lookup(GOIMPORTS_BIN_ENV).unwrap_or_else(|| "goimports".to_string());
        Self::empty()
            .with_formatter("go", FormatterCommand::new(gofmt, &["-s", "-w"]))
            .with_formatter("go", FormatterCommand::new(goimports, &["-w"]))
    }

    pub fn with_formatter(mut self, extension: &str, command: FormatterCommand) -> Self {
        self.by_extension
            .entry(extension.trim_start_matches('.').to_string())
            .or_default()
            .push(command);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.by_extension.is_empty()
    }

    pub fn commands_for(&self, extension: &str) -> &[FormatterCommand] {
        self.by_extension
            .get(extension)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Format `files`, grouped by extension. Files without a formatter are left alone.
    pub fn format_files(&self, files: &[PathBuf]) -> Result<(), GenError> {
        let mut grouped: BTreeMap<&str, Vec<&Path>> = BTreeMap::new();
        for file in files {
            if let Some(ext) = file.extension().and_then(|e| e.to_str()) {
                if self.by_extension.contains_key(ext) {
                    grouped.entry(ext).or_default().push(file);
                }
            }
        }
        for (ext, paths) in grouped {
            for command in self.commands_for(ext) {
                for chunk in paths.chunks(BATCH) {
                    debug!(command = %command.program, files = chunk.len(), "formatting");
                    command.run(chunk)?;
                }
            }
        }
        Ok(())
    }

    pub fn format_file(&self, file: &Path) -> Result<(), GenError> {
        self.format_files(&[file.to_path_buf()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;

    fn stub(dir: &Path, name: &str, script: &str) -> String {
        let path = dir.join(name);
        fs::write(&path, format!("#!/bin/sh\n{script}\n")).unwrap();
        let mut perms = fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&path, perms).unwrap();
        path.display().to_string()
    }

    #[test]
    fn test_runs_commands_in_order_per_extension() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("log");
        let first = stub(
            dir.path(),
            "first",
            &format!("echo \"first $*\" >> {}", log.display()),
        );
        let second = stub(
            dir.path(),
            "second",
            &format!("echo \"second $*\" >> {}", log.display()),
        );
        let pipeline = FormatterPipeline::empty()
            .with_formatter(".go", FormatterCommand::new(first, &["-w"]))
            .with_formatter("go", FormatterCommand::new(second, &[]));

        let go = dir.path().join("a.go");
        let txt = dir.path().join("b.txt");
        fs::write(&go, "package a\n").unwrap();
        fs::write(&txt, "x").unwrap();
        pipeline.format_files(&[go.clone(), txt]).unwrap();

        let log = fs::read_to_string(log).unwrap();
        assert_eq!(
            log,
            format!("first -w {}\nsecond {}\n", go.display(), go.display())
        );
    }

    #[test]
    fn test_non_zero_exit_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let failing = stub(dir.path(), "gofmt", "echo 'syntax error' >&2\nexit 2");
        let pipeline = FormatterPipeline::go_with_lookup(|key| {
            (key == GOFMT_BIN_ENV).then(|| failing.clone())
        });
        let file = dir.path().join("bad.go");
        fs::write(&file, "package").unwrap();
        let err = pipeline.format_file(&file).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FormatterFailed);
        assert!(err.to_string().contains("syntax error"), "{err}");
    }

    #[test]
    fn test_missing_binary_is_fatal() {
        let pipeline = FormatterPipeline::empty().with_formatter(
            "go",
            FormatterCommand::new("/nonexistent/gatewaygen-gofmt", &[]),
        );
        let err = pipeline.format_file(Path::new("x.go")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FormatterFailed);
    }

    #[test]
    fn test_go_default_commands() {
        let pipeline = FormatterPipeline::go_with_lookup(|_| None);
        let commands = pipeline.commands_for("go");
        assert_eq!(commands[0], FormatterCommand::new("gofmt", &["-s", "-w"]));
        assert_eq!(commands[1], FormatterCommand::new("goimports", &["-w"]));
        assert!(pipeline.commands_for("rs").is_empty());
        assert!(FormatterPipeline::empty().is_empty());
    }
}
