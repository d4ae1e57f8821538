//! Error kinds raised by the generator engine.
//!
//! Errors travel through the crate as [`anyhow::Error`] so every layer can add
//! `(class, instance)` context with `.context(...)`. The root cause is usually a
//! [`GenError`], whose [`ErrorKind`] can be recovered from any point in the chain
//! with [`kind_of`].

use std::fmt;
use std::path::PathBuf;

/// Taxonomy of failures. Kinds are stable identifiers used in logs and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    ConfigMissingKey,
    ConfigTypeMismatch,
    InstanceInvalid,
    UnknownClass,
    UnknownType,
    UnknownDependency,
    UnknownInstance,
    CycleDetected,
    IdlParseError,
    IdlIncludeNotFound,
    IdlAnnotationConflict,
    GeneratorFailed,
    PathEscape,
    IoWriteFailed,
    FormatterFailed,
    CacheCorrupt,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::ConfigMissingKey => "config-missing-key",
            ErrorKind::ConfigTypeMismatch => "config-type-mismatch",
            ErrorKind::InstanceInvalid => "instance-invalid",
            ErrorKind::UnknownClass => "unknown-class",
            ErrorKind::UnknownType => "unknown-type",
            ErrorKind::UnknownDependency => "unknown-dependency",
            ErrorKind::UnknownInstance => "unknown-instance",
            ErrorKind::CycleDetected => "cycle-detected",
            ErrorKind::IdlParseError => "idl-parse-error",
            ErrorKind::IdlIncludeNotFound => "idl-include-not-found",
            ErrorKind::IdlAnnotationConflict => "idl-annotation-conflict",
            ErrorKind::GeneratorFailed => "generator-failed",
            ErrorKind::PathEscape => "path-escape",
            ErrorKind::IoWriteFailed => "io-write-failed",
            ErrorKind::FormatterFailed => "formatter-failed",
            ErrorKind::CacheCorrupt => "cache-corrupt",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Concrete error values carrying enough detail to be actionable on their own.
#[derive(Debug, thiserror::Error)]
pub enum GenError {
    #[error("config-missing-key: required key `{key}` is not set")]
    ConfigMissingKey { key: String },

    #[error("config-type-mismatch: key `{key}` expected {expected}, found {found}")]
    ConfigTypeMismatch {
        key: String,
        expected: &'static str,
        found: String,
    },

    #[error("instance-invalid: {path}: {reason}")]
    InstanceInvalid { path: PathBuf, reason: String },

    #[error("unknown-class: `{class}`")]
    UnknownClass { class: String },

    #[error("unknown-type: class `{class}` has no type `{type_name}`")]
    UnknownType { class: String, type_name: String },

    #[error("unknown-dependency: {from} depends on {class}/{instance} which does not exist")]
    UnknownDependency {
        from: String,
        class: String,
        instance: String,
    },

    #[error("unknown-instance: {class}/{instance} was requested but is not configured")]
    UnknownInstance { class: String, instance: String },

    #[error("cycle-detected: {}", render_cycle(.cycle, .cross_class))]
    CycleDetected { cycle: Vec<String>, cross_class: bool },

    #[error("idl-parse-error: {path}:{line}: {message}")]
    IdlParse {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("idl-include-not-found: {missing} (included from {from})")]
    IdlIncludeNotFound { missing: PathBuf, from: PathBuf },

    #[error("idl-annotation-conflict: {path}: {message}")]
    IdlAnnotationConflict { path: PathBuf, message: String },

    #[error("generator-failed: {class}/{type_name}: {message}")]
    GeneratorFailed {
        class: String,
        type_name: String,
        message: String,
    },

    #[error("path-escape: `{path}` leaves {root}")]
    PathEscape { path: PathBuf, root: String },

    #[error("io-write-failed: {path}: {message}")]
    IoWriteFailed { path: PathBuf, message: String },

    #[error("formatter-failed: `{command}` on {path}: {message}")]
    FormatterFailed {
        command: String,
        path: PathBuf,
        message: String,
    },

    #[error("cache-corrupt: {path}: {message}")]
    CacheCorrupt { path: PathBuf, message: String },
}

impl GenError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GenError::ConfigMissingKey { .. } => ErrorKind::ConfigMissingKey,
            GenError::ConfigTypeMismatch { .. } => ErrorKind::ConfigTypeMismatch,
            GenError::InstanceInvalid { .. } => ErrorKind::InstanceInvalid,
            GenError::UnknownClass { .. } => ErrorKind::UnknownClass,
            GenError::UnknownType { .. } => ErrorKind::UnknownType,
            GenError::UnknownDependency { .. } => ErrorKind::UnknownDependency,
            GenError::UnknownInstance { .. } => ErrorKind::UnknownInstance,
            GenError::CycleDetected { .. } => ErrorKind::CycleDetected,
            GenError::IdlParse { .. } => ErrorKind::IdlParseError,
            GenError::IdlIncludeNotFound { .. } => ErrorKind::IdlIncludeNotFound,
            GenError::IdlAnnotationConflict { .. } => ErrorKind::IdlAnnotationConflict,
            GenError::GeneratorFailed { .. } => ErrorKind::GeneratorFailed,
            GenError::PathEscape { .. } => ErrorKind::PathEscape,
            GenError::IoWriteFailed { .. } => ErrorKind::IoWriteFailed,
            GenError::FormatterFailed { .. } => ErrorKind::FormatterFailed,
            GenError::CacheCorrupt { .. } => ErrorKind::CacheCorrupt,
        }
    }

    pub(crate) fn invalid(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        GenError::InstanceInvalid {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

fn render_cycle(cycle: &[String], cross_class: &bool) -> String {
    let path = cycle.join(" -> ");
    if *cross_class {
        format!("{path} (cross-class)")
    } else {
        path
    }
}

/// Find the first [`GenError`] in an error chain and return its kind.
pub fn kind_of(err: &anyhow::Error) -> Option<ErrorKind> {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<GenError>())
        .map(GenError::kind)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_kind_survives_context() {
        let err = anyhow::Error::new(GenError::UnknownClass {
            class: "gadget".into(),
        })
        .context("while reading client/echo");
        assert_eq!(kind_of(&err), Some(ErrorKind::UnknownClass));
    }

    #[test]
    fn test_kind_of_foreign_error() {
        let err: anyhow::Result<()> = Err(std::io::Error::other("boom")).context("outer");
        assert_eq!(kind_of(&err.unwrap_err()), None);
    }

    #[test]
    fn test_cycle_message() {
        let err = GenError::CycleDetected {
            cycle: vec!["client/a".into(), "client/b".into(), "client/a".into()],
            cross_class: false,
        };
        assert_eq!(
            err.to_string(),
            "cycle-detected: client/a -> client/b -> client/a"
        );
        let cross = GenError::CycleDetected {
            cycle: vec!["client/a".into(), "endpoint/b".into(), "client/a".into()],
            cross_class: true,
        };
        assert!(cross.to_string().ends_with("(cross-class)"));
    }
}
