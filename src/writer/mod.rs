//! Writing generated files.
//!
//! [`write_file`] is the only place that creates files in the output tree.
//! Formatting runs afterwards through a [`FormatterPipeline`].

mod format;

pub use format::{FormatterCommand, FormatterPipeline, GOFMT_BIN_ENV, GOIMPORTS_BIN_ENV};

use crate::error::GenError;
use crate::package::normalize_relative;
use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

/// Permissions of every generated file.
#[cfg(unix)]
const FILE_MODE: u32 = 0o644;

/// Write `contents` to `root/relative`, creating parent directories.
///
/// `relative` is normalised first; absolute paths and paths that climb out of
/// `root` fail with `path-escape`. Returns the absolute path written.
pub fn write_file(root: &Path, relative: &Path, contents: &[u8]) -> Result<PathBuf, GenError> {
    let normalised = normalize_relative(relative, &root.display().to_string())?;
    if normalised.as_os_str().is_empty() {
        return Err(GenError::PathEscape {
            path: relative.to_path_buf(),
            root: root.display().to_string(),
        });
    }
    let target = root.join(&normalised);
    let io_failed = |e: io::Error| GenError::IoWriteFailed {
        path: target.clone(),
        message: e.to_string(),
    };

    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(io_failed)?;
    }

    let mut options = OpenOptions::new();
    options.create(true).truncate(true).write(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(FILE_MODE);
    }
    let mut file = options.open(&target).map_err(io_failed)?;
    let written = io::copy(&mut &contents[..], &mut file).map_err(io_failed)?;
    if written != contents.len() as u64 {
        return Err(GenError::IoWriteFailed {
            path: target,
            message: format!("wrote {written} of {} bytes", contents.len()),
        });
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&target, fs::Permissions::from_mode(FILE_MODE)).map_err(io_failed)?;
    }
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_creates_parents_and_truncates() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), Path::new("a/b/./c.go"), b"package c\n// long\n").unwrap();
        assert_eq!(path, dir.path().join("a/b/c.go"));
        write_file(dir.path(), Path::new("a/b/c.go"), b"package c\n").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"package c\n");
    }

    #[cfg(unix)]
    #[test]
    fn test_file_mode() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), Path::new("x.go"), b"").unwrap();
        let mode = fs::metadata(path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o644);
    }

    #[test]
    fn test_rejects_escapes() {
        let dir = tempfile::tempdir().unwrap();
        for bad in ["../x.go", "a/../../x.go", "/etc/passwd", "", "."] {
            let err = write_file(dir.path(), Path::new(bad), b"x").unwrap_err();
            assert_eq!(err.kind(), ErrorKind::PathEscape, "{bad}");
        }
        assert!(write_file(dir.path(), Path::new("a/../x.go"), b"x").is_ok());
    }

    #[test]
    fn test_io_failure_reported() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("blocker"), b"file").unwrap();
        let err = write_file(dir.path(), Path::new("blocker/x.go"), b"x").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IoWriteFailed);
    }
}
