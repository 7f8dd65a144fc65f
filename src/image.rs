//! Input image path validation.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{ProvisionError, Result};

/// An existing image file, as an absolute path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePath(PathBuf);

impl ImagePath {
    /// Resolve `arg` against `cwd` and check it names a regular file.
    pub fn resolve(arg: &Path, cwd: &Path) -> Result<Self> {
        if arg.as_os_str().is_empty() {
            return Err(ProvisionError::usage("image path is empty"));
        }

        let path = if arg.is_absolute() {
            arg.to_path_buf()
        } else {
            cwd.join(arg)
        };

        if !path.is_file() {
            return Err(ProvisionError::usage(format!(
                "{} is not an existing image file",
                path.display()
            )));
        }

        Ok(Self(path))
    }

    /// Resolve `arg` against the process's current directory.
    pub fn resolve_from_current_dir(arg: &Path) -> Result<Self> {
        let cwd = std::env::current_dir()?;
        Self::resolve(arg, &cwd)
    }

    pub fn as_path(&self) -> &Path {
        &self.0
    }
}

impl fmt::Display for ImagePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_relative_path_resolved_against_cwd() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("raspbian.img"), b"img").expect("write");

        let image = ImagePath::resolve(Path::new("raspbian.img"), dir.path()).expect("resolve");
        assert_eq!(image.as_path(), dir.path().join("raspbian.img"));
        assert!(image.as_path().is_absolute());
    }

    #[test]
    fn test_absolute_path_kept() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = dir.path().join("raspbian.img");
        fs::write(&file, b"img").expect("write");

        let image = ImagePath::resolve(&file, Path::new("/nonexistent")).expect("resolve");
        assert_eq!(image.as_path(), file);
    }

    #[test]
    fn test_missing_file_is_usage_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = ImagePath::resolve(Path::new("missing.img"), dir.path()).unwrap_err();
        assert!(matches!(err, ProvisionError::Usage(_)));
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_directory_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = ImagePath::resolve(dir.path(), dir.path()).unwrap_err();
        assert!(matches!(err, ProvisionError::Usage(_)));
    }
}
