//! File operations inside the mounted image.
//!
//! Paths are given as they appear inside the image (`/etc/hostapd/hostapd.conf`)
//! and are joined onto the mount point. In dry-run mode writes are logged
//! and skipped.

use regex::{NoExpand, Regex};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{ProvisionError, Result};

/// The mounted image root.
#[derive(Debug, Clone)]
pub struct TargetRoot {
    root: PathBuf,
    dry_run: bool,
}

impl TargetRoot {
    pub fn new(root: &Path, dry_run: bool) -> Self {
        Self {
            root: root.to_path_buf(),
            dry_run,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Host path of an image path.
    pub fn path(&self, image_path: impl AsRef<Path>) -> PathBuf {
        let image_path = image_path.as_ref();
        self.root
            .join(image_path.strip_prefix("/").unwrap_or(image_path))
    }

    /// Write `contents` to `image_path`, creating parent directories.
    pub fn write_file(&self, image_path: &str, contents: &str, mode: Option<u32>) -> Result<PathBuf> {
        let target = self.path(image_path);
        if self.dry_run {
            info!("[DRY RUN] write {} ({} bytes)", target.display(), contents.len());
            return Ok(target);
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&target, contents)?;
        if let Some(mode) = mode {
            fs::set_permissions(&target, fs::Permissions::from_mode(mode))?;
        }
        debug!("Wrote {} ({} bytes)", target.display(), contents.len());
        Ok(target)
    }

    /// Rewrite a file through `edit`. A missing file is edited as empty.
    pub fn edit_file<F>(&self, image_path: &str, edit: F) -> Result<PathBuf>
    where
        F: FnOnce(&str) -> Result<String>,
    {
        let target = self.path(image_path);
        if self.dry_run {
            info!("[DRY RUN] edit {}", target.display());
            return Ok(target);
        }

        let current = match fs::read_to_string(&target) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(e.into()),
        };
        let updated = edit(&current)?;
        if updated != current {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&target, updated)?;
            debug!("Patched {}", target.display());
        }
        Ok(target)
    }
}

fn assignment_regex(key: &str) -> Result<Regex> {
    Regex::new(&format!(r"(?m)^[ \t]*#?[ \t]*{}=.*$", regex::escape(key)))
        .map_err(|e| ProvisionError::validation(format!("bad assignment key {:?}: {}", key, e)))
}

/// Replace every (possibly commented) `KEY=...` line with `KEY="value"`.
///
/// Returns the new content and whether any line matched.
pub fn replace_assignment(content: &str, key: &str, value: &str) -> Result<(String, bool)> {
    let re = assignment_regex(key)?;
    let line = format!("{}=\"{}\"", key, value);
    let matched = re.is_match(content);
    Ok((re.replace_all(content, NoExpand(&line)).into_owned(), matched))
}

/// Like [`replace_assignment`], appending the assignment when no line matched.
pub fn set_assignment(content: &str, key: &str, value: &str) -> Result<String> {
    let (updated, matched) = replace_assignment(content, key, value)?;
    if matched {
        Ok(updated)
    } else {
        Ok(append_line(&updated, &format!("{}=\"{}\"", key, value)))
    }
}

/// Append `line` unless an identical uncommented line is already present.
pub fn ensure_line(content: &str, line: &str) -> String {
    let wanted = normalize_setting(line);
    if content.lines().any(|existing| normalize_setting(existing) == wanted) {
        content.to_string()
    } else {
        append_line(content, line)
    }
}

fn append_line(content: &str, line: &str) -> String {
    let mut out = content.to_string();
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
    out.push_str(line);
    out.push('\n');
    out
}

// sysctl accepts spaces around '='
fn normalize_setting(line: &str) -> String {
    line.chars().filter(|c| !c.is_whitespace()).collect()
}
