//! Path resolution and directory preparation.
//!
//! [`file`] and [`folder`] turn a user-supplied path into a [`PathBuf`],
//! optionally expanding `$VAR` / `${VAR}` references and asserting that the
//! path exists with the expected kind. [`folder`] can additionally empty
//! (`reset`) or create (`touch`) the directory.
//!
//! ```no_run
//! use iolite::path::{folder, FolderOptions};
//! # fn main() -> anyhow::Result<()> {
//! let out = folder("$HOME/runs/latest", &FolderOptions {
//!     expandvars: true,
//!     reset: true,
//!     ..Default::default()
//! })?;
//! # Ok(())
//! # }
//! ```

use crate::error::{ErrorKind, IoliteError};
use anyhow::{Context, Result};
use regex::{Captures, Regex};
use std::fs::{self, create_dir_all, read_dir};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

static ENV_VAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$(?:\{([^}]*)\}|(\w+))").expect("environment variable pattern is valid")
});

/// Options for [`file`].
#[derive(Clone, Copy, Debug, Default)]
pub struct PathOptions {
    /// Substitute environment variables before interpreting the path.
    pub expandvars: bool,
    /// Require the path to exist as a regular file.
    pub exists: bool,
}

/// Options for [`folder`].
#[derive(Clone, Copy, Debug, Default)]
pub struct FolderOptions {
    /// Substitute environment variables before interpreting the path.
    pub expandvars: bool,
    /// Require the path to exist as a directory.
    pub exists: bool,
    /// Empty the directory if present, create it otherwise.
    pub reset: bool,
    /// Create the directory (and parents) if missing.
    pub touch: bool,
}

/// Replace `$NAME` and `${NAME}` with the value of the environment variable.
///
/// References to unset variables are left as written.
pub fn expand_vars(raw: &str) -> String {
    ENV_VAR
        .replace_all(raw, |caps: &Captures<'_>| {
            let name = caps.get(1).or_else(|| caps.get(2)).map_or("", |m| m.as_str());
            std::env::var(name).unwrap_or_else(|_| caps[0].to_string())
        })
        .into_owned()
}

fn resolve(raw: &Path, expandvars: bool) -> PathBuf {
    if !expandvars {
        return raw.to_path_buf();
    }
    match raw.to_str() {
        Some(s) => PathBuf::from(expand_vars(s)),
        None => raw.to_path_buf(),
    }
}

fn check_exists(path: &Path, want_dir: bool) -> Result<()> {
    if !path.exists() {
        return Err(IoliteError::new(
            ErrorKind::NotFound,
            format!("{} not found.", path.display()),
        )
        .into());
    }
    if want_dir && !path.is_dir() {
        return Err(IoliteError::new(
            ErrorKind::WrongKind,
            format!("{} should be a folder.", path.display()),
        )
        .into());
    }
    if !want_dir && !path.is_file() {
        return Err(IoliteError::new(
            ErrorKind::WrongKind,
            format!("{} should be a file.", path.display()),
        )
        .into());
    }
    Ok(())
}

/// Resolve a file path.
///
/// # Errors
/// `NotFound` / `WrongKind` when `exists` is set and the path is absent or is
/// not a regular file.
pub fn file(raw: impl AsRef<Path>, options: &PathOptions) -> Result<PathBuf> {
    let path = resolve(raw.as_ref(), options.expandvars);
    if options.exists {
        check_exists(&path, false)?;
    }
    Ok(path)
}

/// Resolve a directory path, optionally emptying or creating it.
///
/// `reset` removes every child of an existing directory; a child that cannot
/// be removed is logged and left in place. A missing directory is created
/// with its parents.
///
/// # Errors
/// `NotFound` / `WrongKind` when `exists` is set and the path is absent or is
/// not a directory, `WrongKind` when resetting a path that is not a directory,
/// and I/O errors from listing or creating the directory.
pub fn folder(raw: impl AsRef<Path>, options: &FolderOptions) -> Result<PathBuf> {
    let path = resolve(raw.as_ref(), options.expandvars);

    if options.exists {
        check_exists(&path, true)?;
    }

    if options.reset {
        if path.exists() {
            if !path.is_dir() {
                return Err(IoliteError::new(
                    ErrorKind::WrongKind,
                    format!("cannot reset {}: not a folder.", path.display()),
                )
                .into());
            }
            clear_children(&path)?;
        } else {
            create_dir_all(&path).with_context(|| format!("mkdir -p {}", path.display()))?;
        }
    }

    if options.touch {
        create_dir_all(&path).with_context(|| format!("mkdir -p {}", path.display()))?;
    }

    tracing::debug!(path = %path.display(), "resolved folder");
    Ok(path)
}

fn clear_children(dir: &Path) -> Result<()> {
    let entries = read_dir(dir).with_context(|| format!("list {}", dir.display()))?;
    for entry in entries {
        let entry = entry.with_context(|| format!("list {}", dir.display()))?;
        let child = entry.path();
        // file_type() does not follow symlinks, so a link to a directory is unlinked.
        let is_dir = entry.file_type().is_ok_and(|t| t.is_dir());
        let removed = if is_dir {
            fs::remove_dir_all(&child)
        } else {
            fs::remove_file(&child)
        };
        if let Err(err) = removed {
            tracing::warn!(path = %child.display(), error = %err, "Cannot remove child, skipping");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expand_braced_and_bare() {
        // SAFETY: the variable name is unique to this test.
        unsafe { std::env::set_var("IOLITE_UNIT_ROOT", "/data") };
        assert_eq!(expand_vars("$IOLITE_UNIT_ROOT/a"), "/data/a");
        assert_eq!(expand_vars("${IOLITE_UNIT_ROOT}x/b"), "/datax/b");
    }

    #[test]
    fn unknown_variables_are_kept() {
        assert_eq!(
            expand_vars("$IOLITE_UNIT_SURELY_UNSET/a/${IOLITE_UNIT_NOPE}"),
            "$IOLITE_UNIT_SURELY_UNSET/a/${IOLITE_UNIT_NOPE}"
        );
        assert_eq!(expand_vars("no vars here"), "no vars here");
    }
}
