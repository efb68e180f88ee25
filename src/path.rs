// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Path resolution utilities.
//!
//! Dotlink stores paths in a portable form where anything inside the user's
//! home directory is written with a leading `~`. Everything that touches the
//! file system works on fully resolved absolute paths instead. This module
//! converts between the two forms.

use std::path::{Component, Path, PathBuf};

/// Marker standing in for the user's home directory.
pub const HOME_MARKER: &str = "~";

/// Determine absolute path to user's home directory.
///
/// Does not check if the path returned actually exists.
///
/// # Errors
///
/// - Return [`NoWayHome`] if home directory path cannot be determined.
pub fn home_dir() -> Result<PathBuf> {
    dirs::home_dir().ok_or(NoWayHome)
}

/// Default location of the configuration file: `~/.dotconfig`.
///
/// # Errors
///
/// - Return [`NoWayHome`] if home directory path cannot be determined.
pub fn default_config_path() -> Result<PathBuf> {
    home_dir().map(|home| home.join(".dotconfig"))
}

/// Resolve user supplied path into an absolute path.
///
/// - `~` prefixed input has the marker replaced by the home directory.
/// - Absolute input is returned unchanged.
/// - Anything else is taken relative to the home directory.
///
/// # Errors
///
/// - Return [`NoWayHome`] if home directory path cannot be determined.
pub fn resolve(input: impl AsRef<Path>) -> Result<PathBuf> {
    let input = input.as_ref();
    if input.is_absolute() {
        return Ok(input.to_path_buf());
    }

    Ok(resolve_from(home_dir()?, input))
}

/// Shrink absolute path into its `~` relative form for display and storage.
///
/// Paths outside of the home directory, or any path at all when the home
/// directory cannot be determined, are returned unchanged.
pub fn shrink(path: impl AsRef<Path>) -> PathBuf {
    match home_dir() {
        Ok(home) => shrink_from(home, path),
        Err(_) => path.as_ref().to_path_buf(),
    }
}

pub(crate) fn resolve_from(home: impl AsRef<Path>, input: impl AsRef<Path>) -> PathBuf {
    let home = home.as_ref();
    let input = input.as_ref();
    if input.is_absolute() {
        return input.to_path_buf();
    }

    let raw = input.to_string_lossy();
    match raw.strip_prefix(HOME_MARKER) {
        Some(rest) => match rest.trim_start_matches(['/', '\\']) {
            "" => home.to_path_buf(),
            rest => home.join(rest),
        },
        None => home.join(input),
    }
}

pub(crate) fn shrink_from(home: impl AsRef<Path>, path: impl AsRef<Path>) -> PathBuf {
    let path = path.as_ref();
    match path.strip_prefix(home.as_ref()) {
        Ok(rest) if rest.as_os_str().is_empty() => PathBuf::from(HOME_MARKER),
        Ok(rest) => Path::new(HOME_MARKER).join(rest),
        Err(_) => path.to_path_buf(),
    }
}

/// Resolve the raw target of a symlink against the directory holding it.
///
/// Relative link targets are joined onto the parent of the link, and `.`
/// components are dropped. No file system access happens here, so `..`
/// components are kept as they are.
pub fn link_target_from(link: impl AsRef<Path>, target: impl AsRef<Path>) -> PathBuf {
    let target = target.as_ref();
    let joined = if target.is_absolute() {
        target.to_path_buf()
    } else {
        link.as_ref()
            .parent()
            .map(|parent| parent.join(target))
            .unwrap_or_else(|| target.to_path_buf())
    };

    joined
        .components()
        .filter(|component| !matches!(component, Component::CurDir))
        .collect()
}

/// No way to determine user's home directory.
///
/// # See Also
///
/// - [`dirs::home_dir`](https://docs.rs/dirs/latest/dirs/fn.home_dir.html)
#[derive(Clone, Debug, thiserror::Error)]
#[error("cannot determine absolute path to user's home directory")]
pub struct NoWayHome;

/// Friendly result alias :3
pub type Result<T, E = NoWayHome> = std::result::Result<T, E>;
