// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Manifest of tracked dotfiles.
//!
//! Every dotfile relocated into the managed folder gets an __entry__ in the
//! manifest, a JSON document keyed by a stable identifier (normally the
//! basename of the original file):
//!
//! ```json
//! {
//!   ".zshrc": {
//!     "symlink": "~/.zshrc",
//!     "path": "~/dotfiles/.zshrc",
//!     "status": "ok",
//!     "errors": null
//!   }
//! }
//! ```
//!
//! The `symlink` field is the original location of the dotfile, where a
//! symbolic link now points back to `path` inside of the managed folder.
//!
//! # Path Forms
//!
//! Paths are written to disk in `~` relative form when they live inside of
//! the home directory. Loading resolves them back into absolute paths, so
//! every consumer of a [`Manifest`] works with absolute paths only.
//!
//! # Durability
//!
//! Saving writes a temporary file next to the manifest, then renames it over
//! the original. A crash mid-save leaves either the old or the new document.
//! Two processes racing on the same manifest are not coordinated: the last
//! writer wins.

use crate::path::{resolve, shrink, NoWayHome};

use serde::{Deserialize, Deserializer, Serialize};
use std::{
    collections::{btree_map, BTreeMap},
    convert::Infallible,
    fmt::{Display, Formatter, Result as FmtResult},
    fs::{metadata, read_to_string, Permissions},
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
    str::FromStr,
};
use tempfile::NamedTempFile;
use tracing::{debug, instrument};

/// Last known health of a tracked dotfile.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum Status {
    /// Symlink resolves to the backing file.
    #[default]
    #[serde(rename = "ok")]
    Ok,

    /// At least one check failed, see [`Entry::errors`].
    #[serde(rename = "Nok", alias = "not-ok")]
    NotOk,
}

impl Display for Status {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Ok => fmt.write_str("ok"),
            Self::NotOk => fmt.write_str("not-ok"),
        }
    }
}

/// Kind of problem found with a tracked dotfile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticCode {
    /// Nothing exists at the symlink location.
    SymlinkMissing,

    /// Something exists at the symlink location, but it is not a symlink.
    NotASymlink,

    /// Backing file inside of the managed folder is gone.
    PathMissing,

    /// Symlink points somewhere other than the backing file.
    PathMismatch,

    /// Diagnostic written by something that did not tag it with a code.
    Unknown,
}

impl DiagnosticCode {
    const TAGGED: [Self; 4] = [
        Self::SymlinkMissing,
        Self::NotASymlink,
        Self::PathMissing,
        Self::PathMismatch,
    ];

    /// Stable string form used on disk.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SymlinkMissing => "symlink-missing",
            Self::NotASymlink => "not-a-symlink",
            Self::PathMissing => "path-missing",
            Self::PathMismatch => "path-mismatch",
            Self::Unknown => "unknown",
        }
    }
}

/// One problem found with a tracked dotfile.
///
/// Stored in the manifest as a single `"<code>: <detail>"` string.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(into = "String", from = "String")]
pub struct Diagnostic {
    pub code: DiagnosticCode,
    pub detail: String,
}

impl Diagnostic {
    pub fn new(code: DiagnosticCode, detail: impl Into<String>) -> Self {
        Self {
            code,
            detail: detail.into(),
        }
    }
}

impl Display for Diagnostic {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self.code {
            DiagnosticCode::Unknown => fmt.write_str(&self.detail),
            code => write!(fmt, "{}: {}", code.as_str(), self.detail),
        }
    }
}

impl FromStr for Diagnostic {
    type Err = Infallible;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let tagged = data.split_once(": ").and_then(|(code, detail)| {
            DiagnosticCode::TAGGED
                .into_iter()
                .find(|known| known.as_str() == code)
                .map(|code| Self::new(code, detail))
        });

        Ok(tagged.unwrap_or_else(|| Self::new(DiagnosticCode::Unknown, data)))
    }
}

impl From<String> for Diagnostic {
    fn from(data: String) -> Self {
        match data.parse() {
            Ok(diagnostic) => diagnostic,
            Err(infallible) => match infallible {},
        }
    }
}

impl From<Diagnostic> for String {
    fn from(diagnostic: Diagnostic) -> Self {
        diagnostic.to_string()
    }
}

/// Manifest record for a single tracked dotfile.
///
/// # Invariant
///
/// - `status` is [`Status::Ok`] if and only if `errors` is empty.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Entry {
    /// Original location, now a symlink to `path`.
    pub symlink: PathBuf,

    /// Location of the dotfile inside of the managed folder.
    pub path: PathBuf,

    /// Last known health.
    #[serde(default)]
    pub status: Status,

    /// Problems found by the last status check.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub errors: Vec<Diagnostic>,
}

impl Entry {
    /// Construct healthy entry for a freshly relocated dotfile.
    pub fn new(symlink: impl Into<PathBuf>, path: impl Into<PathBuf>) -> Self {
        Self {
            symlink: symlink.into(),
            path: path.into(),
            status: Status::Ok,
            errors: Vec::new(),
        }
    }

    /// Forget previous diagnostics, and mark entry healthy.
    pub fn reset(&mut self) {
        self.errors.clear();
        self.status = Status::Ok;
    }

    /// Record a problem, and mark entry unhealthy.
    pub fn record(&mut self, diagnostic: Diagnostic) {
        self.errors.push(diagnostic);
        self.status = Status::NotOk;
    }

    pub fn is_ok(&self) -> bool {
        self.status == Status::Ok
    }

    /// Codes of all recorded diagnostics in order of discovery.
    pub fn codes(&self) -> Vec<DiagnosticCode> {
        self.errors.iter().map(|diagnostic| diagnostic.code).collect()
    }

    fn map_paths<E>(&self, mut map: impl FnMut(&Path) -> Result<PathBuf, E>) -> Result<Self, E> {
        Ok(Self {
            symlink: map(&self.symlink)?,
            path: map(&self.path)?,
            status: self.status,
            errors: self.errors.clone(),
        })
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<Diagnostic>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<Diagnostic>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Mapping from identifier to [`Entry`].
#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct Manifest {
    entries: BTreeMap<String, Entry>,
}

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<&Entry> {
        self.entries.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Entry> {
        self.entries.get_mut(id)
    }

    /// Insert entry, replacing whatever was stored under the same identifier.
    pub fn insert(&mut self, id: impl Into<String>, entry: Entry) -> Option<Entry> {
        self.entries.insert(id.into(), entry)
    }

    pub fn remove(&mut self, id: &str) -> Option<Entry> {
        self.entries.remove(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, Entry> {
        self.entries.iter()
    }

    pub fn iter_mut(&mut self) -> btree_map::IterMut<'_, String, Entry> {
        self.entries.iter_mut()
    }

    /// Find identifier of the entry whose symlink lives at target path.
    pub fn find_by_symlink(&self, symlink: impl AsRef<Path>) -> Option<&str> {
        self.entries
            .iter()
            .find(|(_, entry)| entry.symlink == symlink.as_ref())
            .map(|(id, _)| id.as_str())
    }

    /// Overwrite or create every entry of `other`.
    pub fn extend(&mut self, other: Manifest) {
        self.entries.extend(other.entries);
    }

    fn map_paths<E>(&self, mut map: impl FnMut(&Path) -> Result<PathBuf, E>) -> Result<Self, E> {
        let entries = self
            .entries
            .iter()
            .map(|(id, entry)| Ok((id.clone(), entry.map_paths(&mut map)?)))
            .collect::<Result<_, E>>()?;

        Ok(Self { entries })
    }
}

impl FromIterator<(String, Entry)> for Manifest {
    fn from_iter<I: IntoIterator<Item = (String, Entry)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for Manifest {
    type Item = (String, Entry);
    type IntoIter = btree_map::IntoIter<String, Entry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<'a> IntoIterator for &'a Manifest {
    type Item = (&'a String, &'a Entry);
    type IntoIter = btree_map::Iter<'a, String, Entry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Durable manifest on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestStore {
    path: PathBuf,
}

impl ManifestStore {
    /// Construct manifest store for file at target path.
    ///
    /// Does not touch the file system.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Read manifest with every path resolved to absolute form.
    ///
    /// # Errors
    ///
    /// - Return [`ManifestError::NotFound`] if manifest does not exist.
    /// - Return [`ManifestError::Read`] if manifest cannot be read.
    /// - Return [`ManifestError::Parse`] if manifest is not valid JSON.
    /// - Return [`ManifestError::NoWayHome`] if `~` paths cannot be resolved.
    #[instrument(skip(self), level = "debug")]
    pub fn load(&self) -> Result<Manifest> {
        debug!("read manifest from {}", self.path.display());
        let data = read_to_string(&self.path).map_err(|err| match err.kind() {
            ErrorKind::NotFound => ManifestError::NotFound {
                path: self.path.clone(),
            },
            _ => ManifestError::Read {
                source: err,
                path: self.path.clone(),
            },
        })?;

        let stored: Manifest =
            serde_json::from_str(&data).map_err(|err| ManifestError::Parse {
                source: err,
                path: self.path.clone(),
            })?;

        Ok(stored.map_paths(|path| resolve(path))?)
    }

    /// Write manifest with paths shrunk to `~` relative form.
    ///
    /// # Errors
    ///
    /// - Return [`ManifestError::Serialize`] if manifest cannot be serialized.
    /// - Return [`ManifestError::Write`] if manifest cannot be written.
    #[instrument(skip(self, manifest), level = "debug")]
    pub fn save(&self, manifest: &Manifest) -> Result<()> {
        debug!(
            "write {} entries to {}",
            manifest.len(),
            self.path.display()
        );
        let stored = manifest
            .map_paths(|path| Ok::<_, Infallible>(shrink(path)))
            .unwrap_or_else(|infallible| match infallible {});
        let mut data = serde_json::to_string_pretty(&stored).map_err(ManifestError::Serialize)?;
        data.push('\n');

        let write_err = |source| ManifestError::Write {
            source,
            path: self.path.clone(),
        };
        let parent = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut file = NamedTempFile::new_in(parent).map_err(write_err)?;
        file.write_all(data.as_bytes()).map_err(write_err)?;

        // INVARIANT: Keep mode of existing manifest, temp files start private.
        let permissions = match metadata(&self.path) {
            Ok(meta) => Some(meta.permissions()),
            Err(_) => new_manifest_permissions(),
        };
        if let Some(permissions) = permissions {
            file.as_file()
                .set_permissions(permissions)
                .map_err(write_err)?;
        }
        file.persist(&self.path)
            .map_err(|err| write_err(err.error))?;

        Ok(())
    }

    /// Overwrite or create entries, then save.
    ///
    /// A missing manifest is treated as empty, so the first merge creates it.
    ///
    /// # Errors
    ///
    /// - Return any [`ManifestError`] of [`load`](Self::load) other than
    ///   [`ManifestError::NotFound`], or of [`save`](Self::save).
    #[instrument(skip(self, entries), level = "debug")]
    pub fn merge(&self, entries: Manifest) -> Result<Manifest> {
        let mut manifest = match self.load() {
            Ok(manifest) => manifest,
            Err(ManifestError::NotFound { .. }) => {
                debug!("start new manifest at {}", self.path.display());
                Manifest::new()
            }
            Err(err) => return Err(err),
        };
        manifest.extend(entries);
        self.save(&manifest)?;

        Ok(manifest)
    }

    /// Remove entry by identifier, then save.
    ///
    /// Removing an identifier that is not present is not an error.
    ///
    /// # Errors
    ///
    /// - Return any [`ManifestError`] of [`load`](Self::load) or
    ///   [`save`](Self::save).
    #[instrument(skip(self), level = "debug")]
    pub fn delete(&self, id: &str) -> Result<Option<Entry>> {
        let mut manifest = self.load()?;
        let removed = manifest.remove(id);
        if removed.is_none() {
            debug!("no entry {id:?} in manifest");
        }
        self.save(&manifest)?;

        Ok(removed)
    }
}

#[cfg(unix)]
fn new_manifest_permissions() -> Option<Permissions> {
    use std::os::unix::fs::PermissionsExt;

    Some(Permissions::from_mode(0o644))
}

#[cfg(not(unix))]
fn new_manifest_permissions() -> Option<Permissions> {
    None
}

/// All possible error types for manifest interaction.
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    /// Manifest file does not exist.
    #[error("manifest {path:?} not found")]
    NotFound { path: PathBuf },

    /// Manifest file cannot be read.
    #[error("failed to read manifest {path:?}")]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Manifest file is not valid JSON.
    #[error("failed to parse manifest {path:?}")]
    Parse {
        #[source]
        source: serde_json::Error,
        path: PathBuf,
    },

    /// Manifest cannot be serialized.
    #[error("failed to serialize manifest")]
    Serialize(#[source] serde_json::Error),

    /// Manifest file cannot be written.
    #[error("failed to write manifest {path:?}")]
    Write {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Home directory is needed to resolve stored paths.
    #[error(transparent)]
    NoWayHome(#[from] NoWayHome),
}

/// Friendly result alias :3
type Result<T, E = ManifestError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;
    use std::{env::current_dir, fs::write};

    #[test]
    fn diagnostic_round_trips_through_string() {
        let diagnostic = Diagnostic::new(DiagnosticCode::PathMismatch, "/a points to /b");
        let stored = String::from(diagnostic.clone());
        assert_eq!(stored, "path-mismatch: /a points to /b");
        assert_eq!(Diagnostic::from(stored), diagnostic);
    }

    #[test]
    fn untagged_diagnostic_is_unknown() {
        let diagnostic = Diagnostic::from("symlink file /a does not exist".to_string());
        assert_eq!(diagnostic.code, DiagnosticCode::Unknown);
        assert_eq!(diagnostic.to_string(), "symlink file /a does not exist");
    }

    #[test]
    fn entry_record_and_reset_keep_status_in_step() {
        let mut entry = Entry::new("/home/blah/.zshrc", "/home/blah/dotfiles/.zshrc");
        assert!(entry.is_ok());

        entry.record(Diagnostic::new(DiagnosticCode::PathMissing, "gone"));
        assert_eq!(entry.status, Status::NotOk);
        assert_eq!(entry.codes(), vec![DiagnosticCode::PathMissing]);

        entry.reset();
        assert!(entry.is_ok());
        assert!(entry.errors.is_empty());
    }

    #[sealed_test(env = [("HOME", "/home/blah")])]
    fn load_resolves_home_relative_paths() -> anyhow::Result<()> {
        write(
            "info.json",
            indoc! {r#"
                {
                  ".zshrc": {
                    "symlink": "~/.zshrc",
                    "path": "~/dotfiles/.zshrc",
                    "status": "ok",
                    "errors": null
                  },
                  "hosts": {
                    "symlink": "/etc/hosts",
                    "path": "/srv/dots/hosts",
                    "status": "Nok",
                    "errors": ["path-missing: file /srv/dots/hosts does not exist"]
                  }
                }
            "#},
        )?;

        let manifest = ManifestStore::new("info.json").load()?;
        let zshrc = manifest.get(".zshrc").expect("zshrc entry");
        assert_eq!(zshrc, &Entry::new("/home/blah/.zshrc", "/home/blah/dotfiles/.zshrc"));

        let hosts = manifest.get("hosts").expect("hosts entry");
        assert_eq!(hosts.symlink, PathBuf::from("/etc/hosts"));
        assert_eq!(hosts.status, Status::NotOk);
        assert_eq!(hosts.codes(), vec![DiagnosticCode::PathMissing]);

        Ok(())
    }

    #[sealed_test(env = [("HOME", "/home/blah")])]
    fn save_shrinks_paths_and_load_restores_them() -> anyhow::Result<()> {
        let store = ManifestStore::new("info.json");
        let manifest: Manifest = [
            (
                ".vimrc".to_string(),
                Entry::new("/home/blah/.vimrc", "/home/blah/dotfiles/.vimrc"),
            ),
            (
                "hosts".to_string(),
                Entry::new("/etc/hosts", "/srv/dots/hosts"),
            ),
        ]
        .into_iter()
        .collect();
        store.save(&manifest)?;

        let raw = read_to_string("info.json")?;
        assert!(raw.contains(r#""symlink": "~/.vimrc""#));
        assert!(raw.contains(r#""path": "/srv/dots/hosts""#));
        assert_eq!(store.load()?, manifest);

        Ok(())
    }

    #[sealed_test]
    fn load_missing_manifest() {
        let result = ManifestStore::new("missing.json").load();
        assert!(matches!(result, Err(ManifestError::NotFound { .. })));
    }

    #[sealed_test]
    fn load_malformed_manifest() -> anyhow::Result<()> {
        write("info.json", "{ not json")?;
        let result = ManifestStore::new("info.json").load();
        assert!(matches!(result, Err(ManifestError::Parse { .. })));

        Ok(())
    }

    #[sealed_test]
    fn merge_creates_then_overwrites() -> anyhow::Result<()> {
        let store = ManifestStore::new("info.json");
        store.merge([("a".to_string(), Entry::new("/x/a", "/d/a"))].into_iter().collect())?;
        store.merge([("b".to_string(), Entry::new("/x/b", "/d/b"))].into_iter().collect())?;
        let merged =
            store.merge([("a".to_string(), Entry::new("/y/a", "/d/a"))].into_iter().collect())?;

        assert_eq!(merged.len(), 2);
        assert_eq!(merged.get("a").map(|e| e.symlink.clone()), Some(PathBuf::from("/y/a")));
        assert_eq!(store.load()?, merged);

        Ok(())
    }

    #[sealed_test]
    fn delete_absent_identifier_is_no_op() -> anyhow::Result<()> {
        let store = ManifestStore::new("info.json");
        store.merge([("a".to_string(), Entry::new("/x/a", "/d/a"))].into_iter().collect())?;

        assert_eq!(store.delete("missing")?, None);
        assert!(store.delete("a")?.is_some());
        assert!(store.load()?.is_empty());

        Ok(())
    }

    #[cfg(unix)]
    #[sealed_test]
    fn save_keeps_manifest_readable() -> anyhow::Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let store = ManifestStore::new(current_dir()?.join("info.json"));
        store.save(&Manifest::new())?;
        assert_eq!(metadata(store.path())?.permissions().mode() & 0o777, 0o644);

        std::fs::set_permissions(store.path(), Permissions::from_mode(0o640))?;
        store.save(&Manifest::new())?;
        assert_eq!(metadata(store.path())?.permissions().mode() & 0o777, 0o640);

        Ok(())
    }
}
