// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Health checks for tracked dotfiles.
//!
//! A tracked dotfile is healthy when its original location is a symlink, its
//! backing file exists in the managed folder, and the symlink resolves to
//! exactly that backing file. Each entry is checked on its own, and the
//! outcome is written back into the manifest.
//!
//! Listing is the read-only counterpart: it lines up the files sitting in the
//! managed folder against what the manifest tracks.

use crate::{
    link::exists,
    manifest::{
        Diagnostic, DiagnosticCode, Entry, Manifest, ManifestError, ManifestStore, Status,
    },
    path::link_target_from,
};

use std::{
    fs::{read_dir, read_link, symlink_metadata},
    path::{Path, PathBuf},
};
use tracing::{debug, instrument};

/// Verify every tracked dotfile, and record the results in the manifest.
#[derive(Debug, Clone)]
pub struct StatusChecker {
    store: ManifestStore,
}

impl StatusChecker {
    pub fn new(store: ManifestStore) -> Self {
        Self { store }
    }

    /// Re-check every entry, then save the manifest.
    ///
    /// The manifest is rewritten even when nothing changed.
    ///
    /// # Errors
    ///
    /// - Return [`ManifestError`] if the manifest cannot be loaded or saved.
    #[instrument(skip(self), level = "debug")]
    pub fn check(&self) -> Result<StatusReport, ManifestError> {
        let mut manifest = self.store.load()?;
        for (id, entry) in manifest.iter_mut() {
            debug!(
                "check {id}: symlink={}, path={}",
                entry.symlink.display(),
                entry.path.display()
            );
            check_entry(entry);
        }
        self.store.save(&manifest)?;

        let total = manifest.len();
        let unhealthy = manifest
            .into_iter()
            .filter(|(_, entry)| !entry.is_ok())
            .collect();

        Ok(StatusReport { total, unhealthy })
    }
}

/// Outcome of a status check pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StatusReport {
    /// Number of entries checked.
    pub total: usize,

    /// Entries that failed at least one check, by identifier.
    pub unhealthy: Vec<(String, Entry)>,
}

impl StatusReport {
    pub fn is_healthy(&self) -> bool {
        self.unhealthy.is_empty()
    }
}

/// Check a single entry, replacing its previous status and diagnostics.
pub fn check_entry(entry: &mut Entry) {
    entry.reset();

    let symlink_ok = match symlink_metadata(&entry.symlink) {
        Ok(meta) if meta.file_type().is_symlink() => true,
        Ok(_) => {
            entry.record(Diagnostic::new(
                DiagnosticCode::NotASymlink,
                format!("file {} is not a symlink", entry.symlink.display()),
            ));
            false
        }
        Err(_) => {
            entry.record(Diagnostic::new(
                DiagnosticCode::SymlinkMissing,
                format!("symlink file {} does not exist", entry.symlink.display()),
            ));
            false
        }
    };

    let path_ok = exists(&entry.path);
    if !path_ok {
        entry.record(Diagnostic::new(
            DiagnosticCode::PathMissing,
            format!("file {} does not exist", entry.path.display()),
        ));
    }

    if !(symlink_ok && path_ok) {
        return;
    }

    match read_link(&entry.symlink) {
        Ok(target) => {
            let target = link_target_from(&entry.symlink, target);
            if target != entry.path {
                entry.record(Diagnostic::new(
                    DiagnosticCode::PathMismatch,
                    format!(
                        "following symlink ({}) does not match filepath ({})",
                        target.display(),
                        entry.path.display()
                    ),
                ));
            }
        }
        Err(error) => entry.record(Diagnostic::new(
            DiagnosticCode::PathMismatch,
            format!("failed to read symlink {}: {error}", entry.symlink.display()),
        )),
    }
}

/// One line of a managed folder listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Listing {
    /// File in managed folder that the manifest tracks.
    Tracked {
        name: String,
        id: String,
        status: Status,
    },

    /// File in managed folder that nothing tracks.
    Untracked { name: String },

    /// Tracked entry whose backing file is gone from the managed folder.
    Missing { id: String, path: PathBuf },
}

/// List regular files of managed folder against manifest.
///
/// Files come first sorted by name, followed by tracked entries whose
/// backing file is absent. The manifest file itself is skipped. A missing
/// manifest counts as tracking nothing.
///
/// # Errors
///
/// - Return [`ListError::FolderMissing`] if managed folder does not exist.
/// - Return [`ListError::ReadFolder`] if managed folder cannot be read.
/// - Return [`ListError::Manifest`] if manifest exists but cannot be loaded.
#[instrument(skip(store), level = "debug")]
pub fn list(folder: &Path, store: &ManifestStore) -> Result<Vec<Listing>, ListError> {
    if !folder.is_dir() {
        return Err(ListError::FolderMissing {
            path: folder.to_path_buf(),
        });
    }

    let manifest = if store.exists() {
        store.load()?
    } else {
        Manifest::new()
    };

    let read_error = |source| ListError::ReadFolder {
        source,
        path: folder.to_path_buf(),
    };
    let mut names = Vec::new();
    for dir_entry in read_dir(folder).map_err(read_error)? {
        let dir_entry = dir_entry.map_err(read_error)?;
        if !dir_entry.file_type().map_err(read_error)?.is_file() {
            continue;
        }

        if dir_entry.path() == store.path() {
            continue;
        }

        names.push(dir_entry.file_name().to_string_lossy().into_owned());
    }
    names.sort();

    let mut listing = Vec::new();
    for name in names {
        let backing = folder.join(&name);
        match manifest.iter().find(|(_, entry)| entry.path == backing) {
            Some((id, entry)) => listing.push(Listing::Tracked {
                name,
                id: id.clone(),
                status: entry.status,
            }),
            None => listing.push(Listing::Untracked { name }),
        }
    }

    for (id, entry) in &manifest {
        if !exists(&entry.path) {
            listing.push(Listing::Missing {
                id: id.clone(),
                path: entry.path.clone(),
            });
        }
    }

    Ok(listing)
}

/// Listing error types.
#[derive(Debug, thiserror::Error)]
pub enum ListError {
    #[error("managed folder {path:?} does not exist")]
    FolderMissing { path: PathBuf },

    #[error("failed to read managed folder {path:?}")]
    ReadFolder {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    #[error(transparent)]
    Manifest(#[from] ManifestError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::symlink_file;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;
    use std::{
        env::current_dir,
        fs::{create_dir, read_to_string, write},
    };

    #[sealed_test]
    fn healthy_manifest_stays_healthy() -> anyhow::Result<()> {
        let root = current_dir()?;
        create_dir(root.join("dotfiles"))?;
        write(root.join("dotfiles/.zshrc"), "")?;
        symlink_file(&root.join("dotfiles/.zshrc"), &root.join(".zshrc"))?;

        let store = ManifestStore::new(root.join("info.json"));
        let manifest = Manifest::from_iter([(
            ".zshrc".to_string(),
            Entry::new(root.join(".zshrc"), root.join("dotfiles/.zshrc")),
        )]);
        store.save(&manifest)?;

        let checker = StatusChecker::new(store.clone());
        let first = checker.check()?;
        let second = checker.check()?;
        assert!(first.is_healthy());
        assert_eq!(first, second);
        assert_eq!(first.total, 1);
        assert_eq!(store.load()?, manifest);

        Ok(())
    }

    #[sealed_test]
    fn mismatch_is_recorded_and_saved() -> anyhow::Result<()> {
        let root = current_dir()?;
        write(root.join("real"), "")?;
        write(root.join("decoy"), "")?;
        symlink_file(&root.join("decoy"), &root.join(".vimrc"))?;

        let store = ManifestStore::new(root.join("info.json"));
        store.save(&Manifest::from_iter([(
            ".vimrc".to_string(),
            Entry::new(root.join(".vimrc"), root.join("real")),
        )]))?;

        let report = StatusChecker::new(store.clone()).check()?;
        assert_eq!(report.unhealthy.len(), 1);

        let saved = store.load()?;
        let entry = saved.get(".vimrc").expect("vimrc entry");
        assert_eq!(entry.status, Status::NotOk);
        assert_eq!(entry.codes(), vec![DiagnosticCode::PathMismatch]);
        assert!(read_to_string(store.path())?.contains("path-mismatch: "));

        Ok(())
    }

    #[sealed_test]
    fn missing_symlink_and_path_both_reported() -> anyhow::Result<()> {
        let root = current_dir()?;
        let mut entry = Entry::new(root.join(".bashrc"), root.join("dotfiles/.bashrc"));
        check_entry(&mut entry);

        assert_eq!(
            entry.codes(),
            vec![DiagnosticCode::SymlinkMissing, DiagnosticCode::PathMissing]
        );

        Ok(())
    }

    #[sealed_test]
    fn plain_file_is_not_a_symlink() -> anyhow::Result<()> {
        let root = current_dir()?;
        write(root.join(".profile"), "")?;
        write(root.join("backing"), "")?;
        let mut entry = Entry::new(root.join(".profile"), root.join("backing"));
        check_entry(&mut entry);

        assert_eq!(entry.codes(), vec![DiagnosticCode::NotASymlink]);

        Ok(())
    }

    #[sealed_test]
    fn stale_errors_are_cleared_once_fixed() -> anyhow::Result<()> {
        let root = current_dir()?;
        write(root.join("backing"), "")?;
        symlink_file(&root.join("backing"), &root.join(".profile"))?;

        let mut entry = Entry::new(root.join(".profile"), root.join("backing"));
        entry.record(Diagnostic::new(DiagnosticCode::Unknown, "old complaint"));
        check_entry(&mut entry);

        assert!(entry.is_ok());
        assert!(entry.errors.is_empty());

        Ok(())
    }

    #[sealed_test]
    fn list_lines_up_folder_and_manifest() -> anyhow::Result<()> {
        let root = current_dir()?;
        let folder = root.join("dotfiles");
        create_dir(&folder)?;
        create_dir(folder.join(".git"))?;
        write(folder.join(".zshrc"), "")?;
        write(folder.join("notes.txt"), "")?;

        let store = ManifestStore::new(folder.join("info.json"));
        let mut broken = Entry::new(root.join(".vimrc"), folder.join(".vimrc"));
        broken.status = Status::NotOk;
        store.save(&Manifest::from_iter([
            (
                ".zshrc".to_string(),
                Entry::new(root.join(".zshrc"), folder.join(".zshrc")),
            ),
            (".vimrc".to_string(), broken),
        ]))?;

        let listing = list(&folder, &store)?;
        assert_eq!(
            listing,
            vec![
                Listing::Tracked {
                    name: ".zshrc".into(),
                    id: ".zshrc".into(),
                    status: Status::Ok,
                },
                Listing::Untracked {
                    name: "notes.txt".into()
                },
                Listing::Missing {
                    id: ".vimrc".into(),
                    path: folder.join(".vimrc"),
                },
            ]
        );

        Ok(())
    }

    #[sealed_test]
    fn list_needs_managed_folder() -> anyhow::Result<()> {
        let root = current_dir()?;
        let store = ManifestStore::new(root.join("info.json"));
        let result = list(&root.join("nowhere"), &store);
        assert!(matches!(result, Err(ListError::FolderMissing { .. })));

        Ok(())
    }
}
