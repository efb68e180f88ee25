// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Dotfile relocation.
//!
//! Adding a dotfile __relocates__ it: the file is moved into the managed
//! folder, and a symlink is left at its original location pointing to the
//! new home. Removing a dotfile undoes this, putting the file back where it
//! came from.
//!
//! # Partial Failure
//!
//! Neither direction is transactional. If the move succeeds but creating the
//! symlink fails, the dotfile stays in the managed folder without a link
//! back. The error names both paths so the user can repair things by hand.
//! Nothing is rolled back automatically.
//!
//! # Forced Removal
//!
//! Removal normally validates the entry before touching anything, and bails
//! out on the first problem. Forced removal skips validation, logs mutation
//! failures instead of returning them, and always drops the manifest entry.
//! This is a best-effort escape hatch for entries that are already broken,
//! which means it can leave a dotfile neither linked nor restored.

use crate::{
    manifest::{Entry, Manifest, ManifestError, ManifestStore},
    path::{link_target_from, resolve, NoWayHome},
    prompt::{InquirePrompt, Prompt},
};

use std::{
    fs::{read_link, remove_file, rename, symlink_metadata},
    path::{Path, PathBuf},
};
use tracing::{debug, info, instrument, warn};

/// Move dotfiles in and out of the managed folder.
#[derive(Debug)]
pub struct Relocator<P = InquirePrompt>
where
    P: Prompt,
{
    managed_folder: PathBuf,
    store: ManifestStore,
    prompt: P,
}

impl<P> Relocator<P>
where
    P: Prompt,
{
    /// Construct new relocator.
    pub fn new(managed_folder: impl Into<PathBuf>, store: ManifestStore, prompt: P) -> Self {
        Self {
            managed_folder: managed_folder.into(),
            store,
            prompt,
        }
    }

    pub fn managed_folder(&self) -> &Path {
        self.managed_folder.as_path()
    }

    /// Relocate dotfile into managed folder, and record it in the manifest.
    ///
    /// A relative source is taken from the home directory.
    ///
    /// Asks before creating a missing managed folder. Declining does not
    /// abort, the move that follows fails instead.
    ///
    /// Returns identifier of the new entry together with the entry itself.
    ///
    /// # Errors
    ///
    /// - Return [`LinkError::NoWayHome`] if a relative source cannot be
    ///   resolved against home.
    /// - Return [`LinkError::NoFileName`] if source has no basename.
    /// - Return [`LinkError::ReservedName`] if source would land on the
    ///   manifest file.
    /// - Return [`LinkError::AlreadyExists`] if destination exists and
    ///   `force` is not set.
    /// - Return [`LinkError::AlreadyLinked`] if destination exists, `force`
    ///   is set, and the source is itself a symlink.
    /// - Return [`LinkError::CreateFolder`], [`LinkError::Move`], or
    ///   [`LinkError::CreateSymlink`] if file system mutation fails.
    /// - Return [`LinkError::Manifest`] if the manifest cannot be updated.
    #[instrument(skip(self, source), level = "debug")]
    pub fn add(&self, source: impl AsRef<Path>, force: bool) -> Result<(String, Entry)> {
        let source = resolve(source)?;
        let source = source.as_path();
        self.ensure_managed_folder()?;

        let id = source
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| LinkError::NoFileName {
                path: source.to_path_buf(),
            })?;
        let destination = self.managed_folder.join(&id);

        // INVARIANT: Manifest file is never a relocation target.
        if destination == self.store.path() {
            return Err(LinkError::ReservedName { path: destination });
        }

        if exists(&destination) {
            if !force {
                return Err(LinkError::AlreadyExists { path: destination });
            }

            // INVARIANT: Never clobber a managed file through its own symlink.
            if is_symlink(source) {
                return Err(LinkError::AlreadyLinked {
                    path: source.to_path_buf(),
                });
            }

            warn!("overwrite {}", destination.display());
        }

        debug!("move {} to {}", source.display(), destination.display());
        rename(source, &destination).map_err(|err| LinkError::Move {
            source: err,
            from: source.to_path_buf(),
            to: destination.clone(),
        })?;

        debug!("link {} to {}", source.display(), destination.display());
        symlink_file(&destination, source).map_err(|err| LinkError::CreateSymlink {
            source: err,
            link: source.to_path_buf(),
            target: destination.clone(),
        })?;

        let entry = Entry::new(source, &destination);
        self.store
            .merge(Manifest::from_iter([(id.clone(), entry.clone())]))?;
        info!("relocated {} to {}", source.display(), destination.display());

        Ok((id, entry))
    }

    /// Restore dotfile to its original location, and drop it from the manifest.
    ///
    /// Without `force`, every check runs before anything is touched. With
    /// `force`, checks are skipped and mutation failures are only logged.
    ///
    /// Returns the removed entry, or `None` if a forced removal found nothing
    /// under the identifier.
    ///
    /// # Errors
    ///
    /// - Return [`LinkError::EntryNotFound`] if no entry exists for `id`
    ///   and `force` is not set.
    /// - Return [`LinkError::NotASymlink`] if the original location is not a
    ///   symlink.
    /// - Return [`LinkError::TargetMissing`] if the backing file is gone.
    /// - Return [`LinkError::PathMismatch`] if the symlink points elsewhere.
    /// - Return [`LinkError::RemoveSymlink`] or [`LinkError::Move`] if
    ///   file system mutation fails.
    /// - Return [`LinkError::Manifest`] if the manifest cannot be updated.
    #[instrument(skip(self), level = "debug")]
    pub fn remove(&self, id: &str, force: bool) -> Result<Option<Entry>> {
        let manifest = self.store.load()?;
        let Some(entry) = manifest.get(id).cloned() else {
            if !force {
                return Err(LinkError::EntryNotFound { id: id.into() });
            }

            warn!("no entry {id:?} in manifest, nothing to restore");
            self.store.delete(id)?;
            return Ok(None);
        };

        if force {
            restore_best_effort(&entry);
        } else {
            validate(&entry)?;
            restore(&entry)?;
            debug!(
                "restored {} to {}",
                entry.path.display(),
                entry.symlink.display()
            );
        }

        self.store.delete(id)?;
        info!("removed {id} from management");

        Ok(Some(entry))
    }

    fn ensure_managed_folder(&self) -> Result<()> {
        if self.managed_folder.exists() {
            return Ok(());
        }

        let message = format!(
            "Managed folder {} does not exist, create it?",
            self.managed_folder.display()
        );
        if !self.prompt.confirm(&message) {
            warn!(
                "not creating managed folder {}",
                self.managed_folder.display()
            );
            return Ok(());
        }

        create_folder(&self.managed_folder)
    }
}

/// Find identifier of the entry a user supplied name refers to.
///
/// Tries, in order: exact identifier, symlink path after resolution, then
/// basename of the resolved path.
///
/// # Errors
///
/// - Return [`NoWayHome`] if the name has to be resolved and the home
///   directory cannot be determined.
pub fn lookup_id(manifest: &Manifest, name: &str) -> Result<String, NoWayHome> {
    if manifest.contains(name) {
        return Ok(name.to_string());
    }

    let path = resolve(name)?;
    if let Some(id) = manifest.find_by_symlink(&path) {
        return Ok(id.to_string());
    }

    Ok(path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| name.to_string()))
}

/// Check that an entry can be restored without surprises.
fn validate(entry: &Entry) -> Result<()> {
    if !is_symlink(&entry.symlink) {
        return Err(LinkError::NotASymlink {
            path: entry.symlink.clone(),
        });
    }

    if !exists(&entry.path) {
        return Err(LinkError::TargetMissing {
            path: entry.path.clone(),
        });
    }

    let target = read_link(&entry.symlink)
        .map(|target| link_target_from(&entry.symlink, target))
        .map_err(|err| LinkError::ReadSymlink {
            source: err,
            path: entry.symlink.clone(),
        })?;
    if target != entry.path {
        return Err(LinkError::PathMismatch {
            symlink: entry.symlink.clone(),
            target,
            expected: entry.path.clone(),
        });
    }

    Ok(())
}

fn restore(entry: &Entry) -> Result<()> {
    remove_file(&entry.symlink).map_err(|err| LinkError::RemoveSymlink {
        source: err,
        path: entry.symlink.clone(),
    })?;

    rename(&entry.path, &entry.symlink).map_err(|err| LinkError::Move {
        source: err,
        from: entry.path.clone(),
        to: entry.symlink.clone(),
    })
}

/// Attempt each restore step on its own, logging what fails.
fn restore_best_effort(entry: &Entry) {
    if is_symlink(&entry.symlink) {
        if let Err(error) = remove_file(&entry.symlink) {
            warn!(
                "ignoring failure to remove symlink {}: {error}",
                entry.symlink.display()
            );
        }
    }

    if !exists(&entry.path) {
        warn!("nothing to restore, {} is gone", entry.path.display());
        return;
    }

    if exists(&entry.symlink) {
        warn!(
            "not restoring {}, {} is occupied",
            entry.path.display(),
            entry.symlink.display()
        );
        return;
    }

    match rename(&entry.path, &entry.symlink) {
        Ok(()) => debug!(
            "restored {} to {}",
            entry.path.display(),
            entry.symlink.display()
        ),
        Err(error) => warn!(
            "ignoring failure to restore {}: {error}",
            entry.path.display()
        ),
    }
}

/// Create folder and any missing parents.
pub(crate) fn create_folder(path: &Path) -> Result<()> {
    info!("create folder {}", path.display());
    mkdirp::mkdirp(path).map_err(|err| LinkError::CreateFolder {
        source: err,
        path: path.to_path_buf(),
    })?;

    Ok(())
}

/// Something exists at path, without following a final symlink.
pub(crate) fn exists(path: &Path) -> bool {
    symlink_metadata(path).is_ok()
}

pub(crate) fn is_symlink(path: &Path) -> bool {
    symlink_metadata(path)
        .map(|meta| meta.file_type().is_symlink())
        .unwrap_or(false)
}

#[cfg(unix)]
pub(crate) fn symlink_file(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
pub(crate) fn symlink_file(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::windows::fs::symlink_file(target, link)
}

/// All possible error types for relocation.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    /// Source path has no basename to use as identifier.
    #[error("cannot determine file name of {path:?}")]
    NoFileName { path: PathBuf },

    /// Source basename would overwrite the manifest file.
    #[error("{path:?} is the manifest file and cannot be replaced by a dotfile")]
    ReservedName { path: PathBuf },

    /// Managed folder already has a file with the same name.
    #[error("file {path:?} already exists in managed folder")]
    AlreadyExists { path: PathBuf },

    /// Source is already a symlink, refusing to overwrite its target.
    #[error("{path:?} is already a symlink, refusing to overwrite managed file")]
    AlreadyLinked { path: PathBuf },

    /// Nothing tracked under identifier.
    #[error("no entry named {id:?} in manifest")]
    EntryNotFound { id: String },

    /// Original location is not a symlink.
    #[error("{path:?} is not a symlink")]
    NotASymlink { path: PathBuf },

    /// Backing file is missing from managed folder.
    #[error("symlink target {path:?} does not exist")]
    TargetMissing { path: PathBuf },

    /// Symlink resolves somewhere other than the recorded backing file.
    #[error("symlink {symlink:?} points to {target:?} instead of {expected:?}")]
    PathMismatch {
        symlink: PathBuf,
        target: PathBuf,
        expected: PathBuf,
    },

    /// Managed folder cannot be created.
    #[error("failed to create folder {path:?}")]
    CreateFolder {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// File cannot be moved.
    #[error("failed to move {from:?} to {to:?}")]
    Move {
        #[source]
        source: std::io::Error,
        from: PathBuf,
        to: PathBuf,
    },

    /// Symlink cannot be created.
    #[error("failed to link {link:?} to {target:?}")]
    CreateSymlink {
        #[source]
        source: std::io::Error,
        link: PathBuf,
        target: PathBuf,
    },

    /// Symlink target cannot be read.
    #[error("failed to read symlink {path:?}")]
    ReadSymlink {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Symlink cannot be removed.
    #[error("failed to remove symlink {path:?}")]
    RemoveSymlink {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Manifest cannot be read or updated.
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error(transparent)]
    NoWayHome(#[from] NoWayHome),
}

/// Friendly result alias :3
type Result<T, E = LinkError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::FixedAnswer;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;
    use std::{
        env::current_dir,
        fs::{create_dir, read_to_string, write},
    };

    struct Sandbox {
        root: PathBuf,
        folder: PathBuf,
        store: ManifestStore,
    }

    impl Sandbox {
        fn new() -> anyhow::Result<Self> {
            let root = current_dir()?;
            let folder = root.join("dotfiles");
            let store = ManifestStore::new(root.join("info.json"));
            Ok(Self {
                root,
                folder,
                store,
            })
        }

        fn relocator(&self, answer: bool) -> Relocator<FixedAnswer> {
            Relocator::new(&self.folder, self.store.clone(), FixedAnswer(answer))
        }

        fn dotfile(&self, name: &str, contents: &str) -> anyhow::Result<PathBuf> {
            let path = self.root.join(name);
            write(&path, contents)?;
            Ok(path)
        }
    }

    #[sealed_test]
    fn add_then_remove_restores_dotfile() -> anyhow::Result<()> {
        let sandbox = Sandbox::new()?;
        let zshrc = sandbox.dotfile(".zshrc", "export EDITOR=vim")?;
        let relocator = sandbox.relocator(true);

        let (id, entry) = relocator.add(&zshrc, false)?;
        assert_eq!(id, ".zshrc");
        assert_eq!(entry, Entry::new(&zshrc, sandbox.folder.join(".zshrc")));
        assert!(is_symlink(&zshrc));
        assert_eq!(read_link(&zshrc)?, sandbox.folder.join(".zshrc"));
        assert_eq!(sandbox.store.load()?.get(".zshrc"), Some(&entry));

        let removed = relocator.remove(&id, false)?;
        assert_eq!(removed, Some(entry));
        assert!(!is_symlink(&zshrc));
        assert_eq!(read_to_string(&zshrc)?, "export EDITOR=vim");
        assert!(!exists(&sandbox.folder.join(".zshrc")));
        assert!(sandbox.store.load()?.is_empty());

        Ok(())
    }

    #[sealed_test]
    fn add_refuses_existing_destination() -> anyhow::Result<()> {
        let sandbox = Sandbox::new()?;
        create_dir(&sandbox.folder)?;
        write(sandbox.folder.join(".vimrc"), "old")?;
        let vimrc = sandbox.dotfile(".vimrc", "new")?;

        let result = sandbox.relocator(true).add(&vimrc, false);
        assert!(matches!(result, Err(LinkError::AlreadyExists { .. })));
        assert!(!is_symlink(&vimrc));

        Ok(())
    }

    #[sealed_test]
    fn force_add_overwrites_plain_destination() -> anyhow::Result<()> {
        let sandbox = Sandbox::new()?;
        create_dir(&sandbox.folder)?;
        write(sandbox.folder.join(".vimrc"), "old")?;
        let vimrc = sandbox.dotfile(".vimrc", "new")?;

        sandbox.relocator(true).add(&vimrc, true)?;
        assert_eq!(read_to_string(sandbox.folder.join(".vimrc"))?, "new");
        assert!(is_symlink(&vimrc));

        Ok(())
    }

    #[sealed_test]
    fn force_add_refuses_symlinked_source() -> anyhow::Result<()> {
        let sandbox = Sandbox::new()?;
        let vimrc = sandbox.dotfile(".vimrc", "set number")?;
        let relocator = sandbox.relocator(true);
        relocator.add(&vimrc, false)?;

        let result = relocator.add(&vimrc, true);
        assert!(matches!(result, Err(LinkError::AlreadyLinked { .. })));
        assert_eq!(read_to_string(sandbox.folder.join(".vimrc"))?, "set number");

        Ok(())
    }

    #[sealed_test]
    fn declined_folder_creation_fails_move() -> anyhow::Result<()> {
        let sandbox = Sandbox::new()?;
        let gitconfig = sandbox.dotfile(".gitconfig", "[user]")?;

        let result = sandbox.relocator(false).add(&gitconfig, false);
        assert!(matches!(result, Err(LinkError::Move { .. })));
        assert!(!sandbox.folder.exists());
        assert_eq!(read_to_string(&gitconfig)?, "[user]");

        Ok(())
    }

    #[sealed_test]
    fn remove_unknown_entry() -> anyhow::Result<()> {
        let sandbox = Sandbox::new()?;
        sandbox.store.save(&Manifest::new())?;
        let relocator = sandbox.relocator(true);

        let result = relocator.remove("missing", false);
        assert!(matches!(result, Err(LinkError::EntryNotFound { .. })));
        assert_eq!(relocator.remove("missing", true)?, None);

        Ok(())
    }

    #[sealed_test]
    fn remove_rejects_repointed_symlink() -> anyhow::Result<()> {
        let sandbox = Sandbox::new()?;
        let tmux = sandbox.dotfile(".tmux.conf", "set -g mouse on")?;
        let relocator = sandbox.relocator(true);
        relocator.add(&tmux, false)?;

        let elsewhere = sandbox.dotfile("elsewhere", "")?;
        remove_file(&tmux)?;
        symlink_file(&elsewhere, &tmux)?;

        let result = relocator.remove(".tmux.conf", false);
        assert!(matches!(result, Err(LinkError::PathMismatch { .. })));
        assert!(sandbox.store.load()?.contains(".tmux.conf"));

        Ok(())
    }

    #[sealed_test]
    fn remove_rejects_plain_file_and_missing_target() -> anyhow::Result<()> {
        let sandbox = Sandbox::new()?;
        let bashrc = sandbox.dotfile(".bashrc", "")?;
        let inputrc = sandbox.root.join(".inputrc");
        symlink_file(&sandbox.root.join("gone"), &inputrc)?;
        sandbox.store.save(&Manifest::from_iter([
            (".bashrc".to_string(), Entry::new(&bashrc, sandbox.folder.join(".bashrc"))),
            (".inputrc".to_string(), Entry::new(&inputrc, sandbox.root.join("gone"))),
        ]))?;
        let relocator = sandbox.relocator(true);

        let result = relocator.remove(".bashrc", false);
        assert!(matches!(result, Err(LinkError::NotASymlink { .. })));

        let result = relocator.remove(".inputrc", false);
        assert!(matches!(result, Err(LinkError::TargetMissing { .. })));
        assert_eq!(sandbox.store.load()?.len(), 2);

        Ok(())
    }

    #[sealed_test]
    fn forced_remove_drops_broken_entry() -> anyhow::Result<()> {
        let sandbox = Sandbox::new()?;
        let inputrc = sandbox.root.join(".inputrc");
        sandbox.store.save(&Manifest::from_iter([(
            ".inputrc".to_string(),
            Entry::new(&inputrc, sandbox.folder.join(".inputrc")),
        )]))?;

        let removed = sandbox.relocator(true).remove(".inputrc", true)?;
        assert!(removed.is_some());
        assert!(sandbox.store.load()?.is_empty());

        Ok(())
    }

    #[sealed_test]
    fn lookup_by_identifier_symlink_or_basename() -> anyhow::Result<()> {
        let root = current_dir()?;
        let manifest = Manifest::from_iter([(
            "zsh".to_string(),
            Entry::new(root.join(".zshrc"), root.join("dotfiles/.zshrc")),
        )]);

        assert_eq!(lookup_id(&manifest, "zsh")?, "zsh");
        let by_path = root.join(".zshrc");
        assert_eq!(lookup_id(&manifest, &by_path.to_string_lossy())?, "zsh");
        assert_eq!(lookup_id(&manifest, "/nowhere/.vimrc")?, ".vimrc");

        Ok(())
    }

    #[sealed_test]
    fn forced_remove_restores_when_symlink_is_gone() -> anyhow::Result<()> {
        let sandbox = Sandbox::new()?;
        let zshrc = sandbox.dotfile(".zshrc", "export EDITOR=vim")?;
        let relocator = sandbox.relocator(true);
        relocator.add(&zshrc, false)?;
        remove_file(&zshrc)?;

        assert!(relocator.remove(".zshrc", true)?.is_some());
        assert!(!is_symlink(&zshrc));
        assert_eq!(read_to_string(&zshrc)?, "export EDITOR=vim");
        assert!(!exists(&sandbox.folder.join(".zshrc")));
        assert!(sandbox.store.load()?.is_empty());

        Ok(())
    }

    #[sealed_test]
    fn forced_remove_keeps_file_occupying_symlink() -> anyhow::Result<()> {
        let sandbox = Sandbox::new()?;
        let zshrc = sandbox.dotfile(".zshrc", "managed")?;
        let relocator = sandbox.relocator(true);
        relocator.add(&zshrc, false)?;
        remove_file(&zshrc)?;
        write(&zshrc, "handwritten")?;

        relocator.remove(".zshrc", true)?;
        assert_eq!(read_to_string(&zshrc)?, "handwritten");
        assert_eq!(read_to_string(sandbox.folder.join(".zshrc"))?, "managed");

        Ok(())
    }

    #[sealed_test]
    fn force_add_never_replaces_manifest() -> anyhow::Result<()> {
        let root = current_dir()?;
        let folder = root.join("dotfiles");
        let store = ManifestStore::new(folder.join("info.json"));
        let relocator = Relocator::new(&folder, store.clone(), FixedAnswer(true));
        let zshrc = root.join(".zshrc");
        write(&zshrc, "")?;
        relocator.add(&zshrc, false)?;

        create_dir(root.join("other"))?;
        let impostor = root.join("other/info.json");
        write(&impostor, "not a manifest")?;

        let result = relocator.add(&impostor, true);
        assert!(matches!(result, Err(LinkError::ReservedName { .. })));
        assert_eq!(read_to_string(&impostor)?, "not a manifest");
        assert!(store.load()?.contains(".zshrc"));

        Ok(())
    }

    #[sealed_test]
    fn relative_source_is_taken_from_home() -> anyhow::Result<()> {
        let sandbox = Sandbox::new()?;
        std::env::set_var("HOME", &sandbox.root);
        let profile = sandbox.dotfile(".profile", "umask 022")?;

        let (id, entry) = sandbox.relocator(true).add(".profile", false)?;
        assert_eq!(id, ".profile");
        assert_eq!(entry.symlink, profile);
        assert!(is_symlink(&profile));

        Ok(())
    }
}
