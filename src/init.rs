// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Managed folder initialization.
//!
//! Prepares a managed folder on a new machine, or points an existing one at
//! a different remote:
//!
//! - Create the folder if it is missing.
//! - Turn it into a git work tree with `origin` set to the requested remote,
//!   fetching and checking out the requested branch when starting fresh.
//! - Recreate the symlinks of every dotfile tracked by the manifest.
//! - Write the configuration so later commands use this folder.
//!
//! Every step that changes something asks first.

use crate::{
    config::{save_config, Config, ConfigError},
    link::{create_folder, exists, is_symlink, symlink_file, LinkError},
    manifest::{Manifest, ManifestError, ManifestStore},
    path::link_target_from,
    prompt::{InquirePrompt, Prompt},
    vcs::{GitBinary, GitCommand, Vcs, VcsError},
};

use std::{
    fs::read_link,
    path::{Path, PathBuf},
};
use tracing::{debug, info, instrument, warn};

/// Default branch to check out when starting fresh.
pub const DEFAULT_BRANCH: &str = "main";

/// Set up managed folder, its repository, and its symlinks.
#[derive(Debug)]
pub struct Initializer<V = GitBinary, P = InquirePrompt>
where
    V: Vcs,
    P: Prompt,
{
    config: Config,
    config_path: PathBuf,
    vcs: V,
    prompt: P,
}

impl<V, P> Initializer<V, P>
where
    V: Vcs,
    P: Prompt,
{
    /// Construct new initializer.
    ///
    /// The configuration is written to `config_path` once initialization
    /// finishes.
    pub fn new(config: Config, config_path: impl Into<PathBuf>, vcs: V, prompt: P) -> Self {
        Self {
            config,
            config_path: config_path.into(),
            vcs,
            prompt,
        }
    }

    /// Initialize managed folder against remote repository.
    ///
    /// # Errors
    ///
    /// - Return [`InitError::RepositoryMissing`] if `repository` is empty.
    /// - Return [`InitError::BackingFileMissing`] if a tracked dotfile has no
    ///   backing file to link to.
    /// - Return [`InitError::Relink`] if some symlinks cannot be created.
    /// - Return [`InitError::Vcs`] if a git step fails.
    /// - Return [`InitError::Link`], [`InitError::Manifest`], or
    ///   [`InitError::Config`] if file system work fails.
    #[instrument(skip(self), level = "debug")]
    pub fn init(&self, repository: &str, branch: &str, force: bool) -> Result<()> {
        let folder = self.config.repo_path.as_path();
        if !folder.exists() {
            let message = format!("Folder {} does not exist, create it?", folder.display());
            if self.prompt.confirm(&message) {
                create_folder(folder)?;
            } else {
                warn!("not creating folder {}", folder.display());
            }
        }

        let repository = repository.trim();
        if repository.is_empty() {
            return Err(InitError::RepositoryMissing);
        }

        if self.vcs.detect_repo()?.success() {
            self.align_remote(repository, force)?;
        } else {
            self.start_fresh(repository, branch)?;
        }

        let store = ManifestStore::new(&self.config.info_path);
        if store.exists() && self.prompt.confirm("Recreate symlinks of tracked dotfiles?") {
            relink(&store.load()?)?;
            info!("symlinks recreated");
        }

        if !store.exists() {
            debug!("create empty manifest at {}", store.path().display());
            store.save(&Manifest::new())?;
        }

        save_config(&self.config_path, &self.config)?;
        info!("configuration written to {}", self.config_path.display());

        Ok(())
    }

    /// Folder is not a work tree yet: init, add remote, then pull a branch.
    fn start_fresh(&self, repository: &str, branch: &str) -> Result<()> {
        let message = format!(
            "{} is not a git repository, initialize it?",
            self.config.repo_path.display()
        );
        if !self.prompt.confirm(&message) {
            warn!("leaving {} without git", self.config.repo_path.display());
            return Ok(());
        }

        self.vcs.init()?.ensure_success(&GitCommand::Init)?;
        info!("initialized {}", self.config.repo_path.display());

        if self.ensure_remote(repository)?.is_none() {
            return Ok(());
        }

        if !self.prompt.confirm("Fetch, checkout, and pull from remote?") {
            return Ok(());
        }

        self.vcs.fetch()?.ensure_success(&GitCommand::Fetch)?;
        self.vcs
            .checkout_tracking(branch)?
            .ensure_success(&GitCommand::CheckoutTracking {
                branch: branch.into(),
            })?;
        self.vcs
            .pull()?
            .ensure_success(&GitCommand::PullFastForward)?;
        info!("downloaded {branch} from {repository}");

        Ok(())
    }

    /// Folder is already a work tree: make sure `origin` is the repository.
    fn align_remote(&self, repository: &str, force: bool) -> Result<()> {
        let Some(current) = self.vcs.remote_url()? else {
            self.ensure_remote(repository)?;
            return Ok(());
        };

        if same_remote(&current, repository) {
            info!("folder already initialized to {current}");
            return Ok(());
        }

        if !force {
            warn!("remote is {current}, not {repository}, use force to change it");
            return Ok(());
        }

        let message = format!("Remote is {current}, change it to {repository}?");
        if self.prompt.confirm(&message) {
            self.vcs
                .set_remote_url(repository)?
                .ensure_success(&GitCommand::SetRemoteUrl {
                    url: repository.into(),
                })?;
            info!("remote changed to {repository}");
        }

        Ok(())
    }

    /// Return remote URL, adding the remote first if missing and allowed.
    fn ensure_remote(&self, repository: &str) -> Result<Option<String>> {
        if let Some(url) = self.vcs.remote_url()? {
            return Ok(Some(url));
        }

        if !self
            .prompt
            .confirm("Folder has no remote, add the remote repository?")
        {
            return Ok(None);
        }

        self.vcs
            .add_remote(repository)?
            .ensure_success(&GitCommand::AddRemote {
                url: repository.into(),
            })?;

        Ok(self.vcs.remote_url()?)
    }
}

/// Create symlink for every tracked dotfile.
///
/// Links already pointing to their backing file are left alone. Aborts on the
/// first missing backing file. Other failures are collected and reported
/// together once every entry has been tried.
///
/// # Errors
///
/// - Return [`InitError::BackingFileMissing`] if a backing file is gone.
/// - Return [`InitError::Relink`] if one or more symlinks fail.
pub fn relink(manifest: &Manifest) -> Result<()> {
    let mut failures = Vec::new();
    for (id, entry) in manifest {
        if !exists(&entry.path) {
            return Err(InitError::BackingFileMissing {
                path: entry.path.clone(),
            });
        }

        if points_to(&entry.symlink, &entry.path) {
            debug!("{id} already linked");
            continue;
        }

        if let Err(error) = symlink_file(&entry.path, &entry.symlink) {
            failures.push(format!("{}: {error}", entry.symlink.display()));
        }
    }

    if !failures.is_empty() {
        return Err(InitError::Relink { failures });
    }

    Ok(())
}

fn points_to(link: &Path, target: &Path) -> bool {
    is_symlink(link)
        && read_link(link)
            .map(|raw| link_target_from(link, raw) == target)
            .unwrap_or(false)
}

/// Check if two remote URLs name the same repository.
///
/// SSH and HTTPS forms of the same host and path are equal, and a `.git`
/// suffix or trailing slash does not matter.
pub fn same_remote(left: &str, right: &str) -> bool {
    normalize_remote(left) == normalize_remote(right)
}

fn normalize_remote(url: &str) -> String {
    let url = url.trim().trim_end_matches('/');
    let url = url.strip_suffix(".git").unwrap_or(url);

    let location = match url.split_once("://") {
        Some((_, rest)) => rest,
        // INVARIANT: scp-like syntax is `[user@]host:path`.
        None => match url.split_once(':') {
            Some((host, path)) => return join_location(host, path),
            None => url,
        },
    };

    match location.split_once('/') {
        Some((host, path)) => join_location(host, path),
        None => location.to_string(),
    }
}

fn join_location(host: &str, path: &str) -> String {
    let host = host.rsplit('@').next().unwrap_or(host);
    let host = host.split(':').next().unwrap_or(host);
    format!(
        "{}/{}",
        host.to_ascii_lowercase(),
        path.trim_start_matches('/')
    )
}

/// All possible error types for initialization.
#[derive(Debug, thiserror::Error)]
pub enum InitError {
    /// No remote repository was given.
    #[error("repository is empty")]
    RepositoryMissing,

    /// Tracked dotfile has nothing to link to.
    #[error("file {path:?} does not exist")]
    BackingFileMissing { path: PathBuf },

    /// Some symlinks could not be created.
    #[error("could not create symlinks: {}", .failures.join("; "))]
    Relink { failures: Vec<String> },

    #[error(transparent)]
    Link(#[from] LinkError),

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Vcs(#[from] VcsError),
}

/// Friendly result alias :3
type Result<T, E = InitError> = std::result::Result<T, E>;
