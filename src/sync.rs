// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Managed folder synchronization.
//!
//! The managed folder is expected to be a git work tree with a configured
//! remote. Synchronization walks through a fixed sequence of git operations:
//!
//! 1. Confirm the folder is a work tree.
//! 2. Collect pending changes. No changes means there is nothing to do.
//! 3. Dry run: report the pending changes and stop.
//! 4. Upload: stage everything, commit if the staged diff is non-empty, then
//!    push.
//! 5. Download: if the tree is still dirty, ask before pulling. Pull only
//!    fast-forwards.
//!
//! Upload always finishes, or fails, before download starts. A failed push
//! aborts the whole run, so nothing is ever pulled on top of unpushed work.

use crate::{
    prompt::{InquirePrompt, Prompt},
    vcs::{GitBinary, GitCommand, Vcs, VcsError},
};

use std::path::{Path, PathBuf};
use tracing::{info, instrument, warn};

/// Commit message used for every sync commit.
pub const COMMIT_MESSAGE: &str = "dotlink sync";

/// Which parts of a sync to perform.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncOptions {
    dry_run: bool,
    download: bool,
    upload: bool,
}

impl SyncOptions {
    /// Construct sync options.
    ///
    /// A dry run never uploads or downloads, whatever the other flags say.
    pub fn new(dry_run: bool, download: bool, upload: bool) -> Self {
        Self {
            dry_run,
            download: download && !dry_run,
            upload: upload && !dry_run,
        }
    }

    pub fn dry_run(&self) -> bool {
        self.dry_run
    }

    pub fn download(&self) -> bool {
        self.download
    }

    pub fn upload(&self) -> bool {
        self.upload
    }
}

/// How a sync run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Working tree was clean, nothing happened.
    NoChanges,

    /// Pending changes were listed, nothing was touched.
    DryRun { changes: Vec<String> },

    /// Requested steps ran to completion.
    Synced {
        changes: Vec<String>,
        committed: bool,
        pushed: bool,
        pulled: bool,
    },
}

/// Synchronize managed folder with its remote.
#[derive(Debug)]
pub struct RepoSync<V = GitBinary, P = InquirePrompt>
where
    V: Vcs,
    P: Prompt,
{
    repo_path: PathBuf,
    vcs: V,
    prompt: P,
}

impl<V, P> RepoSync<V, P>
where
    V: Vcs,
    P: Prompt,
{
    /// Construct new synchronizer for managed folder at target path.
    pub fn new(repo_path: impl Into<PathBuf>, vcs: V, prompt: P) -> Self {
        Self {
            repo_path: repo_path.into(),
            vcs,
            prompt,
        }
    }

    pub fn repo_path(&self) -> &Path {
        self.repo_path.as_path()
    }

    /// Run one synchronization pass.
    ///
    /// # Errors
    ///
    /// - Return [`SyncError::NotARepository`] if the folder is not a work tree.
    /// - Return [`SyncError::DiffCheckFailed`] if the staged diff check exits
    ///   with anything other than 0 or 1.
    /// - Return [`SyncError::AbortedByUser`] if the user declines pulling into
    ///   a dirty tree.
    /// - Return [`SyncError::Vcs`] if git cannot be run, or any other git
    ///   step fails.
    #[instrument(skip(self), level = "debug")]
    pub fn sync(&self, options: SyncOptions) -> Result<SyncOutcome> {
        if !self.vcs.detect_repo()?.success() {
            return Err(SyncError::NotARepository {
                path: self.repo_path.clone(),
            });
        }
        info!("repository detected at {}", self.repo_path.display());

        let changes = self.pending_changes()?;
        if changes.is_empty() {
            info!("no changes detected");
            return Ok(SyncOutcome::NoChanges);
        }

        if options.dry_run() {
            info!("[dry-run] following files would be staged and committed with message {COMMIT_MESSAGE:?}:");
            log_changes(&changes);
            return Ok(SyncOutcome::DryRun { changes });
        }

        let mut committed = false;
        let mut pushed = false;
        if options.upload() {
            info!("following files will be committed and pushed:");
            log_changes(&changes);
            committed = self.upload()?;
            pushed = true;
        }

        let mut pulled = false;
        if options.download() {
            self.download()?;
            pulled = true;
        }

        Ok(SyncOutcome::Synced {
            changes,
            committed,
            pushed,
            pulled,
        })
    }

    fn pending_changes(&self) -> Result<Vec<String>> {
        let status = self.vcs.status()?.ensure_success(&GitCommand::Status)?;

        Ok(status.lines())
    }

    /// Stage, commit, and push. Returns whether a commit was made.
    fn upload(&self) -> Result<bool> {
        self.vcs
            .stage_all()?
            .ensure_success(&GitCommand::StageAll)?;

        let committed = match self.vcs.staged_diff()?.code {
            1 => {
                self.vcs
                    .commit(COMMIT_MESSAGE)?
                    .ensure_success(&GitCommand::Commit {
                        message: COMMIT_MESSAGE.into(),
                    })?;
                true
            }
            0 => {
                info!("nothing staged to commit");
                false
            }
            code => return Err(SyncError::DiffCheckFailed { code }),
        };

        self.vcs.push()?.ensure_success(&GitCommand::Push)?;
        info!("changes pushed");

        Ok(committed)
    }

    fn download(&self) -> Result<()> {
        if !self.pending_changes()?.is_empty() {
            warn!("local changes detected, pull may fail or cause conflicts");
            if !self
                .prompt
                .confirm("Local changes detected, pull may fail or cause conflicts. Continue?")
            {
                return Err(SyncError::AbortedByUser);
            }
        }

        self.vcs
            .pull()?
            .ensure_success(&GitCommand::PullFastForward)?;
        info!("changes pulled");

        Ok(())
    }
}

fn log_changes(changes: &[String]) {
    for change in changes {
        info!("{change}");
    }
}

/// All possible error types for synchronization.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Managed folder is not a git work tree.
    #[error("not a git repository: {path:?}")]
    NotARepository { path: PathBuf },

    /// Staged diff check ended with unexpected exit code.
    #[error("git diff failed with exit code {code}")]
    DiffCheckFailed { code: i32 },

    /// User declined pulling into a dirty working tree.
    #[error("aborting download of changes from git")]
    AbortedByUser,

    /// Git could not be run, or a git step exited with failure.
    #[error(transparent)]
    Vcs(#[from] VcsError),
}

/// Friendly result alias :3
type Result<T, E = SyncError> = std::result::Result<T, E>;
