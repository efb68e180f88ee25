// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Version control port.
//!
//! Dotlink never speaks any remote protocol itself. Everything that touches
//! the repository behind the managed folder goes through the small set of
//! [`GitCommand`]s defined here. The [`Vcs`] trait is the seam: [`GitBinary`]
//! runs the external `git` binary, while tests plug in a fake that records
//! calls.
//!
//! Exit codes and captured output are the whole contract. The adapter does
//! not interpret them, that is left to callers like
//! [`RepoSync`](crate::sync::RepoSync).

use std::{
    ffi::OsString,
    fmt::{Display, Formatter, Result as FmtResult},
    path::{Path, PathBuf},
    process::Command,
};
use tracing::{debug, instrument};

/// Name of the remote every operation works against.
pub const REMOTE: &str = "origin";

/// Logical git operations dotlink relies on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GitCommand {
    /// Probe whether the folder is inside of a work tree.
    DetectRepo,

    /// Working tree status in porcelain form.
    Status,

    /// Stage every change, including deletions.
    StageAll,

    /// Check for staged changes. Exit code 1 means there is a diff.
    StagedDiff,

    /// Commit staged changes with message.
    Commit { message: String },

    Push,

    /// Pull that refuses to create merge commits.
    PullFastForward,

    /// URL of the remote.
    RemoteUrl,

    AddRemote { url: String },

    SetRemoteUrl { url: String },

    Fetch,

    /// Create local branch tracking its remote counterpart.
    CheckoutTracking { branch: String },

    Init,
}

impl GitCommand {
    /// Arguments passed to git after the working directory flag.
    pub fn args(&self) -> Vec<OsString> {
        let args: Vec<&str> = match self {
            Self::DetectRepo => vec!["rev-parse", "--is-inside-work-tree"],
            Self::Status => vec!["status", "--porcelain"],
            Self::StageAll => vec!["add", "-A"],
            Self::StagedDiff => vec!["diff", "--cached", "--quiet"],
            Self::Commit { message } => vec!["commit", "-m", message.as_str()],
            Self::Push => vec!["push"],
            Self::PullFastForward => vec!["pull", "--ff-only"],
            Self::RemoteUrl => vec!["remote", "get-url", REMOTE],
            Self::AddRemote { url } => vec!["remote", "add", REMOTE, url.as_str()],
            Self::SetRemoteUrl { url } => vec!["remote", "set-url", REMOTE, url.as_str()],
            Self::Fetch => vec!["fetch", REMOTE],
            Self::CheckoutTracking { branch } => {
                return ["checkout", "-b", branch.as_str(), "--track"]
                    .into_iter()
                    .map(OsString::from)
                    .chain([OsString::from(format!("{REMOTE}/{branch}"))])
                    .collect();
            }
            Self::Init => vec!["init"],
        };

        args.into_iter().map(OsString::from).collect()
    }
}

impl Display for GitCommand {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        let args = self
            .args()
            .iter()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join(" ");
        write!(fmt, "git {args}")
    }
}

/// Result of a finished git invocation.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct GitOutput {
    /// Process exit code, or -1 if the process was killed by a signal.
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl GitOutput {
    /// Construct output with exit code only.
    pub fn with_code(code: i32) -> Self {
        Self {
            code,
            ..Self::default()
        }
    }

    /// Construct successful output carrying standard output.
    pub fn with_stdout(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            ..Self::default()
        }
    }

    pub fn success(&self) -> bool {
        self.code == 0
    }

    /// Turn a non-zero exit code into [`VcsError::Failed`].
    ///
    /// # Errors
    ///
    /// - Return [`VcsError::Failed`] if the command did not succeed.
    pub fn ensure_success(self, command: &GitCommand) -> Result<Self> {
        if self.success() {
            return Ok(self);
        }

        Err(VcsError::Failed {
            command: command.to_string(),
            code: self.code,
            stderr: self.stderr.trim().to_string(),
        })
    }

    /// Non-blank lines of standard output.
    pub fn lines(&self) -> Vec<String> {
        self.stdout
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(ToString::to_string)
            .collect()
    }
}

/// Layer of indirection for version control access.
pub trait Vcs {
    /// Run a git command to completion.
    ///
    /// # Errors
    ///
    /// - Return [`VcsError::Spawn`] if the command cannot be run at all.
    ///   A non-zero exit code is not an error.
    fn run(&self, command: GitCommand) -> Result<GitOutput>;

    fn detect_repo(&self) -> Result<GitOutput> {
        self.run(GitCommand::DetectRepo)
    }

    fn status(&self) -> Result<GitOutput> {
        self.run(GitCommand::Status)
    }

    fn stage_all(&self) -> Result<GitOutput> {
        self.run(GitCommand::StageAll)
    }

    fn staged_diff(&self) -> Result<GitOutput> {
        self.run(GitCommand::StagedDiff)
    }

    fn commit(&self, message: &str) -> Result<GitOutput> {
        self.run(GitCommand::Commit {
            message: message.into(),
        })
    }

    fn push(&self) -> Result<GitOutput> {
        self.run(GitCommand::Push)
    }

    fn pull(&self) -> Result<GitOutput> {
        self.run(GitCommand::PullFastForward)
    }

    /// Remote URL, or `None` if no remote is configured.
    fn remote_url(&self) -> Result<Option<String>> {
        let output = self.run(GitCommand::RemoteUrl)?;
        let url = output.stdout.trim();
        if !output.success() || url.is_empty() {
            return Ok(None);
        }

        Ok(Some(url.to_string()))
    }

    fn add_remote(&self, url: &str) -> Result<GitOutput> {
        self.run(GitCommand::AddRemote { url: url.into() })
    }

    fn set_remote_url(&self, url: &str) -> Result<GitOutput> {
        self.run(GitCommand::SetRemoteUrl { url: url.into() })
    }

    fn fetch(&self) -> Result<GitOutput> {
        self.run(GitCommand::Fetch)
    }

    fn checkout_tracking(&self, branch: &str) -> Result<GitOutput> {
        self.run(GitCommand::CheckoutTracking {
            branch: branch.into(),
        })
    }

    fn init(&self) -> Result<GitOutput> {
        self.run(GitCommand::Init)
    }
}

impl<V> Vcs for &V
where
    V: Vcs + ?Sized,
{
    fn run(&self, command: GitCommand) -> Result<GitOutput> {
        (**self).run(command)
    }
}

/// Version control access through the external git binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitBinary {
    program: OsString,
    work_dir: PathBuf,
}

impl GitBinary {
    /// Construct git adapter that operates on target folder.
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            program: "git".into(),
            work_dir: work_dir.into(),
        }
    }

    /// Use a different git executable.
    pub fn with_program(mut self, program: impl Into<OsString>) -> Self {
        self.program = program.into();
        self
    }

    pub fn work_dir(&self) -> &Path {
        self.work_dir.as_path()
    }
}

impl Vcs for GitBinary {
    #[instrument(skip(self), level = "debug")]
    fn run(&self, command: GitCommand) -> Result<GitOutput> {
        let output = Command::new(&self.program)
            .arg("-C")
            .arg(&self.work_dir)
            .args(command.args())
            .output()
            .map_err(|err| VcsError::Spawn {
                source: err,
                command: command.to_string(),
            })?;

        let output = GitOutput {
            code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(output.stdout.as_slice()).into_owned(),
            stderr: String::from_utf8_lossy(output.stderr.as_slice()).into_owned(),
        };
        debug!("{command} exited with {}", output.code);

        Ok(output)
    }
}

/// Version control error types.
#[derive(Debug, thiserror::Error)]
pub enum VcsError {
    /// Git process could not be started or waited on.
    #[error("failed to run {command:?}")]
    Spawn {
        #[source]
        source: std::io::Error,
        command: String,
    },

    /// Git exited with failure.
    #[error("{command:?} failed with exit code {code}: {stderr}")]
    Failed {
        command: String,
        code: i32,
        stderr: String,
    },
}

/// Friendly result alias :3
type Result<T, E = VcsError> = std::result::Result<T, E>;
