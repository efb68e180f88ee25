// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Dotfile relocation and synchronization.
//!
//! Dotlink moves dotfiles out of their usual locations into one __managed
//! folder__, leaving a symlink behind at each original location. A JSON
//! __manifest__ inside of the managed folder remembers where every dotfile
//! came from, and whether its symlink is still healthy. The managed folder
//! is an ordinary git work tree, so it can be uploaded to and downloaded from
//! a remote with the external git binary.
//!
//! # Layout
//!
//! - [`path`]: `~` expansion and contraction.
//! - [`config`]: where the managed folder and manifest live.
//! - [`manifest`]: manifest model and its JSON store.
//! - [`link`]: relocate a dotfile in, or restore it back out.
//! - [`status`]: health checks and folder listing.
//! - [`sync`]: upload and download through git.
//! - [`init`]: prepare a managed folder on a new machine.
//! - [`vcs`]: the git port everything above talks through.
//! - [`prompt`]: yes or no confirmations.

pub mod config;
pub mod init;
pub mod link;
pub mod manifest;
pub mod path;
pub mod prompt;
pub mod status;
pub mod sync;
pub mod vcs;

#[doc(inline)]
pub use config::Config;
#[doc(inline)]
pub use init::Initializer;
#[doc(inline)]
pub use link::Relocator;
#[doc(inline)]
pub use manifest::{Entry, Manifest, ManifestStore};
#[doc(inline)]
pub use status::StatusChecker;
#[doc(inline)]
pub use sync::{RepoSync, SyncOptions, SyncOutcome};
