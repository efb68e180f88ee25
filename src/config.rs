// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration layout.
//!
//! Dotlink reads one small YAML file at startup. It names the managed folder
//! where relocated dotfiles live, and the manifest file that tracks them:
//!
//! ```yaml
//! repo_path: ~/dotfiles
//! info_path: ~/dotfiles/info.json
//! ```
//!
//! Both values go through shell expansion when parsed, and are then resolved
//! into absolute paths. Serialization writes them back in `~` relative form.

use crate::path::{resolve, shrink, NoWayHome};

use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Error as FmtError, Formatter, Result as FmtResult},
    fs::{read_to_string, write},
    io::ErrorKind,
    path::{Path, PathBuf},
    str::FromStr,
};
use tracing::{debug, instrument};

/// Process wide configuration.
///
/// Loaded once, then handed to each component that needs it.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Config {
    /// Managed folder that relocated dotfiles are moved into.
    pub repo_path: PathBuf,

    /// Manifest file tracking every relocated dotfile.
    pub info_path: PathBuf,
}

impl Config {
    /// Construct configuration for a managed folder.
    ///
    /// The manifest is placed at `info.json` inside of the managed folder.
    pub fn for_folder(repo_path: impl Into<PathBuf>) -> Self {
        let repo_path = repo_path.into();
        let info_path = repo_path.join("info.json");
        Self {
            repo_path,
            info_path,
        }
    }

    /// Default configuration: `~/dotfiles` with `~/dotfiles/info.json`.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::NoWayHome`] if home directory cannot be found.
    pub fn try_default() -> Result<Self> {
        Ok(Self::for_folder(resolve("~/dotfiles")?))
    }
}

impl FromStr for Config {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let layout: ConfigLayout = serde_yaml::from_str(data).map_err(ConfigError::Deserialize)?;

        // INVARIANT: Perform shell expansion before path resolution.
        let repo_path = shellexpand::full(&layout.repo_path)?;
        let info_path = match layout.info_path {
            Some(info_path) => resolve(&*shellexpand::full(&info_path)?)?,
            None => resolve(&*repo_path)?.join("info.json"),
        };

        Ok(Self {
            repo_path: resolve(&*repo_path)?,
            info_path,
        })
    }
}

impl Display for Config {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(
            serde_yaml::to_string(&ConfigLayout::from(self))
                .map_err(ConfigError::Serialize)?
                .as_str(),
        )
    }
}

/// On-disk layout of the configuration file.
#[derive(Debug, Deserialize, Serialize)]
struct ConfigLayout {
    repo_path: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    info_path: Option<String>,
}

impl From<&Config> for ConfigLayout {
    fn from(config: &Config) -> Self {
        Self {
            repo_path: shrink(&config.repo_path).to_string_lossy().into_owned(),
            info_path: Some(shrink(&config.info_path).to_string_lossy().into_owned()),
        }
    }
}

/// Read configuration file at target path.
///
/// # Errors
///
/// - Return [`ConfigError::NotFound`] if the file does not exist.
/// - Return [`ConfigError::Read`] if the file cannot be read.
/// - Return [`ConfigError::Deserialize`] if the file is not valid YAML.
#[instrument(skip(path), level = "debug")]
pub fn load_config(path: impl AsRef<Path>) -> Result<Config> {
    let path = path.as_ref();
    debug!("read configuration from {}", path.display());
    let data = read_to_string(path).map_err(|err| match err.kind() {
        ErrorKind::NotFound => ConfigError::NotFound {
            path: path.to_path_buf(),
        },
        _ => ConfigError::Read {
            source: err,
            path: path.to_path_buf(),
        },
    })?;

    data.parse()
}

/// Write configuration file to target path.
///
/// # Errors
///
/// - Return [`ConfigError::Serialize`] if configuration cannot be serialized.
/// - Return [`ConfigError::Write`] if the file cannot be written.
#[instrument(skip(path, config), level = "debug")]
pub fn save_config(path: impl AsRef<Path>, config: &Config) -> Result<()> {
    let path = path.as_ref();
    debug!("write configuration to {}", path.display());
    let data =
        serde_yaml::to_string(&ConfigLayout::from(config)).map_err(ConfigError::Serialize)?;

    write(path, data).map_err(|err| ConfigError::Write {
        source: err,
        path: path.to_path_buf(),
    })
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Configuration file does not exist.
    #[error("configuration file {path:?} not found")]
    NotFound { path: PathBuf },

    /// Configuration file cannot be read.
    #[error("failed to read configuration file {path:?}")]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Configuration file cannot be written.
    #[error("failed to write configuration file {path:?}")]
    Write {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Failed to deserialize configuration.
    #[error("failed to parse configuration")]
    Deserialize(#[source] serde_yaml::Error),

    /// Failed to serialize configuration.
    #[error("failed to serialize configuration")]
    Serialize(#[source] serde_yaml::Error),

    /// Failed to perform shell expansion on configuration.
    #[error(transparent)]
    ShellExpansion(#[from] shellexpand::LookupError<std::env::VarError>),

    /// Home directory is needed to resolve configured paths.
    #[error(transparent)]
    NoWayHome(#[from] NoWayHome),
}

impl From<ConfigError> for FmtError {
    fn from(_: ConfigError) -> Self {
        FmtError
    }
}

/// Friendly result alias :3
type Result<T, E = ConfigError> = std::result::Result<T, E>;
