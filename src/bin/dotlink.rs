// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use dotlink::{
    config::{load_config, save_config, Config, ConfigError},
    init::{Initializer, DEFAULT_BRANCH},
    link::{lookup_id, Relocator},
    manifest::ManifestStore,
    path::{default_config_path, resolve},
    prompt::InquirePrompt,
    status::{list, Listing, StatusChecker},
    sync::{RepoSync, SyncOptions, SyncOutcome},
    vcs::GitBinary,
};

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::{
    path::{Path, PathBuf},
    process::exit,
};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Parser)]
#[command(
    about,
    override_usage = "dotlink [options] <dotlink-command>",
    subcommand_help_heading = "Commands",
    version
)]
struct Cli {
    /// Show debug logs.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to configuration file.
    #[arg(short, long, global = true, env = "DOTLINK_CONFIG_PATH", value_name = "path")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    fn run(self) -> Result<()> {
        let config_path = match self.config {
            Some(path) => resolve(path)?,
            None => default_config_path()?,
        };

        match self.command {
            Command::Add(opts) => run_add(read_config(&config_path)?, opts),
            Command::Remove(opts) => run_remove(read_config(&config_path)?, opts),
            Command::List => run_list(read_config(&config_path)?),
            Command::Status => run_status(read_config(&config_path)?),
            Command::Sync(opts) => run_sync(read_config(&config_path)?, opts),
            Command::Init(opts) => run_init(config_path, opts),
        }
    }
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Move dotfile into managed folder and leave symlink behind.
    #[command(override_usage = "dotlink add [options] <file>")]
    Add(AddOptions),

    /// Restore dotfile from managed folder to its original location.
    #[command(override_usage = "dotlink remove [options] <file>")]
    Remove(RemoveOptions),

    /// List files in managed folder against tracked dotfiles.
    List,

    /// Check health of every tracked dotfile.
    Status,

    /// Upload and download managed folder through git.
    #[command(override_usage = "dotlink sync [options]")]
    Sync(SyncCliOptions),

    /// Prepare managed folder, its remote, and its symlinks.
    #[command(override_usage = "dotlink init [options]")]
    Init(InitOptions),
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct AddOptions {
    /// Dotfile to relocate.
    #[arg(required = true, value_name = "file")]
    pub file: PathBuf,

    /// Replace file of the same name already in managed folder.
    #[arg(short, long)]
    pub force: bool,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct RemoveOptions {
    /// Identifier or original path of tracked dotfile.
    #[arg(required = true, value_name = "file")]
    pub file: String,

    /// Skip symlink checks and drop entry even if restoring fails.
    #[arg(short, long)]
    pub force: bool,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct SyncCliOptions {
    /// Only list what would be committed.
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Pull from remote.
    #[arg(short, long)]
    pub download: bool,

    /// Commit and push to remote.
    #[arg(short, long)]
    pub upload: bool,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct InitOptions {
    /// Managed folder to use instead of the configured one.
    #[arg(short, long, value_name = "path")]
    pub folderpath: Option<PathBuf>,

    /// URL of remote repository.
    #[arg(short, long, value_name = "url", default_value = "")]
    pub repository: String,

    /// Branch to check out when starting fresh.
    #[arg(short, long, value_name = "branch", default_value = DEFAULT_BRANCH)]
    pub branch: String,

    /// Replace remote that does not match repository.
    #[arg(long)]
    pub force: bool,
}

fn main() {
    let cli = Cli::parse();

    let layer = fmt::layer()
        .compact()
        .with_target(false)
        .without_time();
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .init();

    if let Err(error) = cli.run() {
        error!("{error:#}");
        exit(1);
    }

    exit(0)
}

/// Load configuration, writing the default one on first use.
fn read_config(path: &Path) -> Result<Config> {
    match load_config(path) {
        Ok(config) => Ok(config),
        Err(ConfigError::NotFound { .. }) => {
            let config = Config::try_default()?;
            warn!("no configuration at {}, writing default", path.display());
            save_config(path, &config)?;
            Ok(config)
        }
        Err(error) => Err(error.into()),
    }
}

fn run_add(config: Config, opts: AddOptions) -> Result<()> {
    let store = ManifestStore::new(&config.info_path);
    let relocator = Relocator::new(&config.repo_path, store, InquirePrompt);
    let (id, entry) = relocator.add(&opts.file, opts.force)?;
    info!("added {id}: {} -> {}", entry.symlink.display(), entry.path.display());

    Ok(())
}

fn run_remove(config: Config, opts: RemoveOptions) -> Result<()> {
    let store = ManifestStore::new(&config.info_path);
    let id = lookup_id(&store.load()?, &opts.file)?;

    let relocator = Relocator::new(&config.repo_path, store, InquirePrompt);
    match relocator.remove(&id, opts.force)? {
        Some(entry) => info!("restored {id} to {}", entry.symlink.display()),
        None => info!("{id} was not tracked"),
    }

    Ok(())
}

fn run_list(config: Config) -> Result<()> {
    let store = ManifestStore::new(&config.info_path);
    for line in list(&config.repo_path, &store)? {
        match line {
            Listing::Tracked { name, id, status } if name == id => {
                println!("{name} (tracked, {status})");
            }
            Listing::Tracked { name, id, status } => {
                println!("{name} (tracked as {id}, {status})");
            }
            Listing::Untracked { name } => println!("{name} (untracked)"),
            Listing::Missing { id, path } => {
                println!("{id} (missing, expected at {})", path.display());
            }
        }
    }

    Ok(())
}

fn run_status(config: Config) -> Result<()> {
    let report = StatusChecker::new(ManifestStore::new(&config.info_path)).check()?;
    if report.is_healthy() {
        info!("all {} tracked files are healthy", report.total);
        return Ok(());
    }

    warn!(
        "{} of {} tracked files need attention",
        report.unhealthy.len(),
        report.total
    );
    for (id, entry) in report.unhealthy {
        println!("{id} ({})", entry.status);
        for diagnostic in entry.errors {
            println!("    {diagnostic}");
        }
    }

    Ok(())
}

fn run_sync(config: Config, opts: SyncCliOptions) -> Result<()> {
    let (download, upload) = match (opts.download, opts.upload) {
        (false, false) => (true, true),
        flags => flags,
    };
    let options = SyncOptions::new(opts.dry_run, download, upload);

    let sync = RepoSync::new(
        &config.repo_path,
        GitBinary::new(&config.repo_path),
        InquirePrompt,
    );
    match sync.sync(options)? {
        SyncOutcome::NoChanges | SyncOutcome::DryRun { .. } => {}
        SyncOutcome::Synced {
            committed, pulled, ..
        } => info!("sync finished (committed: {committed}, pulled: {pulled})"),
    }

    Ok(())
}

fn run_init(config_path: PathBuf, opts: InitOptions) -> Result<()> {
    let folder = match opts.folderpath {
        Some(path) => resolve(path)?,
        None => match load_config(&config_path) {
            Ok(config) => config.repo_path,
            Err(ConfigError::NotFound { .. }) => Config::try_default()?.repo_path,
            Err(error) => return Err(error.into()),
        },
    };

    let initializer = Initializer::new(
        Config::for_folder(&folder),
        config_path,
        GitBinary::new(&folder),
        InquirePrompt,
    );
    initializer.init(&opts.repository, &opts.branch, opts.force)?;
    info!("managed folder ready at {}", folder.display());

    Ok(())
}
