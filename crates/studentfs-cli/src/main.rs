//! studentfs command-line front end.
//!
//! Drives the entity registry over a store directory on the host
//! filesystem. Every subcommand is one registry call, standing in for the
//! write-triggering filesystem call a mounted store would receive.
//!
//! Usage:
//!   studentfs init notes
//!   studentfs commit notes --from draft.txt
//!   studentfs commit notes --base 1.2 --from alt.txt
//!   studentfs tree notes --json
//!
//! Logs go to stderr; set `RUST_LOG=debug` to see collisions and branching.

mod report;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt};

use studentfs_kernel::{EntityRegistry, LocalBackend, SnapshotError, StoreConfig};
use studentfs_types::VersionString;

/// Versioned snapshot store.
#[derive(Parser, Debug)]
#[command(name = "studentfs")]
#[command(about = "Versioned snapshot store on a plain directory tree")]
struct Cli {
    /// Store root (overrides the config file)
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Config file (default: ~/.config/studentfs/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create an entity with its initial snapshot
    Init { name: String },

    /// Allocate the next snapshot of an entity
    Commit {
        name: String,

        /// Store this file as the new snapshot's content
        #[arg(long)]
        from: Option<PathBuf>,

        /// Branch from this version instead of the current one
        #[arg(long)]
        base: Option<VersionString>,
    },

    /// Show an entity's current version and totals
    Status {
        name: String,

        #[arg(long)]
        json: bool,
    },

    /// Show an entity's version tree
    Tree {
        name: String,

        #[arg(long)]
        json: bool,
    },
}

fn main() -> ExitCode {
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let errno = e.downcast_ref::<SnapshotError>().map(SnapshotError::to_errno);
            tracing::error!(errno = ?errno, "{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut config = StoreConfig::load(cli.config.as_deref()).context("loading config")?;
    if let Some(root) = cli.root {
        config.root = root;
    }
    let registry = open_store(&config)?;

    match cli.command {
        Command::Init { name } => {
            let entity = registry
                .create_entity(&name)
                .with_context(|| format!("creating entity {name}"))?;
            println!("{} {}", entity.name(), entity.current_version());
        }

        Command::Commit { name, from, base } => {
            let content = from
                .as_deref()
                .map(|path| {
                    std::fs::read(path).with_context(|| format!("reading {}", path.display()))
                })
                .transpose()?;

            let snapshot = registry
                .commit_with_content(&name, base.as_ref(), content.as_deref())
                .with_context(|| format!("committing {name}"))?;
            println!("{} {}", name, snapshot.version);
        }

        Command::Status { name, json } => {
            let entity = registry
                .open_entity(&name)
                .with_context(|| format!("opening {name}"))?;
            let status = report::Status::from(&entity);
            if json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                print!("{status}");
            }
        }

        Command::Tree { name, json } => {
            let entity = registry
                .open_entity(&name)
                .with_context(|| format!("opening {name}"))?;
            let tree = report::tree(&entity);
            if json {
                println!("{}", serde_json::to_string_pretty(&tree)?);
            } else {
                print!("{}", report::render_tree(&tree));
            }
        }
    }

    Ok(())
}

/// Registry over a local store root, creating the root if needed.
fn open_store(config: &StoreConfig) -> Result<EntityRegistry> {
    ensure_root(&config.root)?;
    tracing::debug!(root = %config.root.display(), "opening store");
    let fs = Arc::new(LocalBackend::new(&config.root));
    Ok(EntityRegistry::with_config(fs, config))
}

fn ensure_root(root: &Path) -> Result<()> {
    std::fs::create_dir_all(root)
        .with_context(|| format!("creating store root {}", root.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commit_args() {
        let cli = Cli::parse_from([
            "studentfs", "--root", "/tmp/store", "commit", "notes", "--base", "1.2", "--from",
            "draft.txt",
        ]);
        assert_eq!(cli.root, Some(PathBuf::from("/tmp/store")));
        match cli.command {
            Command::Commit { name, from, base } => {
                assert_eq!(name, "notes");
                assert_eq!(from, Some(PathBuf::from("draft.txt")));
                assert_eq!(base, Some(VersionString::parse("1.2").unwrap()));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_rejects_bad_base() {
        let result = Cli::try_parse_from(["studentfs", "commit", "notes", "--base", "1..2"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_open_store_creates_root() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = StoreConfig {
            root: dir.path().join("nested").join("store"),
            ..StoreConfig::default()
        };

        let registry = open_store(&config).unwrap();
        registry.create_entity("notes").unwrap();
        assert!(config.root.join("notes").join("1").is_dir());
    }
}
