//! updist - update package distribution
//!
//! Serves versioned update archives to deployed nodes and gives operators a
//! local CLI over the same catalog.
//!
//! # Directory Layout
//!
//! ```text
//! ~/.updist/
//! ├── blobs/          # Archive bytes, sharded by 2-char prefix
//! │   └── tmp/        # Staging for in-flight writes
//! ├── catalog.db      # SQLite package catalog
//! ├── tenants.toml    # Tenant/license registry
//! └── exercises.json  # Exercise catalog for generated packages
//! ```

#![allow(clippy::missing_errors_doc)]

pub mod cmd;
pub mod context;
pub mod http;
pub mod ui;

use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;

use chrono::{DateTime, Utc};

/// Command-line arguments.
#[derive(Debug, Parser)]
#[command(name = "updist")]
#[command(author, version = env!("UPDIST_VERSION"), about = "updist - update package distribution")]
pub struct Cli {
    /// Service home directory (catalog, blobs, registry)
    #[arg(long, global = true, env = "UPDIST_HOME")]
    pub home: Option<PathBuf>,

    /// Print machine-readable JSON instead of formatted output
    #[arg(long, global = true)]
    pub json: bool,

    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Commands,
}

/// Subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the HTTP server
    Serve {
        /// Listen address (overrides UPDIST_BIND)
        #[arg(long)]
        bind: Option<SocketAddr>,
    },
    /// Publish an update archive
    Upload {
        /// Path to the .zip archive
        file: PathBuf,
        /// Expected checksum (sha256:<hex>); upload fails on mismatch
        #[arg(long)]
        checksum: Option<String>,
    },
    /// List published updates, newest first
    List,
    /// Show one published update
    Info {
        /// Update id
        id: String,
    },
    /// Stop offering an update to nodes
    Deactivate {
        /// Update id
        id: String,
    },
    /// Delete an update and its archive
    Delete {
        /// Update id
        id: String,
    },
    /// Run the eligibility check a node would run
    Check {
        /// Tenant id
        tenant: String,
        /// Version the node is running
        version: String,
    },
    /// Download an active update archive
    Download {
        /// Update id
        id: String,
        /// Output path (defaults to the archive's filename)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Build and publish an update bundling the exercise catalog
    Generate {
        /// Version to publish
        #[arg(long)]
        version: String,
        /// Release notes
        #[arg(long)]
        changelog: String,
        /// Lowest client version able to apply it (default 1.0.0)
        #[arg(long)]
        min_client_version: Option<String>,
        /// Only report exercise deletions after this RFC 3339 timestamp
        #[arg(long)]
        since: Option<DateTime<Utc>>,
    },
    /// Remove orphaned blobs and report records with missing archives
    Clean {
        /// Report only, delete nothing
        #[arg(long)]
        dry_run: bool,
    },
    /// Compute the sha256 checksum of files
    Hash {
        /// Files to hash
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}
