//! CLI definitions for failbox.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// Failbox CLI.
#[derive(Parser)]
#[command(name = "failbox")]
#[command(about = "Inspect, requeue and purge failed jobs")]
#[command(version)]
pub(crate) struct Cli {
    /// Configuration file path (default: ~/.failbox/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Store directory, overrides the configured one
    #[arg(short, long, global = true, env = "FAILBOX_STORE")]
    pub store: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Output format for listings.
#[derive(Clone, Copy, Debug, ValueEnum)]
pub(crate) enum OutputFormat {
    Table,
    Json,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Count failures in one failure queue, or in all registered ones
    Count {
        /// Failure queue name (e.g. emails_failed)
        #[arg(long)]
        queue: Option<String>,
    },

    /// List registered failure queues
    Queues,

    /// List failures by position
    List {
        /// Failure queue name (default: the configured default queue)
        #[arg(long)]
        queue: Option<String>,

        /// First position to show
        #[arg(long, default_value_t = 0)]
        offset: usize,

        /// Maximum number of failures to show
        #[arg(long, default_value_t = 20)]
        limit: usize,

        /// Output format
        #[arg(long, value_enum, default_value = "table")]
        format: OutputFormat,
    },

    /// Show one failure as JSON
    Show {
        /// Position in the failure queue
        index: usize,

        #[arg(long)]
        queue: Option<String>,
    },

    /// Resubmit one failure to its original queue
    Requeue {
        /// Position in the failure queue
        index: usize,

        #[arg(long)]
        queue: Option<String>,
    },

    /// Resubmit every failure recorded for a job queue
    RequeueQueue {
        /// Originating job queue (e.g. emails)
        queue: String,
    },

    /// Delete one failure
    Remove {
        /// Position in the failure queue
        index: usize,

        #[arg(long)]
        queue: Option<String>,
    },

    /// Delete the failure queue of a job queue
    RemoveQueue {
        /// Originating job queue (e.g. emails)
        queue: String,
    },

    /// Delete the default failure queue
    Clear,

    /// Record a failure by hand
    Record {
        /// Originating job queue
        #[arg(long)]
        queue: String,

        /// Job class
        #[arg(long)]
        class: String,

        /// Job arguments as a JSON array
        #[arg(long, default_value = "[]")]
        args: String,

        /// Error type name
        #[arg(long)]
        exception: String,

        /// Error message
        #[arg(long)]
        message: String,

        /// Backtrace frame, outermost first (repeatable)
        #[arg(long)]
        backtrace: Vec<String>,

        /// Worker identifier (default: failbox:<pid>)
        #[arg(long)]
        worker: Option<String>,
    },
}
