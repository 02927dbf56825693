//! Command-line argument definitions for the order processor
//!
//! Defines the CLI surface with the clap derive API. Argument parsing stays
//! thin here; everything of substance lives behind [`crate::config::Config`].

use crate::constants::{
    DEFAULT_PARTITION_COUNT, DEFAULT_READ_BATCH_SIZE, DEFAULT_TOP_USERS, DEFAULT_WRITE_BATCH_SIZE,
    MAX_RETRY_ATTEMPTS,
};
use crate::{Config, Error, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// CLI arguments for the order ETL processor
///
/// Moves raw order records through ingest, cleaning, and aggregation against
/// a partitioned document store, producing dashboard-ready summary views.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "order-processor",
    version,
    about = "ETL engine for order data: ingest, clean, deduplicate, aggregate",
    long_about = "Processes raw e-commerce order records through a three-stage pipeline: \
                  chunked ingestion into a raw staging collection, schema validation with \
                  deduplication into a partitioned clean collection, and parallel computation \
                  of aggregation views for dashboard consumption."
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands
#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    /// Run the full ingest → clean → aggregate pipeline
    Run(RunArgs),
    /// Validate a source file without writing anything
    Check(CheckArgs),
}

/// Arguments for the run command (full pipeline)
#[derive(Debug, Clone, Parser)]
pub struct RunArgs {
    /// Path to the source CSV file of raw order records
    #[arg(short = 'i', long = "input", value_name = "FILE")]
    pub input: PathBuf,

    /// Root directory for the file-backed store; omit for an in-memory
    /// store (useful for dry runs, nothing survives the process)
    #[arg(short = 's', long = "store", value_name = "DIR")]
    pub store_root: Option<PathBuf>,

    /// Audit sink file for rejected records (JSONL, append-only)
    #[arg(long = "audit", value_name = "FILE")]
    pub audit_path: Option<PathBuf>,

    /// Records per source read batch
    #[arg(long = "batch-size", value_name = "COUNT", default_value_t = DEFAULT_READ_BATCH_SIZE)]
    pub batch_size: usize,

    /// Records per store write batch
    #[arg(long = "write-batch-size", value_name = "COUNT", default_value_t = DEFAULT_WRITE_BATCH_SIZE)]
    pub write_batch_size: usize,

    /// Number of parallel cleaning workers (defaults to CPU count, capped at 8)
    #[arg(short = 'j', long = "workers", value_name = "COUNT")]
    pub workers: Option<usize>,

    /// Number of store partitions (must match the store's shard layout)
    #[arg(long = "partitions", value_name = "COUNT", default_value_t = DEFAULT_PARTITION_COUNT)]
    pub partitions: u32,

    /// Data rows to skip before reading (resume after a partial failure)
    #[arg(long = "resume-offset", value_name = "ROWS", default_value_t = 0)]
    pub resume_offset: u64,

    /// Maximum users kept in the user aggregation view
    #[arg(long = "top-users", value_name = "COUNT", default_value_t = DEFAULT_TOP_USERS)]
    pub top_users: usize,

    /// Maximum write attempts per batch on transient store failures
    #[arg(long = "max-retries", value_name = "COUNT", default_value_t = MAX_RETRY_ATTEMPTS)]
    pub max_retries: usize,

    /// Output format for the run report
    #[arg(long = "output-format", value_enum, default_value = "human")]
    pub output_format: OutputFormat,

    /// Increase logging verbosity (-v: info, -vv: debug, -vvv: trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress output except errors
    #[arg(short = 'q', long = "quiet", conflicts_with = "verbose")]
    pub quiet: bool,
}

/// Arguments for the check command (validation only)
#[derive(Debug, Clone, Parser)]
pub struct CheckArgs {
    /// Path to the source CSV file to validate
    #[arg(short = 'i', long = "input", value_name = "FILE")]
    pub input: PathBuf,

    /// Records per read batch
    #[arg(long = "batch-size", value_name = "COUNT", default_value_t = DEFAULT_READ_BATCH_SIZE)]
    pub batch_size: usize,

    /// Stop after this many rows (0 = whole file)
    #[arg(long = "limit", value_name = "ROWS", default_value_t = 0)]
    pub limit: u64,

    /// Increase logging verbosity (-v: info, -vv: debug, -vvv: trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress output except errors
    #[arg(short = 'q', long = "quiet", conflicts_with = "verbose")]
    pub quiet: bool,
}

/// Output format options for machine-readable results
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable output
    Human,
    /// JSON format for scripting
    Json,
}

impl Args {
    /// Get the command if one was specified
    pub fn get_command(&self) -> Commands {
        self.command
            .clone()
            .expect("Command should be present when get_command() is called")
    }
}

impl RunArgs {
    /// Validate the run command arguments for consistency
    pub fn validate(&self) -> Result<()> {
        if !self.input.exists() {
            return Err(Error::configuration(format!(
                "Input file does not exist: {}",
                self.input.display()
            )));
        }

        if self.input.is_dir() {
            return Err(Error::configuration(format!(
                "Input path is a directory, expected a file: {}",
                self.input.display()
            )));
        }

        Ok(())
    }

    /// Effective worker count: explicit flag, else CPU count capped at 8
    pub fn effective_workers(&self) -> usize {
        self.workers.unwrap_or_else(|| num_cpus::get().clamp(1, 8))
    }

    /// Build the pipeline configuration from these arguments
    pub fn to_config(&self) -> Result<Config> {
        let mut config = Config::new(self.input.clone())
            .with_workers(self.effective_workers())
            .with_batch_size(self.batch_size)
            .with_write_batch_size(self.write_batch_size)
            .with_partition_count(self.partitions)
            .with_resume_offset(self.resume_offset);

        if let Some(root) = &self.store_root {
            config = config.with_store_root(root.clone());
        }
        if self.quiet {
            config = config.without_progress();
        }
        config.store.audit_path = self.audit_path.clone();
        config.processing.top_users = self.top_users;
        config.retry.max_attempts = self.max_retries;

        config.validate()?;
        Ok(config)
    }

    /// Determine the log level from the verbosity flags
    pub fn get_log_level(&self) -> &'static str {
        if self.quiet {
            "error"
        } else {
            match self.verbose {
                0 => "warn",
                1 => "info",
                2 => "debug",
                _ => "trace",
            }
        }
    }
}

impl CheckArgs {
    /// Validate the check command arguments
    pub fn validate(&self) -> Result<()> {
        if !self.input.exists() {
            return Err(Error::configuration(format!(
                "Input file does not exist: {}",
                self.input.display()
            )));
        }
        if self.batch_size == 0 {
            return Err(Error::configuration(
                "Batch size must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Determine the log level from the verbosity flags
    pub fn get_log_level(&self) -> &'static str {
        if self.quiet {
            "error"
        } else {
            match self.verbose {
                0 => "warn",
                1 => "info",
                2 => "debug",
                _ => "trace",
            }
        }
    }
}
