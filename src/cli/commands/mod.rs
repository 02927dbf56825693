//! Command implementations for the order processor CLI
//!
//! Dispatches to the subcommand handlers. Each command lives in its own
//! module; `shared` carries the logging setup, progress styling, and
//! report rendering they have in common.

pub mod check;
pub mod run;
pub mod shared;

use crate::app::pipeline::RunReport;
use crate::cli::args::{Args, Commands};
use crate::{Error, Result};
use tokio_util::sync::CancellationToken;

/// Main command runner
///
/// Returns the run report for the `run` command; `check` produces its own
/// summary output and yields no report.
pub async fn run(args: Args, cancellation: CancellationToken) -> Result<Option<RunReport>> {
    match args.get_command() {
        Commands::Run(run_args) => {
            let report = run::run_run(run_args, cancellation).await?;
            if report.is_success() {
                Ok(Some(report))
            } else {
                // Surface the terminal state as the process outcome
                Err(Error::data_validation(report.outcome_line()))
            }
        }
        Commands::Check(check_args) => {
            check::run_check(check_args, cancellation).await?;
            Ok(None)
        }
    }
}
