//! The check command: validate a source file without writing anything
//!
//! Streams the source through the schema validator and prints the rejection
//! breakdown. Duplicate detection runs too, so the numbers match what a
//! real run would accept, but no store or audit sink is touched.

use crate::app::models::RejectReason;
use crate::app::services::cleaning::{ClaimOutcome, InMemoryKeySet, KeySet};
use crate::app::services::schema_validator::validate_record;
use crate::app::services::source_reader::{CsvSource, RecordSource};
use crate::cli::args::CheckArgs;
use crate::cli::commands::shared::setup_logging;
use crate::Result;
use colored::Colorize;
use std::collections::BTreeMap;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Counters produced by a validation-only pass
#[derive(Debug, Default, PartialEq, Eq)]
pub struct CheckSummary {
    pub rows_read: usize,
    pub valid: usize,
    pub duplicates: usize,
    pub rejected_by_reason: BTreeMap<RejectReason, usize>,
}

impl CheckSummary {
    pub fn total_rejected(&self) -> usize {
        self.rejected_by_reason.values().sum::<usize>() + self.duplicates
    }
}

/// Execute the check command
pub async fn run_check(args: CheckArgs, cancellation: CancellationToken) -> Result<CheckSummary> {
    setup_logging(args.get_log_level())?;
    args.validate()?;

    info!("Checking source '{}'", args.input.display());
    let mut source = CsvSource::open(&args.input, args.batch_size)?;
    let summary = check_source(&mut source, args.limit, &cancellation).await?;

    if !args.quiet {
        print_summary(&summary);
    }
    Ok(summary)
}

/// Validate every record a source yields, up to `limit` rows (0 = all)
pub async fn check_source(
    source: &mut dyn RecordSource,
    limit: u64,
    cancellation: &CancellationToken,
) -> Result<CheckSummary> {
    let mut summary = CheckSummary::default();
    let mut key_set = InMemoryKeySet::new();

    'outer: while let Some(batch) = source.next_batch().await? {
        if cancellation.is_cancelled() {
            break;
        }
        for raw in &batch {
            if limit > 0 && summary.rows_read as u64 >= limit {
                break 'outer;
            }
            summary.rows_read += 1;
            match validate_record(raw) {
                Ok(clean) => match key_set.claim(clean.key(), clean.seq) {
                    ClaimOutcome::Claimed => summary.valid += 1,
                    ClaimOutcome::Duplicate { .. } => summary.duplicates += 1,
                },
                Err(reason) => {
                    *summary.rejected_by_reason.entry(reason).or_insert(0) += 1;
                }
            }
        }
    }

    info!(
        "Check complete: {} rows, {} valid, {} rejected",
        summary.rows_read,
        summary.valid,
        summary.total_rejected()
    );
    Ok(summary)
}

fn print_summary(summary: &CheckSummary) {
    println!();
    println!("{}", "Source Check".bold());
    println!("{}", "============".bold());
    println!("Rows read:   {}", summary.rows_read);
    println!("Valid:       {}", summary.valid.to_string().green());
    println!("Duplicates:  {}", summary.duplicates);
    if summary.rejected_by_reason.is_empty() {
        println!("Rejections:  none");
    } else {
        println!("Rejections:");
        for (reason, count) in &summary.rejected_by_reason {
            println!(
                "  {:<18} {:>8}   {}",
                format!("{}:", reason),
                count,
                reason.description().dimmed()
            );
        }
    }
    println!();
}
