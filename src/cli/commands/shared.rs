//! Shared components for CLI commands
//!
//! Logging setup, progress bar styling, and run-report rendering used by
//! the run and check commands.

use crate::app::models::format_cents;
use crate::app::pipeline::RunReport;
use crate::{Result, RunState};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::debug;

/// Set up structured logging for a command
pub fn setup_logging(log_level: &str) -> Result<()> {
    use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("order_processor={}", log_level)));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_level(true)
                .with_timer(fmt::time::uptime())
                .with_writer(std::io::stderr),
        )
        .init();

    debug!("Logging initialized at level: {}", log_level);
    Ok(())
}

/// Create a progress bar with the standard styling
pub fn create_progress_bar(total: u64, message: &str) -> ProgressBar {
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg} [{per_sec}] ETA: {eta}")
            .unwrap()
            .progress_chars("#>-"),
    );
    pb.set_message(message.to_string());
    pb
}

/// Render the run report for humans
pub fn print_run_report(report: &RunReport) {
    println!();
    println!("{}", "Pipeline Run Report".bold());
    println!("{}", "===================".bold());

    let state = match report.state {
        RunState::Completed => report.state.to_string().green().bold(),
        RunState::Cancelled => report.state.to_string().yellow().bold(),
        _ => report.state.to_string().red().bold(),
    };
    println!("Status:      {}", state);
    println!("Outcome:     {}", report.outcome_line());
    if let Some(failure) = &report.failure {
        println!("Failure:     {}", failure.red());
    }

    println!();
    println!("{}", "Stage timing".bold());
    for (stage, seconds) in &report.stage_elapsed_seconds {
        println!("  {:<12} {:>8.2}s", stage, seconds);
    }
    println!("  {:<12} {:>8.2}s", "total", report.total_elapsed_seconds());

    if let Some(ingest) = &report.ingest {
        println!();
        println!("{}", "Ingest".bold());
        println!("  Rows read:        {}", ingest.rows_read);
        println!("  Malformed rows:   {}", ingest.malformed_rows);
        println!("  Batches staged:   {}", ingest.batches_staged);
    }

    if let Some(cleaning) = &report.cleaning {
        println!();
        println!("{}", "Cleaning".bold());
        println!("  Input records:    {}", cleaning.total_input);
        println!(
            "  Accepted:         {} ({:.2}%)",
            cleaning.accepted,
            cleaning.acceptance_rate()
        );
        println!("  Duplicates:       {}", cleaning.duplicate_count);
        if !cleaning.rejected_by_reason.is_empty() {
            println!("  Rejected by reason:");
            for (reason, count) in &cleaning.rejected_by_reason {
                println!("    {:<18} {}", format!("{}:", reason), count);
            }
        }
        println!(
            "  Writes:           {} inserted, {} replaced, {} batches, {} retried",
            cleaning.write.inserted,
            cleaning.write.replaced,
            cleaning.write.batches,
            cleaning.write.retries
        );
        if cleaning.write.store_rejected > 0 {
            println!(
                "  Store rejections: {}",
                cleaning.write.store_rejected.to_string().red()
            );
        }
    }

    if let Some(aggregation) = &report.aggregation {
        println!();
        println!("{}", "Aggregation".bold());
        println!("  Input records:    {}", aggregation.input_records);
        println!("  Views written:    {}", aggregation.views_written);
        for (view, rows) in &aggregation.rows_per_view {
            println!("    {:<28} {} rows", view, rows);
        }
    }
    println!();
}

/// Format a cents amount with a currency-agnostic suffix for reports
pub fn display_money(cents: i64) -> String {
    format_cents(cents)
}
