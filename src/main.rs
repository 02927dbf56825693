use clap::Parser;
use order_processor::cli::{args::Args, commands};
use std::process;
use tokio_util::sync::CancellationToken;

fn main() {
    // Parse command line arguments
    let args = Args::parse();

    // If no subcommand was provided, show help and available commands
    if args.command.is_none() {
        show_help_and_commands();
        process::exit(0);
    }

    // Create async runtime and run the main command logic with signal handling
    let runtime = tokio::runtime::Runtime::new().unwrap_or_else(|e| {
        eprintln!("Failed to create async runtime: {}", e);
        process::exit(1);
    });

    let result = runtime.block_on(async {
        // Create cancellation token for coordinating graceful shutdown
        let cancellation_token = CancellationToken::new();

        // Set up graceful shutdown handling
        let shutdown_signal = async {
            tokio::signal::ctrl_c()
                .await
                .expect("Failed to install CTRL+C signal handler");

            // Cancel all operations when Ctrl+C is received
            cancellation_token.cancel();
        };

        // Run the main command with cancellation support
        tokio::select! {
            result = commands::run(args, cancellation_token.clone()) => {
                result
            }
            _ = shutdown_signal => {
                eprintln!("\nReceived CTRL+C, shutting down gracefully...");
                Err(order_processor::Error::interrupted(
                    "Processing interrupted by user".to_string()
                ))
            }
        }
    });

    match result {
        Ok(_report) => {
            // Success - the report has already been rendered by the command
            process::exit(0);
        }
        Err(error) => {
            // Error occurred - print to stderr and exit with error code
            eprintln!("Error: {:#}", error);
            process::exit(1);
        }
    }
}

/// Show help information and available commands when no subcommand is provided
fn show_help_and_commands() {
    println!("Order Processor - Partitioned Order Data ETL Engine");
    println!("===================================================");
    println!();
    println!("Move raw order records through a three-stage pipeline: chunked");
    println!("ingestion, schema validation with deduplication, and aggregation");
    println!("views for dashboard consumption.");
    println!();
    println!("USAGE:");
    println!("    order-processor <COMMAND> [OPTIONS]");
    println!();
    println!("COMMANDS:");
    println!("    run         Run the full ingest/clean/aggregate pipeline (main command)");
    println!("    check       Validate a source file without writing anything");
    println!("    help        Show this help message or help for specific commands");
    println!();
    println!("OPTIONS:");
    println!("    -h, --help       Show help information");
    println!("    -V, --version    Show version information");
    println!();
    println!("EXAMPLES:");
    println!("    # Run the pipeline against a file-backed store:");
    println!("    order-processor run --input data/raw_orders.csv --store ./store \\");
    println!("                        --audit ./store/rejects.jsonl");
    println!();
    println!("    # Preview validation results without writing:");
    println!("    order-processor check --input data/raw_orders.csv --limit 10000");
    println!();
    println!("    # Resume a partially-ingested source from row 250000:");
    println!("    order-processor run --input data/raw_orders.csv --store ./store \\");
    println!("                        --resume-offset 250000");
    println!();
    println!("For detailed help on any command, use:");
    println!("    order-processor <COMMAND> --help");
}
