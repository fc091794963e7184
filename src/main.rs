//! mongo-s3-export binary
//!
//! Exports one MongoDB collection to a single JSON object in S3.
//!
//! # Usage
//!
//! ```bash
//! mongo-s3-export --uri mongodb://localhost:27017/app \
//!     --collection users --bucket my-exports --compress
//! ```

use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use mongo_s3_export::cli::CliInterface;
use mongo_s3_export::{Result, run_export};

/// Application entry point
#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Main application logic
///
/// 1. Parse command-line arguments and load configuration
/// 2. Initialize logging
/// 3. Handle subcommands or run the export
async fn run() -> Result<()> {
    let cli = CliInterface::new()?;

    initialize_logging(&cli);

    if cli.handle_subcommand()? {
        return Ok(());
    }

    cli.print_banner();

    // Ctrl+C cancels the export and aborts any multipart upload
    let cancel_token = CancellationToken::new();
    let cancel_token_clone = cancel_token.clone();
    let ctrl_c_handle = tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => cancel_token_clone.cancel(),
            Err(err) => eprintln!("Failed to listen for Ctrl+C: {}", err),
        }
    });

    let outcome = run_export(cli.config(), cancel_token).await;
    ctrl_c_handle.abort();

    let result = outcome?;
    info!(
        "Export completed successfully. Records exported: {}, Duration: {}ms",
        result.records_exported, result.elapsed_ms
    );
    Ok(())
}

/// Initialize logging from configuration
///
/// `RUST_LOG` takes precedence over the configured level.
fn initialize_logging(cli: &CliInterface) {
    let level = cli.config().logging.level.to_tracing_level();
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_lowercase()));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    if cli.config().logging.timestamps {
        subscriber.init();
    } else {
        subscriber.without_time().init();
    }
}
