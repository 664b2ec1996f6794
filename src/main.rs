//! esdump - Elasticsearch to CSV exporter
//!
//! Runs a scroll search and writes the selected fields of every hit as one
//! CSV row. Interrupting with Ctrl+C stops the export at the next request
//! boundary; rows already written are kept and scroll contexts are released.
//!
//! # Usage
//!
//! ```bash
//! esdump -e http://localhost:9200 -i 'log-*' -f @timestamp,host,message \
//!     -m level:error -o errors.csv
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info_span};

use esdump::cli::CliInterface;
use esdump::client::HttpSearchClient;
use esdump::error::Result;
use esdump::export::{CsvWriter, ExportCoordinator, ProgressTracker, ScrollEngine};
use esdump::utils::time::format_duration;

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
/// 3. Build the search client, scroll engine and CSV writer
/// 4. Run the export until done, failed or interrupted
///
/// # Returns
/// * `Result<()>` - Success or error
async fn run() -> Result<()> {
    let cli = CliInterface::new()?;
    initialize_logging(&cli);
    debug!("esdump {}", esdump::VERSION);

    let export_config = cli.export_config()?;
    let output = cli.output_config()?;

    let client = Arc::new(HttpSearchClient::new(&cli.config().connection)?);
    let fields = export_config.fields.clone();
    let engine = ScrollEngine::from_config(client, export_config)?.with_span(info_span!(
        "session",
        output = %output.path.display()
    ));
    let writer = CsvWriter::create(&output.path, fields, output.delimiter).await?;

    // Ctrl+C cancels the running export
    let cancel_token = CancellationToken::new();
    let cancel_token_clone = cancel_token.clone();
    let ctrl_c_handle = tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => cancel_token_clone.cancel(),
            Err(err) => eprintln!("Failed to listen for Ctrl+C: {}", err),
        }
    });

    let result = ExportCoordinator::new(
        engine,
        Box::new(writer),
        ProgressTracker::new(output.progress),
    )
    .with_cancellation(cancel_token)
    .execute()
    .await;
    ctrl_c_handle.abort();
    let result = result?;

    if !cli.args().quiet {
        let elapsed = format_duration(Duration::from_millis(result.elapsed_ms));
        if result.cancelled {
            eprintln!(
                "Export interrupted: {} documents written to {} in {}",
                result.documents_exported,
                output.path.display(),
                elapsed
            );
        } else {
            eprintln!(
                "Exported {} documents to {} in {}",
                result.documents_exported,
                output.path.display(),
                elapsed
            );
        }
    }

    Ok(())
}

/// Initialize logging system from the merged configuration
///
/// # Arguments
/// * `cli` - CLI interface with the effective logging settings
fn initialize_logging(cli: &CliInterface) {
    let level = cli.config().logging.level.to_tracing_level();

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr);

    if cli.config().logging.timestamps {
        subscriber.init();
    } else {
        subscriber.without_time().init();
    }
}
