//! Consume command implementation.

use crate::config::Settings;
use recon_consumer::{CancellationToken, Consumer, JsonLinesSource, ReconcileHandler};
use recon_engine::StateApplier;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// Runs the consume command.
///
/// Every input line is delivered on the change-log topic. Ctrl-C stops
/// the loop after the message in flight.
pub fn run(input: Option<&Path>, settings: &Settings) -> Result<(), Box<dyn std::error::Error>> {
    let reader: Box<dyn Read + Send> = match input {
        Some(path) => Box::new(
            File::open(path).map_err(|e| format!("failed to open {}: {e}", path.display()))?,
        ),
        None => Box::new(std::io::stdin()),
    };

    let topic = change_log_topic(settings);
    let source = JsonLinesSource::new(BufReader::new(reader), topic);

    let store = super::http_store(settings)?;
    let applier = StateApplier::new(store, settings.reconcile.clone());
    let handler = ReconcileHandler::new(Arc::new(applier));

    let token = CancellationToken::new();
    watch_ctrl_c(token.clone())?;

    let mut consumer = Consumer::new(settings.consumer.clone(), source, handler);
    let stats = consumer.run(&token)?;

    println!("Consumer stopped");
    println!("  Processed: {}", stats.processed);
    println!("  Failed:    {}", stats.failed);
    println!("  Committed: {}", stats.committed);
    Ok(())
}

fn change_log_topic(settings: &Settings) -> String {
    settings
        .consumer
        .topics()
        .pop()
        .unwrap_or_else(|| "change.log".to_string())
}

/// Trips `token` on the first Ctrl-C.
fn watch_ctrl_c(token: CancellationToken) -> std::io::Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    std::thread::Builder::new()
        .name("ctrl-c".into())
        .spawn(move || {
            runtime.block_on(async {
                match tokio::signal::ctrl_c().await {
                    Ok(()) => {
                        info!("exiting gracefully");
                        token.cancel();
                    }
                    Err(err) => warn!(error = %err, "cannot listen for ctrl-c"),
                }
            });
        })?;
    Ok(())
}
