//! CLI command implementations.

pub mod apply;
pub mod consume;
pub mod plan;

use crate::client::{ReqwestClient, DEFAULT_TIMEOUT};
use crate::config::Settings;
use recon_engine::{ApplyReport, HttpStore};
use serde::de::DeserializeOwned;
use std::path::Path;
use std::time::Duration;

/// Reads a JSON diff file.
pub fn read_diff<T: DeserializeOwned>(path: &Path) -> Result<T, Box<dyn std::error::Error>> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read diff {}: {e}", path.display()))?;
    let diff = serde_json::from_str(&raw)
        .map_err(|e| format!("failed to parse diff {}: {e}", path.display()))?;
    Ok(diff)
}

/// Builds the HTTP store described by `settings`.
pub fn http_store(
    settings: &Settings,
) -> Result<HttpStore<ReqwestClient>, Box<dyn std::error::Error>> {
    let base_url = settings.require_base_url()?;
    let timeout = settings
        .timeout_secs
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_TIMEOUT);
    let client = ReqwestClient::new(settings.token.clone(), timeout)?;
    Ok(HttpStore::new(base_url, client))
}

/// Prints a run report.
pub fn print_report(report: &ApplyReport) {
    println!("Run {} ({})", report.run_id, report.provenance);
    println!(
        "  Classified:  {} created, {} modified, {} deleted",
        report.created, report.modified, report.deletion_candidates
    );
    println!("  Upserted:    {}", report.upserted.len());
    println!("  Deleted:     {}", report.deleted.len());
    println!("  Preserved:   {}", report.preserved.len());
    for entity in &report.preserved {
        println!("    {entity}");
    }
    if !report.is_clean() {
        println!("  Failed upserts: {}", report.failed_upserts.len());
        for entity in &report.failed_upserts {
            println!("    {entity}");
        }
        println!("  Failed deletes: {}", report.failed_deletes.len());
        for entity in &report.failed_deletes {
            println!("    {entity}");
        }
    }
    println!("  Duration:    {:?}", report.duration);
}
