//! Apply command implementation.

use crate::config::Settings;
use recon_engine::StateApplier;
use recon_model::{EntityDiff, EntityRefDiff, Provenance};
use std::path::Path;

/// Runs the apply command.
pub fn run(
    path: &Path,
    refs: bool,
    user_triggered: bool,
    settings: &Settings,
) -> Result<(), Box<dyn std::error::Error>> {
    let provenance = if user_triggered {
        Provenance::UserTriggered
    } else {
        Provenance::Automated
    };

    let store = super::http_store(settings)?;
    println!("Applying {} to {}", path.display(), store.base_url());
    let applier = StateApplier::new(store, settings.reconcile.clone());

    let report = if refs {
        let diff: EntityRefDiff = super::read_diff(path)?;
        applier.delete_diff(&diff, provenance)?
    } else {
        let diff: EntityDiff = super::read_diff(path)?;
        applier.apply_diff(&diff, provenance)?
    };

    println!();
    super::print_report(&report);

    if !report.is_clean() {
        return Err(format!(
            "{} upserts and {} deletes failed",
            report.failed_upserts.len(),
            report.failed_deletes.len()
        )
        .into());
    }
    println!();
    println!("✓ Catalog reconciled");
    Ok(())
}
