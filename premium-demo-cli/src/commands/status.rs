//! Show the entitlement, resuming an interrupted purchase

use anyhow::Result;
use std::path::Path;
use std::time::Duration;

use super::{require_wallet, DemoConfig, Session};
use crate::ui;

#[tracing::instrument(skip(storage_dir, config))]
pub async fn run(storage_dir: &Path, config: &DemoConfig, wait: u64, verbose: bool) -> Result<()> {
    let wallet = require_wallet(storage_dir)?;
    let session = Session::open(storage_dir, config)?;
    let reconciler = &session.reconciler;

    ui::header("Premium Status");
    ui::key_value("Wallet", wallet.as_str());
    if let Some(source) = session.storage.last_source(&wallet).await? {
        ui::key_value("Last source", source.as_str());
    }

    // Picks up a purchase left pending by an earlier run
    reconciler.bind_wallet(wallet.clone()).await?;

    let record = if reconciler.is_polling() {
        if let Some(pending) = session.storage.pending(&wallet).await? {
            ui::info(&format!(
                "Resuming {} purchase {}",
                pending.source, pending.correlation_id
            ));
        }
        let spinner = ui::spinner("Polling backend...");
        let settled = session.wait_settled(Duration::from_secs(wait)).await;
        spinner.finish_and_clear();
        session.save_record(&settled).await?;
        settled
    } else {
        match session.last_record(&wallet).await? {
            Some(record) => {
                ui::info("Last known record");
                record
            }
            None => reconciler.subscription(),
        }
    };

    ui::separator();
    ui::subscription(&record);
    if verbose {
        ui::json(&serde_json::to_value(&record)?);
    }
    if let Some(toast) = reconciler.last_toast() {
        ui::toast(&toast);
    }

    reconciler.shutdown();
    Ok(())
}
