//! List purchasable plans

use anyhow::{Context, Result};
use premium_subscriptions::Source;
use std::path::Path;

use super::{require_wallet, DemoConfig, Session};
use crate::ui;

#[tracing::instrument(skip(storage_dir, config))]
pub async fn run(
    storage_dir: &Path,
    config: &DemoConfig,
    source: Option<Source>,
    promo: Option<String>,
    verbose: bool,
) -> Result<()> {
    let session = Session::open(storage_dir, config)?;
    // The wallet's previous source takes part in resolution
    if let Ok(wallet) = require_wallet(storage_dir) {
        session.reconciler.bind_wallet(wallet).await?;
    }

    let plans = session
        .reconciler
        .list_plans(source, promo.as_deref())
        .await
        .context("Failed to fetch plans")?;

    ui::header(&format!(
        "Plans ({})",
        config.reconciler.platform.as_str()
    ));
    if plans.is_empty() {
        ui::info("No plans offered");
    }
    for plan in &plans {
        ui::separator();
        ui::key_value("Plan", &plan.id);
        if let Some(title) = &plan.title {
            ui::key_value("Title", title);
        }
        ui::key_value("Source", plan.source.as_str());
        ui::key_value("Price", &plan.price.to_string());
        ui::key_value(
            "Billing",
            &format!("every {} days", plan.billing_interval.approx_days()),
        );
        if verbose {
            ui::json(&serde_json::to_value(plan)?);
        }
    }

    session.reconciler.shutdown();
    Ok(())
}
