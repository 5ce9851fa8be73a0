//! Purchase a plan and follow it until the backend settles

use anyhow::{anyhow, Context, Result};
use premium_subscriptions::{
    ManageOutcome, Notice, PurchaseParams, PurchaseResult, Source, SubscriptionReconciler,
    SubscriptionStatus,
};
use std::path::Path;
use std::time::Duration;

use super::{require_wallet, DemoConfig, Session};
use crate::ui;

#[derive(Debug)]
pub struct BuyOptions {
    pub plan: String,
    pub source: Option<Source>,
    pub promo: Option<String>,
    /// Seconds to wait for a pending purchase
    pub wait: u64,
    /// Turn auto-renew off once active
    pub cancel: bool,
}

#[tracing::instrument(skip(storage_dir, config))]
pub async fn run(
    storage_dir: &Path,
    config: &DemoConfig,
    options: BuyOptions,
    verbose: bool,
) -> Result<()> {
    let wallet = require_wallet(storage_dir)?;
    let session = Session::open(storage_dir, config)?;
    let reconciler = &session.reconciler;
    reconciler.bind_wallet(wallet.clone()).await?;
    let toasts = reconciler.subscribe_toasts(|toast| {
        if let Some(toast) = toast {
            ui::toast(toast);
        }
    });

    ui::header("Purchase Premium");
    ui::key_value("Wallet", wallet.as_str());

    let plans = reconciler
        .list_plans(options.source, options.promo.as_deref())
        .await
        .context("Failed to fetch plans")?;
    let plan = plans
        .into_iter()
        .find(|p| p.id == options.plan)
        .ok_or_else(|| anyhow!("Unknown plan: {}", options.plan))?;
    ui::key_value("Plan", &plan.id);
    ui::key_value("Price", &plan.price.to_string());

    let mut params = PurchaseParams::new(plan);
    if let Some(source) = options.source {
        params = params.with_source(source);
    }
    if let Some(promo) = &options.promo {
        params = params.with_promo_code(promo.clone());
    }

    let result = match reconciler.purchase(params).await {
        Ok(result) => result,
        Err(e) => {
            toasts.unsubscribe();
            reconciler.shutdown();
            return Err(e).context("Purchase failed");
        }
    };

    match result {
        PurchaseResult::Canceled => {
            ui::warning("Purchase canceled");
        }
        PurchaseResult::Immediate(_) => {
            ui::success("Purchase completed");
        }
        PurchaseResult::Pending {
            correlation_id,
            checkout_url,
        } => {
            if let Some(url) = checkout_url {
                ui::info("Finish paying at:");
                ui::key_value("URL", &url);
            }
            ui::info(&format!("Waiting for {} to settle", correlation_id));
            let spinner = ui::spinner("Polling backend...");
            let settled = session
                .wait_settled(Duration::from_secs(options.wait))
                .await;
            spinner.finish_and_clear();
            if settled.is_pending() {
                ui::warning("Still pending; run 'premium-demo status' later to resume");
            } else {
                ui::success(&format!("Settled as {}", settled.status));
            }
        }
    }

    if options.cancel && reconciler.subscription().status == SubscriptionStatus::Active {
        manage(reconciler).await?;
    }

    let record = reconciler.subscription();
    session.save_record(&record).await?;

    ui::header("Subscription");
    ui::subscription(&record);
    if verbose {
        ui::json(&serde_json::to_value(&record)?);
    }
    show_notices(reconciler);

    toasts.unsubscribe();
    reconciler.shutdown();
    Ok(())
}

async fn manage(reconciler: &SubscriptionReconciler) -> Result<()> {
    match reconciler
        .cancel_or_manage()
        .await
        .context("Cancel failed")?
    {
        ManageOutcome::Updated(fragment) => {
            ui::success(&format!("Auto-renew off; status {}", fragment.status));
        }
        ManageOutcome::Handoff { url } => {
            ui::info("Manage the subscription at:");
            ui::key_value("URL", &url);
        }
        ManageOutcome::Noop => ui::info("Nothing to cancel"),
    }
    Ok(())
}

fn show_notices(reconciler: &SubscriptionReconciler) {
    let pending: Vec<Notice> = [reconciler.ending_notice(), reconciler.balance_notice()]
        .into_iter()
        .filter(|flow| flow.is_open())
        .filter_map(|flow| flow.params())
        .collect();
    if pending.is_empty() {
        return;
    }

    ui::header("Notices");
    for notice in pending {
        ui::warning(&format!(
            "{} notice ({}) for {}",
            notice.kind,
            notice.window,
            notice.target_date.format("%Y-%m-%d")
        ));
    }
}
