//! Terminal UI utilities

use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use premium_subscriptions::{Subscription, SubscriptionStatus, Toast, ToastLevel};
use std::time::Duration;

/// Print a success message
pub fn success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print an error message
pub fn error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message);
}

/// Print an info message
pub fn info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Print a warning message
pub fn warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Print a section header
pub fn header(text: &str) {
    println!("\n{}", text.bold().underline());
}

/// Print a key-value pair
pub fn key_value(key: &str, value: &str) {
    println!("  {}: {}", key.cyan(), value);
}

/// Create a spinner progress indicator
pub fn spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Print a separator line
pub fn separator() {
    println!("{}", "─".repeat(60).dimmed());
}

/// Print JSON prettily
pub fn json(value: &serde_json::Value) {
    if let Ok(pretty) = serde_json::to_string_pretty(value) {
        println!("{}", pretty);
    }
}

/// Colored status label
pub fn status_label(status: SubscriptionStatus) -> String {
    match status {
        SubscriptionStatus::Active => status.as_str().green().bold().to_string(),
        SubscriptionStatus::Pending => status.as_str().yellow().to_string(),
        SubscriptionStatus::Canceled => status.as_str().magenta().to_string(),
        SubscriptionStatus::Expired => status.as_str().red().to_string(),
        SubscriptionStatus::None => status.as_str().dimmed().to_string(),
    }
}

/// Print the entitlement record
pub fn subscription(record: &Subscription) {
    let dash = || "-".to_string();
    key_value("Status", &status_label(record.status));
    key_value(
        "Wallet",
        &record
            .auth_wallet
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_else(dash),
    );
    key_value(
        "Source",
        &record
            .source()
            .map(|s| s.to_string())
            .unwrap_or_else(dash),
    );
    key_value(
        "Transaction",
        record.original_transaction_id.as_deref().unwrap_or("-"),
    );
    if let Some(expires) = record.expires_date {
        key_value("Expires", &expires.format("%Y-%m-%d %H:%M UTC").to_string());
    }
    if let Some(next) = record.next_charge_date {
        key_value(
            "Next charge",
            &next.format("%Y-%m-%d %H:%M UTC").to_string(),
        );
    }
    key_value("Auto-renew", if record.auto_renews() { "yes" } else { "no" });
}

/// Print a toast at its level
pub fn toast(toast: &Toast) {
    match toast.level {
        ToastLevel::Info => info(&toast.message),
        ToastLevel::Warning => warning(&toast.message),
        ToastLevel::Error => error(&toast.message),
    }
}
