//! Select or forget the demo wallet

use anyhow::Result;
use premium_subscriptions::WalletAddress;
use std::path::Path;

use super::{current_wallet_path, get_current_wallet, set_current_wallet};
use crate::ui;

/// Make `address` the wallet later commands act on
#[tracing::instrument(skip(storage_dir))]
pub async fn run(storage_dir: &Path, address: &str, verbose: bool) -> Result<()> {
    let address = address.trim();
    if address.is_empty() {
        anyhow::bail!("Wallet address cannot be empty");
    }
    let wallet = WalletAddress::new(address);
    set_current_wallet(storage_dir, &wallet)?;

    ui::success(&format!("Logged in as {}", wallet));
    if verbose {
        ui::key_value("Storage", &storage_dir.display().to_string());
    }
    Ok(())
}

/// Forget the current wallet. Its pending purchase stays cached and resumes
/// on the next login.
#[tracing::instrument(skip(storage_dir))]
pub async fn logout(storage_dir: &Path, _verbose: bool) -> Result<()> {
    match get_current_wallet(storage_dir)? {
        Some(wallet) => {
            std::fs::remove_file(current_wallet_path(storage_dir))?;
            ui::success(&format!("Logged out {}", wallet));
        }
        None => ui::info("No wallet was logged in"),
    }
    Ok(())
}
