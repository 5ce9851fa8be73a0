//! CLI command implementations

pub mod buy;
pub mod config;
pub mod login;
pub mod plans;
pub mod status;

use anyhow::{anyhow, Context, Result};
use premium_subscriptions::{
    CryptoStrategy, ExtensionStrategy, FileStore, KeyValueStore, MobileIapStrategy,
    PremiumStorage, ReconcilerConfig, StrategyRegistry, Subscription, SubscriptionReconciler,
    TrialStrategy, WalletAddress,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::simulated::{
    SimulatedBalance, SimulatedCrypto, SimulatedExtension, SimulatedStore, SimulatedTrial,
    SimulatedWallet, SimulationConfig,
};

/// Contents of the `--config` file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DemoConfig {
    #[serde(default)]
    pub reconciler: ReconcilerConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
}

impl DemoConfig {
    /// Load from a JSON file, or use defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: Self = serde_json::from_str(&raw)
            .with_context(|| format!("Invalid config {}", path.display()))?;
        config.reconciler.validate()?;
        Ok(config)
    }
}

/// A reconciler wired to the simulated backends.
pub struct Session {
    pub reconciler: SubscriptionReconciler,
    pub storage: PremiumStorage,
    store: Arc<dyn KeyValueStore>,
}

impl Session {
    pub fn open(storage_dir: &Path, config: &DemoConfig) -> Result<Self> {
        let store: Arc<dyn KeyValueStore> = Arc::new(
            FileStore::new(storage_dir.join("store"))
                .map_err(|e| anyhow!("Failed to create storage: {}", e))?,
        );
        let sim = &config.simulation;

        let registry = StrategyRegistry::new()
            .with(Arc::new(CryptoStrategy::new(Arc::new(SimulatedCrypto::new(
                sim.clone(),
            )))))
            .with(Arc::new(MobileIapStrategy::new(Arc::new(
                SimulatedStore::new(sim.clone()),
            ))))
            .with(Arc::new(ExtensionStrategy::new(Arc::new(
                SimulatedExtension::new(sim.clone()),
            ))))
            .with(Arc::new(TrialStrategy::new(Arc::new(SimulatedTrial::new(
                store.clone(),
            )))));

        let storage = PremiumStorage::new(store.clone());
        let reconciler = SubscriptionReconciler::new(
            Arc::new(registry),
            storage.clone(),
            Arc::new(SimulatedWallet::new(sim)),
            config.reconciler.clone(),
        )?
        .with_balance_source(Arc::new(SimulatedBalance::new(sim)));

        Ok(Self {
            reconciler,
            storage,
            store,
        })
    }

    fn record_key(wallet: &WalletAddress) -> String {
        format!("demo/{}/record", wallet)
    }

    /// Remember the record so later invocations can show it.
    pub async fn save_record(&self, record: &Subscription) -> Result<()> {
        let Some(wallet) = &record.auth_wallet else {
            return Ok(());
        };
        let json = serde_json::to_string(record)?;
        self.store.set(&Self::record_key(wallet), &json).await?;
        Ok(())
    }

    pub async fn last_record(&self, wallet: &WalletAddress) -> Result<Option<Subscription>> {
        match self.store.get(&Self::record_key(wallet)).await? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// Wait until the current attempt leaves `Pending` or polling stops.
    pub async fn wait_settled(&self, timeout: Duration) -> Subscription {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let watch = self.reconciler.subscribe(move |record: &Subscription| {
            let _ = tx.send(record.clone());
        });

        let deadline = tokio::time::Instant::now() + timeout;
        let mut latest = self.reconciler.subscription();
        while latest.is_pending() && self.reconciler.is_polling() {
            match tokio::time::timeout_at(deadline, rx.recv()).await {
                Ok(Some(record)) => latest = record,
                Ok(None) | Err(_) => break,
            }
        }
        watch.unsubscribe();
        self.reconciler.subscription()
    }
}

/// Get the path to the current wallet marker file
pub fn current_wallet_path(storage_dir: &Path) -> PathBuf {
    storage_dir.join(".current_wallet")
}

/// Get the current wallet
pub fn get_current_wallet(storage_dir: &Path) -> Result<Option<WalletAddress>> {
    let path = current_wallet_path(storage_dir);
    if !path.exists() {
        return Ok(None);
    }
    let address = std::fs::read_to_string(path)?;
    Ok(Some(WalletAddress::new(address.trim())))
}

/// Set the current wallet
pub fn set_current_wallet(storage_dir: &Path, wallet: &WalletAddress) -> Result<()> {
    std::fs::create_dir_all(storage_dir)?;
    std::fs::write(current_wallet_path(storage_dir), wallet.as_str())?;
    Ok(())
}

/// Load the current wallet or fail with a hint
pub fn require_wallet(storage_dir: &Path) -> Result<WalletAddress> {
    get_current_wallet(storage_dir)?
        .ok_or_else(|| anyhow!("No wallet selected. Run 'premium-demo login <address>' first."))
}
