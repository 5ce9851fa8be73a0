//! Simulated payment backends
//!
//! Correlation ids embed their creation time (`sim-crypto-1718000000000`),
//! so a purchase started by one CLI invocation resolves the same way when a
//! later invocation resumes it.

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use premium_subscriptions::provider::{
    CheckoutSession, CheckoutState, CryptoTxState, StorePurchase, StoreTxState, TrialGrant,
};
use premium_subscriptions::{
    Amount, BalanceSource, BillingInterval, CryptoPaymentProvider, ExtensionBillingProvider,
    InAppPurchaseProvider, KeyValueStore, Price, PurchasePlan, Result, Source, SubscriptionError,
    TrialProvider, WalletAddress, WalletAuth, WalletAuthenticator,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Promo code the simulated crypto backend accepts.
pub const DEMO_PROMO: &str = "DEMO";

/// Knobs for the simulated backends (the `simulation` section of the
/// config file).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Seconds until a pending purchase confirms.
    #[serde(default = "default_confirm_after_secs")]
    pub confirm_after_secs: i64,

    /// Length of a paid term.
    #[serde(default = "default_term_days")]
    pub term_days: i64,

    /// Spendable wallet balance.
    #[serde(default = "default_balance")]
    pub balance: Amount,

    /// Decline every signing prompt.
    #[serde(default)]
    pub decline: bool,
}

fn default_confirm_after_secs() -> i64 {
    3
}

fn default_term_days() -> i64 {
    30
}

fn default_balance() -> Amount {
    Amount::new(Decimal::new(10, 0))
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            confirm_after_secs: default_confirm_after_secs(),
            term_days: default_term_days(),
            balance: default_balance(),
            decline: false,
        }
    }
}

fn correlation_id(prefix: &str) -> String {
    format!("sim-{}-{}", prefix, Utc::now().timestamp_millis())
}

fn created_at(id: &str) -> Result<DateTime<Utc>> {
    id.rsplit('-')
        .next()
        .and_then(|millis| millis.parse::<i64>().ok())
        .and_then(|millis| Utc.timestamp_millis_opt(millis).single())
        .ok_or_else(|| SubscriptionError::rejected(format!("unknown transaction {}", id)))
}

/// Shared clock logic of the simulated backends.
#[derive(Debug, Clone)]
struct Timeline {
    config: SimulationConfig,
}

impl Timeline {
    fn confirmed(&self, created: DateTime<Utc>) -> bool {
        Utc::now() >= created + Duration::seconds(self.config.confirm_after_secs)
    }

    fn term_end(&self, created: DateTime<Utc>) -> DateTime<Utc> {
        created + Duration::days(self.config.term_days)
    }
}

fn monthly_charge() -> Amount {
    Amount::new(Decimal::new(5, 0))
}

pub struct SimulatedCrypto {
    timeline: Timeline,
}

impl SimulatedCrypto {
    pub fn new(config: SimulationConfig) -> Self {
        Self {
            timeline: Timeline { config },
        }
    }
}

#[async_trait]
impl CryptoPaymentProvider for SimulatedCrypto {
    async fn plans(&self, _locale: &str, promo_code: Option<&str>) -> Result<Vec<PurchasePlan>> {
        // 20% off with the demo promo
        let factor = if promo_code == Some(DEMO_PROMO) {
            Decimal::new(8, 1)
        } else {
            Decimal::ONE
        };
        let price = |ton: i64| Price::new(Amount::new(Decimal::new(ton, 0) * factor), "TON");

        Ok(vec![
            PurchasePlan::new("crypto.monthly", Source::Crypto, price(5), BillingInterval::Monthly)
                .with_title("Premium (monthly, TON)"),
            PurchasePlan::new("crypto.yearly", Source::Crypto, price(50), BillingInterval::Yearly)
                .with_title("Premium (yearly, TON)"),
        ])
    }

    async fn validate_promo(&self, promo_code: &str) -> Result<bool> {
        Ok(promo_code == DEMO_PROMO)
    }

    async fn challenge(&self, wallet: &WalletAddress) -> Result<String> {
        Ok(format!("premium-demo:{}:{}", wallet, Utc::now().timestamp()))
    }

    async fn submit_payment(
        &self,
        plan: &PurchasePlan,
        _auth: &WalletAuth,
        _promo_code: Option<&str>,
    ) -> Result<Option<String>> {
        if self.timeline.config.decline {
            return Ok(None);
        }
        tracing::debug!(plan = %plan.id, "simulated payment broadcast");
        Ok(Some(correlation_id("crypto")))
    }

    async fn transaction_status(&self, tx_id: &str) -> Result<CryptoTxState> {
        let created = created_at(tx_id)?;
        if !self.timeline.confirmed(created) {
            return Ok(CryptoTxState::Unconfirmed);
        }
        let expires_at = self.timeline.term_end(created);
        if Utc::now() >= expires_at {
            return Ok(CryptoTxState::Expired);
        }
        Ok(CryptoTxState::Confirmed {
            expires_at,
            next_charge_at: Some(expires_at),
            charge_amount: monthly_charge(),
            auto_renew: true,
        })
    }

    async fn cancel_auto_renew(&self, tx_id: &str, _auth: &WalletAuth) -> Result<CryptoTxState> {
        let created = created_at(tx_id)?;
        Ok(CryptoTxState::Canceled {
            expires_at: self.timeline.term_end(created),
        })
    }
}

pub struct SimulatedStore {
    timeline: Timeline,
}

impl SimulatedStore {
    pub fn new(config: SimulationConfig) -> Self {
        Self {
            timeline: Timeline { config },
        }
    }
}

#[async_trait]
impl InAppPurchaseProvider for SimulatedStore {
    async fn products(&self, _locale: &str) -> Result<Vec<PurchasePlan>> {
        Ok(vec![PurchasePlan::new(
            "pro.monthly",
            Source::MobileIap,
            Price::new(Amount::new(Decimal::new(499, 2)), "USD"),
            BillingInterval::Monthly,
        )
        .with_title("Premium (monthly, store)")])
    }

    async fn purchase(&self, _product_id: &str, _auth: &WalletAuth) -> Result<StorePurchase> {
        if self.timeline.config.decline {
            return Ok(StorePurchase::UserCanceled);
        }
        Ok(StorePurchase::Completed {
            original_transaction_id: correlation_id("store"),
            state: StoreTxState::Pending,
        })
    }

    async fn transaction_status(&self, original_transaction_id: &str) -> Result<StoreTxState> {
        let created = created_at(original_transaction_id)?;
        if !self.timeline.confirmed(created) {
            return Ok(StoreTxState::Pending);
        }
        let expires_at = self.timeline.term_end(created);
        if Utc::now() >= expires_at {
            return Ok(StoreTxState::Expired);
        }
        Ok(StoreTxState::Purchased {
            expires_at,
            auto_renew: true,
            environment: Some("Sandbox".into()),
        })
    }

    fn management_url(&self) -> String {
        "https://apps.apple.com/account/subscriptions".to_string()
    }
}

pub struct SimulatedExtension {
    timeline: Timeline,
}

impl SimulatedExtension {
    pub fn new(config: SimulationConfig) -> Self {
        Self {
            timeline: Timeline { config },
        }
    }
}

#[async_trait]
impl ExtensionBillingProvider for SimulatedExtension {
    async fn plans(&self, _locale: &str, _promo_code: Option<&str>) -> Result<Vec<PurchasePlan>> {
        Ok(vec![PurchasePlan::new(
            "ext.yearly",
            Source::Extension,
            Price::new(Amount::new(Decimal::new(3999, 2)), "USD"),
            BillingInterval::Yearly,
        )
        .with_title("Premium (yearly, card)")])
    }

    async fn challenge(&self, wallet: &WalletAddress) -> Result<String> {
        Ok(format!("premium-demo-ext:{}", wallet))
    }

    async fn checkout(
        &self,
        _plan: &PurchasePlan,
        _auth: &WalletAuth,
        _promo_code: Option<&str>,
    ) -> Result<CheckoutSession> {
        let session_id = correlation_id("checkout");
        Ok(CheckoutSession {
            checkout_url: format!("https://billing.example/checkout/{}", session_id),
            session_id,
        })
    }

    async fn session_status(&self, session_id: &str) -> Result<CheckoutState> {
        let created = created_at(session_id)?;
        if !self.timeline.confirmed(created) {
            return Ok(CheckoutState::Open);
        }
        let expires_at = self.timeline.term_end(created);
        Ok(CheckoutState::Paid {
            expires_at,
            next_charge_at: Some(expires_at),
        })
    }

    async fn portal_url(&self, session_id: &str) -> Result<String> {
        Ok(format!("https://billing.example/portal/{}", session_id))
    }
}

/// Trial backend; consumed trials are remembered in the demo's store.
pub struct SimulatedTrial {
    store: Arc<dyn KeyValueStore>,
}

impl SimulatedTrial {
    const TRIAL_DAYS: i64 = 7;

    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    fn used_key(wallet: &WalletAddress) -> String {
        format!("simulation/trial/{}", wallet)
    }
}

#[async_trait]
impl TrialProvider for SimulatedTrial {
    async fn trial_plan(&self, _locale: &str) -> Result<Option<PurchasePlan>> {
        Ok(Some(
            PurchasePlan::new(
                "trial.week",
                Source::Trial,
                Price::new(Amount::zero(), "USD"),
                BillingInterval::Days {
                    days: Self::TRIAL_DAYS as u32,
                },
            )
            .with_title("Free week"),
        ))
    }

    async fn start_trial(&self, auth: &WalletAuth) -> Result<Option<TrialGrant>> {
        let trial_id = correlation_id("trial");
        let started = created_at(&trial_id)?;
        self.store.set(&Self::used_key(&auth.wallet), &trial_id).await?;
        Ok(Some(TrialGrant {
            trial_id,
            ends_at: started + Duration::days(Self::TRIAL_DAYS),
            telegram_user: Some("@premium_demo".into()),
        }))
    }

    async fn trial_status(&self, trial_id: &str) -> Result<Option<TrialGrant>> {
        let ends_at = created_at(trial_id)? + Duration::days(Self::TRIAL_DAYS);
        if Utc::now() >= ends_at {
            return Ok(None);
        }
        Ok(Some(TrialGrant {
            trial_id: trial_id.to_string(),
            ends_at,
            telegram_user: Some("@premium_demo".into()),
        }))
    }

    async fn trial_used(&self, wallet: &WalletAddress) -> Result<bool> {
        Ok(self.store.get(&Self::used_key(wallet)).await?.is_some())
    }
}

/// Signs every challenge unless declining is configured.
pub struct SimulatedWallet {
    decline: bool,
}

impl SimulatedWallet {
    pub fn new(config: &SimulationConfig) -> Self {
        Self {
            decline: config.decline,
        }
    }
}

#[async_trait]
impl WalletAuthenticator for SimulatedWallet {
    async fn sign_challenge(&self, wallet: &WalletAddress, challenge: &str) -> Result<String> {
        if self.decline {
            return Err(SubscriptionError::AuthFailure(
                "signing declined in wallet".into(),
            ));
        }
        Ok(format!("sig:{}:{}", wallet, challenge.len()))
    }
}

pub struct SimulatedBalance {
    balance: Amount,
}

impl SimulatedBalance {
    pub fn new(config: &SimulationConfig) -> Self {
        Self {
            balance: config.balance,
        }
    }
}

#[async_trait]
impl BalanceSource for SimulatedBalance {
    async fn balance(&self, _wallet: &WalletAddress) -> Result<Amount> {
        Ok(self.balance)
    }
}
