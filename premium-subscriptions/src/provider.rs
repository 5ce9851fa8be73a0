//! External collaborators
//!
//! These traits describe the payment-provider APIs, the wallet authenticator
//! and the balance lookup the core depends on. Implementations live with the
//! application (HTTP clients, store SDK bridges, extension messaging); tests
//! and the demo CLI use scripted doubles.

use crate::{Amount, PurchasePlan, Result, WalletAddress};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Proof that the caller controls a wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletAuth {
    pub wallet: WalletAddress,
    pub challenge: Option<String>,
    pub signature: Option<String>,
}

impl WalletAuth {
    /// Wallet identity without a signed proof.
    pub fn unsigned(wallet: WalletAddress) -> Self {
        Self {
            wallet,
            challenge: None,
            signature: None,
        }
    }

    pub fn signed(wallet: WalletAddress, challenge: String, signature: String) -> Self {
        Self {
            wallet,
            challenge: Some(challenge),
            signature: Some(signature),
        }
    }

    pub fn is_signed(&self) -> bool {
        self.signature.is_some()
    }
}

/// Signs ownership challenges with the wallet key.
#[async_trait]
pub trait WalletAuthenticator: Send + Sync {
    /// Returns the signature, or `AuthFailure` when the user or the keystore
    /// refused.
    async fn sign_challenge(&self, wallet: &WalletAddress, challenge: &str) -> Result<String>;
}

/// Reads spendable wallet balance for low-balance notices.
#[async_trait]
pub trait BalanceSource: Send + Sync {
    async fn balance(&self, wallet: &WalletAddress) -> Result<Amount>;
}

/// Raw state of an on-chain payment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CryptoTxState {
    /// Broadcast, not yet confirmed
    Unconfirmed,
    /// Confirmed; entitlement granted
    Confirmed {
        expires_at: DateTime<Utc>,
        next_charge_at: Option<DateTime<Utc>>,
        charge_amount: Amount,
        auto_renew: bool,
    },
    /// Auto-renew turned off; entitlement runs until `expires_at`
    Canceled { expires_at: DateTime<Utc> },
    Expired,
    /// Bounced or never included
    Failed { reason: String },
}

/// Backend accepting on-chain subscription payments.
#[async_trait]
pub trait CryptoPaymentProvider: Send + Sync {
    async fn plans(&self, locale: &str, promo_code: Option<&str>) -> Result<Vec<PurchasePlan>>;
    /// Remote promo validation; `false` for unknown or exhausted codes.
    async fn validate_promo(&self, promo_code: &str) -> Result<bool>;
    /// Server-issued challenge the wallet must sign before paying.
    async fn challenge(&self, wallet: &WalletAddress) -> Result<String>;
    /// Submit the payment. `Ok(None)` means the user declined in the
    /// signing prompt; `Ok(Some(tx))` is the transaction to track.
    async fn submit_payment(
        &self,
        plan: &PurchasePlan,
        auth: &WalletAuth,
        promo_code: Option<&str>,
    ) -> Result<Option<String>>;
    async fn transaction_status(&self, tx_id: &str) -> Result<CryptoTxState>;
    /// Turn auto-renew off on-chain.
    async fn cancel_auto_renew(&self, tx_id: &str, auth: &WalletAuth) -> Result<CryptoTxState>;
}

/// Raw state of a store transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum StoreTxState {
    /// Purchasing, deferred (ask-to-buy) or awaiting server verification
    Pending,
    Purchased {
        expires_at: DateTime<Utc>,
        auto_renew: bool,
        environment: Option<String>,
    },
    /// Auto-renew disabled by the user in the store
    RenewalDisabled { expires_at: DateTime<Utc> },
    Expired,
    Revoked { reason: String },
}

/// Outcome of a native store purchase sheet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StorePurchase {
    Completed {
        original_transaction_id: String,
        state: StoreTxState,
    },
    UserCanceled,
}

/// Mobile store (App Store / Play) billing bridge.
#[async_trait]
pub trait InAppPurchaseProvider: Send + Sync {
    async fn products(&self, locale: &str) -> Result<Vec<PurchasePlan>>;
    async fn purchase(&self, product_id: &str, auth: &WalletAuth) -> Result<StorePurchase>;
    async fn transaction_status(&self, original_transaction_id: &str) -> Result<StoreTxState>;
    /// Deep link into the platform's subscription management screen.
    fn management_url(&self) -> String;
}

/// Raw state of an extension billing checkout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CheckoutState {
    Open,
    Paid {
        expires_at: DateTime<Utc>,
        next_charge_at: Option<DateTime<Utc>>,
    },
    Canceled { expires_at: Option<DateTime<Utc>> },
    Expired,
    Abandoned,
}

/// Outcome of starting an extension checkout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub session_id: String,
    /// Hosted checkout page the extension opens in a tab
    pub checkout_url: String,
}

/// Browser-extension billing backend.
#[async_trait]
pub trait ExtensionBillingProvider: Send + Sync {
    async fn plans(&self, locale: &str, promo_code: Option<&str>) -> Result<Vec<PurchasePlan>>;
    async fn challenge(&self, wallet: &WalletAddress) -> Result<String>;
    async fn checkout(
        &self,
        plan: &PurchasePlan,
        auth: &WalletAuth,
        promo_code: Option<&str>,
    ) -> Result<CheckoutSession>;
    async fn session_status(&self, session_id: &str) -> Result<CheckoutState>;
    async fn portal_url(&self, session_id: &str) -> Result<String>;
}

/// Trial eligibility and activation (linked to a telegram account).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialGrant {
    pub trial_id: String,
    pub ends_at: DateTime<Utc>,
    pub telegram_user: Option<String>,
}

#[async_trait]
pub trait TrialProvider: Send + Sync {
    async fn trial_plan(&self, locale: &str) -> Result<Option<PurchasePlan>>;
    /// Returns `Ok(None)` when the user aborted the telegram login.
    async fn start_trial(&self, auth: &WalletAuth) -> Result<Option<TrialGrant>>;
    async fn trial_status(&self, trial_id: &str) -> Result<Option<TrialGrant>>;
    /// Whether this wallet already consumed its trial.
    async fn trial_used(&self, wallet: &WalletAddress) -> Result<bool>;
}
