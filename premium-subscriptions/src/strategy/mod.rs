//! Subscription strategies
//!
//! One [`SubscriptionStrategy`] per payment backend. Each strategy adapts a
//! provider API (see [`crate::provider`]) to the same three capabilities:
//! start a purchase, query an attempt's status, cancel or hand off
//! management. The reconciler only ever talks to this trait, which is what
//! lets crypto and in-app purchase pending states share one poll loop.

mod crypto;
mod extension;
mod mobile_iap;
mod registry;
mod trial;

pub use crypto::CryptoStrategy;
pub use extension::ExtensionStrategy;
pub use mobile_iap::MobileIapStrategy;
pub use registry::StrategyRegistry;
pub use trial::TrialStrategy;

use crate::provider::WalletAuth;
use crate::{
    Platform, PurchasePlan, Result, Source, StatusFragment, Subscription, WalletAddress,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Outcome of [`SubscriptionStrategy::initiate`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum PurchaseResult {
    /// The provider settled the purchase synchronously.
    Immediate(StatusFragment),
    /// Confirmation arrives later; poll with `correlation_id`.
    Pending {
        correlation_id: String,
        /// Page the user must visit to finish paying, if any
        checkout_url: Option<String>,
    },
    /// The user backed out. Not an error.
    Canceled,
}

impl PurchaseResult {
    pub fn pending(correlation_id: impl Into<String>) -> Self {
        Self::Pending {
            correlation_id: correlation_id.into(),
            checkout_url: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending { .. })
    }
}

/// Outcome of [`SubscriptionStrategy::cancel_or_manage`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ManageOutcome {
    /// The backend changed the entitlement; merge this fragment.
    Updated(StatusFragment),
    /// Management happens in a platform surface the app opens.
    Handoff { url: String },
    /// Nothing to manage.
    Noop,
}

/// Payment-backend capability surface.
#[async_trait]
pub trait SubscriptionStrategy: Send + Sync {
    fn source(&self) -> Source;

    /// Whether this backend can sell on `platform`.
    fn is_available(&self, platform: Platform) -> bool;

    /// Catalog fetch.
    async fn list_plans(&self, locale: &str, promo_code: Option<&str>)
        -> Result<Vec<PurchasePlan>>;

    /// Challenge the wallet must sign before `initiate`; `None` when the
    /// backend does not verify wallet ownership.
    async fn auth_challenge(&self, wallet: &WalletAddress) -> Result<Option<String>> {
        let _ = wallet;
        Ok(None)
    }

    /// Start a purchase. User cancellation is `Ok(PurchaseResult::Canceled)`.
    async fn initiate(
        &self,
        plan: &PurchasePlan,
        auth: &WalletAuth,
        promo_code: Option<&str>,
    ) -> Result<PurchaseResult>;

    /// Read the current state of an attempt. Must be idempotent.
    async fn query_status(&self, correlation_id: &str) -> Result<StatusFragment>;

    async fn cancel_or_manage(
        &self,
        subscription: &Subscription,
        auth: &WalletAuth,
    ) -> Result<ManageOutcome>;
}

/// Correlation id of a record, or an invariant violation.
pub(crate) fn require_transaction_id(subscription: &Subscription) -> Result<&str> {
    subscription
        .original_transaction_id
        .as_deref()
        .ok_or_else(|| {
            crate::SubscriptionError::InvariantViolation(
                "subscription has no transaction id".into(),
            )
        })
}
