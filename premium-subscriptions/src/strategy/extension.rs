//! Browser-extension billing strategy.

use super::{require_transaction_id, ManageOutcome, PurchaseResult, SubscriptionStrategy};
use crate::provider::{CheckoutState, ExtensionBillingProvider, WalletAuth};
use crate::{
    BackendDetails, Platform, PurchasePlan, Result, Source, StatusFragment, Subscription,
    SubscriptionError, SubscriptionStatus, WalletAddress,
};
use async_trait::async_trait;
use std::sync::Arc;

/// Buys premium through a hosted checkout opened from the extension.
///
/// Checkout always completes out of band, so `initiate` never resolves
/// immediately.
pub struct ExtensionStrategy {
    provider: Arc<dyn ExtensionBillingProvider>,
}

impl ExtensionStrategy {
    pub fn new(provider: Arc<dyn ExtensionBillingProvider>) -> Self {
        Self { provider }
    }

    fn fragment_for(state: CheckoutState) -> StatusFragment {
        match state {
            CheckoutState::Open => StatusFragment::pending(),
            CheckoutState::Paid {
                expires_at,
                next_charge_at,
            } => {
                let fragment =
                    StatusFragment::active(expires_at).with_backend(BackendDetails::Extension {
                        auto_renew: next_charge_at.is_some(),
                        management_url: None,
                    });
                match next_charge_at {
                    Some(next) => fragment.with_next_charge(next),
                    None => fragment,
                }
            }
            CheckoutState::Canceled { expires_at } => {
                let fragment = StatusFragment::new(SubscriptionStatus::Canceled);
                match expires_at {
                    Some(expires) => fragment.with_expires(expires),
                    None => fragment,
                }
            }
            CheckoutState::Expired => StatusFragment::new(SubscriptionStatus::Expired),
            // Closing the checkout tab ends the attempt without an entitlement.
            CheckoutState::Abandoned => StatusFragment::new(SubscriptionStatus::Canceled),
        }
    }
}

#[async_trait]
impl SubscriptionStrategy for ExtensionStrategy {
    fn source(&self) -> Source {
        Source::Extension
    }

    fn is_available(&self, platform: Platform) -> bool {
        platform == Platform::Extension
    }

    async fn list_plans(
        &self,
        locale: &str,
        promo_code: Option<&str>,
    ) -> Result<Vec<PurchasePlan>> {
        self.provider.plans(locale, promo_code).await
    }

    async fn auth_challenge(&self, wallet: &WalletAddress) -> Result<Option<String>> {
        self.provider.challenge(wallet).await.map(Some)
    }

    #[tracing::instrument(skip(self, plan, auth), fields(plan = %plan.id))]
    async fn initiate(
        &self,
        plan: &PurchasePlan,
        auth: &WalletAuth,
        promo_code: Option<&str>,
    ) -> Result<PurchaseResult> {
        if !auth.is_signed() {
            return Err(SubscriptionError::AuthFailure(
                "extension checkout requires a signed wallet challenge".into(),
            ));
        }
        let session = self.provider.checkout(plan, auth, promo_code).await?;
        Ok(PurchaseResult::Pending {
            correlation_id: session.session_id,
            checkout_url: Some(session.checkout_url),
        })
    }

    async fn query_status(&self, correlation_id: &str) -> Result<StatusFragment> {
        let state = self.provider.session_status(correlation_id).await?;
        Ok(Self::fragment_for(state))
    }

    async fn cancel_or_manage(
        &self,
        subscription: &Subscription,
        _auth: &WalletAuth,
    ) -> Result<ManageOutcome> {
        let session_id = require_transaction_id(subscription)?;
        let url = self.provider.portal_url(session_id).await?;
        Ok(ManageOutcome::Handoff { url })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    #[test]
    fn test_checkout_state_mapping() {
        assert!(ExtensionStrategy::fragment_for(CheckoutState::Open)
            .status
            .is_pending());
        assert_eq!(
            ExtensionStrategy::fragment_for(CheckoutState::Abandoned).status,
            SubscriptionStatus::Canceled
        );

        let expires = Utc::now() + Duration::days(30);
        let paid = ExtensionStrategy::fragment_for(CheckoutState::Paid {
            expires_at: expires,
            next_charge_at: Some(expires),
        });
        assert_eq!(paid.status, SubscriptionStatus::Active);
        assert_eq!(paid.next_charge_date, Some(expires));
    }
}
