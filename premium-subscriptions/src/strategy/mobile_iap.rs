//! Mobile in-app purchase strategy.

use super::{ManageOutcome, PurchaseResult, SubscriptionStrategy};
use crate::provider::{InAppPurchaseProvider, StorePurchase, StoreTxState, WalletAuth};
use crate::{
    BackendDetails, Platform, PurchasePlan, Result, Source, StatusFragment, Subscription,
    SubscriptionError, SubscriptionStatus,
};
use async_trait::async_trait;
use std::sync::Arc;

/// Buys premium through the platform store.
///
/// Only sells on mobile. Management is handed off to the store's own
/// subscription screen.
pub struct MobileIapStrategy {
    provider: Arc<dyn InAppPurchaseProvider>,
}

impl MobileIapStrategy {
    pub fn new(provider: Arc<dyn InAppPurchaseProvider>) -> Self {
        Self { provider }
    }

    fn fragment_for(product_id: Option<&str>, state: StoreTxState) -> Result<StatusFragment> {
        let fragment = match state {
            StoreTxState::Pending => StatusFragment::pending(),
            StoreTxState::Purchased {
                expires_at,
                auto_renew,
                environment,
            } => {
                let fragment = StatusFragment::active(expires_at).with_backend(
                    BackendDetails::MobileIap {
                        product_id: product_id.unwrap_or_default().to_string(),
                        auto_renew,
                        environment,
                    },
                );
                if auto_renew {
                    fragment.with_next_charge(expires_at)
                } else {
                    fragment
                }
            }
            StoreTxState::RenewalDisabled { expires_at } => {
                StatusFragment::new(SubscriptionStatus::Canceled).with_expires(expires_at)
            }
            StoreTxState::Expired => StatusFragment::new(SubscriptionStatus::Expired),
            StoreTxState::Revoked { reason } => return Err(SubscriptionError::rejected(reason)),
        };
        Ok(fragment)
    }
}

#[async_trait]
impl SubscriptionStrategy for MobileIapStrategy {
    fn source(&self) -> Source {
        Source::MobileIap
    }

    fn is_available(&self, platform: Platform) -> bool {
        platform == Platform::Mobile
    }

    async fn list_plans(
        &self,
        locale: &str,
        _promo_code: Option<&str>,
    ) -> Result<Vec<PurchasePlan>> {
        self.provider.products(locale).await
    }

    #[tracing::instrument(skip(self, plan, auth), fields(product = %plan.id))]
    async fn initiate(
        &self,
        plan: &PurchasePlan,
        auth: &WalletAuth,
        promo_code: Option<&str>,
    ) -> Result<PurchaseResult> {
        if promo_code.is_some() {
            tracing::debug!("promo codes are not supported by store billing; ignored");
        }

        match self.provider.purchase(&plan.id, auth).await? {
            StorePurchase::UserCanceled => Ok(PurchaseResult::Canceled),
            StorePurchase::Completed {
                original_transaction_id,
                state: StoreTxState::Pending,
            } => Ok(PurchaseResult::pending(original_transaction_id)),
            StorePurchase::Completed {
                original_transaction_id,
                state,
            } => {
                let fragment = Self::fragment_for(Some(&plan.id), state)?
                    .with_transaction_id(original_transaction_id);
                Ok(PurchaseResult::Immediate(fragment))
            }
        }
    }

    async fn query_status(&self, correlation_id: &str) -> Result<StatusFragment> {
        let state = self.provider.transaction_status(correlation_id).await?;
        Self::fragment_for(None, state)
    }

    async fn cancel_or_manage(
        &self,
        _subscription: &Subscription,
        _auth: &WalletAuth,
    ) -> Result<ManageOutcome> {
        Ok(ManageOutcome::Handoff {
            url: self.provider.management_url(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    #[test]
    fn test_auto_renewing_purchase_has_next_charge() {
        let expires = Utc::now() + Duration::days(30);
        let fragment = MobileIapStrategy::fragment_for(
            Some("pro.monthly"),
            StoreTxState::Purchased {
                expires_at: expires,
                auto_renew: true,
                environment: Some("sandbox".into()),
            },
        )
        .unwrap();

        assert_eq!(fragment.status, SubscriptionStatus::Active);
        assert_eq!(fragment.next_charge_date, Some(expires));
        assert!(matches!(
            fragment.backend,
            Some(BackendDetails::MobileIap { ref product_id, .. }) if product_id == "pro.monthly"
        ));
    }

    #[test]
    fn test_renewal_disabled_is_canceled() {
        let expires = Utc::now() + Duration::days(2);
        let fragment = MobileIapStrategy::fragment_for(
            None,
            StoreTxState::RenewalDisabled {
                expires_at: expires,
            },
        )
        .unwrap();
        assert_eq!(fragment.status, SubscriptionStatus::Canceled);
        assert_eq!(fragment.expires_date, Some(expires));
    }
}
