//! Time-limited trial strategy.

use super::{ManageOutcome, PurchaseResult, SubscriptionStrategy};
use crate::provider::{TrialGrant, TrialProvider, WalletAuth};
use crate::{
    BackendDetails, Platform, PurchasePlan, Result, Source, StatusFragment, Subscription,
    SubscriptionError, SubscriptionStatus,
};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

/// One free trial per wallet, unlocked through a telegram login.
pub struct TrialStrategy {
    provider: Arc<dyn TrialProvider>,
}

impl TrialStrategy {
    pub fn new(provider: Arc<dyn TrialProvider>) -> Self {
        Self { provider }
    }

    fn fragment_for(grant: &TrialGrant) -> StatusFragment {
        let status = if grant.ends_at > Utc::now() {
            SubscriptionStatus::Active
        } else {
            SubscriptionStatus::Expired
        };
        StatusFragment::new(status)
            .with_expires(grant.ends_at)
            .with_transaction_id(grant.trial_id.clone())
            .with_backend(BackendDetails::Trial {
                trial_ends_at: Some(grant.ends_at),
                telegram_user: grant.telegram_user.clone(),
            })
    }
}

#[async_trait]
impl SubscriptionStrategy for TrialStrategy {
    fn source(&self) -> Source {
        Source::Trial
    }

    fn is_available(&self, _platform: Platform) -> bool {
        true
    }

    async fn list_plans(
        &self,
        locale: &str,
        _promo_code: Option<&str>,
    ) -> Result<Vec<PurchasePlan>> {
        Ok(self.provider.trial_plan(locale).await?.into_iter().collect())
    }

    #[tracing::instrument(skip(self, plan, auth), fields(plan = %plan.id, wallet = %auth.wallet))]
    async fn initiate(
        &self,
        plan: &PurchasePlan,
        auth: &WalletAuth,
        _promo_code: Option<&str>,
    ) -> Result<PurchaseResult> {
        if self.provider.trial_used(&auth.wallet).await? {
            return Err(SubscriptionError::rejected("trial already used"));
        }
        match self.provider.start_trial(auth).await? {
            Some(grant) => Ok(PurchaseResult::Immediate(Self::fragment_for(&grant))),
            None => Ok(PurchaseResult::Canceled),
        }
    }

    async fn query_status(&self, correlation_id: &str) -> Result<StatusFragment> {
        match self.provider.trial_status(correlation_id).await? {
            Some(grant) => Ok(Self::fragment_for(&grant)),
            None => Ok(StatusFragment::new(SubscriptionStatus::Expired)),
        }
    }

    async fn cancel_or_manage(
        &self,
        _subscription: &Subscription,
        _auth: &WalletAuth,
    ) -> Result<ManageOutcome> {
        Ok(ManageOutcome::Noop)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_grant_mapping() {
        let live = TrialGrant {
            trial_id: "trial-1".into(),
            ends_at: Utc::now() + Duration::days(7),
            telegram_user: Some("tg-9".into()),
        };
        let fragment = TrialStrategy::fragment_for(&live);
        assert_eq!(fragment.status, SubscriptionStatus::Active);
        assert_eq!(fragment.original_transaction_id.as_deref(), Some("trial-1"));

        let over = TrialGrant {
            ends_at: Utc::now() - Duration::minutes(1),
            ..live
        };
        assert_eq!(
            TrialStrategy::fragment_for(&over).status,
            SubscriptionStatus::Expired
        );
    }
}
