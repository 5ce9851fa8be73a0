//! On-chain crypto payment strategy.

use super::{require_transaction_id, ManageOutcome, PurchaseResult, SubscriptionStrategy};
use crate::provider::{CryptoPaymentProvider, CryptoTxState, WalletAuth};
use crate::{
    BackendDetails, Platform, PurchasePlan, Result, Source, StatusFragment, Subscription,
    SubscriptionError, SubscriptionStatus, WalletAddress,
};
use async_trait::async_trait;
use std::sync::Arc;

const PROMO_MIN_LEN: usize = 3;
const PROMO_MAX_LEN: usize = 32;

/// Pays for premium with a signed on-chain transfer.
///
/// Promo codes are only accepted here. A malformed code is rejected locally,
/// an unknown one after asking the backend; neither touches subscription
/// state.
pub struct CryptoStrategy {
    provider: Arc<dyn CryptoPaymentProvider>,
}

impl CryptoStrategy {
    pub fn new(provider: Arc<dyn CryptoPaymentProvider>) -> Self {
        Self { provider }
    }

    /// Local format check: 3-32 ASCII letters, digits, `-` or `_`.
    pub fn check_promo_format(promo_code: &str) -> Result<()> {
        let len = promo_code.len();
        let well_formed = (PROMO_MIN_LEN..=PROMO_MAX_LEN).contains(&len)
            && promo_code
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if well_formed {
            Ok(())
        } else {
            Err(SubscriptionError::InvalidPromoCode(promo_code.to_string()))
        }
    }

    async fn validate_promo(&self, promo_code: &str) -> Result<()> {
        Self::check_promo_format(promo_code)?;
        if self.provider.validate_promo(promo_code).await? {
            Ok(())
        } else {
            Err(SubscriptionError::InvalidPromoCode(promo_code.to_string()))
        }
    }

    fn fragment_for(state: CryptoTxState) -> Result<StatusFragment> {
        let fragment = match state {
            CryptoTxState::Unconfirmed => StatusFragment::pending(),
            CryptoTxState::Confirmed {
                expires_at,
                next_charge_at,
                charge_amount,
                auto_renew,
            } => {
                let fragment = StatusFragment::active(expires_at).with_backend(
                    BackendDetails::Crypto {
                        promo_code: None,
                        charge_amount: Some(charge_amount),
                        auto_renew,
                    },
                );
                match next_charge_at.filter(|_| auto_renew) {
                    Some(next) => fragment.with_next_charge(next),
                    None => fragment,
                }
            }
            CryptoTxState::Canceled { expires_at } => {
                StatusFragment::new(SubscriptionStatus::Canceled).with_expires(expires_at)
            }
            CryptoTxState::Expired => StatusFragment::new(SubscriptionStatus::Expired),
            CryptoTxState::Failed { reason } => return Err(SubscriptionError::rejected(reason)),
        };
        Ok(fragment)
    }
}

#[async_trait]
impl SubscriptionStrategy for CryptoStrategy {
    fn source(&self) -> Source {
        Source::Crypto
    }

    fn is_available(&self, _platform: Platform) -> bool {
        true
    }

    async fn list_plans(
        &self,
        locale: &str,
        promo_code: Option<&str>,
    ) -> Result<Vec<PurchasePlan>> {
        if let Some(code) = promo_code {
            self.validate_promo(code).await?;
        }
        self.provider.plans(locale, promo_code).await
    }

    async fn auth_challenge(&self, wallet: &WalletAddress) -> Result<Option<String>> {
        self.provider.challenge(wallet).await.map(Some)
    }

    #[tracing::instrument(skip(self, plan, auth), fields(plan = %plan.id, wallet = %auth.wallet))]
    async fn initiate(
        &self,
        plan: &PurchasePlan,
        auth: &WalletAuth,
        promo_code: Option<&str>,
    ) -> Result<PurchaseResult> {
        if !auth.is_signed() {
            return Err(SubscriptionError::AuthFailure(
                "crypto payment requires a signed wallet challenge".into(),
            ));
        }
        if let Some(code) = promo_code {
            self.validate_promo(code).await?;
        }

        match self.provider.submit_payment(plan, auth, promo_code).await? {
            Some(tx_id) => {
                tracing::info!(tx = %tx_id, "crypto payment submitted");
                Ok(PurchaseResult::pending(tx_id))
            }
            None => Ok(PurchaseResult::Canceled),
        }
    }

    async fn query_status(&self, correlation_id: &str) -> Result<StatusFragment> {
        let state = self.provider.transaction_status(correlation_id).await?;
        Self::fragment_for(state)
    }

    async fn cancel_or_manage(
        &self,
        subscription: &Subscription,
        auth: &WalletAuth,
    ) -> Result<ManageOutcome> {
        let tx_id = require_transaction_id(subscription)?;
        let state = self.provider.cancel_auto_renew(tx_id, auth).await?;
        Ok(ManageOutcome::Updated(Self::fragment_for(state)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    #[test]
    fn test_promo_format() {
        assert!(CryptoStrategy::check_promo_format("SPRING-24").is_ok());
        assert!(CryptoStrategy::check_promo_format("ab").is_err());
        assert!(CryptoStrategy::check_promo_format("has space").is_err());
        assert!(CryptoStrategy::check_promo_format(&"x".repeat(33)).is_err());
    }

    #[test]
    fn test_confirmed_maps_to_active() {
        let expires = Utc::now() + Duration::days(30);
        let fragment = CryptoStrategy::fragment_for(CryptoTxState::Confirmed {
            expires_at: expires,
            next_charge_at: Some(expires),
            charge_amount: crate::Amount::from_minor(5, 0),
            auto_renew: false,
        })
        .unwrap();

        assert_eq!(fragment.status, SubscriptionStatus::Active);
        assert_eq!(fragment.expires_date, Some(expires));
        // No next charge without auto-renew.
        assert!(fragment.next_charge_date.is_none());
    }

    #[test]
    fn test_failed_is_rejection() {
        let err = CryptoStrategy::fragment_for(CryptoTxState::Failed {
            reason: "bounced".into(),
        })
        .unwrap_err();
        assert!(err.is_terminal_for_attempt());
    }
}
