//! Strategy lookup table
//!
//! Strategies are resolved by [`Source`] once, when a purchase starts. The
//! registry never inspects strategy objects to guess what they are.

use super::SubscriptionStrategy;
use crate::{Platform, Result, Source, SubscriptionError};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Registry of the strategies available in this session.
///
/// # Example
///
/// ```ignore
/// let registry = StrategyRegistry::new();
/// registry.register(Arc::new(CryptoStrategy::new(provider)));
///
/// let strategy = registry.resolve(None, Platform::Desktop)?;
/// assert_eq!(strategy.source(), Source::Crypto);
/// ```
pub struct StrategyRegistry {
    strategies: RwLock<HashMap<Source, Arc<dyn SubscriptionStrategy>>>,
}

impl StrategyRegistry {
    /// Creates a new empty registry.
    pub fn new() -> Self {
        Self {
            strategies: RwLock::new(HashMap::new()),
        }
    }

    /// Registers a strategy, replacing any previous one for the same source.
    pub fn register(&self, strategy: Arc<dyn SubscriptionStrategy>) {
        let source = strategy.source();
        let mut strategies = self.strategies.write().unwrap_or_else(|e| e.into_inner());
        strategies.insert(source, strategy);
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(self, strategy: Arc<dyn SubscriptionStrategy>) -> Self {
        self.register(strategy);
        self
    }

    pub fn get(&self, source: Source) -> Option<Arc<dyn SubscriptionStrategy>> {
        let strategies = self.strategies.read().unwrap_or_else(|e| e.into_inner());
        strategies.get(&source).cloned()
    }

    /// Gets a strategy, returning an error if not registered.
    pub fn get_required(&self, source: Source) -> Result<Arc<dyn SubscriptionStrategy>> {
        self.get(source)
            .ok_or(SubscriptionError::StrategyUnavailable(source))
    }

    /// Registered sources, in declaration order.
    pub fn sources(&self) -> Vec<Source> {
        let strategies = self.strategies.read().unwrap_or_else(|e| e.into_inner());
        Source::ALL
            .into_iter()
            .filter(|s| strategies.contains_key(s))
            .collect()
    }

    pub fn len(&self) -> usize {
        let strategies = self.strategies.read().unwrap_or_else(|e| e.into_inner());
        strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Pick the strategy for a new purchase.
    ///
    /// Precedence: the wallet's previous source if it is still registered and
    /// available, then the platform-native source, then crypto, then trial.
    pub fn resolve(
        &self,
        previous: Option<Source>,
        platform: Platform,
    ) -> Result<Arc<dyn SubscriptionStrategy>> {
        let native = match platform {
            Platform::Mobile => Some(Source::MobileIap),
            Platform::Extension => Some(Source::Extension),
            Platform::Desktop | Platform::Telegram => None,
        };

        let candidates = previous
            .into_iter()
            .chain(native)
            .chain([Source::Crypto, Source::Trial]);

        for source in candidates {
            if let Some(strategy) = self.get(source) {
                if strategy.is_available(platform) {
                    tracing::debug!(%source, platform = platform.as_str(), "strategy resolved");
                    return Ok(strategy);
                }
            }
        }

        Err(SubscriptionError::StrategyUnavailable(
            previous.unwrap_or(Source::Crypto),
        ))
    }
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::super::{ManageOutcome, PurchaseResult};
    use super::*;
    use crate::provider::WalletAuth;
    use crate::{PurchasePlan, StatusFragment, Subscription, SubscriptionStatus};
    use async_trait::async_trait;

    struct FixedStrategy {
        source: Source,
        platforms: Vec<Platform>,
    }

    impl FixedStrategy {
        fn everywhere(source: Source) -> Arc<Self> {
            Arc::new(Self {
                source,
                platforms: vec![
                    Platform::Desktop,
                    Platform::Mobile,
                    Platform::Extension,
                    Platform::Telegram,
                ],
            })
        }

        fn only(source: Source, platform: Platform) -> Arc<Self> {
            Arc::new(Self {
                source,
                platforms: vec![platform],
            })
        }
    }

    #[async_trait]
    impl SubscriptionStrategy for FixedStrategy {
        fn source(&self) -> Source {
            self.source
        }

        fn is_available(&self, platform: Platform) -> bool {
            self.platforms.contains(&platform)
        }

        async fn list_plans(&self, _: &str, _: Option<&str>) -> Result<Vec<PurchasePlan>> {
            Ok(Vec::new())
        }

        async fn initiate(
            &self,
            _: &PurchasePlan,
            _: &WalletAuth,
            _: Option<&str>,
        ) -> Result<PurchaseResult> {
            Ok(PurchaseResult::Canceled)
        }

        async fn query_status(&self, _: &str) -> Result<StatusFragment> {
            Ok(StatusFragment::new(SubscriptionStatus::Expired))
        }

        async fn cancel_or_manage(&self, _: &Subscription, _: &WalletAuth) -> Result<ManageOutcome> {
            Ok(ManageOutcome::Noop)
        }
    }

    fn full_registry() -> StrategyRegistry {
        StrategyRegistry::new()
            .with(FixedStrategy::everywhere(Source::Crypto))
            .with(FixedStrategy::only(Source::MobileIap, Platform::Mobile))
            .with(FixedStrategy::only(Source::Extension, Platform::Extension))
            .with(FixedStrategy::everywhere(Source::Trial))
    }

    #[test]
    fn test_register_and_get() {
        let registry = StrategyRegistry::new();
        assert!(registry.is_empty());
        registry.register(FixedStrategy::everywhere(Source::Crypto));

        assert_eq!(registry.len(), 1);
        assert!(registry.get(Source::Crypto).is_some());
        assert!(matches!(
            registry.get_required(Source::Trial),
            Err(SubscriptionError::StrategyUnavailable(Source::Trial))
        ));
    }

    #[test]
    fn test_previous_source_wins() {
        let registry = full_registry();
        let strategy = registry
            .resolve(Some(Source::Trial), Platform::Mobile)
            .unwrap();
        assert_eq!(strategy.source(), Source::Trial);
    }

    #[test]
    fn test_unavailable_previous_source_falls_through() {
        let registry = full_registry();
        // Bought in the extension, now on desktop.
        let strategy = registry
            .resolve(Some(Source::Extension), Platform::Desktop)
            .unwrap();
        assert_eq!(strategy.source(), Source::Crypto);
    }

    #[test]
    fn test_native_source_preferred() {
        let registry = full_registry();
        assert_eq!(
            registry.resolve(None, Platform::Mobile).unwrap().source(),
            Source::MobileIap
        );
        assert_eq!(
            registry.resolve(None, Platform::Extension).unwrap().source(),
            Source::Extension
        );
        assert_eq!(
            registry.resolve(None, Platform::Desktop).unwrap().source(),
            Source::Crypto
        );
    }

    #[test]
    fn test_trial_is_last_resort() {
        let registry = StrategyRegistry::new().with(FixedStrategy::everywhere(Source::Trial));
        assert_eq!(
            registry.resolve(None, Platform::Mobile).unwrap().source(),
            Source::Trial
        );

        let empty = StrategyRegistry::new();
        assert!(empty.resolve(None, Platform::Desktop).is_err());
    }

    #[test]
    fn test_sources_in_declaration_order() {
        let registry = StrategyRegistry::new()
            .with(FixedStrategy::everywhere(Source::Trial))
            .with(FixedStrategy::everywhere(Source::Crypto));
        assert_eq!(registry.sources(), vec![Source::Crypto, Source::Trial]);
    }
}
