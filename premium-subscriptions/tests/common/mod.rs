//! Common test utilities: scripted providers and a reconciler harness

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use premium_subscriptions::provider::{
    CheckoutSession, CheckoutState, CryptoTxState, StorePurchase, StoreTxState, TrialGrant,
};
use premium_subscriptions::{
    Amount, BalanceSource, KeyValueStore, MemoryStore, BillingInterval, CryptoPaymentProvider, CryptoStrategy,
    ExtensionBillingProvider, ExtensionStrategy, InAppPurchaseProvider, MobileIapStrategy,
    Platform, PremiumStorage, Price, PurchasePlan, ReconcilerConfig, Result, Source,
    StrategyRegistry, Subscription, SubscriptionError, SubscriptionReconciler,
    SubscriptionStatus, Toast, TrialProvider, TrialStrategy, Unsubscribe, WalletAddress,
    WalletAuth, WalletAuthenticator,
};
use rust_decimal_macros::dec;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const POLL_SECS: u64 = 10;

pub fn wallet() -> WalletAddress {
    WalletAddress::new("UQ-alice")
}

pub fn crypto_plan() -> PurchasePlan {
    PurchasePlan::new(
        "crypto.monthly",
        Source::Crypto,
        Price::new(Amount::new(dec!(5)), "TON"),
        BillingInterval::Monthly,
    )
}

pub fn iap_plan() -> PurchasePlan {
    PurchasePlan::new(
        "pro.monthly",
        Source::MobileIap,
        Price::new(Amount::new(dec!(4.99)), "USD"),
        BillingInterval::Monthly,
    )
}

pub fn extension_plan() -> PurchasePlan {
    PurchasePlan::new(
        "ext.yearly",
        Source::Extension,
        Price::new(Amount::new(dec!(39.99)), "USD"),
        BillingInterval::Yearly,
    )
}

pub fn trial_plan() -> PurchasePlan {
    PurchasePlan::new(
        "trial.week",
        Source::Trial,
        Price::new(Amount::zero(), "USD"),
        BillingInterval::Days { days: 7 },
    )
}

/// Confirmed auto-renewing crypto payment, charging 5 TON in `days` days.
pub fn confirmed_in_days(days: i64) -> CryptoTxState {
    let at = Utc::now() + ChronoDuration::days(days);
    CryptoTxState::Confirmed {
        expires_at: at,
        next_charge_at: Some(at),
        charge_amount: Amount::new(dec!(5)),
        auto_renew: true,
    }
}

/// Crypto backend: payments are numbered `tx-1`, `tx-2`, ... and status
/// queries pop from a script, repeating the fallback once it runs dry.
pub struct MockCrypto {
    submitted: AtomicUsize,
    script: Mutex<VecDeque<Result<CryptoTxState>>>,
    fallback: Mutex<CryptoTxState>,
    query_delay: Mutex<Option<Duration>>,
    decline: AtomicBool,
    pub queries: Mutex<Vec<String>>,
}

impl MockCrypto {
    pub fn new() -> Self {
        Self {
            submitted: AtomicUsize::new(0),
            script: Mutex::new(VecDeque::new()),
            fallback: Mutex::new(CryptoTxState::Unconfirmed),
            query_delay: Mutex::new(None),
            decline: AtomicBool::new(false),
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn script(&self, steps: Vec<Result<CryptoTxState>>) {
        self.script.lock().unwrap().extend(steps);
    }

    pub fn set_fallback(&self, state: CryptoTxState) {
        *self.fallback.lock().unwrap() = state;
    }

    /// Every status query takes `delay` (tokio time).
    pub fn set_query_delay(&self, delay: Duration) {
        *self.query_delay.lock().unwrap() = Some(delay);
    }

    pub fn decline_next(&self) {
        self.decline.store(true, Ordering::SeqCst);
    }

    pub fn query_count(&self) -> usize {
        self.queries.lock().unwrap().len()
    }

    pub fn queried(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl CryptoPaymentProvider for MockCrypto {
    async fn plans(&self, _locale: &str, _promo_code: Option<&str>) -> Result<Vec<PurchasePlan>> {
        Ok(vec![crypto_plan()])
    }

    async fn validate_promo(&self, promo_code: &str) -> Result<bool> {
        Ok(promo_code == "SPRING")
    }

    async fn challenge(&self, wallet: &WalletAddress) -> Result<String> {
        Ok(format!("challenge-for-{}", wallet))
    }

    async fn submit_payment(
        &self,
        _plan: &PurchasePlan,
        _auth: &WalletAuth,
        _promo_code: Option<&str>,
    ) -> Result<Option<String>> {
        if self.decline.swap(false, Ordering::SeqCst) {
            return Ok(None);
        }
        let n = self.submitted.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Some(format!("tx-{}", n)))
    }

    async fn transaction_status(&self, tx_id: &str) -> Result<CryptoTxState> {
        self.queries.lock().unwrap().push(tx_id.to_string());
        let delay = *self.query_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let step = self.script.lock().unwrap().pop_front();
        match step {
            Some(step) => step,
            None => Ok(self.fallback.lock().unwrap().clone()),
        }
    }

    async fn cancel_auto_renew(&self, _tx_id: &str, auth: &WalletAuth) -> Result<CryptoTxState> {
        if !auth.is_signed() {
            return Err(SubscriptionError::AuthFailure("unsigned".into()));
        }
        Ok(CryptoTxState::Canceled {
            expires_at: Utc::now() + ChronoDuration::days(10),
        })
    }
}

/// Mobile store backend with a fixed purchase outcome and status.
pub struct MockStore {
    outcome: Mutex<StorePurchase>,
    status: Mutex<StoreTxState>,
    pub queries: AtomicUsize,
}

impl MockStore {
    pub fn new() -> Self {
        Self {
            outcome: Mutex::new(StorePurchase::UserCanceled),
            status: Mutex::new(StoreTxState::Pending),
            queries: AtomicUsize::new(0),
        }
    }

    pub fn set_outcome(&self, outcome: StorePurchase) {
        *self.outcome.lock().unwrap() = outcome;
    }

    pub fn set_status(&self, status: StoreTxState) {
        *self.status.lock().unwrap() = status;
    }
}

#[async_trait]
impl InAppPurchaseProvider for MockStore {
    async fn products(&self, _locale: &str) -> Result<Vec<PurchasePlan>> {
        Ok(vec![iap_plan()])
    }

    async fn purchase(&self, _product_id: &str, _auth: &WalletAuth) -> Result<StorePurchase> {
        Ok(self.outcome.lock().unwrap().clone())
    }

    async fn transaction_status(&self, _original_transaction_id: &str) -> Result<StoreTxState> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        Ok(self.status.lock().unwrap().clone())
    }

    fn management_url(&self) -> String {
        "https://store.example/subscriptions".to_string()
    }
}

/// Extension billing backend; every checkout opens session `cs-1`.
pub struct MockExtension {
    state: Mutex<CheckoutState>,
}

impl MockExtension {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(CheckoutState::Open),
        }
    }

    pub fn set_state(&self, state: CheckoutState) {
        *self.state.lock().unwrap() = state;
    }
}

#[async_trait]
impl ExtensionBillingProvider for MockExtension {
    async fn plans(&self, _locale: &str, _promo_code: Option<&str>) -> Result<Vec<PurchasePlan>> {
        Ok(vec![extension_plan()])
    }

    async fn challenge(&self, _wallet: &WalletAddress) -> Result<String> {
        Ok("ext-challenge".to_string())
    }

    async fn checkout(
        &self,
        _plan: &PurchasePlan,
        _auth: &WalletAuth,
        _promo_code: Option<&str>,
    ) -> Result<CheckoutSession> {
        Ok(CheckoutSession {
            session_id: "cs-1".to_string(),
            checkout_url: "https://billing.example/checkout/cs-1".to_string(),
        })
    }

    async fn session_status(&self, _session_id: &str) -> Result<CheckoutState> {
        Ok(self.state.lock().unwrap().clone())
    }

    async fn portal_url(&self, session_id: &str) -> Result<String> {
        Ok(format!("https://billing.example/portal/{}", session_id))
    }
}

/// Trial backend granting one seven-day trial per wallet.
pub struct MockTrial {
    used: AtomicBool,
}

impl MockTrial {
    pub fn new() -> Self {
        Self {
            used: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl TrialProvider for MockTrial {
    async fn trial_plan(&self, _locale: &str) -> Result<Option<PurchasePlan>> {
        Ok(Some(trial_plan()))
    }

    async fn start_trial(&self, _auth: &WalletAuth) -> Result<Option<TrialGrant>> {
        self.used.store(true, Ordering::SeqCst);
        Ok(Some(TrialGrant {
            trial_id: "trial-1".to_string(),
            ends_at: Utc::now() + ChronoDuration::days(7),
            telegram_user: Some("tg-42".to_string()),
        }))
    }

    async fn trial_status(&self, _trial_id: &str) -> Result<Option<TrialGrant>> {
        Ok(None)
    }

    async fn trial_used(&self, _wallet: &WalletAddress) -> Result<bool> {
        Ok(self.used.load(Ordering::SeqCst))
    }
}

/// Signs every challenge unless told to fail.
pub struct MockAuth {
    fail: AtomicBool,
}

impl MockAuth {
    pub fn new() -> Self {
        Self {
            fail: AtomicBool::new(false),
        }
    }

    pub fn fail(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl WalletAuthenticator for MockAuth {
    async fn sign_challenge(&self, _wallet: &WalletAddress, challenge: &str) -> Result<String> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(SubscriptionError::AuthFailure("signature expired".into()));
        }
        Ok(format!("sig({})", challenge))
    }
}

pub struct FixedBalance(pub Amount);

#[async_trait]
impl BalanceSource for FixedBalance {
    async fn balance(&self, _wallet: &WalletAddress) -> Result<Amount> {
        Ok(self.0)
    }
}

/// Memory store whose first write of a pending-purchase key stalls.
pub struct SlowPendingStore {
    inner: MemoryStore,
    delay: Duration,
    stalled: AtomicBool,
}

impl SlowPendingStore {
    pub fn new(delay: Duration) -> Self {
        Self {
            inner: MemoryStore::new(),
            delay,
            stalled: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl KeyValueStore for SlowPendingStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        if key.ends_with("/pending") && !self.stalled.swap(true, Ordering::SeqCst) {
            tokio::time::sleep(self.delay).await;
        }
        self.inner.set(key, value).await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.inner.remove(key).await
    }

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        self.inner.keys_with_prefix(prefix).await
    }
}

/// Reconciler wired to every mock backend.
pub struct Harness {
    pub reconciler: SubscriptionReconciler,
    pub crypto: Arc<MockCrypto>,
    pub store: Arc<MockStore>,
    pub extension: Arc<MockExtension>,
    pub trial: Arc<MockTrial>,
    pub auth: Arc<MockAuth>,
    pub storage: PremiumStorage,
}

impl Harness {
    pub fn new(platform: Platform) -> Self {
        Self::with_storage(platform, PremiumStorage::in_memory(), Amount::new(dec!(100)))
    }

    pub fn with_balance(platform: Platform, balance: Amount) -> Self {
        Self::with_storage(platform, PremiumStorage::in_memory(), balance)
    }

    pub fn with_storage(platform: Platform, storage: PremiumStorage, balance: Amount) -> Self {
        let crypto = Arc::new(MockCrypto::new());
        let store = Arc::new(MockStore::new());
        let extension = Arc::new(MockExtension::new());
        let trial = Arc::new(MockTrial::new());
        let auth = Arc::new(MockAuth::new());

        let registry = StrategyRegistry::new()
            .with(Arc::new(CryptoStrategy::new(crypto.clone())))
            .with(Arc::new(MobileIapStrategy::new(store.clone())))
            .with(Arc::new(ExtensionStrategy::new(extension.clone())))
            .with(Arc::new(TrialStrategy::new(trial.clone())));

        let config = ReconcilerConfig::default()
            .with_platform(platform)
            .with_poll_interval(POLL_SECS);

        let reconciler = SubscriptionReconciler::new(
            Arc::new(registry),
            storage.clone(),
            auth.clone(),
            config,
        )
        .unwrap()
        .with_balance_source(Arc::new(FixedBalance(balance)));

        Self {
            reconciler,
            crypto,
            store,
            extension,
            trial,
            auth,
            storage,
        }
    }

    /// Record `(status, source, transaction id)` of every write.
    pub fn record_writes(&self) -> (Arc<Mutex<Vec<Snapshot>>>, Unsubscribe) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let handle = self
            .reconciler
            .subscribe(move |sub| sink.lock().unwrap().push(Snapshot::of(sub)));
        (seen, handle)
    }

    pub fn record_toasts(&self) -> (Arc<Mutex<Vec<Toast>>>, Unsubscribe) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let handle = self.reconciler.subscribe_toasts(move |toast| {
            if let Some(toast) = toast {
                sink.lock().unwrap().push(toast.clone());
            }
        });
        (seen, handle)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub status: SubscriptionStatus,
    pub source: Option<Source>,
    pub transaction_id: Option<String>,
}

impl Snapshot {
    pub fn of(sub: &Subscription) -> Self {
        Self {
            status: sub.status,
            source: sub.source(),
            transaction_id: sub.original_transaction_id.clone(),
        }
    }

    pub fn new(status: SubscriptionStatus, source: Option<Source>, tx: Option<&str>) -> Self {
        Self {
            status,
            source,
            transaction_id: tx.map(str::to_string),
        }
    }
}

/// Let tokio time run forward by `secs`, firing every timer due on the way.
pub async fn advance_secs(secs: u64) {
    tokio::time::sleep(Duration::from_secs(secs)).await;
}
