//! Subscription reconciler (native only)
//!
//! Turns provider responses into the one authoritative [`Subscription`]
//! record of the bound wallet. Every write to that record goes through the
//! reconciler; UI code reads it through [`SubscriptionReconciler::subscription`]
//! or [`SubscriptionReconciler::subscribe`].
//!
//! Pending purchases are confirmed by a background poll loop spawned on the
//! tokio runtime. There is at most one loop per reconciler. The loop carries
//! the purchase flow's [`FlowToken`] and re-checks it after the sleep and
//! after every status query; an aborted token discards the result.
//!
//! Listeners registered on the record run while the reconciler holds its
//! write gate. They may read the reconciler but must not call back into
//! operations that write.

use crate::notice::{self, Notice, NoticeKind, Toast};
use crate::provider::{BalanceSource, WalletAuth, WalletAuthenticator};
use crate::{
    Atom, BackendDetails, FlowController, FlowToken, ManageOutcome, PendingPurchase, PremiumStorage,
    PurchasePlan, PurchaseResult, ReconcilerConfig, Result, Source, StatusFragment,
    StrategyRegistry, Subscription, SubscriptionError, SubscriptionStatus, SubscriptionStrategy,
    Unsubscribe, WalletAddress,
};
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::sleep;

/// Parameters of the "start purchase" flow
#[derive(Debug, Clone, PartialEq)]
pub struct PurchaseParams {
    /// Payment backend; defaults to the plan's source
    pub source: Option<Source>,
    pub plan: PurchasePlan,
    pub promo_code: Option<String>,
}

impl PurchaseParams {
    pub fn new(plan: PurchasePlan) -> Self {
        Self {
            source: None,
            plan,
            promo_code: None,
        }
    }

    pub fn with_source(mut self, source: Source) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_promo_code(mut self, promo_code: impl Into<String>) -> Self {
        self.promo_code = Some(promo_code.into());
        self
    }

    /// Source the purchase will go through.
    pub fn source(&self) -> Source {
        self.source.unwrap_or(self.plan.source)
    }
}

struct PollTask {
    token: FlowToken,
    attempt: u64,
    handle: JoinHandle<()>,
}

struct Inner {
    subscription: Atom<Subscription>,
    purchase_flow: FlowController<PurchaseParams>,
    ending_notice: FlowController<Notice>,
    balance_notice: FlowController<Notice>,
    toasts: Atom<Option<Toast>>,
    registry: Arc<StrategyRegistry>,
    storage: PremiumStorage,
    authenticator: Arc<dyn WalletAuthenticator>,
    balance: RwLock<Option<Arc<dyn BalanceSource>>>,
    config: ReconcilerConfig,
    attempts: AtomicU64,
    poll: Mutex<Option<PollTask>>,
    // Token checks and record writes happen under this gate, so an abort
    // either lands before a write or the write sees the aborted token.
    write_gate: Mutex<()>,
    // Serializes notice checks; markers are read and written across awaits.
    notice_lock: tokio::sync::Mutex<()>,
    // Held while an attempt writes the pending cache and last source, so a
    // superseded attempt cannot land its cache write after the newer one.
    commit_lock: tokio::sync::Mutex<()>,
}

/// Orchestrates purchases, polling and notices for one wallet session
///
/// Cloning gives another handle to the same reconciler.
#[derive(Clone)]
pub struct SubscriptionReconciler {
    inner: Arc<Inner>,
}

impl SubscriptionReconciler {
    pub fn new(
        registry: Arc<StrategyRegistry>,
        storage: PremiumStorage,
        authenticator: Arc<dyn WalletAuthenticator>,
        config: ReconcilerConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            inner: Arc::new(Inner {
                subscription: Atom::new(Subscription::default()),
                purchase_flow: FlowController::new(),
                ending_notice: FlowController::new(),
                balance_notice: FlowController::new(),
                toasts: Atom::new(None),
                registry,
                storage,
                authenticator,
                balance: RwLock::new(None),
                config,
                attempts: AtomicU64::new(0),
                poll: Mutex::new(None),
                write_gate: Mutex::new(()),
                notice_lock: tokio::sync::Mutex::new(()),
                commit_lock: tokio::sync::Mutex::new(()),
            }),
        })
    }

    /// Enable low-balance notices for crypto renewals.
    pub fn with_balance_source(self, balance: Arc<dyn BalanceSource>) -> Self {
        *self
            .inner
            .balance
            .write()
            .unwrap_or_else(|e| e.into_inner()) = Some(balance);
        self
    }

    pub fn config(&self) -> &ReconcilerConfig {
        &self.inner.config
    }

    /// Current record snapshot.
    pub fn subscription(&self) -> Subscription {
        self.inner.subscription.value()
    }

    pub fn wallet(&self) -> Option<WalletAddress> {
        self.subscription().auth_wallet
    }

    /// Observe the record. The listener runs immediately with the current
    /// value, then after every write.
    pub fn subscribe<F>(&self, listener: F) -> Unsubscribe
    where
        F: Fn(&Subscription) + Send + Sync + 'static,
    {
        self.inner.subscription.subscribe(listener)
    }

    /// Observe transient user messages.
    pub fn subscribe_toasts<F>(&self, listener: F) -> Unsubscribe
    where
        F: Fn(&Option<Toast>) + Send + Sync + 'static,
    {
        self.inner.toasts.subscribe(listener)
    }

    pub fn last_toast(&self) -> Option<Toast> {
        self.inner.toasts.value()
    }

    pub fn purchase_flow(&self) -> &FlowController<PurchaseParams> {
        &self.inner.purchase_flow
    }

    pub fn ending_notice(&self) -> &FlowController<Notice> {
        &self.inner.ending_notice
    }

    pub fn balance_notice(&self) -> &FlowController<Notice> {
        &self.inner.balance_notice
    }

    /// Bind the session to `wallet`.
    ///
    /// Supersedes the current record with an empty one for the wallet. A
    /// purchase that was pending when the previous process stopped is picked
    /// up again and polled.
    #[tracing::instrument(skip(self), fields(wallet = %wallet))]
    pub async fn bind_wallet(&self, wallet: WalletAddress) -> Result<()> {
        let token = {
            let _gate = self.gate();
            self.stop_polling();
            self.inner
                .subscription
                .next(Subscription::none(Some(wallet.clone())));
            self.inner.purchase_flow.token()
        };
        self.close_notices();

        let pending = match self.inner.storage.pending(&wallet).await {
            Ok(pending) => pending,
            Err(e) => {
                tracing::warn!(error = %e, "dropping unreadable pending purchase");
                self.clear_pending(&wallet).await;
                None
            }
        };
        let Some(pending) = pending else {
            return Ok(());
        };

        let Some(strategy) = self.inner.registry.get(pending.source) else {
            tracing::warn!(source = %pending.source, "no strategy for cached pending purchase");
            self.clear_pending(&wallet).await;
            return Ok(());
        };

        self.inner
            .attempts
            .fetch_max(pending.attempt, Ordering::AcqRel);
        let record = Subscription::pending(
            wallet,
            pending.source,
            pending.correlation_id.clone(),
            pending.attempt,
        );
        if !self.publish_if_current(&token, record) {
            return Ok(());
        }

        let correlation_id = pending.correlation_id.clone();
        if self.start_polling(strategy, pending.correlation_id, pending.attempt, token) {
            tracing::info!(
                source = %pending.source,
                %correlation_id,
                "resuming pending purchase"
            );
        }
        Ok(())
    }

    /// Catalog for `source`, or for the source a new purchase would use.
    pub async fn list_plans(
        &self,
        source: Option<Source>,
        promo_code: Option<&str>,
    ) -> Result<Vec<PurchasePlan>> {
        let strategy = match source {
            Some(source) => self.inner.registry.get_required(source)?,
            None => self.resolve_strategy().await?,
        };
        strategy
            .list_plans(&self.inner.config.locale, promo_code)
            .await
    }

    pub fn open_purchase(&self, params: PurchaseParams) {
        self.inner.purchase_flow.open(params);
    }

    /// Close the purchase flow. A purchase still in flight is abandoned and
    /// the poll loop stops.
    pub fn close_purchase(&self) {
        let _gate = self.gate();
        self.inner.purchase_flow.close();
    }

    /// Start a new purchase attempt.
    ///
    /// Any previous attempt is superseded first; its in-flight calls see an
    /// aborted token and write nothing. Provider errors are surfaced as a
    /// toast and returned; they never change the record.
    ///
    /// When the new attempt is declined or fails to start, an earlier attempt
    /// that is still pending in the cache goes back to being polled.
    #[tracing::instrument(skip(self, params), fields(plan = %params.plan.id, source = %params.source()))]
    pub async fn purchase(&self, params: PurchaseParams) -> Result<PurchaseResult> {
        let wallet = self.wallet().ok_or(SubscriptionError::NoWallet)?;
        params.plan.validate()?;

        let source = params.source();
        let strategy = self.inner.registry.get_required(source)?;
        if !strategy.is_available(self.inner.config.platform) {
            return Err(SubscriptionError::StrategyUnavailable(source));
        }

        self.inner.purchase_flow.open(params.clone());
        let token = {
            let _gate = self.gate();
            self.stop_polling();
            self.inner.purchase_flow.token()
        };
        let attempt = self.inner.attempts.fetch_add(1, Ordering::AcqRel) + 1;

        let outcome = match self.authenticate(strategy.as_ref(), &wallet).await {
            Ok(auth) => {
                if token.is_aborted() {
                    tracing::debug!("attempt superseded during authentication");
                    return Ok(PurchaseResult::Canceled);
                }
                strategy
                    .initiate(&params.plan, &auth, params.promo_code.as_deref())
                    .await
            }
            Err(e) => Err(e),
        };

        if token.is_aborted() {
            tracing::debug!("attempt superseded; discarding initiate result");
            return Ok(PurchaseResult::Canceled);
        }

        let result = match outcome {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(error = %e, code = e.code() as i32, "purchase failed to start");
                self.toast(Toast::from_error(&e));
                if e.is_terminal_for_attempt() {
                    self.close_purchase();
                }
                self.resume_cached(&wallet).await;
                return Err(e);
            }
        };

        match &result {
            PurchaseResult::Pending { correlation_id, .. } => {
                let commit = self.inner.commit_lock.lock().await;
                let mut record =
                    Subscription::pending(wallet.clone(), source, correlation_id.clone(), attempt);
                record.backend = Some(fresh_backend(
                    source,
                    &params.plan.id,
                    params.promo_code.as_deref(),
                ));
                if !self.publish_if_current(&token, record) {
                    return Ok(PurchaseResult::Canceled);
                }
                let pending = PendingPurchase {
                    source,
                    correlation_id: correlation_id.clone(),
                    attempt,
                };
                if let Err(e) = self.inner.storage.save_pending(&wallet, &pending).await {
                    tracing::warn!(error = %e, "failed to cache pending purchase");
                }
                if token.is_aborted() {
                    tracing::debug!("attempt superseded while caching");
                    return Ok(PurchaseResult::Canceled);
                }
                self.remember_source(&wallet, source).await;
                if !self.start_polling(strategy, correlation_id.clone(), attempt, token) {
                    tracing::debug!("attempt superseded before polling started");
                    return Ok(PurchaseResult::Canceled);
                }
                drop(commit);
                tracing::info!(%correlation_id, attempt, "purchase pending");
                self.after_write().await;
            }
            PurchaseResult::Immediate(fragment) => {
                let commit = self.inner.commit_lock.lock().await;
                let mut fresh = Subscription::none(Some(wallet.clone()));
                fresh.attempt = attempt;
                fresh.backend = Some(fresh_backend(
                    source,
                    &params.plan.id,
                    params.promo_code.as_deref(),
                ));
                let record = fresh.merged(fragment);
                if !self.publish_if_current(&token, record) {
                    return Ok(PurchaseResult::Canceled);
                }
                self.remember_source(&wallet, source).await;
                drop(commit);
                tracing::info!(status = %fragment.status, attempt, "purchase settled");
                self.after_write().await;
            }
            PurchaseResult::Canceled => {
                tracing::info!("purchase canceled by user");
                self.close_purchase();
                self.resume_cached(&wallet).await;
            }
        }
        Ok(result)
    }

    /// Query the provider once for the current record and merge the answer.
    ///
    /// A terminal record only moves forward: active, then canceled, then
    /// expired. Answers that would move it back are discarded.
    #[tracing::instrument(skip(self))]
    pub async fn refresh(&self) -> Result<Subscription> {
        let current = self.subscription();
        let (Some(source), Some(correlation_id)) =
            (current.source(), current.original_transaction_id.clone())
        else {
            return Ok(current);
        };
        let strategy = self.inner.registry.get_required(source)?;
        let token = self.inner.purchase_flow.token();

        let fragment = match strategy.query_status(&correlation_id).await {
            Ok(fragment) => fragment,
            Err(e) => {
                self.toast(Toast::from_error(&e));
                return Err(e);
            }
        };

        match self.commit_fragment(&token, current.attempt, source, &fragment, false) {
            Ok(()) => {
                if fragment.is_terminal() && current.is_pending() {
                    self.clear_pending_for(&current, &correlation_id).await;
                }
                self.after_write().await;
            }
            Err(e) => tracing::debug!(reason = %e, "refresh result discarded"),
        }
        Ok(self.subscription())
    }

    /// Cancel auto-renewal or hand management off to the backend.
    #[tracing::instrument(skip(self))]
    pub async fn cancel_or_manage(&self) -> Result<ManageOutcome> {
        let wallet = self.wallet().ok_or(SubscriptionError::NoWallet)?;
        let current = self.subscription();
        let source = current.source().ok_or_else(|| {
            SubscriptionError::InvariantViolation("no subscription to manage".into())
        })?;
        let strategy = self.inner.registry.get_required(source)?;
        let token = self.inner.purchase_flow.token();

        let outcome = match self.authenticate(strategy.as_ref(), &wallet).await {
            Ok(auth) => strategy.cancel_or_manage(&current, &auth).await,
            Err(e) => Err(e),
        };
        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(error = %e, "cancel or manage failed");
                self.toast(Toast::from_error(&e));
                return Err(e);
            }
        };

        if let ManageOutcome::Updated(fragment) = &outcome {
            if !fragment.is_terminal() {
                tracing::warn!(status = %fragment.status, "ignoring non-terminal manage result");
                return Ok(outcome);
            }
            match self.commit_fragment(&token, current.attempt, source, fragment, false) {
                Ok(()) => self.after_write().await,
                Err(e) => tracing::debug!(reason = %e, "manage result discarded"),
            }
        }
        Ok(outcome)
    }

    /// Raise ending or low-balance notices due for the current record.
    ///
    /// Each window fires at most once per subscription lifetime. The marker
    /// is persisted before the notice flow opens.
    pub async fn check_notices(&self) -> Result<Vec<Notice>> {
        let _serial = self.inner.notice_lock.lock().await;
        let sub = self.subscription();
        let Some(wallet) = sub.auth_wallet.clone() else {
            return Ok(Vec::new());
        };
        let now = Utc::now();
        let lifetime = notice::lifetime_id(&sub);
        let mut raised = Vec::new();

        if let Some(target) = notice::ending_target(&sub) {
            if let Some(n) = self
                .raise(NoticeKind::Ending, &wallet, &lifetime, now, target)
                .await?
            {
                self.inner.ending_notice.open(n.clone());
                raised.push(n);
            }
        }

        let balance_source = self
            .inner
            .balance
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        if let Some(balance_source) = balance_source {
            if sub.source() == Some(Source::Crypto) && sub.auto_renews() {
                match balance_source.balance(&wallet).await {
                    Ok(balance) => {
                        if let Some(target) = notice::balance_target(&sub, balance) {
                            if let Some(n) = self
                                .raise(NoticeKind::Balance, &wallet, &lifetime, now, target)
                                .await?
                            {
                                self.inner.balance_notice.open(n.clone());
                                raised.push(n);
                            }
                        }
                    }
                    Err(e) => tracing::debug!(error = %e, "balance unavailable; skipping check"),
                }
            }
        }

        Ok(raised)
    }

    /// Pick the window of `kind` due now and persist its marker.
    async fn raise(
        &self,
        kind: NoticeKind,
        wallet: &WalletAddress,
        lifetime: &str,
        now: DateTime<Utc>,
        target: DateTime<Utc>,
    ) -> Result<Option<Notice>> {
        let diff = notice::diff_days(now, target);
        let storage = &self.inner.storage;
        let marked = storage.markers(wallet, kind, lifetime).await?;
        let other_marked = storage.markers(wallet, kind.other(), lifetime).await?;
        let Some(window) = notice::plan_window(
            kind,
            diff,
            &marked,
            &other_marked,
            &self.inner.config.notices,
        ) else {
            return Ok(None);
        };

        storage.set_marker(wallet, kind, window, lifetime).await?;
        tracing::info!(%kind, %window, %lifetime, "notice raised");
        Ok(Some(Notice {
            wallet: wallet.clone(),
            kind,
            window,
            target_date: target,
            lifetime: lifetime.to_string(),
        }))
    }

    /// Stop polling and supersede the record with a wallet-less one.
    ///
    /// A cached pending purchase stays in storage and resumes on the next
    /// [`bind_wallet`](Self::bind_wallet) for that wallet.
    #[tracing::instrument(skip(self))]
    pub fn logout(&self) {
        {
            let _gate = self.gate();
            self.stop_polling();
            self.inner.purchase_flow.close();
            self.inner.subscription.next(Subscription::none(None));
        }
        self.close_notices();
        tracing::info!("logged out");
    }

    /// Whether a poll loop is live for the current attempt.
    pub fn is_polling(&self) -> bool {
        let poll = self.inner.poll.lock().unwrap_or_else(|e| e.into_inner());
        poll.as_ref()
            .is_some_and(|task| !task.handle.is_finished() && !task.token.is_aborted())
    }

    /// Stop background work and close every flow.
    pub fn shutdown(&self) {
        let _gate = self.gate();
        self.stop_polling();
        self.inner.purchase_flow.close();
        self.inner.ending_notice.close();
        self.inner.balance_notice.close();
    }

    fn gate(&self) -> std::sync::MutexGuard<'_, ()> {
        self.inner
            .write_gate
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }

    fn toast(&self, toast: Toast) {
        self.inner.toasts.next(Some(toast));
    }

    fn close_notices(&self) {
        self.inner.ending_notice.close();
        self.inner.balance_notice.close();
    }

    /// Abort the live attempt and its poll loop. Caller holds the gate.
    fn stop_polling(&self) {
        self.inner.purchase_flow.abort();
        let task = self
            .inner
            .poll
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(task) = task {
            tracing::debug!(attempt = task.attempt, "stopping poll loop");
            task.handle.abort();
        }
    }

    async fn resolve_strategy(&self) -> Result<Arc<dyn SubscriptionStrategy>> {
        let previous = match self.wallet() {
            Some(wallet) => self.inner.storage.last_source(&wallet).await?,
            None => None,
        };
        self.inner
            .registry
            .resolve(previous, self.inner.config.platform)
    }

    async fn authenticate(
        &self,
        strategy: &dyn SubscriptionStrategy,
        wallet: &WalletAddress,
    ) -> Result<WalletAuth> {
        match strategy.auth_challenge(wallet).await? {
            Some(challenge) => {
                let signature = self
                    .inner
                    .authenticator
                    .sign_challenge(wallet, &challenge)
                    .await?;
                Ok(WalletAuth::signed(wallet.clone(), challenge, signature))
            }
            None => Ok(WalletAuth::unsigned(wallet.clone())),
        }
    }

    async fn remember_source(&self, wallet: &WalletAddress, source: Source) {
        if let Err(e) = self.inner.storage.save_last_source(wallet, source).await {
            tracing::warn!(error = %e, "failed to persist last source");
        }
    }

    async fn clear_pending(&self, wallet: &WalletAddress) {
        if let Err(e) = self.inner.storage.clear_pending(wallet).await {
            tracing::warn!(error = %e, "failed to clear pending purchase");
        }
    }

    /// Clear the cache of `sub`'s wallet if it still holds `correlation_id`.
    async fn clear_pending_for(&self, sub: &Subscription, correlation_id: &str) {
        let Some(wallet) = &sub.auth_wallet else {
            return;
        };
        if let Ok(Some(cached)) = self.inner.storage.pending(wallet).await {
            if cached.correlation_id != correlation_id {
                return;
            }
        }
        self.clear_pending(wallet).await;
    }

    /// Poll the cached attempt again if the record still shows it pending.
    async fn resume_cached(&self, wallet: &WalletAddress) {
        let _commit = self.inner.commit_lock.lock().await;
        let pending = match self.inner.storage.pending(wallet).await {
            Ok(Some(pending)) => pending,
            Ok(None) => return,
            Err(e) => {
                tracing::warn!(error = %e, "cannot read pending purchase");
                return;
            }
        };
        let current = self.subscription();
        if current.auth_wallet.as_ref() != Some(wallet)
            || !current.is_pending()
            || current.attempt != pending.attempt
            || current.source() != Some(pending.source)
            || current.original_transaction_id.as_deref() != Some(pending.correlation_id.as_str())
        {
            return;
        }
        let Some(strategy) = self.inner.registry.get(pending.source) else {
            return;
        };

        let token = self.inner.purchase_flow.token();
        let correlation_id = pending.correlation_id.clone();
        if self.start_polling(strategy, pending.correlation_id, pending.attempt, token) {
            tracing::info!(%correlation_id, attempt = pending.attempt, "polling earlier attempt again");
        }
    }

    /// Publish `record` unless `token` was aborted. Returns whether it was
    /// written.
    fn publish_if_current(&self, token: &FlowToken, record: Subscription) -> bool {
        let _gate = self.gate();
        if token.is_aborted() {
            return false;
        }
        self.inner.subscription.next(record);
        true
    }

    /// Merge `fragment` into the record of `attempt`.
    ///
    /// With `require_pending` the record must still be pending, which is what
    /// a poll tick expects. A record of another attempt or source, or an
    /// aborted token, is an invariant violation and nothing is written.
    fn commit_fragment(
        &self,
        token: &FlowToken,
        attempt: u64,
        source: Source,
        fragment: &StatusFragment,
        require_pending: bool,
    ) -> Result<()> {
        let _gate = self.gate();
        if token.is_aborted() {
            return Err(SubscriptionError::InvariantViolation(
                "token aborted before write".into(),
            ));
        }
        let current = self.inner.subscription.value();
        if current.attempt != attempt || current.source() != Some(source) {
            return Err(SubscriptionError::InvariantViolation(format!(
                "record moved to attempt {} while attempt {} was writing",
                current.attempt, attempt
            )));
        }
        if require_pending && !current.is_pending() {
            return Err(SubscriptionError::InvariantViolation(format!(
                "tick for attempt {} after terminal status {}",
                attempt, current.status
            )));
        }
        if !current.status.can_advance_to(fragment.status) {
            return Err(SubscriptionError::InvariantViolation(format!(
                "{} cannot move back to {}",
                current.status, fragment.status
            )));
        }
        self.inner.subscription.next(current.merged(fragment));
        Ok(())
    }

    async fn after_write(&self) {
        if let Err(e) = self.check_notices().await {
            tracing::warn!(error = %e, "notice check failed");
        }
    }

    /// Install the poll loop of `attempt`. Returns false, spawning nothing,
    /// when `token` is aborted or a live loop of a newer attempt exists.
    fn start_polling(
        &self,
        strategy: Arc<dyn SubscriptionStrategy>,
        correlation_id: String,
        attempt: u64,
        token: FlowToken,
    ) -> bool {
        let _gate = self.gate();
        if token.is_aborted() {
            return false;
        }
        let mut poll = self.inner.poll.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(live) = poll.as_ref() {
            let live_newer = live.attempt > attempt
                && !live.token.is_aborted()
                && !live.handle.is_finished();
            if live_newer {
                return false;
            }
        }

        let this = self.clone();
        let loop_token = token.clone();
        let handle = tokio::spawn(async move {
            this.poll_loop(strategy, correlation_id, attempt, loop_token)
                .await;
        });
        let previous = poll.replace(PollTask {
            token,
            attempt,
            handle,
        });
        if let Some(previous) = previous {
            tracing::debug!(attempt = previous.attempt, "replacing poll loop");
            previous.handle.abort();
        }
        true
    }

    #[tracing::instrument(skip(self, strategy, token), fields(source = %strategy.source()))]
    async fn poll_loop(
        &self,
        strategy: Arc<dyn SubscriptionStrategy>,
        correlation_id: String,
        attempt: u64,
        token: FlowToken,
    ) {
        let interval = self.inner.config.poll_interval();
        let source = strategy.source();

        loop {
            sleep(interval).await;
            if token.is_aborted() {
                tracing::debug!("poll loop aborted");
                return;
            }

            let result = strategy.query_status(&correlation_id).await;
            if token.is_aborted() {
                tracing::debug!("poll result discarded; attempt aborted");
                return;
            }

            let fragment = match result {
                Ok(fragment) if fragment.is_terminal() => fragment,
                Ok(_) => continue,
                Err(e) if e.is_retryable() => {
                    tracing::debug!(error = %e, "transient poll failure");
                    self.toast(Toast::from_error(&e));
                    continue;
                }
                Err(SubscriptionError::InvariantViolation(reason)) => {
                    tracing::debug!(%reason, "ignoring invariant violation");
                    continue;
                }
                Err(e @ SubscriptionError::ProviderRejected { .. }) => {
                    tracing::warn!(error = %e, "provider rejected pending purchase");
                    self.toast(Toast::from_error(&e));
                    StatusFragment::new(SubscriptionStatus::Canceled)
                }
                Err(e) if e.requires_reauth() => {
                    tracing::warn!(error = %e, "wallet re-authentication required");
                    self.toast(Toast::from_error(&e));
                    self.close_purchase();
                    return;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "poll loop stopped");
                    self.toast(Toast::from_error(&e));
                    return;
                }
            };

            let committed = {
                let _commit = self.inner.commit_lock.lock().await;
                match self.commit_fragment(&token, attempt, source, &fragment, true) {
                    Ok(()) => {
                        self.clear_pending_for(&self.subscription(), &correlation_id)
                            .await;
                        true
                    }
                    Err(e) => {
                        tracing::debug!(reason = %e, "terminal tick discarded");
                        false
                    }
                }
            };
            if committed {
                tracing::info!(status = %fragment.status, attempt, "purchase resolved");
                self.after_write().await;
            }
            return;
        }
    }
}

/// Backend details a new attempt of `plan_id` starts from.
fn fresh_backend(source: Source, plan_id: &str, promo_code: Option<&str>) -> BackendDetails {
    match (BackendDetails::blank(source), promo_code) {
        (
            BackendDetails::Crypto {
                charge_amount,
                auto_renew,
                ..
            },
            Some(code),
        ) => BackendDetails::Crypto {
            promo_code: Some(code.to_string()),
            charge_amount,
            auto_renew,
        },
        (
            BackendDetails::MobileIap {
                auto_renew,
                environment,
                ..
            },
            _,
        ) => BackendDetails::MobileIap {
            product_id: plan_id.to_string(),
            auto_renew,
            environment,
        },
        (blank, _) => blank,
    }
}
