//! # Premium Subscriptions
//!
//! Client-side lifecycle of a premium entitlement for wallet apps.
//!
//! A purchase can go through one of several payment backends (on-chain
//! crypto payment, mobile in-app purchase, browser-extension checkout, free
//! trial). Each backend is wrapped by a [`SubscriptionStrategy`]; the
//! [`SubscriptionReconciler`] drives the strategies, polls pending
//! purchases and keeps exactly one authoritative [`Subscription`] record per
//! wallet in an observable [`Atom`].
//!
//! UI workflows are modelled with [`FlowController`]s. Closing or
//! superseding a flow aborts its [`FlowToken`]; async work re-checks the
//! token after every suspension point and drops its result when aborted.
//!
//! Expiry and low-balance warnings are computed by [`notice`] and fire at
//! most once per window and subscription lifetime.

pub mod amount;
pub mod atom;
pub mod config;
pub mod error;
pub mod flow;
pub mod notice;
pub mod provider;
pub mod storage;
pub mod strategy;
pub mod subscription;

// Poll loops need tokio timers (native only)
#[cfg(not(target_arch = "wasm32"))]
pub mod reconciler;

pub use amount::{Amount, Price};
pub use atom::{Atom, Listener, Unsubscribe};
pub use config::{NoticeConfig, Platform, ReconcilerConfig};
pub use error::{SubscriptionError, SubscriptionErrorCode};
pub use flow::{FlowController, FlowToken};
pub use notice::{Notice, NoticeKind, Toast, ToastLevel, Window};
pub use provider::{
    BalanceSource, CryptoPaymentProvider, ExtensionBillingProvider, InAppPurchaseProvider,
    TrialProvider, WalletAuth, WalletAuthenticator,
};
pub use storage::{KeyValueStore, MemoryStore, PendingPurchase, PremiumStorage};
pub use strategy::{
    CryptoStrategy, ExtensionStrategy, ManageOutcome, MobileIapStrategy, PurchaseResult,
    StrategyRegistry, SubscriptionStrategy, TrialStrategy,
};
pub use subscription::{
    BackendDetails, BillingInterval, PurchasePlan, Source, StatusFragment, Subscription,
    SubscriptionStatus, WalletAddress,
};

#[cfg(not(target_arch = "wasm32"))]
pub use storage::FileStore;

#[cfg(not(target_arch = "wasm32"))]
pub use reconciler::{PurchaseParams, SubscriptionReconciler};

pub type Result<T> = std::result::Result<T, SubscriptionError>;
