//! Expiry and low-balance warnings
//!
//! A warning belongs to a window bucket (time left until the target date).
//! Each bucket fires at most once per subscription lifetime; the markers
//! that record this live in [`crate::storage::PremiumStorage`].

use crate::{
    Amount, BackendDetails, NoticeConfig, Subscription, SubscriptionError, SubscriptionErrorCode,
    SubscriptionStatus, WalletAddress,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

const SECONDS_PER_DAY: f64 = 86_400.0;

/// What a notice warns about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeKind {
    /// Subscription ends or renews soon
    Ending,
    /// Wallet balance will not cover the next crypto charge
    Balance,
}

impl NoticeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ending => "ending",
            Self::Balance => "balance",
        }
    }

    /// Windows this kind can fire in, strongest first.
    pub fn windows(&self) -> &'static [Window] {
        match self {
            Self::Ending => &[Window::Day, Window::Week],
            Self::Balance => &[Window::Day, Window::ThreeDays],
        }
    }

    pub fn other(&self) -> Self {
        match self {
            Self::Ending => Self::Balance,
            Self::Balance => Self::Ending,
        }
    }
}

impl fmt::Display for NoticeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Time-to-target bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Window {
    Day,
    Week,
    ThreeDays,
}

impl Window {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Day => "DAY",
            Self::Week => "WEEK",
            Self::ThreeDays => "THREE_DAYS",
        }
    }

    /// `DAY` outranks every other window.
    pub fn is_strongest(&self) -> bool {
        matches!(self, Self::Day)
    }

    /// Marker name, e.g. `ending:DAY`.
    pub fn key(&self, kind: NoticeKind) -> String {
        format!("{}:{}", kind.as_str(), self.as_str())
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A warning ready to be shown
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notice {
    pub wallet: WalletAddress,
    pub kind: NoticeKind,
    pub window: Window,
    pub target_date: DateTime<Utc>,
    /// Subscription lifetime the notice was raised in
    pub lifetime: String,
}

/// Severity of a [`Toast`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToastLevel {
    Info,
    Warning,
    Error,
}

/// Transient, non-blocking message for the user
#[derive(Debug, Clone, PartialEq)]
pub struct Toast {
    pub level: ToastLevel,
    pub message: String,
    pub code: Option<SubscriptionErrorCode>,
}

impl Toast {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: ToastLevel::Info,
            message: message.into(),
            code: None,
        }
    }

    /// Retryable failures are warnings; everything else is an error.
    pub fn from_error(err: &SubscriptionError) -> Self {
        let level = if err.is_retryable() {
            ToastLevel::Warning
        } else {
            ToastLevel::Error
        };
        Self {
            level,
            message: err.to_string(),
            code: Some(err.code()),
        }
    }
}

/// Fractional days from `now` until `target`; negative once passed.
pub fn diff_days(now: DateTime<Utc>, target: DateTime<Utc>) -> f64 {
    (target - now).num_milliseconds() as f64 / 1000.0 / SECONDS_PER_DAY
}

/// Bucket for `diff` days left, if any.
pub fn bucket(kind: NoticeKind, diff: f64, config: &NoticeConfig) -> Option<Window> {
    if diff <= 0.0 {
        return None;
    }
    if diff <= 1.0 {
        return Some(Window::Day);
    }
    match kind {
        NoticeKind::Ending if diff <= config.ending_window_days as f64 => Some(Window::Week),
        NoticeKind::Balance if diff <= config.balance_window_days as f64 => {
            Some(Window::ThreeDays)
        }
        _ => None,
    }
}

/// Identity of one subscription lifetime.
///
/// Markers are scoped to it, so a new purchase starts with a clean slate
/// while re-checks of the same purchase see the markers already written.
pub fn lifetime_id(subscription: &Subscription) -> String {
    let source = subscription
        .source()
        .map(|s| s.as_str())
        .unwrap_or("none");
    match &subscription.original_transaction_id {
        Some(id) => format!("{}:{}", source, id),
        None => format!("{}:attempt-{}", source, subscription.attempt),
    }
}

/// Date the ending warning counts down to.
pub fn ending_target(subscription: &Subscription) -> Option<DateTime<Utc>> {
    match subscription.status {
        SubscriptionStatus::Active | SubscriptionStatus::Canceled => subscription
            .next_charge_date
            .or(subscription.expires_date),
        _ => None,
    }
}

/// Date of a crypto renewal the wallet cannot pay for.
pub fn balance_target(subscription: &Subscription, balance: Amount) -> Option<DateTime<Utc>> {
    if subscription.status != SubscriptionStatus::Active {
        return None;
    }
    match &subscription.backend {
        Some(BackendDetails::Crypto {
            charge_amount: Some(charge),
            auto_renew: true,
            ..
        }) if !balance.covers(charge) => subscription.next_charge_date,
        _ => None,
    }
}

/// Decide which window, if any, to raise now.
///
/// `marked` are the windows of `kind` already raised in this lifetime and
/// `other_marked` those of the other kind. A `DAY` marker suppresses the
/// weaker windows of its own kind; with `cross_kind_suppression` it also
/// suppresses the weaker windows of the other kind.
pub fn plan_window(
    kind: NoticeKind,
    diff: f64,
    marked: &[Window],
    other_marked: &[Window],
    config: &NoticeConfig,
) -> Option<Window> {
    let window = bucket(kind, diff, config)?;
    if marked.contains(&window) {
        return None;
    }
    if !window.is_strongest() {
        if marked.iter().any(Window::is_strongest) {
            return None;
        }
        if config.cross_kind_suppression && other_marked.iter().any(Window::is_strongest) {
            return None;
        }
    }
    Some(window)
}
