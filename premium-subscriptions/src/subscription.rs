use crate::{Amount, Price, Result, SubscriptionError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Wallet address that owns an entitlement
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WalletAddress(pub String);

impl WalletAddress {
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WalletAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Entitlement status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    #[default]
    None,
    Pending,
    Active,
    Canceled,
    Expired,
}

impl SubscriptionStatus {
    /// Active, canceled and expired end a purchase attempt.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Active | Self::Canceled | Self::Expired)
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }

    /// Whether a record in this status may take `next` from a refresh or a
    /// management call. Pending goes anywhere; terminal statuses only move
    /// forward from active to canceled to expired.
    pub fn can_advance_to(&self, next: SubscriptionStatus) -> bool {
        match (self, next) {
            (Self::None, _) | (_, Self::None) => false,
            (Self::Pending, _) => true,
            (current, next) => next.is_terminal() && next.rank() >= current.rank(),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Self::None | Self::Pending => 0,
            Self::Active => 1,
            Self::Canceled => 2,
            Self::Expired => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Canceled => "canceled",
            Self::Expired => "expired",
        }
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payment backend an entitlement was purchased through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Crypto,
    MobileIap,
    Extension,
    Trial,
}

impl Source {
    pub const ALL: [Source; 4] = [
        Source::Crypto,
        Source::MobileIap,
        Source::Extension,
        Source::Trial,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Crypto => "crypto",
            Self::MobileIap => "mobile_iap",
            Self::Extension => "extension",
            Self::Trial => "trial",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Source {
    type Err = SubscriptionError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "crypto" => Ok(Self::Crypto),
            "mobile_iap" | "iap" | "ios" => Ok(Self::MobileIap),
            "extension" => Ok(Self::Extension),
            "trial" | "telegram" => Ok(Self::Trial),
            other => Err(SubscriptionError::Config(format!("unknown source: {}", other))),
        }
    }
}

/// Backend-specific fields, nested under the source tag
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum BackendDetails {
    Crypto {
        promo_code: Option<String>,
        /// Amount charged from the wallet on every renewal
        charge_amount: Option<Amount>,
        auto_renew: bool,
    },
    MobileIap {
        product_id: String,
        auto_renew: bool,
        /// Store environment, e.g. "production" or "sandbox"
        environment: Option<String>,
    },
    Extension {
        auto_renew: bool,
        management_url: Option<String>,
    },
    Trial {
        trial_ends_at: Option<DateTime<Utc>>,
        telegram_user: Option<String>,
    },
}

impl BackendDetails {
    pub fn source(&self) -> Source {
        match self {
            Self::Crypto { .. } => Source::Crypto,
            Self::MobileIap { .. } => Source::MobileIap,
            Self::Extension { .. } => Source::Extension,
            Self::Trial { .. } => Source::Trial,
        }
    }

    /// Whether the backend will charge again at `next_charge_date`.
    pub fn auto_renews(&self) -> bool {
        match self {
            Self::Crypto { auto_renew, .. }
            | Self::MobileIap { auto_renew, .. }
            | Self::Extension { auto_renew, .. } => *auto_renew,
            Self::Trial { .. } => false,
        }
    }

    /// Fill fields the provider did not report from the previous details of
    /// the same backend. Details of a different backend are ignored.
    fn carry_over(&self, previous: Option<&BackendDetails>) -> Self {
        let mut next = self.clone();
        match (&mut next, previous) {
            (
                Self::Crypto { promo_code, .. },
                Some(Self::Crypto {
                    promo_code: old, ..
                }),
            ) if promo_code.is_none() => *promo_code = old.clone(),
            (
                Self::MobileIap { product_id, .. },
                Some(Self::MobileIap {
                    product_id: old, ..
                }),
            ) if product_id.is_empty() => *product_id = old.clone(),
            (
                Self::Extension { management_url, .. },
                Some(Self::Extension {
                    management_url: old,
                    ..
                }),
            ) if management_url.is_none() => *management_url = old.clone(),
            (
                Self::Trial { telegram_user, .. },
                Some(Self::Trial {
                    telegram_user: old, ..
                }),
            ) if telegram_user.is_none() => *telegram_user = old.clone(),
            _ => {}
        }
        next
    }

    /// Empty details for a fresh attempt on `source`.
    pub fn blank(source: Source) -> Self {
        match source {
            Source::Crypto => Self::Crypto {
                promo_code: None,
                charge_amount: None,
                auto_renew: false,
            },
            Source::MobileIap => Self::MobileIap {
                product_id: String::new(),
                auto_renew: false,
                environment: None,
            },
            Source::Extension => Self::Extension {
                auto_renew: false,
                management_url: None,
            },
            Source::Trial => Self::Trial {
                trial_ends_at: None,
                telegram_user: None,
            },
        }
    }
}

/// Authoritative entitlement record for one wallet
///
/// Only the reconciler writes it. A new purchase attempt replaces the whole
/// record; fields of the previous attempt never leak into the next one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    pub status: SubscriptionStatus,
    pub auth_wallet: Option<WalletAddress>,
    pub expires_date: Option<DateTime<Utc>>,
    pub next_charge_date: Option<DateTime<Utc>>,
    /// Backend correlation id, used to re-query status and to dedupe restores
    pub original_transaction_id: Option<String>,
    /// Attempt number within the wallet session; bumps on every new purchase
    pub attempt: u64,
    pub backend: Option<BackendDetails>,
}

impl Subscription {
    /// The record a wallet starts with.
    pub fn none(wallet: Option<WalletAddress>) -> Self {
        Self {
            status: SubscriptionStatus::None,
            auth_wallet: wallet,
            expires_date: None,
            next_charge_date: None,
            original_transaction_id: None,
            attempt: 0,
            backend: None,
        }
    }

    /// Fresh pending record for a new attempt.
    pub fn pending(
        wallet: WalletAddress,
        source: Source,
        correlation_id: impl Into<String>,
        attempt: u64,
    ) -> Self {
        Self {
            status: SubscriptionStatus::Pending,
            auth_wallet: Some(wallet),
            expires_date: None,
            next_charge_date: None,
            original_transaction_id: Some(correlation_id.into()),
            attempt,
            backend: Some(BackendDetails::blank(source)),
        }
    }

    pub fn source(&self) -> Option<Source> {
        self.backend.as_ref().map(BackendDetails::source)
    }

    pub fn is_pending(&self) -> bool {
        self.status.is_pending()
    }

    /// Entitled right now (canceled subscriptions stay usable until expiry).
    pub fn is_entitled(&self, now: DateTime<Utc>) -> bool {
        match self.status {
            SubscriptionStatus::Active => self.expires_date.is_none_or(|end| now < end),
            SubscriptionStatus::Canceled => self.expires_date.is_some_and(|end| now < end),
            _ => false,
        }
    }

    pub fn auto_renews(&self) -> bool {
        self.backend.as_ref().is_some_and(BackendDetails::auto_renews)
    }

    /// Apply a provider status fragment.
    ///
    /// Returns the merged record; `self` is untouched so callers publish the
    /// result in one write.
    pub fn merged(&self, fragment: &StatusFragment) -> Self {
        let mut merged = self.clone();
        merged.status = fragment.status;
        if fragment.expires_date.is_some() {
            merged.expires_date = fragment.expires_date;
        }
        if fragment.next_charge_date.is_some() || fragment.status != SubscriptionStatus::Active
        {
            merged.next_charge_date = fragment.next_charge_date;
        }
        if let Some(id) = &fragment.original_transaction_id {
            merged.original_transaction_id = Some(id.clone());
        }
        if let Some(backend) = &fragment.backend {
            merged.backend = Some(backend.carry_over(self.backend.as_ref()));
        }
        merged
    }
}

impl Default for Subscription {
    fn default() -> Self {
        Self::none(None)
    }
}

/// Partial status reported by a provider for one attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusFragment {
    pub status: SubscriptionStatus,
    pub expires_date: Option<DateTime<Utc>>,
    pub next_charge_date: Option<DateTime<Utc>>,
    pub original_transaction_id: Option<String>,
    pub backend: Option<BackendDetails>,
}

impl StatusFragment {
    pub fn new(status: SubscriptionStatus) -> Self {
        Self {
            status,
            expires_date: None,
            next_charge_date: None,
            original_transaction_id: None,
            backend: None,
        }
    }

    pub fn pending() -> Self {
        Self::new(SubscriptionStatus::Pending)
    }

    pub fn active(expires_date: DateTime<Utc>) -> Self {
        Self::new(SubscriptionStatus::Active).with_expires(expires_date)
    }

    pub fn with_expires(mut self, expires_date: DateTime<Utc>) -> Self {
        self.expires_date = Some(expires_date);
        self
    }

    pub fn with_next_charge(mut self, next_charge_date: DateTime<Utc>) -> Self {
        self.next_charge_date = Some(next_charge_date);
        self
    }

    pub fn with_transaction_id(mut self, id: impl Into<String>) -> Self {
        self.original_transaction_id = Some(id.into());
        self
    }

    pub fn with_backend(mut self, backend: BackendDetails) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Billing period of a plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BillingInterval {
    Monthly,
    Yearly,
    Days { days: u32 },
}

impl BillingInterval {
    /// Approximate length in days, for display and trial bookkeeping.
    pub fn approx_days(&self) -> u32 {
        match self {
            Self::Monthly => 30,
            Self::Yearly => 365,
            Self::Days { days } => *days,
        }
    }
}

/// An offer from a provider catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchasePlan {
    pub id: String,
    pub source: Source,
    pub price: Price,
    pub billing_interval: BillingInterval,
    pub title: Option<String>,
}

impl PurchasePlan {
    pub fn new(
        id: impl Into<String>,
        source: Source,
        price: Price,
        billing_interval: BillingInterval,
    ) -> Self {
        Self {
            id: id.into(),
            source,
            price,
            billing_interval,
            title: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Validate plan data
    pub fn validate(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(SubscriptionError::rejected("Plan ID cannot be empty"));
        }
        if self.price.currency.is_empty() {
            return Err(SubscriptionError::rejected("Plan currency cannot be empty"));
        }
        if let BillingInterval::Days { days: 0 } = self.billing_interval {
            return Err(SubscriptionError::rejected(
                "Billing interval must be at least one day",
            ));
        }
        Ok(())
    }
}
