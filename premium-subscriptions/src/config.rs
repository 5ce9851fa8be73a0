//! Configuration for the reconciler and notice windows.

use crate::{Result, SubscriptionError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Runtime the wallet app is running in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    /// Desktop or web app.
    #[default]
    Desktop,
    /// Native mobile app with store billing.
    Mobile,
    /// Browser extension.
    Extension,
    /// Telegram mini app.
    Telegram,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Desktop => "desktop",
            Self::Mobile => "mobile",
            Self::Extension => "extension",
            Self::Telegram => "telegram",
        }
    }
}

/// Notice window configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NoticeConfig {
    /// Upper bound (days) of the "ending soon" week window.
    #[serde(default = "default_ending_window_days")]
    pub ending_window_days: u32,

    /// Upper bound (days) of the low-balance window.
    #[serde(default = "default_balance_window_days")]
    pub balance_window_days: u32,

    /// Let a `Day` marker of one notice kind also suppress the weaker window
    /// of the other kind. Off until product decides otherwise.
    #[serde(default)]
    pub cross_kind_suppression: bool,
}

fn default_ending_window_days() -> u32 {
    7
}

fn default_balance_window_days() -> u32 {
    3
}

impl Default for NoticeConfig {
    fn default() -> Self {
        Self {
            ending_window_days: default_ending_window_days(),
            balance_window_days: default_balance_window_days(),
            cross_kind_suppression: false,
        }
    }
}

/// Configuration for [`SubscriptionReconciler`](crate::SubscriptionReconciler).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReconcilerConfig {
    /// Seconds between status queries while a purchase is pending.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Runtime used for strategy resolution.
    #[serde(default)]
    pub platform: Platform,

    /// Locale passed to catalog fetches.
    #[serde(default = "default_locale")]
    pub locale: String,

    #[serde(default)]
    pub notices: NoticeConfig,
}

fn default_poll_interval_secs() -> u64 {
    10
}

fn default_locale() -> String {
    "en".to_string()
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            platform: Platform::default(),
            locale: default_locale(),
            notices: NoticeConfig::default(),
        }
    }
}

impl ReconcilerConfig {
    /// Load from a JSON file; missing fields fall back to defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            SubscriptionError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config: Self = serde_json::from_str(&raw)
            .map_err(|e| SubscriptionError::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_secs == 0 {
            return Err(SubscriptionError::Config(
                "poll_interval_secs must be positive".into(),
            ));
        }
        if self.notices.ending_window_days <= 1 || self.notices.balance_window_days <= 1 {
            return Err(SubscriptionError::Config(
                "notice windows must be longer than one day".into(),
            ));
        }
        if self.locale.is_empty() {
            return Err(SubscriptionError::Config("locale cannot be empty".into()));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Set the poll interval.
    pub fn with_poll_interval(mut self, secs: u64) -> Self {
        self.poll_interval_secs = secs;
        self
    }

    /// Set the platform.
    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    /// Set the catalog locale.
    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = locale.into();
        self
    }

    /// Set notice windows.
    pub fn with_notices(mut self, notices: NoticeConfig) -> Self {
        self.notices = notices;
        self
    }
}
