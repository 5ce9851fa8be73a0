//! Error types for subscription operations.
//!
//! Every failure a provider, the wallet authenticator or the storage layer can
//! produce is mapped onto one [`SubscriptionError`] variant. The reconciler
//! branches on the classification helpers instead of matching strings.

use crate::subscription::Source;

/// Error codes for FFI and mobile integration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum SubscriptionErrorCode {
    /// Network failure or provider timeout
    NetworkOrTimeout = 2000,
    /// Wallet signature rejected or expired
    AuthFailure = 3000,
    /// Provider refused the purchase or transaction
    ProviderRejected = 6003,
    /// Promo code failed validation
    InvalidPromoCode = 5001,
    /// No strategy registered or available for a source
    StrategyUnavailable = 4001,
    /// No wallet bound to the session
    NoWallet = 4000,
    /// Storage error
    Storage = 7000,
    /// Serialization error
    Serialization = 5002,
    /// Invalid configuration
    Config = 5000,
    /// Programming fault that was caught and ignored
    InvariantViolation = 9999,
}

/// Errors raised by the subscription core.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum SubscriptionError {
    #[error("{operation} failed: {reason}")]
    NetworkOrTimeout { operation: String, reason: String },
    #[error("provider rejected: {reason}")]
    ProviderRejected { reason: String },
    #[error("wallet authentication failed: {0}")]
    AuthFailure(String),
    #[error("invalid promo code: {0}")]
    InvalidPromoCode(String),
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
    #[error("no strategy available for source {0}")]
    StrategyUnavailable(Source),
    #[error("no wallet bound")]
    NoWallet,
    #[error("storage error: {0}")]
    Storage(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl SubscriptionError {
    /// Create a network/timeout error for the named operation.
    pub fn network(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::NetworkOrTimeout {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Create a provider rejection.
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::ProviderRejected {
            reason: reason.into(),
        }
    }

    /// Get the error code.
    pub fn code(&self) -> SubscriptionErrorCode {
        match self {
            Self::NetworkOrTimeout { .. } => SubscriptionErrorCode::NetworkOrTimeout,
            Self::ProviderRejected { .. } => SubscriptionErrorCode::ProviderRejected,
            Self::AuthFailure(_) => SubscriptionErrorCode::AuthFailure,
            Self::InvalidPromoCode(_) => SubscriptionErrorCode::InvalidPromoCode,
            Self::InvariantViolation(_) => SubscriptionErrorCode::InvariantViolation,
            Self::StrategyUnavailable(_) => SubscriptionErrorCode::StrategyUnavailable,
            Self::NoWallet => SubscriptionErrorCode::NoWallet,
            Self::Storage(_) => SubscriptionErrorCode::Storage,
            Self::Serialization(_) => SubscriptionErrorCode::Serialization,
            Self::Config(_) => SubscriptionErrorCode::Config,
        }
    }

    /// Check if the operation can be retried as-is.
    ///
    /// Poll loops keep running through retryable errors.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::NetworkOrTimeout { .. })
    }

    /// Check if this error ends the current purchase attempt.
    pub fn is_terminal_for_attempt(&self) -> bool {
        matches!(self, Self::ProviderRejected { .. } | Self::AuthFailure(_))
    }

    /// Check if the user must re-authenticate the wallet.
    pub fn requires_reauth(&self) -> bool {
        matches!(self, Self::AuthFailure(_))
    }
}

impl From<serde_json::Error> for SubscriptionError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for SubscriptionError {
    fn from(err: std::io::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        let net = SubscriptionError::network("query_status", "connection reset");
        assert!(net.is_retryable());
        assert!(!net.is_terminal_for_attempt());
        assert_eq!(net.code(), SubscriptionErrorCode::NetworkOrTimeout);

        let rejected = SubscriptionError::rejected("card declined");
        assert!(!rejected.is_retryable());
        assert!(rejected.is_terminal_for_attempt());

        let auth = SubscriptionError::AuthFailure("signature expired".into());
        assert!(auth.requires_reauth());
        assert!(auth.is_terminal_for_attempt());

        let promo = SubscriptionError::InvalidPromoCode("SPRING".into());
        assert!(!promo.is_retryable());
        assert!(!promo.is_terminal_for_attempt());
    }

    #[test]
    fn test_display() {
        let err = SubscriptionError::network("initiate", "timeout after 30s");
        assert_eq!(err.to_string(), "initiate failed: timeout after 30s");
        assert_eq!(
            SubscriptionError::StrategyUnavailable(Source::MobileIap).to_string(),
            "no strategy available for source mobile_iap"
        );
    }
}
