//! Error types for the control plane.
//!
//! [`GatewayError`] covers every failure mode a caller of the core API can
//! see: budget enforcement, provider failures, cancellation, missing prices,
//! and ledger insufficiency. Each variant can be categorized, checked for
//! retryability, and converted to a message safe to surface to a tenant.

use crate::logging::log_error;
use thiserror::Error;

/// High-level categorization of errors for routing and handling decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Expected business outcome, not a system fault (budget blocks, insufficient balance).
    BusinessLogic,
    /// The provider or network had an issue.
    External,
    /// A bug or invariant violation inside the control plane itself.
    Internal,
    /// The caller made a mistake they can fix (bad config, missing price row).
    Client,
    /// Temporary failure that should be retried with backoff.
    Transient,
}

/// Severity level for logging and alerting decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// System is unusable or a monetary invariant is at risk.
    Critical,
    /// Action failed but the system is stable.
    Error,
    /// Unexpected but recoverable.
    Warning,
    /// Expected outcome, log at info/debug.
    Info,
}

/// Convenience alias for `Result<T, GatewayError>`.
pub type GatewayResult<T> = std::result::Result<T, GatewayError>;

/// Errors that can occur while routing a call through the control plane.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// The tenant's hard budget limit would be exceeded by this call.
    ///
    /// No provider call is issued; a `status=blocked` usage event is still
    /// persisted. See spec §4.8 step 2 and §7.
    #[error("Budget blocked: {state}")]
    BudgetBlocked {
        /// The budget state that triggered the block (`hard_blocked`).
        state: String,
    },

    /// The provider callable returned a failure.
    #[error("Provider call failed: {message}")]
    ProviderError {
        /// Symbolic error code recorded on the usage event (never the raw payload).
        error_code: String,
        /// Human-readable detail.
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The caller cancelled the call, or a deadline elapsed.
    #[error("Call cancelled")]
    Cancelled,

    /// Provider response could not be parsed into token/usage data.
    #[error("Response parsing failed: {message}")]
    ResponseParsingError {
        /// Details about the parsing failure.
        message: String,
    },

    /// Provider-level rate limiting.
    #[error("Rate limit exceeded, retry after {retry_after_seconds}s")]
    RateLimitExceeded {
        /// Recommended wait time before retrying.
        retry_after_seconds: u64,
    },

    /// A single attempt exceeded its request timeout.
    #[error("Request timed out after {timeout_seconds}s")]
    Timeout {
        /// The timeout duration that was exceeded.
        timeout_seconds: u64,
    },

    /// Gateway configuration is invalid or incomplete.
    #[error("Configuration error: {message}")]
    ConfigurationError {
        /// Description of the configuration problem.
        message: String,
    },

    /// A tenant's ledger charge could not be completed.
    ///
    /// Not treated as a hard error by callers; the ledger returns this as
    /// part of a `ChargeResult` rather than always propagating it.
    #[error("Insufficient balance: need {needed}, have {available}")]
    InsufficientBalance {
        /// Amount the charge required.
        needed: String,
        /// Amount actually available.
        available: String,
    },
}

impl GatewayError {
    /// Get the error category for routing and handling decisions.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::BudgetBlocked { .. } => ErrorCategory::BusinessLogic,
            Self::ProviderError { .. } => ErrorCategory::External,
            Self::Cancelled => ErrorCategory::BusinessLogic,
            Self::ResponseParsingError { .. } => ErrorCategory::External,
            Self::RateLimitExceeded { .. } => ErrorCategory::Transient,
            Self::Timeout { .. } => ErrorCategory::Transient,
            Self::ConfigurationError { .. } => ErrorCategory::Client,
            Self::InsufficientBalance { .. } => ErrorCategory::BusinessLogic,
        }
    }

    /// Get the error severity for logging and alerting.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::BudgetBlocked { .. } => ErrorSeverity::Info,
            Self::ProviderError { .. } => ErrorSeverity::Error,
            Self::Cancelled => ErrorSeverity::Info,
            Self::ResponseParsingError { .. } => ErrorSeverity::Warning,
            Self::RateLimitExceeded { .. } => ErrorSeverity::Warning,
            Self::Timeout { .. } => ErrorSeverity::Warning,
            Self::ConfigurationError { .. } => ErrorSeverity::Error,
            Self::InsufficientBalance { .. } => ErrorSeverity::Info,
        }
    }

    /// Whether this error is transient and should trigger a retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimitExceeded { .. } | Self::Timeout { .. } | Self::ProviderError { .. }
        )
    }

    /// Convert to a message safe to surface to a tenant.
    pub fn user_message(&self) -> String {
        match self {
            Self::BudgetBlocked { state } => format!("Budget blocked: {state}"),
            Self::ProviderError { error_code, .. } => {
                format!("Unable to complete the call (code: {error_code})")
            }
            Self::Cancelled => "Call was cancelled".to_string(),
            Self::ResponseParsingError { .. } => {
                "Received an invalid response from the provider".to_string()
            }
            Self::RateLimitExceeded {
                retry_after_seconds,
            } => format!("Provider is busy, retry after {retry_after_seconds}s"),
            Self::Timeout { .. } => "Request timed out, please try again".to_string(),
            Self::ConfigurationError { .. } => "Gateway configuration issue".to_string(),
            Self::InsufficientBalance { .. } => "Insufficient credit balance".to_string(),
        }
    }

    // ========================================================================
    // Constructor methods with automatic logging
    // ========================================================================

    pub fn budget_blocked(state: impl Into<String>) -> Self {
        let state = state.into();
        log_error!(error_type = "budget_blocked", state = %state, "Call blocked by tenant budget");
        Self::BudgetBlocked { state }
    }

    pub fn provider_error(
        error_code: impl Into<String>,
        message: impl Into<String>,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        let error_code = error_code.into();
        let message = message.into();
        log_error!(
            error_type = "provider_error",
            error_code = %error_code,
            message = %message,
            "Provider call failed"
        );
        Self::ProviderError {
            error_code,
            message,
            source,
        }
    }

    pub fn cancelled() -> Self {
        log_error!(error_type = "cancelled", "Call cancelled");
        Self::Cancelled
    }

    pub fn response_parsing_error(message: impl Into<String>) -> Self {
        let message = message.into();
        log_error!(error_type = "response_parsing_error", message = %message, "Provider response malformed");
        Self::ResponseParsingError { message }
    }

    pub fn rate_limit_exceeded(retry_after_seconds: u64) -> Self {
        log_error!(
            error_type = "rate_limit_exceeded",
            retry_after_seconds = retry_after_seconds,
            "Provider rate limit exceeded"
        );
        Self::RateLimitExceeded {
            retry_after_seconds,
        }
    }

    pub fn timeout(timeout_seconds: u64) -> Self {
        log_error!(error_type = "timeout", timeout_seconds = timeout_seconds, "Request timed out");
        Self::Timeout { timeout_seconds }
    }

    pub fn configuration_error(message: impl Into<String>) -> Self {
        let message = message.into();
        log_error!(error_type = "configuration_error", message = %message, "Gateway configuration invalid");
        Self::ConfigurationError { message }
    }

    pub fn insufficient_balance(needed: impl Into<String>, available: impl Into<String>) -> Self {
        Self::InsufficientBalance {
            needed: needed.into(),
            available: available.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_blocked_is_not_retryable() {
        let err = GatewayError::budget_blocked("hard_blocked");
        assert!(!err.is_retryable());
        assert_eq!(err.category(), ErrorCategory::BusinessLogic);
    }

    #[test]
    fn timeout_is_retryable_and_transient() {
        let err = GatewayError::timeout(30);
        assert!(err.is_retryable());
        assert_eq!(err.category(), ErrorCategory::Transient);
    }

    #[test]
    fn provider_error_user_message_hides_raw_payload() {
        let err = GatewayError::provider_error("connection_reset", "raw payload: secret", None);
        assert!(!err.user_message().contains("secret"));
    }
}
