//! Error types for AdComply

/// Result type alias using AdComply's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for AdComply operations
///
/// Violations are not errors: a failed compliance check is a normal outcome
/// carried in a [`crate::ComplianceVerdict`]. The variants here describe
/// malformed input and infrastructure failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// Malformed artifact, rejected before (or during) evaluation
    #[error("validation error: {0}")]
    Validation(String),

    /// Malformed rule source; the previously published rule set stays live
    #[error("rule load error: {0}")]
    RuleLoad(String),

    /// A moderation adapter is down or returned garbage
    #[error("model unavailable for {category}: {reason}")]
    ModelUnavailable {
        /// Moderation category served by the adapter
        category: String,
        /// Underlying cause
        reason: String,
    },

    /// Regulation feed could not be fetched or parsed
    #[error("regulatory fetch error: {0}")]
    RegulatoryFetch(String),

    /// A notification could not be delivered to a recipient
    #[error("notification delivery to {recipient} failed: {reason}")]
    NotificationDelivery {
        /// Recipient address or URL
        recipient: String,
        /// Underlying cause
        reason: String,
        /// Whether another attempt may succeed
        retryable: bool,
    },

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    /// Network/IO errors
    #[error("io error: {0}")]
    Io(String),

    /// Serialization errors
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Timeout errors
    #[error("operation timed out")]
    Timeout,

    /// Caller cancelled the operation
    #[error("operation cancelled")]
    Cancelled,

    /// Generic internal errors
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a new rule load error
    pub fn rule_load(msg: impl Into<String>) -> Self {
        Self::RuleLoad(msg.into())
    }

    /// Create a new model unavailable error
    pub fn model_unavailable(category: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ModelUnavailable {
            category: category.into(),
            reason: reason.into(),
        }
    }

    /// Create a new regulatory fetch error
    pub fn regulatory_fetch(msg: impl Into<String>) -> Self {
        Self::RegulatoryFetch(msg.into())
    }

    /// Create a delivery error that may succeed on retry
    pub fn delivery(recipient: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::NotificationDelivery {
            recipient: recipient.into(),
            reason: reason.into(),
            retryable: true,
        }
    }

    /// Create a delivery error that will never succeed on retry
    pub fn delivery_permanent(recipient: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::NotificationDelivery {
            recipient: recipient.into(),
            reason: reason.into(),
            retryable: false,
        }
    }

    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// True for malformed-input errors that must be surfaced to the caller
    /// instead of degrading the verdict.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// True when retrying the same operation may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::NotificationDelivery { retryable, .. } => *retryable,
            Self::Io(_) | Self::Timeout | Self::RegulatoryFetch(_) | Self::ModelUnavailable { .. } => {
                true
            }
            _ => false,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_classification() {
        assert!(Error::delivery("ops@example.com", "connection reset").is_retryable());
        assert!(!Error::delivery_permanent("ops@example.com", "no smtp").is_retryable());
        assert!(!Error::validation("missing id").is_retryable());
        assert!(Error::validation("missing id").is_validation());
    }

    #[test]
    fn test_display() {
        let err = Error::model_unavailable("toxicity", "connection refused");
        assert_eq!(
            err.to_string(),
            "model unavailable for toxicity: connection refused"
        );
    }
}
