//! Error types for email delivery.

use queue_worker::{ErrorCategory, HandlerError};
use thiserror::Error;

/// Result type for email operations.
pub type EmailResult<T> = Result<T, EmailError>;

/// Errors that can occur while building or sending an email.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EmailError {
    /// Recipient address is missing or malformed
    #[error("Invalid recipient: {0}")]
    InvalidRecipient(String),

    /// Message cannot be built or was rejected for its content
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    /// Provider is throttling us
    #[error("Rate limit exceeded: {0}")]
    RateLimited(String),

    /// Credentials were refused
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Any other provider failure (network, 5xx, timeouts)
    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl EmailError {
    /// Category used by the retry controller
    pub fn category(&self) -> ErrorCategory {
        match self {
            EmailError::InvalidRecipient(_) | EmailError::InvalidMessage(_) => ErrorCategory::Permanent,
            _ => ErrorCategory::Transient,
        }
    }

    /// Map a free-form provider message onto a variant.
    ///
    /// Only messages that name the recipient address are permanent. Generic
    /// "invalid ..." text (expired tokens, TLS certificates, IO errors) stays
    /// transient.
    pub fn classify(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_ascii_lowercase();

        if lower.contains("rate limit") || lower.contains("throttl") || lower.contains("429") {
            EmailError::RateLimited(message)
        } else if AUTH_MARKERS.iter().any(|m| lower.contains(m)) {
            EmailError::Auth(message)
        } else if RECIPIENT_MARKERS.iter().any(|m| lower.contains(m)) {
            EmailError::InvalidRecipient(message)
        } else {
            EmailError::Provider(message)
        }
    }
}

const AUTH_MARKERS: &[&str] = &[
    "accessdenied",
    "access denied",
    "credentials",
    "security token",
    "signaturedoesnotmatch",
    "authentication",
    "unauthorized",
];

const RECIPIENT_MARKERS: &[&str] = &[
    "invalid recipient",
    "invalid address",
    "invalid mailbox",
    "malformed address",
    "mailbox unavailable",
    "no such user",
    "user unknown",
    "recipient address rejected",
];

impl From<EmailError> for HandlerError {
    fn from(err: EmailError) -> Self {
        HandlerError {
            message: err.to_string(),
            category: err.category(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify() {
        assert!(matches!(EmailError::classify("429 Too Many Requests"), EmailError::RateLimited(_)));
        assert!(matches!(
            EmailError::classify("Invalid mailbox syntax"),
            EmailError::InvalidRecipient(_)
        ));
        assert!(matches!(
            EmailError::classify("550 5.1.1 <bob@example.com>: Recipient address rejected: User unknown"),
            EmailError::InvalidRecipient(_)
        ));
        assert!(matches!(EmailError::classify("connection reset"), EmailError::Provider(_)));
    }

    #[test]
    fn test_classify_generic_invalid_is_transient() {
        let token = EmailError::classify("The security token included in the request is invalid");
        assert!(matches!(token, EmailError::Auth(_)));
        assert_eq!(token.category(), ErrorCategory::Transient);

        for message in [
            "dispatch failure: invalid peer certificate: UnknownIssuer",
            "io error: Invalid argument (os error 22)",
            "malformed response from server",
        ] {
            let err = EmailError::classify(message);
            assert!(matches!(err, EmailError::Provider(_)), "{message}: {err:?}");
            assert_eq!(err.category(), ErrorCategory::Transient);
        }
    }

    #[test]
    fn test_only_invalid_input_is_permanent() {
        assert_eq!(
            EmailError::InvalidRecipient("x".into()).category(),
            ErrorCategory::Permanent
        );
        assert_eq!(
            EmailError::InvalidMessage("x".into()).category(),
            ErrorCategory::Permanent
        );
        assert_eq!(EmailError::RateLimited("x".into()).category(), ErrorCategory::Transient);
        assert_eq!(EmailError::Provider("x".into()).category(), ErrorCategory::Transient);
    }

    #[test]
    fn test_into_handler_error() {
        let err: HandlerError = EmailError::InvalidRecipient("bob@".into()).into();
        assert_eq!(err.category, ErrorCategory::Permanent);
        assert_eq!(err.message, "Invalid recipient: bob@");
    }
}
