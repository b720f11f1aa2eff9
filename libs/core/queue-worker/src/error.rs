//! Pipeline error types and error categorization
//!
//! Errors are split by where they happen:
//! - **TransportError**: the queue service itself failed (receive/delete/send)
//! - **HandlerError**: the side effect for one message failed
//! - **DecodeError**: the message body could not be parsed
//! - **MessageError**: terminal outcome for a single message
//! - **CycleError**: the whole poll cycle was aborted

use std::fmt;
use thiserror::Error;

/// Category of a handler failure, used to decide whether to retry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Temporary failure - retry after the configured delay
    Transient,
    /// Unrecoverable error - dead-letter without retrying
    Permanent,
}

impl ErrorCategory {
    /// Whether a failure of this category is worth retrying
    pub fn should_retry(&self) -> bool {
        matches!(self, ErrorCategory::Transient)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Transient => "transient",
            ErrorCategory::Permanent => "permanent",
        }
    }
}

/// Queue operation that failed at the transport boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportOp {
    Receive,
    Delete,
    Send,
}

impl fmt::Display for TransportOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = match self {
            TransportOp::Receive => "receive",
            TransportOp::Delete => "delete",
            TransportOp::Send => "send",
        };
        f.write_str(op)
    }
}

/// Infrastructure failure talking to the queue service.
///
/// Every transport implementation maps its native errors into this one type,
/// so callers never need to know which backend is in use.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Transport {operation} failed on '{endpoint}': {message}")]
pub struct TransportError {
    pub operation: TransportOp,
    pub endpoint: String,
    pub message: String,
}

impl TransportError {
    pub fn new(operation: TransportOp, endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            operation,
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    pub fn receive(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(TransportOp::Receive, endpoint, message)
    }

    pub fn delete(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(TransportOp::Delete, endpoint, message)
    }

    pub fn send(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(TransportOp::Send, endpoint, message)
    }
}

/// Failure reported by a message handler
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Handler error: {message}")]
pub struct HandlerError {
    pub message: String,
    pub category: ErrorCategory,
}

impl HandlerError {
    /// Create a transient handler error (will be retried)
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            category: ErrorCategory::Transient,
        }
    }

    /// Create a permanent handler error (dead-lettered immediately)
    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            category: ErrorCategory::Permanent,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        self.category
    }
}

/// Message body could not be turned into a payload
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Malformed payload: {0}")]
    Malformed(String),
}

impl From<serde_json::Error> for DecodeError {
    fn from(err: serde_json::Error) -> Self {
        DecodeError::Malformed(err.to_string())
    }
}

/// Terminal failure for a single message.
///
/// None of these abort the poll cycle; sibling messages are still processed.
#[derive(Error, Debug)]
pub enum MessageError {
    /// Handler kept failing; message was dead-lettered after the last attempt
    #[error("Retries exhausted after {attempts} attempts: {source}")]
    Exhausted {
        attempts: u32,
        #[source]
        source: HandlerError,
    },

    /// Body could not be decoded; message was dead-lettered without retrying
    #[error("Dead-lettered malformed message: {0}")]
    Malformed(#[source] DecodeError),

    /// Handler reported a permanent failure; message was dead-lettered
    #[error("Dead-lettered rejected message: {0}")]
    Rejected(#[source] HandlerError),

    /// Sending to the dead-letter queue failed; source message was NOT deleted
    #[error("Dead-letter relocation failed ({cause}): {source}")]
    DeadLetterRelocation {
        #[source]
        source: TransportError,
        cause: String,
    },

    /// Deleting from the source queue failed after the outcome was confirmed.
    /// `dead_lettered` is set when the DLQ copy was already written.
    #[error("Failed to delete message from source queue: {source}")]
    Delete {
        #[source]
        source: TransportError,
        dead_lettered: bool,
    },
}

impl MessageError {
    /// Whether the message ended up in the dead-letter queue
    pub fn was_dead_lettered(&self) -> bool {
        matches!(
            self,
            MessageError::Exhausted { .. }
                | MessageError::Malformed(_)
                | MessageError::Rejected(_)
                | MessageError::Delete {
                    dead_lettered: true,
                    ..
                }
        )
    }

    /// Short label for logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            MessageError::Exhausted { .. } => "exhausted",
            MessageError::Malformed(_) => "malformed",
            MessageError::Rejected(_) => "rejected",
            MessageError::DeadLetterRelocation { .. } => "dead_letter_relocation",
            MessageError::Delete { .. } => "delete",
        }
    }
}

/// Failure that aborts a whole poll cycle
#[derive(Error, Debug)]
pub enum CycleError {
    /// The receive call itself failed; nothing was processed
    #[error("Receive failed, cycle aborted: {0}")]
    Receive(#[source] TransportError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_categories() {
        assert!(ErrorCategory::Transient.should_retry());
        assert!(!ErrorCategory::Permanent.should_retry());
        assert_eq!(HandlerError::transient("x").category(), ErrorCategory::Transient);
        assert_eq!(HandlerError::permanent("x").category(), ErrorCategory::Permanent);
    }

    #[test]
    fn test_transport_error_display() {
        let err = TransportError::send("https://sqs/dlq", "connection reset");
        assert_eq!(err.operation, TransportOp::Send);
        assert_eq!(
            err.to_string(),
            "Transport send failed on 'https://sqs/dlq': connection reset"
        );
    }

    #[test]
    fn test_message_error_dead_lettered() {
        let exhausted = MessageError::Exhausted {
            attempts: 3,
            source: HandlerError::transient("smtp down"),
        };
        assert!(exhausted.was_dead_lettered());
        assert_eq!(exhausted.kind(), "exhausted");

        let relocation = MessageError::DeadLetterRelocation {
            source: TransportError::send("dlq", "boom"),
            cause: "smtp down".to_string(),
        };
        assert!(!relocation.was_dead_lettered());
        assert!(relocation.to_string().contains("relocation"));

        let stranded = MessageError::Delete {
            source: TransportError::delete("source", "gone"),
            dead_lettered: true,
        };
        assert!(stranded.was_dead_lettered());
        assert_eq!(stranded.kind(), "delete");
    }

    #[test]
    fn test_decode_error_from_serde() {
        let err: DecodeError = serde_json::from_str::<serde_json::Value>("{not json")
            .unwrap_err()
            .into();
        assert!(matches!(err, DecodeError::Malformed(_)));
    }
}
