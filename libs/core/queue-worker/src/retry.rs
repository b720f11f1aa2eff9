//! Per-message retry state machine
//!
//! ```text
//! Attempting(0) --ok--> Succeeded                       (delete)
//! Attempting(n) --transient, n < max--> Attempting(n+1) (wait, retry)
//! Attempting(n) --transient, n == max--> DeadLettered   (relocate, delete)
//! Attempting(n) --permanent--> DeadLettered             (relocate, delete)
//! ```
//!
//! [`RetryPolicy`] holds the pure transition function. [`RetryController`]
//! drives it against a real transport, handler and dead-letter router.

use crate::decoder::MessageDecoder;
use crate::dlq::{DeadLetterReason, DeadLetterRouter};
use crate::error::{ErrorCategory, HandlerError, MessageError};
use crate::handler::MessageHandler;
use crate::metrics::PipelineMetrics;
use crate::transport::{QueueMessage, QueueTransport};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Delay between handler attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Same delay before every retry
    Fixed(Duration),
    /// `base * 2^(retry - 1)`, capped at `max`
    Exponential { base: Duration, max: Duration },
}

impl Backoff {
    /// Delay before retry number `retry` (1-based)
    pub fn delay_for(&self, retry: u32) -> Duration {
        match *self {
            Backoff::Fixed(delay) => delay,
            Backoff::Exponential { base, max } => {
                let exponent = retry.saturating_sub(1).min(31);
                base.checked_mul(1u32 << exponent).unwrap_or(max).min(max)
            }
        }
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Backoff::Fixed(Duration::from_millis(9000))
    }
}

/// Where a single message is in its processing sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptState {
    /// About to invoke the handler; `n` failed attempts so far
    Attempting(u32),
    Succeeded,
    DeadLettered,
}

impl AttemptState {
    pub fn initial() -> Self {
        AttemptState::Attempting(0)
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, AttemptState::Attempting(_))
    }
}

/// Result of one handler invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure(ErrorCategory),
}

impl From<&Result<(), HandlerError>> for Outcome {
    fn from(result: &Result<(), HandlerError>) -> Self {
        match result {
            Ok(()) => Outcome::Success,
            Err(e) => Outcome::Failure(e.category()),
        }
    }
}

/// Side effect required by a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Delete the message from the source queue
    Delete,
    /// Sleep, then invoke the handler again with the same message
    Retry { delay: Duration },
    /// Relocate to the dead-letter queue, then delete from the source
    DeadLetter { reason: DeadLetterReason },
    /// State is terminal; nothing to do
    None,
}

/// What to do after a failed attempt; the only two outcomes of a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureAction {
    Retry { delay: Duration },
    DeadLetter { reason: DeadLetterReason },
}

impl From<FailureAction> for Action {
    fn from(action: FailureAction) -> Self {
        match action {
            FailureAction::Retry { delay } => Action::Retry { delay },
            FailureAction::DeadLetter { reason } => Action::DeadLetter { reason },
        }
    }
}

/// Bounded retry policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retries: u32,
    backoff: Backoff,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, backoff: Backoff) -> Self {
        Self { max_retries, backoff }
    }

    /// Retries allowed after the first attempt
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn backoff(&self) -> Backoff {
        self.backoff
    }

    /// Upper bound on handler invocations for one message
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Pure transition function
    pub fn next(&self, state: AttemptState, outcome: Outcome) -> (AttemptState, Action) {
        let AttemptState::Attempting(n) = state else {
            return (state, Action::None);
        };

        match outcome {
            Outcome::Success => (AttemptState::Succeeded, Action::Delete),
            Outcome::Failure(category) => {
                let action = self.on_failure(n, category);
                let next = match action {
                    FailureAction::Retry { .. } => AttemptState::Attempting(n + 1),
                    FailureAction::DeadLetter { .. } => AttemptState::DeadLettered,
                };
                (next, action.into())
            }
        }
    }

    /// Decision after attempt `n` (0-based) failed with `category`
    pub fn on_failure(&self, n: u32, category: ErrorCategory) -> FailureAction {
        match category {
            ErrorCategory::Permanent => FailureAction::DeadLetter {
                reason: DeadLetterReason::Permanent,
            },
            ErrorCategory::Transient if n < self.max_retries => FailureAction::Retry {
                delay: self.backoff.delay_for(n + 1),
            },
            ErrorCategory::Transient => FailureAction::DeadLetter {
                reason: DeadLetterReason::Exhausted,
            },
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(2, Backoff::default())
    }
}

/// Runs one message through decode, handle, retry and dead-letter
pub struct RetryController<P> {
    transport: Arc<dyn QueueTransport>,
    decoder: Arc<dyn MessageDecoder<P>>,
    handler: Arc<dyn MessageHandler<P>>,
    router: DeadLetterRouter,
    policy: RetryPolicy,
    metrics: PipelineMetrics,
}

impl<P: Send + Sync + 'static> RetryController<P> {
    pub fn new(
        transport: Arc<dyn QueueTransport>,
        decoder: Arc<dyn MessageDecoder<P>>,
        handler: Arc<dyn MessageHandler<P>>,
        router: DeadLetterRouter,
        policy: RetryPolicy,
    ) -> Self {
        let metrics = PipelineMetrics::new(handler.name());
        Self {
            transport,
            decoder,
            handler,
            router,
            policy,
            metrics,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Process one message read from `source`.
    ///
    /// Returns `Ok(())` only when the handler succeeded and the message was
    /// deleted. Every other terminal outcome is a [`MessageError`]; the
    /// message is deleted only if it reached the dead-letter queue first.
    pub async fn process(&self, source: &str, message: &QueueMessage) -> Result<(), MessageError> {
        let payload = match self.decoder.decode(&message.body) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(
                    message_id = %message.log_id(),
                    error = %err,
                    "Malformed payload, dead-lettering without retry"
                );
                self.dead_letter(source, message, DeadLetterReason::Malformed, &err.to_string(), 0)
                    .await?;
                return Err(MessageError::Malformed(err));
            }
        };

        let started = Instant::now();
        let mut failed = 0u32;

        loop {
            let error = match self.handler.handle(&payload).await {
                Ok(()) => {
                    debug!(message_id = %message.log_id(), attempts = failed + 1, "Handler succeeded");
                    self.delete_source(source, message, false).await?;
                    self.metrics.message_succeeded(source, started.elapsed());
                    return Ok(());
                }
                Err(error) => error,
            };

            let action = self.policy.on_failure(failed, error.category());
            failed += 1;

            match action {
                FailureAction::Retry { delay } => {
                    warn!(
                        message_id = %message.log_id(),
                        handler = self.handler.name(),
                        attempt = failed,
                        max_attempts = self.policy.max_attempts(),
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Handler failed, retrying"
                    );
                    self.metrics.message_retried(source);
                    tokio::time::sleep(delay).await;
                }
                FailureAction::DeadLetter { reason } => {
                    return Err(self.dead_letter_failure(source, message, reason, error, failed).await);
                }
            }
        }
    }

    async fn dead_letter_failure(
        &self,
        source: &str,
        message: &QueueMessage,
        reason: DeadLetterReason,
        error: HandlerError,
        attempts: u32,
    ) -> MessageError {
        if let Err(err) = self
            .dead_letter(source, message, reason, &error.to_string(), attempts)
            .await
        {
            return err;
        }

        match reason {
            DeadLetterReason::Permanent => MessageError::Rejected(error),
            _ => MessageError::Exhausted {
                attempts,
                source: error,
            },
        }
    }

    /// Relocate, then delete. The source message is left in place if the
    /// relocation fails.
    async fn dead_letter(
        &self,
        source: &str,
        message: &QueueMessage,
        reason: DeadLetterReason,
        error: &str,
        attempts: u32,
    ) -> Result<(), MessageError> {
        self.router
            .relocate(source, message, reason, error, attempts)
            .await
            .map_err(|e| MessageError::DeadLetterRelocation {
                source: e,
                cause: error.to_string(),
            })?;

        self.metrics.message_dead_lettered(source, reason.as_str());
        self.delete_source(source, message, true).await
    }

    async fn delete_source(
        &self,
        source: &str,
        message: &QueueMessage,
        dead_lettered: bool,
    ) -> Result<(), MessageError> {
        self.transport
            .delete(source, &message.receipt_handle)
            .await
            .map_err(|source| MessageError::Delete {
                source,
                dead_lettered,
            })
    }
}
