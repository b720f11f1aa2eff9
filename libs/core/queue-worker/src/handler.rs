//! Side-effect boundary for decoded payloads

use crate::error::HandlerError;
use async_trait::async_trait;

/// Executes the side effect for one decoded payload.
///
/// Return a [`HandlerError::transient`] for failures worth retrying and a
/// [`HandlerError::permanent`] for ones that will never succeed; the latter
/// are dead-lettered without further attempts.
///
/// # Example
///
/// ```rust,ignore
/// use queue_worker::{HandlerError, MessageHandler};
///
/// struct AuditHandler;
///
/// #[async_trait]
/// impl MessageHandler<AuditEvent> for AuditHandler {
///     async fn handle(&self, event: &AuditEvent) -> Result<(), HandlerError> {
///         store(event).await.map_err(|e| HandlerError::transient(e.to_string()))
///     }
///
///     fn name(&self) -> &'static str {
///         "AuditHandler"
///     }
/// }
/// ```
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessageHandler<P: Send + Sync + 'static>: Send + Sync {
    async fn handle(&self, payload: &P) -> Result<(), HandlerError>;

    /// Handler name for logs and metric labels
    fn name(&self) -> &'static str;
}
