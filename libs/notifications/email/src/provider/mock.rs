//! Mock email provider for tests and local runs

use super::{EmailProvider, SendResult};
use crate::error::{EmailError, EmailResult};
use crate::models::Email;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Captures sent emails; failures can be scripted
#[derive(Clone, Default)]
pub struct MockEmailProvider {
    sent_emails: Arc<Mutex<Vec<Email>>>,
    attempts: Arc<Mutex<usize>>,
    scripted_failures: Arc<Mutex<VecDeque<EmailError>>>,
    always_fail: Option<EmailError>,
}

impl MockEmailProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Provider that fails every send with `error`
    pub fn failing(error: EmailError) -> Self {
        Self {
            always_fail: Some(error),
            ..Self::default()
        }
    }

    /// Fail the next sends with the given errors, in order, then succeed
    pub async fn fail_next(&self, errors: impl IntoIterator<Item = EmailError>) {
        self.scripted_failures.lock().await.extend(errors);
    }

    pub async fn sent_emails(&self) -> Vec<Email> {
        self.sent_emails.lock().await.clone()
    }

    pub async fn sent_count(&self) -> usize {
        self.sent_emails.lock().await.len()
    }

    /// Send calls made, including failed ones
    pub async fn attempts(&self) -> usize {
        *self.attempts.lock().await
    }

    pub async fn was_sent_to(&self, address: &str) -> bool {
        self.sent_emails.lock().await.iter().any(|e| e.to == address)
    }
}

#[async_trait]
impl EmailProvider for MockEmailProvider {
    async fn send(&self, email: &Email) -> EmailResult<SendResult> {
        *self.attempts.lock().await += 1;

        if let Some(error) = &self.always_fail {
            return Err(error.clone());
        }
        if let Some(error) = self.scripted_failures.lock().await.pop_front() {
            return Err(error);
        }

        self.sent_emails.lock().await.push(email.clone());

        Ok(SendResult {
            message_id: format!("mock-{}", email.id),
        })
    }

    async fn health_check(&self) -> EmailResult<()> {
        match &self.always_fail {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
