//! EmailJob - the queue payload consumed by the email worker
//!
//! Jobs arrive pre-rendered: the producer (user service) fills in subject and
//! bodies. Retry state is never stored in the payload; the poll worker keeps
//! it in memory for the lifetime of one delivery.

use crate::models::{Email, EmailPriority};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Why the email is being sent. Used for logging only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum EmailType {
    Welcome,
    Verification,
    PasswordReset,
    PasswordChanged,
    #[default]
    Transactional,
}

/// Email job as serialized on the queue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailJob {
    /// Unique job ID
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,

    #[serde(default)]
    pub email_type: EmailType,

    /// Recipient email address
    pub to_email: String,

    /// Optional recipient name
    #[serde(default)]
    pub to_name: Option<String>,

    pub subject: String,

    #[serde(default)]
    pub body_text: Option<String>,

    #[serde(default)]
    pub body_html: Option<String>,

    #[serde(default)]
    pub priority: EmailPriority,

    /// When the producer enqueued the job
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl EmailJob {
    pub fn new(email_type: EmailType, to_email: impl Into<String>, subject: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            email_type,
            to_email: to_email.into(),
            to_name: None,
            subject: subject.into(),
            body_text: None,
            body_html: None,
            priority: EmailPriority::Normal,
            created_at: Utc::now(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.to_name = Some(name.into());
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.body_text = Some(text.into());
        self
    }

    pub fn with_html(mut self, html: impl Into<String>) -> Self {
        self.body_html = Some(html.into());
        self
    }

    pub fn with_priority(mut self, priority: EmailPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Welcome email sent after registration
    pub fn welcome(to_email: impl Into<String>, name: impl Into<String>, app_name: &str) -> Self {
        let name = name.into();
        Self::new(EmailType::Welcome, to_email, format!("Welcome to {}", app_name))
            .with_text(format!("Hi {},\n\nThanks for joining {}.", name, app_name))
            .with_name(name)
    }

    /// Build the provider-facing email with the given sender
    pub fn to_email(&self, from: &str) -> Email {
        let mut email = Email::new(&self.to_email, &self.subject).with_priority(self.priority);
        email.id = self.id.to_string();
        email.from = Some(from.to_string());
        email.body_text = self.body_text.clone();
        email.body_html = self.body_html.clone();
        email
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_job_creation() {
        let job = EmailJob::new(EmailType::Verification, "test@example.com", "Verify");

        assert_eq!(job.to_email, "test@example.com");
        assert_eq!(job.subject, "Verify");
        assert_eq!(job.email_type, EmailType::Verification);
    }

    #[test]
    fn test_minimal_payload_decodes_with_defaults() {
        let job: EmailJob = serde_json::from_str(
            r#"{"to_email": "a@example.com", "subject": "Hello", "body_text": "Hi"}"#,
        )
        .unwrap();

        assert_eq!(job.email_type, EmailType::Transactional);
        assert_eq!(job.priority, EmailPriority::Normal);
        assert_eq!(job.body_text.as_deref(), Some("Hi"));
    }

    #[test]
    fn test_payload_without_recipient_is_rejected() {
        let result = serde_json::from_str::<EmailJob>(r#"{"subject": "Hello"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_to_email_carries_job_fields() {
        let job = EmailJob::welcome("user@example.com", "Ada", "Zerg").with_priority(EmailPriority::High);
        let email = job.to_email("Zerg <noreply@zerg.dev>");

        assert_eq!(email.id, job.id.to_string());
        assert_eq!(email.to, "user@example.com");
        assert_eq!(email.from.as_deref(), Some("Zerg <noreply@zerg.dev>"));
        assert_eq!(email.priority, EmailPriority::High);
        assert!(email.body_text.unwrap().contains("Ada"));
    }
}
