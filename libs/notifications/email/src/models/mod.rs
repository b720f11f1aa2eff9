use crate::error::{EmailError, EmailResult};
use serde::{Deserialize, Serialize};

/// Email priority levels
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum EmailPriority {
    /// Urgent emails (password reset, OTP)
    High,
    /// Normal transactional emails
    #[default]
    Normal,
    /// Bulk/marketing emails
    Low,
}

/// Email message ready to hand to a provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Email {
    /// Unique identifier for the email
    pub id: String,
    /// Recipient email address
    pub to: String,
    #[serde(default)]
    pub cc: Vec<String>,
    #[serde(default)]
    pub bcc: Vec<String>,
    pub subject: String,
    pub body_text: Option<String>,
    pub body_html: Option<String>,
    /// Sender, formatted as `Name <address>`
    pub from: Option<String>,
    pub reply_to: Option<String>,
    #[serde(default)]
    pub priority: EmailPriority,
}

impl Email {
    /// Create a new email with required fields
    pub fn new(to: impl Into<String>, subject: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            to: to.into(),
            cc: Vec::new(),
            bcc: Vec::new(),
            subject: subject.into(),
            body_text: None,
            body_html: None,
            from: None,
            reply_to: None,
            priority: EmailPriority::Normal,
        }
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

    /// Reject emails no provider could ever deliver
    pub fn validate(&self) -> EmailResult<()> {
        validate_address(&self.to)?;
        for address in self.cc.iter().chain(&self.bcc) {
            validate_address(address)?;
        }
        if self.body_text.is_none() && self.body_html.is_none() {
            return Err(EmailError::InvalidMessage(
                "Email must have either text or HTML body".to_string(),
            ));
        }
        Ok(())
    }
}

/// Minimal `local@domain` shape check
fn validate_address(address: &str) -> EmailResult<()> {
    let address = address.trim();
    match address.split_once('@') {
        Some((local, domain))
            if !local.is_empty()
                && !domain.is_empty()
                && !domain.contains('@')
                && !address.contains(char::is_whitespace) =>
        {
            Ok(())
        }
        _ => Err(EmailError::InvalidRecipient(format!(
            "malformed address '{}'",
            address
        ))),
    }
}
