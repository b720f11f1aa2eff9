//! Email delivery for the queue worker
//!
//! ## Components
//!
//! - **Payload**: `EmailJob`, the JSON body placed on the queue
//! - **Handler**: `EmailProcessor`, a `queue_worker::MessageHandler<EmailJob>`
//! - **Models**: `Email`, `EmailPriority`
//! - **Providers**: AWS SES, SMTP (lettre) and an in-memory mock
//!
//! ## Usage
//!
//! ```ignore
//! use email::{EmailJob, EmailProcessor, SenderConfig, SesProvider};
//! use queue_worker::{PollWorker, WorkerConfig};
//!
//! let provider = SesProvider::from_config(&aws, "noreply@example.com", "Notifications").await;
//! let processor = EmailProcessor::new(provider, SenderConfig::from_env()?);
//! let worker = PollWorker::<EmailJob>::new(config, transport, Arc::new(processor));
//! worker.run_cycle().await?;
//! ```

pub mod error;
pub mod job;
pub mod models;
pub mod processor;
pub mod provider;

// Re-export main types
pub use error::{EmailError, EmailResult};
pub use job::{EmailJob, EmailType};
pub use models::{Email, EmailPriority};
pub use processor::{EmailProcessor, SenderConfig};
pub use provider::{
    EmailProvider, MockEmailProvider, SendResult, SesProvider, SmtpConfig, SmtpProvider,
};
