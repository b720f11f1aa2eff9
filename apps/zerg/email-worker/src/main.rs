//! Email Worker Service - Entry Point
//!
//! Scheduled worker that drains the email job queue.

#[tokio::main]
async fn main() -> eyre::Result<()> {
    zerg_email_worker::run().await
}
