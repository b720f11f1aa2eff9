//! Email Worker Service
//!
//! Drains the email job queue on a schedule and delivers each job.
//!
//! ## Architecture
//!
//! ```text
//! Source queue (SQS / Redis stream)
//!   ↓ (cron tick, single-flight)
//! PollWorker<EmailJob>
//!   ↓ (bounded retries)
//! EmailProcessor → EmailProvider (SES/SMTP)
//!   ↓ on exhaustion / bad payload
//! Dead letter queue
//! ```
//!
//! ## Commands
//!
//! - `run-once`: one cycle, report printed as JSON
//! - `schedule`: cron-driven cycles with a health server and graceful shutdown

mod cli;

pub use cli::{Cli, Commands};

use axum::Router;
use clap::Parser;
use core_config::aws::AwsConfig;
use core_config::redis::RedisConfig;
use core_config::tracing::{init_tracing, install_color_eyre};
use core_config::{env_optional, env_parse, Environment, FromEnv};
use email::{
    EmailJob, EmailProcessor, EmailProvider, MockEmailProvider, SenderConfig, SesProvider,
    SmtpConfig, SmtpProvider,
};
use eyre::{Result, WrapErr};
use queue_worker::{
    health_router, init_metrics, run_scheduled, HealthState, InMemoryTransport, PollWorker,
    QueueBackend, QueueTransport, RedisStreamTransport, SqsTransport, WorkerConfig, WorkerStatus,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Start the health HTTP server
///
/// - Liveness: `/health`
/// - Readiness: `/ready`
/// - Prometheus metrics: `/metrics`
/// - Last cycle report: `/status`
async fn start_health_server(health_state: HealthState, port: u16) -> Result<()> {
    let app: Router = health_router(health_state);

    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr)
        .await
        .wrap_err_with(|| format!("Failed to bind health server to {}", addr))?;

    info!(port = %port, "Health server listening");

    axum::serve(listener, app)
        .await
        .wrap_err("Health server failed")?;

    Ok(())
}

/// Connect the transport selected by `QUEUE_BACKEND`
async fn build_transport(config: &WorkerConfig) -> Result<Arc<dyn QueueTransport>> {
    match config.backend {
        QueueBackend::Sqs => {
            let aws = AwsConfig::from_env().wrap_err("Failed to load AWS configuration")?;
            info!(region = ?aws.region, endpoint = ?aws.endpoint_url, "Using SQS transport");
            Ok(Arc::new(SqsTransport::from_config(&aws).await))
        }
        QueueBackend::Redis => {
            let redis_config =
                RedisConfig::from_env().wrap_err("Failed to load Redis configuration")?;

            info!("Connecting to Redis...");
            let client = redis::Client::open(redis_config.uri.as_str())
                .wrap_err("Invalid Redis URI")?;
            // Responses must outlast the BLOCK window of each receive
            let manager_config = RedisStreamTransport::connection_config(config.wait_time);
            let manager = redis::aio::ConnectionManager::new_with_config(client, manager_config)
                .await
                .wrap_err("Failed to connect to Redis")?;
            info!(
                consumer_group = %redis_config.consumer_group,
                consumer_id = %redis_config.consumer_id,
                "Connected to Redis successfully"
            );

            Ok(Arc::new(RedisStreamTransport::new(
                manager,
                redis_config.consumer_group,
                redis_config.consumer_id,
            )))
        }
        QueueBackend::Memory => {
            warn!("Using in-memory transport; messages do not survive a restart");
            Ok(Arc::new(InMemoryTransport::new()))
        }
    }
}

/// Select the email provider for the environment
///
/// Production sends through SES. Development uses SMTP (Mailpit/MailHog on
/// localhost when `SMTP_HOST` is unset), or the in-memory mock when
/// `EMAIL_PROVIDER=mock`.
async fn build_provider(
    environment: &Environment,
    sender: &SenderConfig,
) -> Result<Arc<dyn EmailProvider>> {
    if env_optional("EMAIL_PROVIDER").is_some_and(|p| p.eq_ignore_ascii_case("mock")) {
        warn!("Using mock email provider; nothing will be delivered");
        return Ok(Arc::new(MockEmailProvider::new()));
    }

    match environment {
        Environment::Production => {
            info!("Using SES provider for production");
            let aws = AwsConfig::from_env().wrap_err("Failed to load AWS configuration")?;
            let provider =
                SesProvider::from_config(&aws, sender.from_email.clone(), sender.from_name.clone())
                    .await;
            Ok(Arc::new(provider))
        }
        Environment::Development => {
            let config = match SmtpConfig::from_env() {
                Ok(config) => config,
                Err(e) => {
                    info!(reason = %e, "SMTP not configured, using local Mailpit/MailHog");
                    SmtpConfig::local()
                }
            };
            info!(host = %config.host, port = config.port, "Using SMTP provider for development");
            let provider = SmtpProvider::new(config)
                .map_err(|e| eyre::eyre!("SMTP configuration error: {}", e))?;
            Ok(Arc::new(provider))
        }
    }
}

/// Run the email worker
///
/// 1. Sets up color-eyre, structured logging and Prometheus metrics
/// 2. Loads the worker configuration and connects the queue transport
/// 3. Selects the email provider for the environment
/// 4. Runs one cycle or the cron scheduler, depending on the subcommand
///
/// # Errors
///
/// Returns an error if configuration is invalid, the transport or provider
/// cannot be built, a `run-once` cycle aborts, or the scheduler fails.
pub async fn run() -> Result<()> {
    install_color_eyre();

    let environment = Environment::from_env();
    init_tracing(&environment);
    init_metrics();

    let cli = Cli::parse();

    let app_name = env!("CARGO_PKG_NAME");
    let app_version = env!("CARGO_PKG_VERSION");
    info!(name = %app_name, version = %app_version, "Starting email worker service");
    info!("Environment: {:?}", environment);

    let config = WorkerConfig::from_env().wrap_err("Failed to load worker configuration")?;
    info!(
        backend = ?config.backend,
        source = %config.source_queue,
        dead_letter_queue = %config.dead_letter_queue,
        max_retries = config.max_retries,
        backoff = ?config.backoff,
        "Worker configuration loaded"
    );

    let transport = build_transport(&config).await?;

    let sender = SenderConfig::from_env().wrap_err("Failed to load sender configuration")?;
    let provider = build_provider(&environment, &sender).await?;
    let processor = EmailProcessor::new(provider, sender);

    let status = WorkerStatus::new();
    let cron = match &cli.command {
        Commands::Schedule { cron: Some(cron) } => cron.clone(),
        _ => config.cron.clone(),
    };
    let worker = Arc::new(
        PollWorker::<EmailJob>::new(config, transport, Arc::new(processor)).with_status(status.clone()),
    );

    match cli.command {
        Commands::RunOnce => {
            let report = worker.run_cycle().await.wrap_err("Poll cycle failed")?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Schedule { .. } => {
            // Checks EMAIL_WORKER_HEALTH_PORT first, then HEALTH_PORT
            let health_port: u16 = match env_parse("EMAIL_WORKER_HEALTH_PORT", 0u16)? {
                0 => env_parse("HEALTH_PORT", 8081)?,
                port => port,
            };

            let health_state = HealthState::new(app_name, app_version, status);
            tokio::spawn(async move {
                if let Err(e) = start_health_server(health_state, health_port).await {
                    error!(error = %e, "Health server failed");
                }
            });

            let (shutdown_tx, shutdown_rx) = watch::channel(false);
            tokio::spawn(async move {
                if let Err(e) = shutdown_signal().await {
                    error!("Error waiting for shutdown signal: {}", e);
                }
                let _ = shutdown_tx.send(true);
            });

            run_scheduled(worker, &cron, shutdown_rx)
                .await
                .wrap_err("Scheduler failed")?;
        }
    }

    info!("Email worker service stopped");
    Ok(())
}

/// Wait for a shutdown signal (SIGINT or SIGTERM)
async fn shutdown_signal() -> Result<()> {
    let ctrl_c = signal::ctrl_c();

    #[cfg(unix)]
    let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate())
        .wrap_err("Failed to install SIGTERM handler")?;

    #[cfg(unix)]
    let terminate = terminate.recv();

    #[cfg(not(unix))]
    let terminate = std::future::pending::<Option<()>>();

    tokio::select! {
        result = ctrl_c => {
            result.wrap_err("Failed to listen for Ctrl+C")?;
            info!("Received Ctrl+C, initiating shutdown...");
        },
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        },
    }

    Ok(())
}
