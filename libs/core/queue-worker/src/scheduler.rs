//! Cron trigger for poll cycles
//!
//! Each tick runs one cycle. Cycle errors are logged and never stop the
//! scheduler; overlapping ticks are skipped by the worker itself.

use crate::worker::PollWorker;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{watch, RwLock};
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};
use tracing::{debug, error, info};

#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("Scheduler error: {0}")]
    Scheduler(#[from] JobSchedulerError),
}

/// Ticks hold a read guard for their whole run; shutdown takes the write
/// guard, so it waits for every tick that got in first and turns away the
/// rest.
#[derive(Clone, Default)]
struct TickGate {
    closed: Arc<RwLock<bool>>,
}

impl TickGate {
    /// Run `tick` unless the gate is closed. Returns whether it ran.
    async fn run<F>(&self, tick: F) -> bool
    where
        F: Future<Output = ()>,
    {
        let closed = self.closed.read().await;
        if *closed {
            return false;
        }
        tick.await;
        true
    }

    /// Close the gate once all running ticks have finished
    async fn close(&self) {
        *self.closed.write().await = true;
    }
}

/// Run `worker` on `cron_expr` until `shutdown` flips to `true`.
///
/// A cycle that is already running when shutdown is signalled is allowed to
/// finish; no new cycles are started afterwards.
pub async fn run_scheduled<P>(
    worker: Arc<PollWorker<P>>,
    cron_expr: &str,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), SchedulerError>
where
    P: Send + Sync + 'static,
{
    info!(cron = cron_expr, "Starting scheduled polling");

    let mut sched = JobScheduler::new().await?;
    let gate = TickGate::default();

    let job_gate = gate.clone();
    let job = Job::new_async(cron_expr, move |_uuid, _l| {
        let worker = worker.clone();
        let gate = job_gate.clone();

        Box::pin(async move {
            let ran = gate
                .run(async {
                    match worker.run_cycle().await {
                        Ok(report) if report.skipped => {}
                        Ok(report) => {
                            info!(
                                received = report.received,
                                succeeded = report.succeeded,
                                dead_lettered = report.dead_lettered,
                                failed = report.failures.len(),
                                "Scheduled poll cycle complete"
                            );
                        }
                        Err(e) => {
                            error!(error = %e, "Scheduled poll cycle failed");
                        }
                    }
                })
                .await;

            if !ran {
                debug!("Tick after shutdown, not polling");
            }
        })
    })?;

    sched.add(job).await?;
    sched.start().await?;
    info!("Scheduler started, waiting for ticks...");

    while !*shutdown.borrow() {
        if shutdown.changed().await.is_err() {
            break;
        }
    }

    info!("Shutdown signal received, stopping scheduler");
    sched.shutdown().await?;

    // Wait for a cycle that was mid-flight when the signal arrived
    gate.close().await;

    info!("Scheduler stopped");
    Ok(())
}
