//! End-to-end poll cycles against the in-memory transport

use async_trait::async_trait;
use queue_worker::{
    CycleError, DeadLetterEntry, DeadLetterReason, HandlerError, InMemoryTransport, MessageHandler,
    PollWorker, TransportOp, WorkerConfig,
};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const SOURCE: &str = "emails";
const DLQ: &str = "emails-dlq";

#[derive(Debug, Deserialize)]
struct Job {
    id: u32,
}

/// Records every invocation; ids in `failing` always fail transiently
#[derive(Default)]
struct ScriptedHandler {
    failing: HashSet<u32>,
    permanent: HashSet<u32>,
    calls: Mutex<HashMap<u32, u32>>,
    order: Mutex<Vec<u32>>,
}

impl ScriptedHandler {
    fn failing(ids: &[u32]) -> Self {
        Self {
            failing: ids.iter().copied().collect(),
            ..Self::default()
        }
    }

    fn calls_for(&self, id: u32) -> u32 {
        self.calls.lock().unwrap().get(&id).copied().unwrap_or(0)
    }

    fn total_calls(&self) -> u32 {
        self.calls.lock().unwrap().values().sum()
    }

    fn order(&self) -> Vec<u32> {
        self.order.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessageHandler<Job> for ScriptedHandler {
    async fn handle(&self, job: &Job) -> Result<(), HandlerError> {
        *self.calls.lock().unwrap().entry(job.id).or_default() += 1;
        self.order.lock().unwrap().push(job.id);

        if self.permanent.contains(&job.id) {
            return Err(HandlerError::permanent(format!("job {} rejected", job.id)));
        }
        if self.failing.contains(&job.id) {
            return Err(HandlerError::transient(format!("job {} failed", job.id)));
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "ScriptedHandler"
    }
}

fn config() -> WorkerConfig {
    WorkerConfig::new(SOURCE, DLQ).with_backend(queue_worker::QueueBackend::Memory)
}

fn worker(transport: &InMemoryTransport, handler: Arc<ScriptedHandler>) -> PollWorker<Job> {
    PollWorker::new(config(), Arc::new(transport.clone()), handler)
}

async fn enqueue(transport: &InMemoryTransport, ids: &[u32]) {
    for id in ids {
        transport.push(SOURCE, format!(r#"{{"id": {id}}}"#)).await;
    }
}

fn dlq_entries(bodies: &[String]) -> Vec<DeadLetterEntry> {
    bodies
        .iter()
        .map(|body| serde_json::from_str(body).unwrap())
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_all_messages_succeed_and_are_deleted() {
    let transport = InMemoryTransport::new();
    enqueue(&transport, &[1, 2, 3]).await;
    let handler = Arc::new(ScriptedHandler::default());

    let report = worker(&transport, handler.clone()).run_cycle().await.unwrap();

    assert_eq!(report.received, 3);
    assert_eq!(report.succeeded, 3);
    assert_eq!(handler.order(), vec![1, 2, 3]);
    assert_eq!(transport.deleted(SOURCE).await.len(), 3);
    assert_eq!(transport.in_flight_count(SOURCE).await, 0);
    assert_eq!(transport.call_count(TransportOp::Send, DLQ).await, 0);
}

#[tokio::test(start_paused = true)]
async fn test_failing_message_does_not_block_siblings() {
    let transport = InMemoryTransport::new();
    enqueue(&transport, &[1, 2, 3]).await;
    let handler = Arc::new(ScriptedHandler::failing(&[2]));

    let report = worker(&transport, handler.clone()).run_cycle().await.unwrap();

    assert_eq!(report.succeeded, 2);
    assert_eq!(report.dead_lettered, 1);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].kind, "exhausted");

    assert_eq!(handler.calls_for(1), 1);
    assert_eq!(handler.calls_for(2), 3);
    assert_eq!(handler.calls_for(3), 1);
    assert_eq!(handler.order(), vec![1, 2, 2, 2, 3]);

    let entries = dlq_entries(&transport.messages(DLQ).await);
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].original_body, r#"{"id": 2}"#);
    assert_eq!(entries[0].reason, DeadLetterReason::Exhausted);
    assert_eq!(entries[0].attempts, 3);
    assert_eq!(entries[0].error, "Handler error: job 2 failed");

    assert_eq!(transport.deleted(SOURCE).await.len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_retry_delay_is_applied_between_attempts() {
    let transport = InMemoryTransport::new();
    enqueue(&transport, &[7]).await;
    let handler = Arc::new(ScriptedHandler::failing(&[7]));

    let started = tokio::time::Instant::now();
    worker(&transport, handler).run_cycle().await.unwrap();

    // Two retries with the default 9s delay
    assert!(started.elapsed() >= Duration::from_millis(18_000));
}

#[tokio::test(start_paused = true)]
async fn test_configured_retry_limit_bounds_attempts() {
    let transport = InMemoryTransport::new();
    enqueue(&transport, &[1]).await;
    let handler = Arc::new(ScriptedHandler::failing(&[1]));

    let worker = PollWorker::new(
        config().with_max_retries(4).with_retry_delay(Duration::from_millis(10)),
        Arc::new(transport.clone()),
        handler.clone(),
    );
    worker.run_cycle().await.unwrap();

    assert_eq!(handler.calls_for(1), 5);
}

#[tokio::test]
async fn test_empty_queue_makes_no_delete_or_send() {
    let transport = InMemoryTransport::new();
    let handler = Arc::new(ScriptedHandler::default());

    let report = worker(&transport, handler.clone()).run_cycle().await.unwrap();

    assert_eq!(report.received, 0);
    assert_eq!(handler.total_calls(), 0);
    assert_eq!(transport.call_count(TransportOp::Receive, SOURCE).await, 1);
    assert_eq!(transport.call_count(TransportOp::Delete, SOURCE).await, 0);
    assert_eq!(transport.call_count(TransportOp::Send, DLQ).await, 0);
}

#[tokio::test]
async fn test_receive_failure_aborts_cycle() {
    let transport = InMemoryTransport::new();
    enqueue(&transport, &[1]).await;
    transport.fail_on(TransportOp::Receive, SOURCE, "network unreachable").await;
    let handler = Arc::new(ScriptedHandler::default());

    let err = worker(&transport, handler.clone()).run_cycle().await.unwrap_err();

    let CycleError::Receive(source) = err;
    assert_eq!(source.operation, TransportOp::Receive);
    assert_eq!(transport.call_count(TransportOp::Receive, SOURCE).await, 1);
    assert_eq!(handler.total_calls(), 0);
    assert_eq!(transport.messages(SOURCE).await.len(), 1);
}

#[tokio::test]
async fn test_malformed_payload_is_dead_lettered_without_handler_call() {
    let transport = InMemoryTransport::new();
    transport.push(SOURCE, "{\"id\": ").await;
    enqueue(&transport, &[2]).await;
    let handler = Arc::new(ScriptedHandler::default());

    let report = worker(&transport, handler.clone()).run_cycle().await.unwrap();

    assert_eq!(report.succeeded, 1);
    assert_eq!(report.failures[0].kind, "malformed");
    assert_eq!(handler.order(), vec![2]);

    let entries = dlq_entries(&transport.messages(DLQ).await);
    assert_eq!(entries[0].reason, DeadLetterReason::Malformed);
    assert_eq!(entries[0].attempts, 0);
    assert_eq!(transport.deleted(SOURCE).await.len(), 2);
}

#[tokio::test]
async fn test_permanent_failure_is_dead_lettered_immediately() {
    let transport = InMemoryTransport::new();
    enqueue(&transport, &[9]).await;
    let handler = Arc::new(ScriptedHandler {
        permanent: [9].into_iter().collect(),
        ..ScriptedHandler::default()
    });

    let report = worker(&transport, handler.clone()).run_cycle().await.unwrap();

    assert_eq!(report.dead_lettered, 1);
    assert_eq!(report.failures[0].kind, "rejected");
    assert_eq!(handler.calls_for(9), 1);
    let entries = dlq_entries(&transport.messages(DLQ).await);
    assert_eq!(entries[0].reason, DeadLetterReason::Permanent);
}

#[tokio::test(start_paused = true)]
async fn test_dead_letter_send_failure_keeps_source_message() {
    let transport = InMemoryTransport::new();
    enqueue(&transport, &[1, 2]).await;
    transport.fail_on(TransportOp::Send, DLQ, "queue does not exist").await;
    let handler = Arc::new(ScriptedHandler::failing(&[1]));

    let report = worker(&transport, handler.clone()).run_cycle().await.unwrap();

    assert_eq!(report.succeeded, 1);
    assert_eq!(report.dead_lettered, 0);
    assert_eq!(report.failures[0].kind, "dead_letter_relocation");
    assert!(!report.failures[0].dead_lettered);

    // Only message 2 was deleted; message 1 stays for redelivery
    assert_eq!(transport.deleted(SOURCE).await.len(), 1);
    assert_eq!(transport.in_flight_count(SOURCE).await, 1);
    assert!(transport.messages(DLQ).await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_redelivered_message_after_relocation_failure() {
    let transport = InMemoryTransport::new();
    enqueue(&transport, &[1]).await;
    transport.fail_on(TransportOp::Send, DLQ, "throttled").await;
    let handler = Arc::new(ScriptedHandler::failing(&[1]));
    let worker = worker(&transport, handler.clone());

    worker.run_cycle().await.unwrap();
    assert_eq!(transport.redeliver(SOURCE).await, 1);
    transport.clear_failure(TransportOp::Send, DLQ).await;

    // Redelivery starts a fresh retry sequence
    let report = worker.run_cycle().await.unwrap();
    assert_eq!(report.dead_lettered, 1);
    assert_eq!(handler.calls_for(1), 6);
    assert_eq!(transport.messages(DLQ).await.len(), 1);
    assert_eq!(transport.in_flight_count(SOURCE).await, 0);
}

#[tokio::test(start_paused = true)]
async fn test_repeated_relocation_only_duplicates_entry() {
    let transport = InMemoryTransport::new();
    enqueue(&transport, &[1]).await;
    transport.fail_on(TransportOp::Delete, SOURCE, "receipt handle expired").await;
    let handler = Arc::new(ScriptedHandler::failing(&[1]));
    let worker = worker(&transport, handler);

    let report = worker.run_cycle().await.unwrap();
    assert_eq!(report.failures[0].kind, "delete");
    // The DLQ copy exists, so the report counts the message as dead-lettered
    assert!(report.failures[0].dead_lettered);
    assert_eq!(report.dead_lettered, 1);
    assert_eq!(transport.messages(DLQ).await.len(), 1);

    transport.clear_failure(TransportOp::Delete, SOURCE).await;
    transport.redeliver(SOURCE).await;

    let report = worker.run_cycle().await.unwrap();
    assert_eq!(report.dead_lettered, 1);
    assert!(report.failures.iter().all(|f| f.kind == "exhausted"));
    assert_eq!(transport.messages(DLQ).await.len(), 2);
    assert_eq!(transport.in_flight_count(SOURCE).await, 0);
}

#[tokio::test(start_paused = true)]
async fn test_overlapping_cycles_are_skipped() {
    let transport = InMemoryTransport::new();
    enqueue(&transport, &[1]).await;
    let handler = Arc::new(ScriptedHandler::failing(&[1]));
    let worker = Arc::new(worker(&transport, handler.clone()));

    let first = tokio::spawn({
        let worker = worker.clone();
        async move { worker.run_cycle().await }
    });

    // Let the first cycle reach its retry delay
    tokio::time::sleep(Duration::from_millis(1)).await;
    let second = worker.run_cycle().await.unwrap();
    assert!(second.skipped);

    let first = first.await.unwrap().unwrap();
    assert!(!first.skipped);
    assert_eq!(handler.calls_for(1), 3);
    assert_eq!(transport.call_count(TransportOp::Receive, SOURCE).await, 1);
}

#[tokio::test]
async fn test_status_tracks_cycles() {
    let transport = InMemoryTransport::new();
    enqueue(&transport, &[1]).await;
    let worker = worker(&transport, Arc::new(ScriptedHandler::default()));

    worker.run_cycle().await.unwrap();
    let status = worker.status().snapshot().await;
    assert_eq!(status.cycles_completed, 1);
    assert!(status.is_ready());
    assert_eq!(status.last_report.map(|r| r.succeeded), Some(1));
}
