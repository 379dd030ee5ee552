//! The scheduler: one timed worker per resolved stream.
//!
//! Workers publish on a fixed wall-clock cadence with the first publish at
//! `t0 + interval` and drift-free deadlines (`deadline += interval`). A
//! single cancellation token is observed at every suspension point; the
//! duration timer, user interrupt, and fail-fast all cancel through it.

use crate::config::expand::{resolve_streams, ResolvedStream};
use crate::config::model::Plan;
use crate::error::{ConfigError, ErrorKind, PayloadError};
use crate::mqtt::{BrokerConnector, Publisher};
use crate::runtime::reporter::{Reporter, StatusSink, StatusTx};
use crate::runtime::state::{RunResult, RunSnapshot, StreamState, StreamStatus};
use crate::sim::payloads::PayloadBuilder;
use crate::sim::rng::SimRng;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Time allowed for workers to drain after cancellation before they are
/// aborted and publishers are closed anyway.
pub const SHUTDOWN_BUDGET: Duration = Duration::from_secs(5);

/// Errors that abort the run before any worker starts.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A payload builder could not be constructed from its spec
    #[error("Stream '{stream}': {source}")]
    Payload {
        stream: String,
        #[source]
        source: PayloadError,
    },
}

/// Run-scoped options supplied by the CLI.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub fail_fast: bool,
    pub duration: Option<f64>,
    pub seed: Option<u64>,
    pub shutdown_budget: Duration,
}

impl Default for EngineOptions {
    fn default() -> Self {
        EngineOptions {
            fail_fast: false,
            duration: None,
            seed: None,
            shutdown_budget: SHUTDOWN_BUDGET,
        }
    }
}

struct PreparedStream {
    stream: ResolvedStream,
    builder: PayloadBuilder,
    status: StreamStatus,
}

/// Run the plan to completion (duration expiry, cancellation, or fail-fast).
pub async fn run(
    plan: Plan,
    opts: EngineOptions,
    sink: Box<dyn StatusSink>,
    connector: &dyn BrokerConnector,
    cancel: CancellationToken,
) -> Result<RunResult, EngineError> {
    let started = Instant::now();
    let prepared = prepare_streams(&plan, opts.seed)?;

    let initial_rows: Vec<StreamStatus> = prepared.iter().map(|p| p.status.clone()).collect();
    tracing::info!(
        brokers = plan.brokers.len(),
        streams = initial_rows.len(),
        fail_fast = opts.fail_fast,
        "starting run"
    );

    let (reporter, tx) = Reporter::new(sink, RunSnapshot::new(Utc::now(), initial_rows));
    let reporter_handle = tokio::spawn(reporter.run());

    let failed_fast = Arc::new(AtomicBool::new(false));
    let (publishers, broker_errors) = connect_brokers(&plan, &prepared, connector).await;
    if opts.fail_fast && !broker_errors.is_empty() {
        failed_fast.store(true, Ordering::SeqCst);
        cancel.cancel();
    }

    let mut handles = Vec::new();
    for PreparedStream {
        stream,
        builder,
        mut status,
    } in prepared
    {
        if let Some(message) = broker_errors.get(&stream.broker) {
            status.state = StreamState::Errored;
            status.error_count += 1;
            status.last_error = message.clone();
            status.last_error_kind = "transport-connect".to_string();
            let _ = tx.send(status);
            continue;
        }
        let publisher = publishers
            .get(&stream.broker)
            .expect("connected broker missing publisher")
            .clone();
        status.state = StreamState::Running;
        let _ = tx.send(status.clone());
        handles.push(tokio::spawn(stream_worker(
            stream,
            builder,
            status,
            publisher,
            cancel.clone(),
            opts.fail_fast,
            failed_fast.clone(),
            tx.clone(),
        )));
    }

    if let Some(seconds) = opts.duration {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs_f64(seconds)) => {
                    tracing::info!(duration = seconds, "duration reached, cancelling");
                    cancel.cancel();
                }
                _ = cancel.cancelled() => {}
            }
        });
    }

    drain_workers(handles, &cancel, opts.shutdown_budget).await;
    drop(tx);

    let (mut sink, snapshot) = reporter_handle.await.expect("reporter task panicked");

    for (name, publisher) in &publishers {
        if let Err(err) = publisher.close().await {
            tracing::warn!(broker = %name, error = %err, "error closing publisher");
        }
    }

    let failed_fast = failed_fast.load(Ordering::SeqCst);
    let exit_code = if failed_fast {
        1
    } else if snapshot.total_publishes > 0 {
        0
    } else {
        1
    };
    let result = RunResult {
        exit_code,
        total_publishes: snapshot.total_publishes,
        total_errors: snapshot.total_errors,
        failed_fast,
        duration: started.elapsed(),
    };
    tracing::info!(
        publishes = result.total_publishes,
        errors = result.total_errors,
        failed_fast = result.failed_fast,
        "run finished"
    );
    sink.finish(&snapshot, &result);
    Ok(result)
}

/// Expand the plan and build one payload builder per resolved stream.
fn prepare_streams(plan: &Plan, seed: Option<u64>) -> Result<Vec<PreparedStream>, EngineError> {
    let resolved = resolve_streams(plan)?;
    let sim_rng = SimRng::new(seed);
    let mut prepared = Vec::with_capacity(resolved.len());
    for (index, stream) in resolved.into_iter().enumerate() {
        let rng = sim_rng.derive(index as u64);
        let builder = PayloadBuilder::from_spec(&stream.payload, &plan.config_dir, rng).map_err(
            |source| EngineError::Payload {
                stream: stream.id.clone(),
                source,
            },
        )?;
        let status = StreamStatus::new(&stream.id, &stream.topic, stream.interval);
        prepared.push(PreparedStream {
            stream,
            builder,
            status,
        });
    }
    Ok(prepared)
}

/// Connect one publisher per referenced broker. A connect failure poisons
/// only that broker's streams; the rest of the run proceeds.
async fn connect_brokers(
    plan: &Plan,
    prepared: &[PreparedStream],
    connector: &dyn BrokerConnector,
) -> (
    HashMap<String, Arc<dyn Publisher>>,
    HashMap<String, String>,
) {
    let mut publishers = HashMap::new();
    let mut errors = HashMap::new();
    for broker in &plan.brokers {
        if !prepared.iter().any(|p| p.stream.broker == broker.name) {
            continue;
        }
        match connector.connect(broker).await {
            Ok(publisher) => {
                publishers.insert(broker.name.clone(), publisher);
            }
            Err(err) => {
                tracing::error!(broker = %broker.name, error = %err, "broker connect failed");
                errors.insert(broker.name.clone(), err.to_string());
            }
        }
    }
    (publishers, errors)
}

enum Outcome {
    Published { preview: String, bytes: usize },
    Failed { kind: &'static str, message: String },
    Cancelled,
}

#[allow(clippy::too_many_arguments)]
async fn stream_worker(
    stream: ResolvedStream,
    mut builder: PayloadBuilder,
    mut status: StreamStatus,
    publisher: Arc<dyn Publisher>,
    cancel: CancellationToken,
    fail_fast: bool,
    failed_fast: Arc<AtomicBool>,
    tx: StatusTx,
) {
    let interval = Duration::from_secs_f64(stream.interval);
    let mut deadline = Instant::now() + interval;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep_until(deadline) => {}
        }
        deadline += interval;

        match attempt_publish(&mut builder, &stream, publisher.as_ref(), &cancel).await {
            Outcome::Published { preview, bytes } => {
                status.state = StreamState::Running;
                status.publish_count += 1;
                status.last_publish = Some(Utc::now());
                status.last_preview = preview;
                status.last_bytes = bytes;
                status.last_error.clear();
                status.last_error_kind.clear();
                tracing::debug!(
                    stream = %stream.id,
                    topic = %stream.topic,
                    count = status.publish_count,
                    bytes,
                    "published"
                );
                let _ = tx.send(status.clone());
            }
            Outcome::Failed { kind, message } => {
                status.state = StreamState::Errored;
                status.error_count += 1;
                status.last_error = message.clone();
                status.last_error_kind = kind.to_string();
                tracing::error!(
                    stream = %stream.id,
                    topic = %stream.topic,
                    kind,
                    error = %message,
                    "publish failed"
                );
                let _ = tx.send(status.clone());
                if fail_fast {
                    failed_fast.store(true, Ordering::SeqCst);
                    cancel.cancel();
                    break;
                }
            }
            Outcome::Cancelled => break,
        }
    }
    status.state = StreamState::Stopped;
    let _ = tx.send(status);
}

async fn attempt_publish(
    builder: &mut PayloadBuilder,
    stream: &ResolvedStream,
    publisher: &dyn Publisher,
    cancel: &CancellationToken,
) -> Outcome {
    let built = match builder.build() {
        Ok(built) => built,
        Err(err) => {
            return Outcome::Failed {
                kind: err.kind(),
                message: err.to_string(),
            }
        }
    };
    let bytes = built.bytes.len();
    tokio::select! {
        _ = cancel.cancelled() => Outcome::Cancelled,
        result = publisher.publish(&stream.topic, &built.bytes, stream.qos, stream.retain) => {
            match result {
                Ok(()) => Outcome::Published { preview: built.preview, bytes },
                Err(err) => Outcome::Failed { kind: err.kind(), message: err.to_string() },
            }
        }
    }
}

/// Wait for every worker; after cancellation, allow `budget` before aborting
/// whatever is left.
async fn drain_workers(
    handles: Vec<tokio::task::JoinHandle<()>>,
    cancel: &CancellationToken,
    budget: Duration,
) {
    let abort_handles: Vec<_> = handles.iter().map(|h| h.abort_handle()).collect();
    let drain = async move {
        for handle in handles {
            let _ = handle.await;
        }
    };
    tokio::pin!(drain);
    let overrun = async {
        cancel.cancelled().await;
        tokio::time::sleep(budget).await;
    };
    tokio::select! {
        _ = &mut drain => {}
        _ = overrun => {
            tracing::warn!("shutdown budget exceeded, aborting remaining workers");
            for handle in abort_handles {
                handle.abort();
            }
            drain.await;
        }
    }
}
