use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, RwLock};
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

pub mod pool;
pub mod worker;

use crate::error::StampedeError;
use crate::metrics::MetricsCollector;
use crate::ramp::RampSchedule;
use crate::report::TestRun;
use crate::sampler::build_client;
use crate::scenario::model::Scenario;
use crate::scenario::validation::validate_scenario;
use crate::thresholds::{self, ThresholdSpec};
use pool::VuPool;
use worker::WorkerContext;

// ---------------------------------------------------------------------------
// EngineStatus
// ---------------------------------------------------------------------------

/// Current operational status of the test engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineStatus {
    /// Engine is idle and waiting for a scenario to execute.
    #[default]
    Idle,
    /// Engine is actively running a scenario.
    Running,
    /// Engine has been signalled to stop but has not yet finished.
    Stopping,
    /// Engine has completed execution and produced a summary.
    Completed,
    /// Engine encountered a fatal error during execution.
    Error,
}

impl std::fmt::Display for EngineStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EngineStatus::Idle => "idle",
            EngineStatus::Running => "running",
            EngineStatus::Stopping => "stopping",
            EngineStatus::Completed => "completed",
            EngineStatus::Error => "error",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// An event emitted by the engine during test execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    /// Periodic progress snapshot (~every 500 ms).
    Progress {
        completed_requests: u64,
        total_failures: u64,
        active_vus: u32,
        elapsed_ms: u64,
        current_rps: f64,
        mean_ms: f64,
        p95_ms: u64,
    },

    /// Engine lifecycle status changed.
    StatusChange { status: EngineStatus },

    /// Test run completed; the final summary and verdict are attached.
    Complete { run: Box<TestRun> },
}

/// A handle to a running test that allows callers to inspect status and stop
/// execution.
pub struct EngineHandle {
    /// Cancel token — call `.cancel()` to trigger a graceful stop.
    pub cancel_token: CancellationToken,
    /// Current engine lifecycle state.
    pub status: Arc<RwLock<EngineStatus>>,
    /// The shared collector — callers may read it for live stats.
    pub collector: Arc<RwLock<MetricsCollector>>,
}

/// Configuration passed to [`run_test`].
pub struct EngineConfig {
    /// The scenario to execute.
    pub scenario: Scenario,
    /// Channel sender for engine events.
    pub event_tx: mpsc::Sender<EngineEvent>,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Start executing a scenario asynchronously.
///
/// Configuration problems (invalid scenario, malformed threshold
/// expressions) fail here, before any traffic is generated. On success an
/// [`EngineHandle`] is returned immediately and the engine runs in a
/// background Tokio task.
pub async fn run_test(config: EngineConfig) -> Result<EngineHandle, StampedeError> {
    let errors = validate_scenario(&config.scenario);
    if let Some(first) = errors.into_iter().next() {
        return Err(first);
    }
    let specs = thresholds::parse_all(&config.scenario.thresholds)?;

    let cancel_token = CancellationToken::new();
    let status = Arc::new(RwLock::new(EngineStatus::Running));
    let collector = Arc::new(RwLock::new(MetricsCollector::new()));

    let handle = EngineHandle {
        cancel_token: cancel_token.clone(),
        status: status.clone(),
        collector: collector.clone(),
    };

    let _ = config
        .event_tx
        .send(EngineEvent::StatusChange {
            status: EngineStatus::Running,
        })
        .await;

    tokio::spawn(async move {
        execute_scenario(
            config.scenario,
            specs,
            config.event_tx,
            cancel_token,
            status,
            collector,
        )
        .await;
    });

    Ok(handle)
}

// ---------------------------------------------------------------------------
// Internal implementation
// ---------------------------------------------------------------------------

/// Top-level scenario executor. Drives the ramp, drains samples into the
/// collector, and emits a final [`EngineEvent::Complete`] when done.
async fn execute_scenario(
    scenario: Scenario,
    specs: Vec<ThresholdSpec>,
    event_tx: mpsc::Sender<EngineEvent>,
    cancel_token: CancellationToken,
    status: Arc<RwLock<EngineStatus>>,
    collector: Arc<RwLock<MetricsCollector>>,
) {
    let request_timeout = Duration::from_millis(scenario.request_timeout_ms);

    // Shared client: all virtual users reuse one connection pool.
    let client = match build_client(request_timeout) {
        Ok(c) => Arc::new(c),
        Err(e) => {
            emit_error_status(&event_tx, &status, format!("Failed to build HTTP client: {e}"))
                .await;
            return;
        }
    };

    // Samples funnel through a single channel into the collector — one
    // writer, so concurrent snapshot reads never see torn aggregates.
    let (sample_tx, mut sample_rx) = mpsc::channel(4096);

    let ctx = WorkerContext {
        client,
        target_url: Arc::from(scenario.target_url.as_str()),
        think_time: Duration::from_millis(scenario.think_time_ms),
        sample_tx,
    };

    let schedule = RampSchedule::new(scenario.stages.clone());
    let active_vus = Arc::new(AtomicU32::new(0));

    // Scale-down and shutdown are cooperative; an in-flight request gets up
    // to its own timeout to finish before the pool aborts it.
    let stop_grace = request_timeout + Duration::from_secs(1);

    // The scheduler task owns the pool: it is the only place that mutates
    // the worker set, on a fixed 100 ms tick.
    let cancel_for_scheduler = cancel_token.clone();
    let active_for_scheduler = Arc::clone(&active_vus);
    let status_for_scheduler = Arc::clone(&status);
    let tx_for_scheduler = event_tx.clone();
    let scheduler = tokio::spawn(async move {
        let mut pool = VuPool::new(ctx);
        let start = Instant::now();
        let mut ticker = interval(Duration::from_millis(100));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let target = schedule.target_at(start.elapsed());
                    pool.set_target(target.vus);
                    active_for_scheduler.store(pool.target(), Ordering::Relaxed);
                    if target.complete {
                        break;
                    }
                }
                _ = cancel_for_scheduler.cancelled() => break,
            }
        }

        {
            let mut s = status_for_scheduler.write().await;
            *s = EngineStatus::Stopping;
        }
        let _ = tx_for_scheduler
            .send(EngineEvent::StatusChange {
                status: EngineStatus::Stopping,
            })
            .await;

        pool.stop_all(stop_grace).await;
        active_for_scheduler.store(0, Ordering::Relaxed);
        // Dropping the pool drops the last sample sender, closing the
        // channel once every worker has exited.
    });

    // Progress reporter — emits periodic progress events every 500 ms.
    let collector_for_reporter = Arc::clone(&collector);
    let tx_for_reporter = event_tx.clone();
    let active_for_reporter = Arc::clone(&active_vus);
    let cancel_for_reporter = cancel_token.clone();
    let progress_task = tokio::spawn(async move {
        let mut ticker = interval(Duration::from_millis(500));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let snap = collector_for_reporter.read().await.snapshot();
                    let _ = tx_for_reporter
                        .send(EngineEvent::Progress {
                            completed_requests: snap.total_requests,
                            total_failures: snap.total_failures,
                            active_vus: active_for_reporter.load(Ordering::Relaxed),
                            elapsed_ms: snap.elapsed_ms,
                            current_rps: snap.requests_per_second,
                            mean_ms: snap.mean_ms,
                            p95_ms: snap.p95_ms,
                        })
                        .await;
                }
                _ = cancel_for_reporter.cancelled() => break,
            }
        }
    });

    // Aggregation loop — drains the sample channel until every worker is
    // gone. Running it here keeps workers from ever blocking on a full
    // channel during shutdown.
    while let Some(sample) = sample_rx.recv().await {
        let mut c = collector.write().await;
        c.record(&sample);
    }

    progress_task.abort();
    let _ = scheduler.await;

    // Evaluate thresholds against the final snapshot and build the run.
    let (snapshot, time_series, started_at) = {
        let c = collector.read().await;
        (c.snapshot(), c.time_series(), c.started_at())
    };
    let threshold_report = thresholds::evaluate(&snapshot, &specs);
    let passed = threshold_report.passed;

    let run = TestRun {
        run_id: Uuid::new_v4(),
        scenario_name: scenario.name.clone(),
        target_url: scenario.target_url.clone(),
        stages: scenario.stages.clone(),
        started_at,
        finished_at: Utc::now(),
        metrics: snapshot,
        time_series,
        thresholds: threshold_report,
        passed,
    };

    // Both normal completion and graceful cancellation produce the same
    // status; only setup failures reach Error.
    {
        let mut s = status.write().await;
        *s = EngineStatus::Completed;
    }
    let _ = event_tx
        .send(EngineEvent::StatusChange {
            status: EngineStatus::Completed,
        })
        .await;
    let _ = event_tx
        .send(EngineEvent::Complete { run: Box::new(run) })
        .await;
}

// ---------------------------------------------------------------------------
// Error helpers
// ---------------------------------------------------------------------------

async fn emit_error_status(
    tx: &mpsc::Sender<EngineEvent>,
    status: &Arc<RwLock<EngineStatus>>,
    message: String,
) {
    tracing::error!("Engine error: {message}");
    {
        let mut s = status.write().await;
        *s = EngineStatus::Error;
    }
    let _ = tx
        .send(EngineEvent::StatusChange {
            status: EngineStatus::Error,
        })
        .await;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
