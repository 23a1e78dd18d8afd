use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::sampler::{probe, Sample};

/// Everything a virtual user needs for its request loop.
#[derive(Clone)]
pub struct WorkerContext {
    pub client: Arc<reqwest::Client>,
    pub target_url: Arc<str>,
    pub think_time: Duration,
    pub sample_tx: mpsc::Sender<Sample>,
}

/// Run a single virtual user: probe, report the sample, pause, repeat.
///
/// The function returns when `cancel` is triggered or the sample channel
/// closes. Cancellation is cooperative — the token is checked between
/// iterations and during the think-time pause, never mid-request.
pub async fn run_virtual_user(worker_id: u32, ctx: WorkerContext, cancel: CancellationToken) {
    tracing::debug!(worker_id, "virtual user started");

    loop {
        if cancel.is_cancelled() {
            break;
        }

        let sample = probe(&ctx.client, &ctx.target_url).await;

        // If the channel is closed (receiver dropped) just stop.
        if ctx.sample_tx.send(sample).await.is_err() {
            break;
        }

        tokio::select! {
            _ = sleep(ctx.think_time) => {}
            _ = cancel.cancelled() => break,
        }
    }

    tracing::debug!(worker_id, "virtual user stopped");
}
