use std::time::Duration;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::engine::worker::{run_virtual_user, WorkerContext};

/// Pool of concurrently running virtual users.
///
/// The scheduler calls [`set_target`](Self::set_target) as the ramp curve
/// moves; the pool reconciles the live worker count to the target without
/// ever interrupting an in-flight request. Scale-down cancels the most
/// recently spawned workers first.
pub struct VuPool {
    ctx: WorkerContext,
    join_set: JoinSet<()>,
    /// One cancellation token per live worker, in spawn order.
    workers: Vec<CancellationToken>,
    next_worker_id: u32,
}

impl VuPool {
    pub fn new(ctx: WorkerContext) -> Self {
        Self {
            ctx,
            join_set: JoinSet::new(),
            workers: Vec::new(),
            next_worker_id: 0,
        }
    }

    /// Number of workers the pool is currently holding at.
    pub fn target(&self) -> u32 {
        self.workers.len() as u32
    }

    /// Reconcile the live worker count to `target`.
    ///
    /// Spawning is immediate; stopping is cooperative — a cancelled worker
    /// finishes its current iteration before exiting, so the observed task
    /// count converges to the target without overshooting it.
    pub fn set_target(&mut self, target: u32) {
        while (self.workers.len() as u32) < target {
            let token = CancellationToken::new();
            let worker_id = self.next_worker_id;
            self.next_worker_id += 1;
            self.join_set
                .spawn(run_virtual_user(worker_id, self.ctx.clone(), token.clone()));
            self.workers.push(token);
        }
        while (self.workers.len() as u32) > target {
            if let Some(token) = self.workers.pop() {
                token.cancel();
            }
        }
    }

    /// Stop every worker and wait for them to exit.
    ///
    /// Workers get up to `grace` to finish their current iteration; anything
    /// still running after the deadline is aborted. Idempotent — a second
    /// call finds no workers and returns immediately.
    pub async fn stop_all(&mut self, grace: Duration) {
        for token in self.workers.drain(..) {
            token.cancel();
        }

        let drained = tokio::time::timeout(grace, async {
            while self.join_set.join_next().await.is_some() {}
        })
        .await;

        if drained.is_err() {
            tracing::warn!("grace period elapsed, aborting remaining virtual users");
            self.join_set.abort_all();
            while self.join_set.join_next().await.is_some() {}
        }
    }
}
