use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

/// A single periodic driver: fires every `interval`, cooperating with a
/// process-wide shutdown signal. Replaces the ad-hoc `setInterval` /
/// manual-awaits mix that would otherwise appear independently in the
/// signal monitor, position monitor, and learning controller.
pub struct Scheduler {
    interval: Duration,
    shutdown: CancellationToken,
}

impl Scheduler {
    pub fn new(interval: Duration, shutdown: CancellationToken) -> Self {
        Self { interval, shutdown }
    }

    /// Runs `on_tick` every `interval` until the shutdown token fires. Each
    /// tick is awaited to completion before the next is considered — the
    /// caller is responsible for fanning work out to a bounded pool inside
    /// `on_tick` if it wants concurrency.
    pub async fn run<F, Fut>(&self, mut on_tick: F)
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = ()>,
    {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    tracing::info!("scheduler shutting down");
                    return;
                }
                _ = ticker.tick() => {
                    on_tick().await;
                }
            }
        }
    }
}

/// Bounded concurrent dispatch: at most `capacity` work items run at once.
/// Acquiring a permit is the suspension point; callers that can't get one
/// immediately simply wait, which is the desired backpressure behavior for
/// C5's batch processing and C2's predictor concurrency cap.
#[derive(Clone)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
}

impl WorkerPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(capacity)),
        }
    }

    /// Runs `f` once a permit is available, releasing it on completion.
    pub async fn run<F, Fut, T>(&self, f: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = T>,
    {
        let _permit = self.permits.acquire().await.expect("worker pool semaphore closed");
        f().await
    }
}
