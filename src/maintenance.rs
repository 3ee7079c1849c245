//! Cancellable periodic background jobs.

use std::time::Duration;
use tokio::{
    task::JoinHandle,
    time::{interval_at, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Smallest period accepted; a zero period would make `interval` panic.
const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Cap for periods and deadlines, roughly thirty years.
pub const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// The instant `after` from now. Durations too large to represent saturate
/// at [`FAR_FUTURE`] instead of overflowing.
pub fn deadline_after(after: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(after).unwrap_or_else(|| now + FAR_FUTURE)
}

/// Handle to a job that runs every `period` until cancelled.
#[derive(Debug)]
pub struct PeriodicTask {
    name: &'static str,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl PeriodicTask {
    /// Spawns `job` on the tokio runtime. The first run happens one full
    /// `period` after spawning. Nothing is locked while waiting for a tick.
    pub fn spawn<F>(
        name: &'static str,
        period: Duration,
        cancel: CancellationToken,
        mut job: F,
    ) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        let period = period.clamp(MIN_PERIOD, FAR_FUTURE);
        let token = cancel.clone();

        let handle = tokio::spawn(async move {
            info!("⏱️ Starting {} (every {})", name, humantime::format_duration(period));
            let mut ticker = interval_at(deadline_after(period), period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        debug!("{} tick", name);
                        job();
                    }
                }
            }

            info!("🛑 {} stopped", name);
        });

        Self { name, cancel, handle }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Stops scheduling new runs. A run already in progress completes.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Cancels the task and waits for it to exit.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.handle.await {
            warn!("{} ended abnormally: {}", self.name, e);
        }
    }
}
