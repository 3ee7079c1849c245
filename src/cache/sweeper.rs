use std::{sync::Arc, time::Duration};
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::ExpiringCache;
use crate::maintenance::PeriodicTask;

/// Background task that evicts expired entries whether or not anyone reads
/// them again. Without it, cold keys would only leave memory on a read.
#[derive(Debug)]
pub struct InvalidationSweeper {
    task: PeriodicTask,
}

impl InvalidationSweeper {
    /// Starts sweeping `cache` every `interval` until `cancel` fires.
    pub fn spawn(
        cache: Arc<ExpiringCache>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> Self {
        let task = PeriodicTask::spawn("cache invalidation", interval, cancel, move || {
            let removed = cache.purge_expired();
            if removed > 0 {
                info!(
                    "🧹 Cache cleanup: removed {} expired entries ({} left)",
                    removed,
                    cache.len()
                );
            }
        });

        Self { task }
    }

    pub fn cancel(&self) {
        self.task.cancel();
    }

    pub async fn shutdown(self) {
        self.task.shutdown().await;
    }
}
