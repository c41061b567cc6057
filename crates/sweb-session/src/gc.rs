//! Background expiration sweep.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::GcConfig;
use crate::provider::MemoryProvider;

/// Handle to a running sweep task.
///
/// Dropping the handle cancels the task without waiting for it; call
/// [`shutdown`](Self::shutdown) to stop it and wait.
#[derive(Debug)]
pub struct GcHandle {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl GcHandle {
    /// Stop the task and wait until it has exited.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take()
            && let Err(e) = task.await
        {
            warn!(error = %e, "Session GC task ended abnormally");
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Drop for GcHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn ticker(period: Duration) -> Interval {
    // First tick one period from now, not immediately
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

/// Spawn the sweep loop for `provider` on the current runtime.
pub(crate) fn spawn(provider: Arc<MemoryProvider>, config: GcConfig) -> GcHandle {
    let sweep_every = config.interval.unwrap_or_else(|| provider.timeout());
    let flush_every = config.flush_interval.filter(|_| provider.is_persistent());
    let cancel = CancellationToken::new();
    let token = cancel.clone();

    let task = tokio::spawn(async move {
        let mut sweep = ticker(sweep_every);
        let mut flush = flush_every.map(ticker);
        info!(interval = ?sweep_every, flush_interval = ?flush_every, "Session GC started");

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = sweep.tick() => {
                    let removed = provider.remove_expired().await;
                    if removed > 0 {
                        debug!(removed, "Session sweep finished");
                    }
                }
                _ = async {
                    match flush.as_mut() {
                        Some(flush) => { flush.tick().await; }
                        None => std::future::pending::<()>().await,
                    }
                } => {
                    provider.persist_all().await;
                }
            }
        }

        info!("Session GC stopped");
    });

    GcHandle {
        cancel,
        task: Some(task),
    }
}
