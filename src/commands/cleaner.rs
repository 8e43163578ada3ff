//! Expiry of old batches
//!
//! [`BatchCleaner::sweep`] expires every batch not modified within `max_age`, whatever its
//! state. [`CleanerScheduler`] runs sweeps on a tokio task: first after `start_delay`, then
//! once per `interval`. Shutting the scheduler down also stops a sweep in progress before
//! its next record.

use crate::artifacts::batch::filters;
use crate::artifacts::batch::filters::Hydration;
use crate::commands::BatchService;
use crate::config::CleanerConfig;
use crate::errors::{BatchError, BatchResult};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Outcome of one sweep
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub expired: Vec<String>,
    pub failed: Vec<String>,
    /// The sweep stopped before visiting every expired batch
    pub cancelled: bool,
}

pub struct BatchCleaner {
    service: Arc<BatchService>,
    max_age: Duration,
}

impl BatchCleaner {
    pub fn new(service: Arc<BatchService>, max_age: Duration) -> Self {
        BatchCleaner { service, max_age }
    }

    /// Expire every batch last modified more than `max_age` ago
    ///
    /// A batch that cannot be expired is logged and left for the next sweep.
    pub fn sweep(&self, cancelled: &AtomicBool) -> BatchResult<SweepReport> {
        let max_age = chrono::Duration::from_std(self.max_age)
            .map_err(|err| BatchError::Config(format!("invalid max age: {err}")))?;
        let now = self.service.clock().now();
        let cutoff = now
            .checked_sub_signed(max_age)
            .ok_or_else(|| BatchError::Config(format!("max age {max_age} reaches before {now}")))?;

        let expired = self
            .service
            .store()
            .find(Hydration::Detail, &filters::expired_before(cutoff))?;
        debug!(%cutoff, count = expired.len(), "sweeping expired batches");

        let mut report = SweepReport::default();
        for summary in expired {
            if cancelled.load(Ordering::SeqCst) {
                info!("batch sweep cancelled");
                report.cancelled = true;
                break;
            }
            let Some(mut batch) = summary.batch else {
                continue;
            };

            match self.service.expire(&mut batch) {
                Ok(()) => {
                    info!(batch = %batch.id, "expired batch");
                    report.expired.push(batch.id);
                }
                Err(err) => {
                    warn!(batch = %batch.id, error = %err, "could not expire batch");
                    report.failed.push(batch.id);
                }
            }
        }

        Ok(report)
    }
}

pub struct CleanerScheduler {
    cleaner: Arc<BatchCleaner>,
    start_delay: Duration,
    interval: Option<Duration>,
}

impl CleanerScheduler {
    pub fn new(cleaner: Arc<BatchCleaner>, config: &CleanerConfig) -> Self {
        CleanerScheduler {
            cleaner,
            start_delay: config.start_delay,
            interval: config.interval,
        }
    }

    /// Spawn the sweeping task on the current runtime; `None` when sweeping is disabled
    pub fn start(self) -> Option<CleanerHandle> {
        let Some(interval) = self.interval else {
            info!("batch cleaner disabled");
            return None;
        };
        if interval.is_zero() {
            warn!("batch cleaner interval is zero, not scheduling");
            return None;
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let cancelled = Arc::new(AtomicBool::new(false));
        let sweeps = Arc::new(AtomicUsize::new(0));

        let task = tokio::spawn(Self::run(
            self.cleaner,
            self.start_delay,
            interval,
            shutdown_rx,
            cancelled.clone(),
            sweeps.clone(),
        ));
        info!(start_delay = ?self.start_delay, ?interval, "batch cleaner scheduled");

        Some(CleanerHandle {
            shutdown: shutdown_tx,
            cancelled,
            sweeps,
            task,
        })
    }

    async fn run(
        cleaner: Arc<BatchCleaner>,
        start_delay: Duration,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
        cancelled: Arc<AtomicBool>,
        sweeps: Arc<AtomicUsize>,
    ) {
        tokio::select! {
            _ = tokio::time::sleep(start_delay) => {}
            _ = shutdown.changed() => return,
        }

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.changed() => return,
            }

            let sweep = {
                let cleaner = cleaner.clone();
                let cancelled = cancelled.clone();
                tokio::task::spawn_blocking(move || cleaner.sweep(&cancelled))
            };

            match sweep.await {
                Ok(Ok(report)) => info!(
                    expired = report.expired.len(),
                    failed = report.failed.len(),
                    "batch sweep finished"
                ),
                Ok(Err(err)) => error!(error = %err, "batch sweep failed"),
                Err(err) => error!(error = %err, "batch sweep panicked"),
            }
            sweeps.fetch_add(1, Ordering::SeqCst);

            if cancelled.load(Ordering::SeqCst) {
                return;
            }
        }
    }
}

/// Control over a running scheduler
pub struct CleanerHandle {
    shutdown: watch::Sender<bool>,
    cancelled: Arc<AtomicBool>,
    sweeps: Arc<AtomicUsize>,
    task: JoinHandle<()>,
}

impl CleanerHandle {
    /// Sweeps finished so far
    pub fn completed_sweeps(&self) -> usize {
        self.sweeps.load(Ordering::SeqCst)
    }

    /// Stop scheduling, cancel a running sweep and wait for the task to end
    pub async fn shutdown(self) {
        self.cancelled.store(true, Ordering::SeqCst);
        let _ = self.shutdown.send(true);
        if let Err(err) = self.task.await {
            error!(error = %err, "batch cleaner task failed");
        }
    }
}
