//! Scheduler loop
//!
//! Periodically recomputes channel eligibility and feeds listings one at a
//! time into the delivery pipeline, pacing dispatches to respect upstream
//! rate limits. The pause flag is checked before every dispatch, not only at
//! tick boundaries, so an operator can stop the flow mid-tick.

use super::pipeline::{DeliveryPipeline, DispatchOutcome};
use crate::config::{MatchingConfig, SchedulerConfig};
use crate::error::Result;
use crate::matching;
use crate::store::RecordStore;
use crate::transport::MediaTransport;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// Scheduler statistics
#[derive(Debug, Clone, Default)]
pub struct SchedulerStats {
    pub ticks: u64,
    pub dispatched: u64,
    pub skipped_in_flight: u64,
    pub failures: u64,
}

/// Cloneable control surface for the running loop
#[derive(Clone)]
pub struct SchedulerHandle {
    running: Arc<AtomicBool>,
    paused: Arc<AtomicBool>,
}

impl SchedulerHandle {
    pub fn pause(&self) {
        if !self.paused.swap(true, Ordering::SeqCst) {
            info!("Auto-posting paused");
        }
    }

    pub fn resume(&self) {
        if self.paused.swap(false, Ordering::SeqCst) {
            info!("Auto-posting resumed");
        }
    }

    pub fn stop(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            info!("Scheduler stopping");
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }
}

/// Periodic driver of the delivery pipeline
pub struct Scheduler<S, T> {
    store: Arc<S>,
    pipeline: Arc<DeliveryPipeline<S, T>>,
    config: SchedulerConfig,
    matching: MatchingConfig,
    running: Arc<AtomicBool>,
    paused: Arc<AtomicBool>,
    stats: Arc<RwLock<SchedulerStats>>,
}

impl<S: RecordStore, T: MediaTransport> Scheduler<S, T> {
    pub fn new(
        store: Arc<S>,
        pipeline: Arc<DeliveryPipeline<S, T>>,
        config: SchedulerConfig,
        matching: MatchingConfig,
    ) -> Self {
        Self {
            store,
            pipeline,
            config,
            matching,
            running: Arc::new(AtomicBool::new(false)),
            paused: Arc::new(AtomicBool::new(false)),
            stats: Arc::new(RwLock::new(SchedulerStats::default())),
        }
    }

    pub fn handle(&self) -> SchedulerHandle {
        SchedulerHandle {
            running: self.running.clone(),
            paused: self.paused.clone(),
        }
    }

    pub async fn stats(&self) -> SchedulerStats {
        self.stats.read().await.clone()
    }

    /// Start the dispatch loop as a background task
    pub fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Scheduler already running");
            return;
        }

        info!(
            "Starting scheduler (tick: {}s, pacing: {}s)",
            self.config.tick_secs, self.config.pacing_secs
        );

        let scheduler = self.clone();
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(Duration::from_secs(scheduler.config.tick_secs));

            while scheduler.running.load(Ordering::SeqCst) {
                interval.tick().await;

                if scheduler.paused.load(Ordering::SeqCst) {
                    debug!("Scheduler paused, skipping tick");
                    continue;
                }

                if let Err(e) = scheduler.run_tick().await {
                    error!("Scheduler tick failed: {}", e);
                }
            }

            info!("Scheduler stopped");
        });
    }

    /// One pass over the pending work: recompute eligibility from entity
    /// state, dispatch each pending listing once, pace between dispatches.
    pub async fn run_tick(&self) -> Result<()> {
        {
            let mut stats = self.stats.write().await;
            stats.ticks += 1;
        }

        let channels = self.store.channels().await?;
        let listings = self.store.listings().await?;
        let pending = matching::pending_by_channel(&channels, &listings, &self.matching);
        if pending.is_empty() {
            debug!("No pending listings to process");
            return Ok(());
        }

        // A listing eligible for several channels is dispatched once; the
        // pipeline fans out to all its channels itself
        let mut seen = HashSet::new();
        for (channel, group) in pending {
            info!(
                "{} pending listings for channel {} ({})",
                group.len(),
                channel.chat_id,
                channel.category
            );

            for listing in group {
                if !seen.insert(listing.id) {
                    continue;
                }

                if !self.wait_while_paused().await {
                    info!("Auto-posting stopped mid-tick");
                    return Ok(());
                }

                match self.pipeline.dispatch(listing.id).await {
                    Ok(report) => {
                        let mut stats = self.stats.write().await;
                        match report.outcome {
                            DispatchOutcome::AlreadyInFlight => stats.skipped_in_flight += 1,
                            _ => stats.dispatched += 1,
                        }
                    }
                    Err(e) => {
                        let mut stats = self.stats.write().await;
                        stats.failures += 1;
                        error!("Error processing listing {}: {}", listing.id, e);
                    }
                }

                sleep(Duration::from_secs(self.config.pacing_secs)).await;
            }
        }

        Ok(())
    }

    /// Block while paused; returns false when the scheduler was stopped
    async fn wait_while_paused(&self) -> bool {
        loop {
            if !self.running.load(Ordering::SeqCst) {
                return false;
            }
            if !self.paused.load(Ordering::SeqCst) {
                return true;
            }
            sleep(Duration::from_secs(1)).await;
        }
    }
}
