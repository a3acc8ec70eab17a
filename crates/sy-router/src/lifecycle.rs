//! Lifecycle Manager - periodic background work for the core
//!
//! Handles:
//! - The metrics tick (timeout sweep, load evaluation, snapshot publish)
//! - An optional faster timeout sweep
//! - Mirroring published snapshots into metrics gauges
//! - Graceful shutdown of all of the above

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use sy_common::{CoreConfig, MetricsSnapshot};

use crate::clock::Clock;
use crate::engine::{CoreHandle, Roster};
use crate::directory::WorkerDirectory;
use crate::Result;

/// What a single tick did
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// A fresh snapshot was published
    Completed(MetricsSnapshot),
    /// Another tick was still running
    Skipped,
    /// The worker directory failed; the previous snapshot was republished
    Stale(MetricsSnapshot),
}

impl TickOutcome {
    pub fn snapshot(&self) -> Option<&MetricsSnapshot> {
        match self {
            TickOutcome::Completed(s) | TickOutcome::Stale(s) => Some(s),
            TickOutcome::Skipped => None,
        }
    }
}

/// Clears the in-progress flag when the tick ends, however it ends
struct TickGuard<'a>(&'a AtomicBool);

impl<'a> TickGuard<'a> {
    fn try_acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| TickGuard(flag))
    }
}

impl Drop for TickGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Runs tick phases against the core. Ticks never overlap.
pub(crate) struct TickRunner {
    core: CoreHandle,
    directory: Arc<dyn WorkerDirectory>,
    clock: Arc<dyn Clock>,
    in_progress: AtomicBool,
}

impl TickRunner {
    pub(crate) fn new(
        core: CoreHandle,
        directory: Arc<dyn WorkerDirectory>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            core,
            directory,
            clock,
            in_progress: AtomicBool::new(false),
        }
    }

    /// Sweep, collect, evaluate and publish. Each phase is one atomic core
    /// operation; routing may interleave between phases.
    pub(crate) async fn tick(&self) -> Result<TickOutcome> {
        let Some(_guard) = TickGuard::try_acquire(&self.in_progress) else {
            metrics::counter!("switchyard_ticks_skipped_total").increment(1);
            warn!("Previous metrics tick still running, skipping this one");
            return Ok(TickOutcome::Skipped);
        };

        let timed_out = self.core.sweep().await?;
        if timed_out > 0 {
            debug!(timed_out, "Timeout sweep removed queued work");
        }

        let fetched_at = self.clock.now();
        match self.directory.workers().await {
            Ok(workers) => {
                self.core.evaluate(Roster { workers, fetched_at }).await?;
                let snapshot = self.core.publish().await?;
                debug!(
                    sequence = snapshot.sequence,
                    system_load = snapshot.system_load,
                    "Metrics tick complete"
                );
                Ok(TickOutcome::Completed(snapshot))
            }
            Err(e) => {
                error!(error = %e, "Metrics collection failed, keeping previous snapshot");
                let snapshot = self.core.collection_failed(e.to_string()).await?;
                Ok(TickOutcome::Stale(snapshot))
            }
        }
    }

    pub(crate) async fn sweep(&self) -> Result<usize> {
        self.core.sweep().await
    }
}

/// Configuration for the lifecycle manager
#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    /// Interval for the metrics tick
    pub tick_interval: Duration,
    /// Interval for a dedicated timeout sweep, if faster than the tick
    pub sweep_interval: Option<Duration>,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(5),
            sweep_interval: None,
        }
    }
}

impl From<&CoreConfig> for LifecycleConfig {
    fn from(config: &CoreConfig) -> Self {
        Self {
            tick_interval: config.tick_interval(),
            sweep_interval: config.sweep_interval(),
        }
    }
}

fn export_gauges(snapshot: &MetricsSnapshot) {
    metrics::gauge!("switchyard_active_work", "kind" => "call").set(snapshot.active_calls as f64);
    metrics::gauge!("switchyard_active_work", "kind" => "message").set(snapshot.active_messages as f64);
    metrics::gauge!("switchyard_queued_work", "kind" => "call").set(snapshot.queued_calls as f64);
    metrics::gauge!("switchyard_queued_work", "kind" => "message").set(snapshot.queued_messages as f64);
    metrics::gauge!("switchyard_agent_utilization").set(snapshot.agent_utilization);
    metrics::gauge!("switchyard_system_load").set(snapshot.system_load);
    metrics::gauge!("switchyard_average_response_seconds").set(snapshot.average_response_time_ms / 1000.0);
}

/// Manages the periodic tasks of a running core
pub struct LifecycleManager {
    shutdown_tx: broadcast::Sender<()>,
    tasks: Vec<JoinHandle<()>>,
}

impl LifecycleManager {
    /// Start all lifecycle tasks
    pub(crate) fn start(
        runner: Arc<TickRunner>,
        mut metrics_rx: watch::Receiver<MetricsSnapshot>,
        config: LifecycleConfig,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        let mut tasks = Vec::new();

        // Metrics tick
        {
            let runner = runner.clone();
            let mut shutdown_rx = shutdown_tx.subscribe();
            let interval = config.tick_interval;

            tasks.push(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                // The first tick completes immediately
                ticker.tick().await;

                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            // Spawned so a slow tick is observed as a skip, not a backlog
                            let runner = runner.clone();
                            tokio::spawn(async move {
                                if let Err(e) = runner.tick().await {
                                    error!(error = %e, "Metrics tick failed");
                                }
                            });
                        }
                        _ = shutdown_rx.recv() => {
                            info!("Metrics tick shutting down");
                            break;
                        }
                    }
                }
            }));
        }

        // Dedicated timeout sweep
        if let Some(interval) = config.sweep_interval {
            let runner = runner.clone();
            let mut shutdown_rx = shutdown_tx.subscribe();

            tasks.push(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                ticker.tick().await;

                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            match runner.sweep().await {
                                Ok(0) => {}
                                Ok(timed_out) => debug!(timed_out, "Timeout sweep removed queued work"),
                                Err(e) => {
                                    error!(error = %e, "Timeout sweep failed");
                                }
                            }
                        }
                        _ = shutdown_rx.recv() => {
                            info!("Timeout sweep shutting down");
                            break;
                        }
                    }
                }
            }));
        }

        // Gauge exporter
        {
            let mut shutdown_rx = shutdown_tx.subscribe();

            tasks.push(tokio::spawn(async move {
                loop {
                    tokio::select! {
                        changed = metrics_rx.changed() => {
                            if changed.is_err() {
                                break;
                            }
                            let snapshot = metrics_rx.borrow_and_update().clone();
                            export_gauges(&snapshot);
                        }
                        _ = shutdown_rx.recv() => {
                            debug!("Gauge exporter shutting down");
                            break;
                        }
                    }
                }
            }));
        }

        info!(
            tick_interval_ms = config.tick_interval.as_millis() as u64,
            sweep_interval_ms = config.sweep_interval.map(|d| d.as_millis() as u64),
            "Lifecycle manager started"
        );

        Self { shutdown_tx, tasks }
    }

    /// Signal shutdown to all lifecycle tasks and wait for them to exit
    pub async fn shutdown(self) {
        info!("Lifecycle manager shutting down...");
        let _ = self.shutdown_tx.send(());
        for task in self.tasks {
            let _ = task.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LifecycleConfig::default();
        assert_eq!(config.tick_interval, Duration::from_secs(5));
        assert!(config.sweep_interval.is_none());
    }

    #[test]
    fn test_config_from_core_config() {
        let mut core = CoreConfig::default();
        core.tick_interval_ms = 2_000;
        core.sweep_interval_ms = Some(250);
        let config = LifecycleConfig::from(&core);
        assert_eq!(config.tick_interval, Duration::from_secs(2));
        assert_eq!(config.sweep_interval, Some(Duration::from_millis(250)));
    }

    #[test]
    fn test_tick_guard_is_exclusive_and_released() {
        let flag = AtomicBool::new(false);
        let guard = TickGuard::try_acquire(&flag).unwrap();
        assert!(TickGuard::try_acquire(&flag).is_none());
        drop(guard);
        assert!(TickGuard::try_acquire(&flag).is_some());
    }
}
