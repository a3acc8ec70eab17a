//! Orchestrator - public entry point to the routing core
//!
//! Owns the lifecycle (uninitialized, running, draining, stopped) and
//! translates API calls into core commands. Worker lookups happen here,
//! outside the core, so a slow directory never holds up other operations.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{error, info, warn};

use sy_common::{
    Alert, AnalyticsReport, CoreConfig, CoreEvent, MetricsSnapshot, RouteOutcome, Timeframe,
    WorkItem, WorkKind, WorkRequest,
};

use crate::clock::{Clock, SystemClock};
use crate::engine::{self, CoreHandle, CoreState, Roster};
use crate::directory::WorkerDirectory;
use crate::error::CoreError;
use crate::lifecycle::{LifecycleConfig, LifecycleManager, TickOutcome, TickRunner};
use crate::notification::{spawn_dispatcher, DispatchPolicy, NotificationChannel};
use crate::Result;

const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(50);
const FINAL_TICK_ATTEMPTS: u32 = 40;

/// Externally visible lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrchestratorState {
    Uninitialized,
    Initializing,
    Running,
    Draining,
    Stopped,
}

struct Runtime {
    config: CoreConfig,
    core: CoreHandle,
    ticks: Arc<TickRunner>,
    events: broadcast::Sender<CoreEvent>,
    metrics_rx: watch::Receiver<MetricsSnapshot>,
    /// Taken on shutdown
    lifecycle: Mutex<Option<LifecycleManager>>,
}

enum State {
    Uninitialized,
    Initializing,
    Running(Arc<Runtime>),
    Draining(Arc<Runtime>),
    Stopped(Arc<Runtime>),
}

pub struct Orchestrator {
    directory: Arc<dyn WorkerDirectory>,
    notifier: Arc<dyn NotificationChannel>,
    clock: Arc<dyn Clock>,
    state: Mutex<State>,
}

impl Orchestrator {
    pub fn new(directory: Arc<dyn WorkerDirectory>, notifier: Arc<dyn NotificationChannel>) -> Self {
        Self::with_clock(directory, notifier, Arc::new(SystemClock))
    }

    pub fn with_clock(
        directory: Arc<dyn WorkerDirectory>,
        notifier: Arc<dyn NotificationChannel>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            directory,
            notifier,
            clock,
            state: Mutex::new(State::Uninitialized),
        }
    }

    pub fn state(&self) -> OrchestratorState {
        match &*self.state.lock() {
            State::Uninitialized => OrchestratorState::Uninitialized,
            State::Initializing => OrchestratorState::Initializing,
            State::Running(_) => OrchestratorState::Running,
            State::Draining(_) => OrchestratorState::Draining,
            State::Stopped(_) => OrchestratorState::Stopped,
        }
    }

    /// Start the core. Succeeds at most once per instance; a configuration
    /// that fails validation leaves the instance uninitialized.
    pub async fn initialize(&self, config: CoreConfig) -> Result<()> {
        {
            let mut state = self.state.lock();
            if !matches!(*state, State::Uninitialized) {
                return Err(CoreError::AlreadyInitialized);
            }
            *state = State::Initializing;
        }

        if let Err(e) = config.validate() {
            error!(error = %e, "Rejecting core configuration");
            *self.state.lock() = State::Uninitialized;
            return Err(e.into());
        }

        let (events, _) = broadcast::channel(config.event_buffer);
        let (metrics_tx, metrics_rx) = watch::channel(MetricsSnapshot::empty(self.clock.utc()));
        let (dispatch_tx, dispatch_rx) = mpsc::channel(config.alerts.dispatch_buffer);

        // Ends once the core task drops its sender
        spawn_dispatcher(
            self.notifier.clone(),
            dispatch_rx,
            DispatchPolicy::from_config(&config.alerts),
        );

        let core_state = CoreState::new(
            &config,
            self.clock.clone(),
            events.clone(),
            metrics_tx,
            Some(dispatch_tx),
        );
        let (core, _core_task) = engine::spawn(core_state);
        let ticks = Arc::new(TickRunner::new(
            core.clone(),
            self.directory.clone(),
            self.clock.clone(),
        ));
        let lifecycle = LifecycleManager::start(
            ticks.clone(),
            metrics_rx.clone(),
            LifecycleConfig::from(&config),
        );

        info!(
            call_capacity = config.queues.call.capacity,
            message_capacity = config.queues.message.capacity,
            selection = ?config.selection,
            tick_interval_ms = config.tick_interval_ms,
            "Routing core initialized"
        );

        *self.state.lock() = State::Running(Arc::new(Runtime {
            config,
            core,
            ticks,
            events,
            metrics_rx,
            lifecycle: Mutex::new(Some(lifecycle)),
        }));
        Ok(())
    }

    /// Runtime that accepts new work
    fn accepting(&self) -> Result<Arc<Runtime>> {
        match &*self.state.lock() {
            State::Running(rt) => Ok(rt.clone()),
            State::Uninitialized | State::Initializing => Err(CoreError::NotInitialized),
            State::Draining(_) | State::Stopped(_) => Err(CoreError::ShuttingDown),
        }
    }

    /// Runtime that still processes in-flight work
    fn live(&self) -> Result<Arc<Runtime>> {
        match &*self.state.lock() {
            State::Running(rt) | State::Draining(rt) => Ok(rt.clone()),
            State::Uninitialized | State::Initializing => Err(CoreError::NotInitialized),
            State::Stopped(_) => Err(CoreError::ShuttingDown),
        }
    }

    /// Any started runtime, including a stopped one
    fn started(&self) -> Result<Arc<Runtime>> {
        match &*self.state.lock() {
            State::Running(rt) | State::Draining(rt) | State::Stopped(rt) => Ok(rt.clone()),
            State::Uninitialized | State::Initializing => Err(CoreError::NotInitialized),
        }
    }

    pub async fn route(&self, kind: WorkKind, request: WorkRequest) -> Result<RouteOutcome> {
        let runtime = self.accepting()?;
        let arrived = self.clock.now();
        let arrived_utc = self.clock.utc();

        let roster = match self.directory.workers().await {
            Ok(workers) => Some(Roster {
                workers,
                fetched_at: arrived,
            }),
            Err(e) => {
                warn!(error = %e, work_item_id = %request.id, "Worker lookup failed, routing to queue");
                None
            }
        };

        // The core re-checks: shutdown may have started during the lookup
        let item = WorkItem::new(kind, request, arrived, arrived_utc);
        runtime.core.route(item, roster).await
    }

    pub async fn route_call(&self, request: WorkRequest) -> Result<RouteOutcome> {
        self.route(WorkKind::Call, request).await
    }

    pub async fn route_message(&self, request: WorkRequest) -> Result<RouteOutcome> {
        self.route(WorkKind::Message, request).await
    }

    /// Report that the worker finished an assigned item.
    pub async fn complete(&self, work_item_id: &str) -> Result<()> {
        let runtime = self.live()?;
        runtime.core.complete(work_item_id.to_string()).await
    }

    /// Latest published snapshot. Never blocks on the core.
    pub fn get_metrics(&self) -> Result<MetricsSnapshot> {
        let runtime = self.started()?;
        let snapshot = runtime.metrics_rx.borrow().clone();
        Ok(snapshot)
    }

    pub async fn get_analytics(&self, timeframe: Timeframe) -> Result<AnalyticsReport> {
        self.started()?.core.analytics(timeframe).await
    }

    /// Currently active alerts in first-seen order
    pub async fn get_alerts(&self) -> Result<Vec<Alert>> {
        self.started()?.core.alerts().await
    }

    pub fn subscribe(&self) -> Result<broadcast::Receiver<CoreEvent>> {
        Ok(self.started()?.events.subscribe())
    }

    /// Run one metrics tick now. Skipped if a tick is already running.
    pub async fn tick(&self) -> Result<TickOutcome> {
        self.live()?.ticks.tick().await
    }

    /// Stop accepting work, give in-flight work the grace period, fail what
    /// is left and publish a final snapshot.
    pub async fn shutdown(&self) -> Result<MetricsSnapshot> {
        let runtime = {
            let mut state = self.state.lock();
            let runtime = match &*state {
                State::Running(rt) => rt.clone(),
                State::Uninitialized | State::Initializing => return Err(CoreError::NotInitialized),
                State::Draining(_) | State::Stopped(_) => return Err(CoreError::ShuttingDown),
            };
            *state = State::Draining(runtime.clone());
            runtime
        };

        let drained = Self::drain(&runtime).await;
        let lifecycle = runtime.lifecycle.lock().take();
        if let Some(lifecycle) = lifecycle {
            lifecycle.shutdown().await;
        }

        let result = match drained {
            Ok(()) => Self::final_tick(&runtime).await,
            Err(e) => Err(e),
        };
        *self.state.lock() = State::Stopped(runtime);
        match &result {
            Ok(snapshot) => info!(sequence = snapshot.sequence, "Routing core stopped"),
            Err(e) => error!(error = %e, "Routing core stopped without a final snapshot"),
        }
        result
    }

    /// Close admission, wait out the grace period, then fail what is left.
    async fn drain(runtime: &Runtime) -> Result<()> {
        runtime.core.stop_accepting().await?;

        let grace = runtime.config.shutdown_grace();
        info!(grace_ms = grace.as_millis() as u64, "Draining routing core");

        let deadline = tokio::time::Instant::now() + grace;
        loop {
            let pending = runtime.core.pending().await?;
            if pending == 0 {
                break;
            }
            let now = tokio::time::Instant::now();
            if now >= deadline {
                break;
            }
            tokio::time::sleep(DRAIN_POLL_INTERVAL.min(deadline - now)).await;
        }

        let failed = runtime.core.fail_remaining("shutdown grace period elapsed").await?;
        if failed > 0 {
            warn!(failed, "Force-failed work still in flight after grace period");
        }
        Ok(())
    }

    async fn final_tick(runtime: &Runtime) -> Result<MetricsSnapshot> {
        for _ in 0..FINAL_TICK_ATTEMPTS {
            match runtime.ticks.tick().await? {
                TickOutcome::Completed(s) | TickOutcome::Stale(s) => return Ok(s),
                TickOutcome::Skipped => tokio::time::sleep(DRAIN_POLL_INTERVAL).await,
            }
        }
        warn!("Timer tick still running at shutdown, publishing directly");
        runtime.core.publish().await
    }
}
