//! Core task - the single owner of queue, router, load and analytics state
//!
//! All state-mutating operations arrive as [`Command`]s on one mpsc channel
//! and are applied one at a time, so each operation is atomic with respect
//! to every other. Callers get their answer back on a oneshot.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use serde_json::json;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use sy_common::{
    Alert, AlertType, AnalyticsReport, CoreConfig, CoreEvent, FailedStage, LoadSignal,
    MetricsSnapshot, RouteOutcome, Timeframe, WorkItem, WorkKind, WorkerInfo,
};

use crate::alert::AlertManager;
use crate::analytics::Analytics;
use crate::clock::Clock;
use crate::error::CoreError;
use crate::load::LoadMonitor;
use crate::queue::{QueueStore, TimedOut};
use crate::router::Router;
use crate::Result;

const COMMAND_BUFFER: usize = 1024;

type Reply<T> = oneshot::Sender<T>;

/// Worker roster tagged with when the lookup started
#[derive(Debug, Clone)]
pub(crate) struct Roster {
    pub(crate) workers: Vec<WorkerInfo>,
    pub(crate) fetched_at: Instant,
}

pub(crate) enum Command {
    Route {
        item: WorkItem,
        /// `None` when the directory lookup failed
        roster: Option<Roster>,
        reply: Reply<Result<RouteOutcome>>,
    },
    Complete {
        work_item_id: String,
        reply: Reply<Result<()>>,
    },
    Sweep {
        reply: Reply<usize>,
    },
    Evaluate {
        roster: Roster,
        reply: Reply<()>,
    },
    Publish {
        reply: Reply<MetricsSnapshot>,
    },
    CollectionFailed {
        reason: String,
        reply: Reply<MetricsSnapshot>,
    },
    Analytics {
        timeframe: Timeframe,
        reply: Reply<AnalyticsReport>,
    },
    Alerts {
        reply: Reply<Vec<Alert>>,
    },
    Pending {
        reply: Reply<usize>,
    },
    FailRemaining {
        reason: String,
        reply: Reply<usize>,
    },
    StopAccepting {
        reply: Reply<()>,
    },
}

pub(crate) struct CoreState {
    queues: QueueStore,
    router: Router,
    load: LoadMonitor,
    analytics: Analytics,
    alerts: AlertManager,
    clock: Arc<dyn Clock>,
    events: broadcast::Sender<CoreEvent>,
    metrics_tx: watch::Sender<MetricsSnapshot>,
    /// Ids currently queued or assigned
    in_flight: HashSet<String>,
    /// Freshest roster the directory returned
    roster: Vec<WorkerInfo>,
    roster_fetched_at: Option<Instant>,
    /// Cleared once shutdown starts
    accepting: bool,
    sequence: u64,
}

impl CoreState {
    pub(crate) fn new(
        config: &CoreConfig,
        clock: Arc<dyn Clock>,
        events: broadcast::Sender<CoreEvent>,
        metrics_tx: watch::Sender<MetricsSnapshot>,
        dispatch_tx: Option<mpsc::Sender<Alert>>,
    ) -> Self {
        Self {
            queues: QueueStore::new(&config.queues),
            router: Router::new(config.selection),
            load: LoadMonitor::new(config.load.clone()),
            analytics: Analytics::new(config.analytics.clone()),
            alerts: AlertManager::new(config.alerts.dedupe_window(), dispatch_tx),
            clock,
            events,
            metrics_tx,
            in_flight: HashSet::new(),
            roster: Vec::new(),
            roster_fetched_at: None,
            accepting: true,
            sequence: 0,
        }
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Route { item, roster, reply } => {
                let _ = reply.send(self.route(item, roster));
            }
            Command::Complete { work_item_id, reply } => {
                let _ = reply.send(self.complete(&work_item_id));
            }
            Command::Sweep { reply } => {
                let _ = reply.send(self.sweep());
            }
            Command::Evaluate { roster, reply } => {
                self.evaluate(roster);
                let _ = reply.send(());
            }
            Command::Publish { reply } => {
                let _ = reply.send(self.publish());
            }
            Command::CollectionFailed { reason, reply } => {
                let _ = reply.send(self.collection_failed(reason));
            }
            Command::Analytics { timeframe, reply } => {
                let report = self
                    .analytics
                    .get_analytics(timeframe, self.clock.now(), self.clock.utc());
                let _ = reply.send(report);
            }
            Command::Alerts { reply } => {
                let _ = reply.send(self.alerts.get_active_alerts());
            }
            Command::Pending { reply } => {
                let _ = reply.send(self.in_flight.len());
            }
            Command::FailRemaining { reason, reply } => {
                let _ = reply.send(self.fail_remaining(&reason));
            }
            Command::StopAccepting { reply } => {
                self.stop_accepting();
                let _ = reply.send(());
            }
        }
    }

    fn emit(&mut self, event: CoreEvent) {
        self.analytics.record_event(&event, self.clock.now());
        record_event_metrics(&event);
        // Nobody listening is fine
        let _ = self.events.send(event);
    }

    fn raise(&mut self, alert_type: AlertType, dedupe_key: String, payload: serde_json::Value) {
        let triggered = self.alerts.trigger_alert(
            alert_type,
            dedupe_key,
            payload,
            self.clock.now(),
            self.clock.utc(),
        );
        if triggered.is_new {
            self.emit(CoreEvent::AlertTriggered {
                alert: triggered.alert,
            });
        }
    }

    /// Lookups can finish out of order; an older roster never replaces a newer one.
    fn install_roster(&mut self, roster: Roster) {
        match self.roster_fetched_at {
            Some(current) if roster.fetched_at < current => {
                debug!("Ignoring roster older than the one already installed");
            }
            _ => {
                self.roster = roster.workers;
                self.roster_fetched_at = Some(roster.fetched_at);
            }
        }
    }

    fn stop_accepting(&mut self) {
        if self.accepting {
            info!(pending = self.in_flight.len(), "Core no longer accepting new work");
            self.accepting = false;
        }
    }

    fn route(&mut self, item: WorkItem, roster: Option<Roster>) -> Result<RouteOutcome> {
        if !self.accepting {
            warn!(work_item_id = %item.id, "Rejecting work item, core is shutting down");
            return Err(CoreError::ShuttingDown);
        }
        if self.in_flight.contains(&item.id) {
            warn!(work_item_id = %item.id, "Rejecting duplicate work item");
            return Err(CoreError::duplicate(item.id));
        }

        let id = item.id.clone();
        let kind = item.kind;
        let now_utc = self.clock.utc();
        let outcome = match roster {
            Some(roster) => {
                self.install_roster(roster);
                // Queued work takes freed capacity before a new arrival
                self.dispatch_queued();
                self.router.route(item, &self.roster, &mut self.queues, now_utc)
            }
            None => self.router.route(item, &[], &mut self.queues, now_utc),
        };

        match &outcome {
            RouteOutcome::Routed(decision) => {
                self.in_flight.insert(id);
                self.emit(CoreEvent::Routed {
                    kind,
                    decision: decision.clone(),
                    from_queue: false,
                    waited_ms: 0,
                });
            }
            RouteOutcome::Queued { depth } => {
                debug!(work_item_id = %id, kind = %kind, depth, "Work item queued");
                self.in_flight.insert(id.clone());
                self.emit(CoreEvent::Queued {
                    work_item_id: id,
                    kind,
                    depth: *depth,
                });
            }
            RouteOutcome::Rejected(_) => {
                let capacity = self.queues.capacity(kind);
                warn!(work_item_id = %id, kind = %kind, capacity, "Queue full, rejecting work item");
                self.emit(CoreEvent::Overflow {
                    work_item_id: id.clone(),
                    kind,
                    capacity,
                });
                self.raise(
                    AlertType::QueueOverflow,
                    format!("queue:{}", kind),
                    json!({ "workItemId": id, "kind": kind, "capacity": capacity }),
                );
            }
        }
        Ok(outcome)
    }

    fn complete(&mut self, work_item_id: &str) -> Result<()> {
        let Some(assignment) = self.router.release(work_item_id) else {
            return Err(CoreError::unknown(work_item_id));
        };
        self.in_flight.remove(work_item_id);

        let response = assignment.item.waited(self.clock.now());
        self.emit(CoreEvent::Completed {
            work_item_id: assignment.item.id,
            kind: assignment.item.kind,
            worker_id: assignment.decision.worker_id,
            response_time_ms: response.as_millis() as u64,
        });

        self.dispatch_queued();
        Ok(())
    }

    fn dispatch_queued(&mut self) {
        let now = self.clock.now();
        let dispatched = self
            .router
            .dispatch_queued(&mut self.queues, &self.roster, self.clock.utc());
        for d in dispatched {
            let waited = now.saturating_duration_since(d.enqueued_at);
            self.emit(CoreEvent::Routed {
                kind: d.kind,
                decision: d.decision,
                from_queue: true,
                waited_ms: waited.as_millis() as u64,
            });
        }
    }

    fn sweep(&mut self) -> usize {
        let expired = self.queues.sweep_timeouts(self.clock.now());
        let count = expired.len();
        for TimedOut { item, waited } in expired {
            self.in_flight.remove(&item.id);
            let waited_ms = waited.as_millis() as u64;
            warn!(work_item_id = %item.id, kind = %item.kind, waited_ms, "Queued work item timed out");
            self.emit(CoreEvent::TimedOut {
                work_item_id: item.id.clone(),
                kind: item.kind,
                waited_ms,
            });
            self.raise(
                AlertType::QueueTimeout,
                format!("queue:{}", item.kind),
                json!({ "workItemId": item.id, "kind": item.kind, "waitedMs": waited_ms }),
            );
        }
        count
    }

    fn evaluate(&mut self, roster: Roster) {
        self.install_roster(roster);
        self.dispatch_queued();

        let capacity = Router::online_capacity(&self.roster);
        let utilization = self.load.compute_utilization(self.router.active_total(), capacity);
        let load = self.load.compute_system_load(
            utilization,
            self.queues.total_len(),
            self.queues.total_capacity(),
        );

        match self.load.check_thresholds(load) {
            Some(LoadSignal::HighLoad) => {
                warn!(load, utilization, "System load high");
                self.emit(CoreEvent::LoadHigh { load });
                self.raise(
                    AlertType::HighLoad,
                    "system".to_string(),
                    json!({ "load": load, "utilization": utilization }),
                );
            }
            Some(LoadSignal::CriticalLoad) => {
                warn!(load, utilization, "System load critical");
                self.emit(CoreEvent::LoadCritical { load });
                self.raise(
                    AlertType::CriticalLoad,
                    "system".to_string(),
                    json!({ "load": load, "utilization": utilization }),
                );
            }
            Some(LoadSignal::Recovered) => {
                info!(load, utilization, "System load recovered");
                self.emit(CoreEvent::LoadRecovered { load });
                self.alerts.resolve(AlertType::HighLoad);
                self.alerts.resolve(AlertType::CriticalLoad);
            }
            None => {}
        }

        let pruned = self.alerts.prune_expired(self.clock.now());
        if pruned > 0 {
            debug!(pruned, "Pruned expired alerts");
        }
    }

    fn publish(&mut self) -> MetricsSnapshot {
        self.sequence += 1;
        let calls = self.analytics.counters(WorkKind::Call);
        let messages = self.analytics.counters(WorkKind::Message);
        debug_assert_eq!(calls.active as usize, self.router.active_count(WorkKind::Call));
        debug_assert_eq!(calls.queued as usize, self.queues.len(WorkKind::Call));
        debug_assert_eq!(messages.active as usize, self.router.active_count(WorkKind::Message));
        debug_assert_eq!(messages.queued as usize, self.queues.len(WorkKind::Message));

        let snapshot = MetricsSnapshot {
            active_calls: calls.active,
            queued_calls: calls.queued,
            active_messages: messages.active,
            queued_messages: messages.queued,
            agent_utilization: self.load.utilization(),
            average_response_time_ms: self.analytics.get_average_response_time(self.clock.now()),
            system_load: self.load.system_load(),
            timestamp: self.clock.utc(),
            sequence: self.sequence,
        };
        self.metrics_tx.send_replace(snapshot.clone());
        self.emit(CoreEvent::MetricsUpdated {
            snapshot: snapshot.clone(),
        });
        snapshot
    }

    /// Keep the previous snapshot and republish it unchanged.
    fn collection_failed(&mut self, reason: String) -> MetricsSnapshot {
        self.raise(
            AlertType::MetricsCollectionFailed,
            "directory".to_string(),
            json!({ "reason": reason }),
        );
        let previous = self.metrics_tx.borrow().clone();
        self.emit(CoreEvent::MetricsUpdated {
            snapshot: previous.clone(),
        });
        previous
    }

    fn fail_remaining(&mut self, reason: &str) -> usize {
        let mut failed = 0;
        for item in self.queues.drain_all() {
            self.emit(CoreEvent::Failed {
                work_item_id: item.id,
                kind: item.kind,
                stage: FailedStage::Queued,
                reason: reason.to_string(),
            });
            failed += 1;
        }
        for assignment in self.router.drain_assignments() {
            self.emit(CoreEvent::Failed {
                work_item_id: assignment.item.id,
                kind: assignment.item.kind,
                stage: FailedStage::Active,
                reason: reason.to_string(),
            });
            failed += 1;
        }
        self.in_flight.clear();
        failed
    }
}

fn record_event_metrics(event: &CoreEvent) {
    let (kind, outcome) = match event {
        CoreEvent::Routed { kind, .. } => (*kind, "routed"),
        CoreEvent::Queued { kind, .. } => (*kind, "queued"),
        CoreEvent::Completed { kind, .. } => (*kind, "completed"),
        CoreEvent::Overflow { kind, .. } => (*kind, "overflow"),
        CoreEvent::TimedOut { kind, .. } => (*kind, "timeout"),
        CoreEvent::Failed { kind, .. } => (*kind, "failed"),
        CoreEvent::AlertTriggered { alert } => {
            metrics::counter!("switchyard_alerts_total", "type" => alert.alert_type.as_str()).increment(1);
            return;
        }
        CoreEvent::LoadHigh { .. }
        | CoreEvent::LoadCritical { .. }
        | CoreEvent::LoadRecovered { .. }
        | CoreEvent::MetricsUpdated { .. } => return,
    };
    metrics::counter!("switchyard_work_total", "kind" => kind.as_str(), "outcome" => outcome).increment(1);
}

/// Cheap cloneable sender side of the core task
#[derive(Clone)]
pub(crate) struct CoreHandle {
    tx: mpsc::Sender<Command>,
}

impl CoreHandle {
    async fn request<T>(&self, build: impl FnOnce(Reply<T>) -> Command) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(build(reply))
            .await
            .map_err(|_| CoreError::CoreUnavailable)?;
        rx.await.map_err(|_| CoreError::CoreUnavailable)
    }

    pub(crate) async fn route(&self, item: WorkItem, roster: Option<Roster>) -> Result<RouteOutcome> {
        self.request(|reply| Command::Route { item, roster, reply }).await?
    }

    pub(crate) async fn complete(&self, work_item_id: String) -> Result<()> {
        self.request(|reply| Command::Complete { work_item_id, reply }).await?
    }

    pub(crate) async fn sweep(&self) -> Result<usize> {
        self.request(|reply| Command::Sweep { reply }).await
    }

    pub(crate) async fn evaluate(&self, roster: Roster) -> Result<()> {
        self.request(|reply| Command::Evaluate { roster, reply }).await
    }

    pub(crate) async fn publish(&self) -> Result<MetricsSnapshot> {
        self.request(|reply| Command::Publish { reply }).await
    }

    pub(crate) async fn collection_failed(&self, reason: String) -> Result<MetricsSnapshot> {
        self.request(|reply| Command::CollectionFailed { reason, reply }).await
    }

    pub(crate) async fn analytics(&self, timeframe: Timeframe) -> Result<AnalyticsReport> {
        self.request(|reply| Command::Analytics { timeframe, reply }).await
    }

    pub(crate) async fn alerts(&self) -> Result<Vec<Alert>> {
        self.request(|reply| Command::Alerts { reply }).await
    }

    pub(crate) async fn pending(&self) -> Result<usize> {
        self.request(|reply| Command::Pending { reply }).await
    }

    /// Refuse every `route` from now on; completions are still accepted.
    pub(crate) async fn stop_accepting(&self) -> Result<()> {
        self.request(|reply| Command::StopAccepting { reply }).await
    }

    pub(crate) async fn fail_remaining(&self, reason: impl Into<String>) -> Result<usize> {
        let reason = reason.into();
        self.request(|reply| Command::FailRemaining { reason, reply }).await
    }
}

/// Start the core task. It runs until every handle is dropped.
pub(crate) fn spawn(state: CoreState) -> (CoreHandle, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel(COMMAND_BUFFER);
    let task = tokio::spawn(async move {
        let mut state = state;
        while let Some(command) = rx.recv().await {
            state.handle(command);
        }
        debug!("Core task stopped");
    });
    (CoreHandle { tx }, task)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::Utc;
    use std::time::Duration;
    use sy_common::{QueueLimits, WorkRequest};

    struct Harness {
        state: CoreState,
        clock: ManualClock,
        events: broadcast::Receiver<CoreEvent>,
        metrics: watch::Receiver<MetricsSnapshot>,
    }

    fn harness(config: CoreConfig) -> Harness {
        let clock = ManualClock::new();
        let (events_tx, events) = broadcast::channel(256);
        let (metrics_tx, metrics) = watch::channel(MetricsSnapshot::empty(Utc::now()));
        let state = CoreState::new(&config, Arc::new(clock.clone()), events_tx, metrics_tx, None);
        Harness { state, clock, events, metrics }
    }

    fn roster(clock: &ManualClock, workers: Vec<WorkerInfo>) -> Roster {
        Roster {
            workers,
            fetched_at: clock.now(),
        }
    }

    fn small_config() -> CoreConfig {
        let mut config = CoreConfig::default();
        config.queues.call = QueueLimits { capacity: 2, max_wait_ms: 2_000 };
        config
    }

    impl Harness {
        fn call(&self, id: &str) -> WorkItem {
            WorkItem::new(WorkKind::Call, WorkRequest::new(id, "p"), self.clock.now(), self.clock.utc())
        }

        fn drain_names(&mut self) -> Vec<&'static str> {
            let mut names = Vec::new();
            while let Ok(event) = self.events.try_recv() {
                names.push(event.name());
            }
            names
        }
    }

    #[test]
    fn test_overflow_emits_event_and_one_alert() {
        let mut h = harness(small_config());

        for id in ["c1", "c2"] {
            let item = h.call(id);
            assert!(h.state.route(item, Some(roster(&h.clock, vec![]))).unwrap().is_queued());
        }
        let item = h.call("c3");
        assert!(h.state.route(item, Some(roster(&h.clock, vec![]))).unwrap().is_overflow());
        let item = h.call("c4");
        assert!(h.state.route(item, Some(roster(&h.clock, vec![]))).unwrap().is_overflow());

        assert_eq!(
            h.drain_names(),
            vec!["queued", "queued", "overflow", "alert:triggered", "overflow"]
        );
        let alerts = h.state.alerts.get_active_alerts();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].occurrences, 2);
    }

    #[test]
    fn test_duplicate_id_is_rejected() {
        let mut h = harness(small_config());
        let item = h.call("c1");
        h.state.route(item, Some(roster(&h.clock, vec![]))).unwrap();
        let item = h.call("c1");
        assert!(matches!(
            h.state.route(item, Some(roster(&h.clock, vec![]))),
            Err(CoreError::DuplicateWorkItem { .. })
        ));
    }

    #[test]
    fn test_complete_frees_slot_for_queued_item() {
        let mut h = harness(small_config());
        let workers = vec![WorkerInfo::new("w1", &[WorkKind::Call], 1)];

        let item = h.call("c1");
        assert!(h.state.route(item, Some(roster(&h.clock, workers.clone()))).unwrap().is_routed());
        let item = h.call("c2");
        assert!(h.state.route(item, Some(roster(&h.clock, workers))).unwrap().is_queued());

        h.clock.advance(Duration::from_millis(700));
        h.state.complete("c1").unwrap();

        assert_eq!(h.drain_names(), vec!["routed", "queued", "completed", "routed"]);
        assert!(h.state.router.is_assigned("c2"));
        assert!(matches!(h.state.complete("c1"), Err(CoreError::UnknownWorkItem { .. })));
    }

    #[test]
    fn test_sweep_times_out_and_balances() {
        let mut h = harness(small_config());
        let item = h.call("c1");
        h.state.route(item, Some(roster(&h.clock, vec![]))).unwrap();

        h.clock.advance(Duration::from_millis(2_100));
        assert_eq!(h.state.sweep(), 1);

        let snapshot = h.state.publish();
        assert_eq!(snapshot.queued_calls, 0);
        assert_eq!(snapshot.sequence, 1);
        assert_eq!(*h.metrics.borrow(), snapshot);
        assert_eq!(h.state.analytics.counters(WorkKind::Call).totals.timed_out, 1);
    }

    #[test]
    fn test_collection_failure_republishes_previous_snapshot() {
        let mut h = harness(small_config());
        h.state.evaluate(roster(&h.clock, vec![WorkerInfo::new("w1", &[WorkKind::Call], 2)]));
        let first = h.state.publish();

        let item = h.call("c1");
        h.state.route(item, None).unwrap();
        let stale = h.state.collection_failed("directory down".to_string());

        assert_eq!(stale, first);
        let types: Vec<AlertType> = h.state.alerts.get_active_alerts().iter().map(|a| a.alert_type).collect();
        assert_eq!(types, vec![AlertType::MetricsCollectionFailed]);
    }

    #[test]
    fn test_fail_remaining_empties_everything() {
        let mut h = harness(small_config());
        let workers = vec![WorkerInfo::new("w1", &[WorkKind::Call], 1)];
        let item = h.call("c1");
        h.state.route(item, Some(roster(&h.clock, workers.clone()))).unwrap();
        let item = h.call("c2");
        h.state.route(item, Some(roster(&h.clock, workers))).unwrap();

        assert_eq!(h.state.fail_remaining("shutdown"), 2);
        assert!(h.state.in_flight.is_empty());
        let calls = h.state.analytics.counters(WorkKind::Call);
        assert_eq!(calls.totals.failed, 2);
        assert_eq!(calls.active + calls.queued, 0);
    }

    #[test]
    fn test_queued_item_takes_new_capacity_before_new_arrival() {
        let mut h = harness(small_config());
        let item = h.call("c1");
        assert!(h.state.route(item, Some(roster(&h.clock, vec![]))).unwrap().is_queued());

        h.clock.advance(Duration::from_millis(300));
        let workers = vec![WorkerInfo::new("w1", &[WorkKind::Call], 1)];
        let item = h.call("c2");
        let outcome = h.state.route(item, Some(roster(&h.clock, workers))).unwrap();

        assert!(matches!(outcome, RouteOutcome::Queued { depth: 1 }));
        assert!(h.state.router.is_assigned("c1"));
        assert!(!h.state.router.is_assigned("c2"));
        assert_eq!(h.drain_names(), vec!["queued", "routed", "queued"]);
    }

    #[test]
    fn test_older_roster_does_not_replace_newer() {
        let mut h = harness(small_config());
        let stale = roster(&h.clock, vec![]);
        h.clock.advance(Duration::from_millis(10));
        let fresh = roster(&h.clock, vec![WorkerInfo::new("w1", &[WorkKind::Call], 1)]);

        let item = h.call("c1");
        assert!(h.state.route(item, Some(fresh)).unwrap().is_routed());
        // Lookup that started first but finished last
        let item = h.call("c2");
        assert!(h.state.route(item, Some(stale.clone())).unwrap().is_queued());
        assert_eq!(h.state.roster.len(), 1);

        h.state.evaluate(stale);
        assert_eq!(h.state.roster.len(), 1);

        h.state.complete("c1").unwrap();
        assert!(h.state.router.is_assigned("c2"));
    }

    #[test]
    fn test_stop_accepting_rejects_routes_but_not_completions() {
        let mut h = harness(small_config());
        let workers = vec![WorkerInfo::new("w1", &[WorkKind::Call], 1)];
        let item = h.call("c1");
        h.state.route(item, Some(roster(&h.clock, workers.clone()))).unwrap();

        h.state.stop_accepting();
        let item = h.call("c2");
        assert!(matches!(
            h.state.route(item, Some(roster(&h.clock, workers))),
            Err(CoreError::ShuttingDown)
        ));
        assert!(h.state.queues.is_empty());

        h.state.complete("c1").unwrap();
        let calls = h.state.analytics.counters(WorkKind::Call);
        assert_eq!((calls.totals.accepted, calls.totals.completed), (1, 1));
    }

    #[tokio::test]
    async fn test_handle_round_trip_until_dropped() {
        let h = harness(small_config());
        let item = h.call("c1");
        let empty = roster(&h.clock, vec![]);
        let (core, task) = spawn(h.state);

        let outcome = core.route(item, Some(empty)).await.unwrap();
        assert!(outcome.is_queued());
        assert_eq!(core.pending().await.unwrap(), 1);
        assert_eq!(core.fail_remaining("test").await.unwrap(), 1);
        assert_eq!(core.pending().await.unwrap(), 0);

        drop(core);
        task.await.unwrap();
    }
}
