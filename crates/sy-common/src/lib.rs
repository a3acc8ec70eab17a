use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};
use std::fmt;
use std::time::{Duration, Instant};

// ============================================================================
// Work Item Types
// ============================================================================

/// Kind of inbound work. Each kind has its own bounded queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WorkKind {
    Call,
    Message,
}

impl WorkKind {
    pub const ALL: [WorkKind; 2] = [WorkKind::Call, WorkKind::Message];

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkKind::Call => "call",
            WorkKind::Message => "message",
        }
    }
}

impl fmt::Display for WorkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Priority band. Queues serve the highest band first, FIFO within a band.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

impl Priority {
    /// Bands in service order (highest first)
    pub const SERVICE_ORDER: [Priority; 4] = [
        Priority::Urgent,
        Priority::High,
        Priority::Normal,
        Priority::Low,
    ];
}

/// Opaque handle to the transport-layer payload. The core never looks inside.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PayloadRef(pub String);

impl PayloadRef {
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Already-normalized work description handed over by the transport layer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkRequest {
    pub id: String,
    #[serde(default)]
    pub priority: Priority,
    pub payload_ref: PayloadRef,
    /// Skills a worker must hold to take this item
    #[serde(default)]
    pub skills: Vec<String>,
}

impl WorkRequest {
    pub fn new(id: impl Into<String>, payload_ref: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            priority: Priority::Normal,
            payload_ref: PayloadRef::new(payload_ref),
            skills: Vec::new(),
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_skills<I, S>(mut self, skills: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.skills = skills.into_iter().map(Into::into).collect();
        self
    }
}

/// A unit of inbound work owned by the core.
///
/// Owned by the queue store while queued and by the router once assigned;
/// it is deliberately not `Clone` so that ownership moves with the item.
#[derive(Debug)]
pub struct WorkItem {
    pub id: String,
    pub kind: WorkKind,
    pub priority: Priority,
    /// Monotonic arrival time, used for wait and response measurements
    pub enqueued_at: Instant,
    pub received_at: DateTime<Utc>,
    pub payload_ref: PayloadRef,
    pub skills: Vec<String>,
}

impl WorkItem {
    pub fn new(kind: WorkKind, request: WorkRequest, now: Instant, now_utc: DateTime<Utc>) -> Self {
        Self {
            id: request.id,
            kind,
            priority: request.priority,
            enqueued_at: now,
            received_at: now_utc,
            payload_ref: request.payload_ref,
            skills: request.skills,
        }
    }

    pub fn waited(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.enqueued_at)
    }
}

// ============================================================================
// Worker Types
// ============================================================================

fn default_worker_capacity() -> u32 {
    1
}

fn default_online() -> bool {
    true
}

/// A worker (agent) as reported by the worker directory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerInfo {
    pub id: String,
    pub kinds: Vec<WorkKind>,
    #[serde(default)]
    pub skills: Vec<String>,
    /// Maximum concurrent work items
    #[serde(default = "default_worker_capacity")]
    pub capacity: u32,
    #[serde(default = "default_online")]
    pub online: bool,
}

impl WorkerInfo {
    pub fn new(id: impl Into<String>, kinds: &[WorkKind], capacity: u32) -> Self {
        Self {
            id: id.into(),
            kinds: kinds.to_vec(),
            skills: Vec::new(),
            capacity,
            online: true,
        }
    }

    pub fn with_skills<I, S>(mut self, skills: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.skills = skills.into_iter().map(Into::into).collect();
        self
    }

    pub fn serves(&self, kind: WorkKind) -> bool {
        self.kinds.contains(&kind)
    }

    pub fn has_skills(&self, required: &[String]) -> bool {
        required.iter().all(|s| self.skills.contains(s))
    }
}

// ============================================================================
// Routing Types
// ============================================================================

/// Assignment of a work item to a worker. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub work_item_id: String,
    pub worker_id: String,
    pub score: f64,
    pub decided_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RejectReason {
    /// The kind's queue was at capacity
    Overflow,
}

/// Result of routing a work item. Overflow is a normal value, not an error.
#[derive(Debug, Clone, PartialEq)]
pub enum RouteOutcome {
    Routed(RoutingDecision),
    Queued { depth: usize },
    Rejected(RejectReason),
}

impl RouteOutcome {
    pub fn worker_id(&self) -> Option<&str> {
        match self {
            RouteOutcome::Routed(decision) => Some(&decision.worker_id),
            _ => None,
        }
    }

    pub fn is_routed(&self) -> bool {
        matches!(self, RouteOutcome::Routed(_))
    }

    pub fn is_queued(&self) -> bool {
        matches!(self, RouteOutcome::Queued { .. })
    }

    pub fn is_overflow(&self) -> bool {
        matches!(self, RouteOutcome::Rejected(RejectReason::Overflow))
    }
}

// ============================================================================
// Metrics & Analytics Types
// ============================================================================

/// Point-in-time summary of the core, produced once per tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub active_calls: u64,
    pub queued_calls: u64,
    pub active_messages: u64,
    pub queued_messages: u64,
    pub agent_utilization: f64,
    pub average_response_time_ms: f64,
    pub system_load: f64,
    pub timestamp: DateTime<Utc>,
    /// Tick sequence number, 0 before the first tick
    pub sequence: u64,
}

impl MetricsSnapshot {
    pub fn empty(timestamp: DateTime<Utc>) -> Self {
        Self {
            active_calls: 0,
            queued_calls: 0,
            active_messages: 0,
            queued_messages: 0,
            agent_utilization: 0.0,
            average_response_time_ms: 0.0,
            system_load: 0.0,
            timestamp,
            sequence: 0,
        }
    }

    pub fn active(&self, kind: WorkKind) -> u64 {
        match kind {
            WorkKind::Call => self.active_calls,
            WorkKind::Message => self.active_messages,
        }
    }

    pub fn queued(&self, kind: WorkKind) -> u64 {
        match kind {
            WorkKind::Call => self.queued_calls,
            WorkKind::Message => self.queued_messages,
        }
    }
}

/// Look-back window for analytics queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Timeframe {
    LastMinute,
    LastHour,
    LastDay,
    Custom { millis: u64 },
}

impl Timeframe {
    pub fn duration(&self) -> Duration {
        match self {
            Timeframe::LastMinute => Duration::from_secs(60),
            Timeframe::LastHour => Duration::from_secs(3600),
            Timeframe::LastDay => Duration::from_secs(86_400),
            Timeframe::Custom { millis } => Duration::from_millis(*millis),
        }
    }
}

/// Per-kind transition counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KindStats {
    pub accepted: u64,
    pub routed: u64,
    pub queued: u64,
    pub completed: u64,
    pub rejected: u64,
    pub timed_out: u64,
    pub failed: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KindReport {
    pub kind: WorkKind,
    /// Transitions observed inside the timeframe
    pub window: KindStats,
    /// Lifetime totals
    pub totals: KindStats,
    pub active: u64,
    pub queued: u64,
}

/// Answer to a timeframe analytics query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsReport {
    pub timeframe: Timeframe,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub kinds: Vec<KindReport>,
    pub average_response_time_ms: f64,
    pub average_queue_wait_ms: f64,
    pub alerts_triggered: u64,
}

impl AnalyticsReport {
    pub fn kind(&self, kind: WorkKind) -> Option<&KindReport> {
        self.kinds.iter().find(|k| k.kind == kind)
    }
}

// ============================================================================
// Load & Alert Types
// ============================================================================

/// Threshold crossing reported by the load monitor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LoadSignal {
    HighLoad,
    CriticalLoad,
    Recovered,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AlertType {
    QueueOverflow,
    QueueTimeout,
    HighLoad,
    CriticalLoad,
    MetricsCollectionFailed,
}

impl AlertType {
    pub fn default_severity(&self) -> AlertSeverity {
        match self {
            AlertType::QueueOverflow => AlertSeverity::Error,
            AlertType::QueueTimeout => AlertSeverity::Warn,
            AlertType::HighLoad => AlertSeverity::Warn,
            AlertType::CriticalLoad => AlertSeverity::Critical,
            AlertType::MetricsCollectionFailed => AlertSeverity::Error,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AlertType::QueueOverflow => "queue_overflow",
            AlertType::QueueTimeout => "queue_timeout",
            AlertType::HighLoad => "high_load",
            AlertType::CriticalLoad => "critical_load",
            AlertType::MetricsCollectionFailed => "metrics_collection_failed",
        }
    }
}

/// Alert severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AlertSeverity {
    Info,
    Warn,
    Error,
    Critical,
}

/// A deduplicated abnormal condition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub alert_type: AlertType,
    pub severity: AlertSeverity,
    pub payload: serde_json::Value,
    pub dedupe_key: String,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    /// Triggers folded into this alert, including the first
    pub occurrences: u32,
}

impl Alert {
    pub fn new(
        alert_type: AlertType,
        dedupe_key: String,
        payload: serde_json::Value,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            alert_type,
            severity: alert_type.default_severity(),
            payload,
            dedupe_key,
            first_seen_at: now,
            last_seen_at: now,
            occurrences: 1,
        }
    }
}

// ============================================================================
// Outbound Events
// ============================================================================

/// Where a work item was when it was force-failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FailedStage {
    Queued,
    Active,
}

/// Every event the core publishes. Consumers match on this exhaustively.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum CoreEvent {
    #[serde(rename = "queued")]
    Queued { work_item_id: String, kind: WorkKind, depth: usize },
    #[serde(rename = "routed")]
    Routed { kind: WorkKind, decision: RoutingDecision, from_queue: bool, waited_ms: u64 },
    #[serde(rename = "completed")]
    Completed { work_item_id: String, kind: WorkKind, worker_id: String, response_time_ms: u64 },
    #[serde(rename = "overflow")]
    Overflow { work_item_id: String, kind: WorkKind, capacity: usize },
    #[serde(rename = "timeout")]
    TimedOut { work_item_id: String, kind: WorkKind, waited_ms: u64 },
    #[serde(rename = "failed")]
    Failed { work_item_id: String, kind: WorkKind, stage: FailedStage, reason: String },
    #[serde(rename = "load:high")]
    LoadHigh { load: f64 },
    #[serde(rename = "load:critical")]
    LoadCritical { load: f64 },
    #[serde(rename = "load:recovered")]
    LoadRecovered { load: f64 },
    #[serde(rename = "alert:triggered")]
    AlertTriggered { alert: Alert },
    #[serde(rename = "metrics:updated")]
    MetricsUpdated { snapshot: MetricsSnapshot },
}

impl CoreEvent {
    pub fn name(&self) -> &'static str {
        match self {
            CoreEvent::Queued { .. } => "queued",
            CoreEvent::Routed { .. } => "routed",
            CoreEvent::Completed { .. } => "completed",
            CoreEvent::Overflow { .. } => "overflow",
            CoreEvent::TimedOut { .. } => "timeout",
            CoreEvent::Failed { .. } => "failed",
            CoreEvent::LoadHigh { .. } => "load:high",
            CoreEvent::LoadCritical { .. } => "load:critical",
            CoreEvent::LoadRecovered { .. } => "load:recovered",
            CoreEvent::AlertTriggered { .. } => "alert:triggered",
            CoreEvent::MetricsUpdated { .. } => "metrics:updated",
        }
    }
}

// ============================================================================
// Configuration Types
// ============================================================================

/// Limits for one kind's queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueLimits {
    pub capacity: usize,
    pub max_wait_ms: u64,
}

impl QueueLimits {
    pub fn max_wait(&self) -> Duration {
        Duration::from_millis(self.max_wait_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QueuesConfig {
    pub call: QueueLimits,
    pub message: QueueLimits,
}

impl QueuesConfig {
    pub fn limits(&self, kind: WorkKind) -> &QueueLimits {
        match kind {
            WorkKind::Call => &self.call,
            WorkKind::Message => &self.message,
        }
    }

    pub fn limits_mut(&mut self, kind: WorkKind) -> &mut QueueLimits {
        match kind {
            WorkKind::Call => &mut self.call,
            WorkKind::Message => &mut self.message,
        }
    }
}

impl Default for QueuesConfig {
    fn default() -> Self {
        Self {
            call: QueueLimits { capacity: 50, max_wait_ms: 120_000 },
            message: QueueLimits { capacity: 200, max_wait_ms: 300_000 },
        }
    }
}

/// Load thresholds (fractions, 1.0 = 100%) and the system-load blend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoadConfig {
    pub high_threshold: f64,
    pub critical_threshold: f64,
    pub hysteresis: f64,
    pub utilization_weight: f64,
    pub queue_weight: f64,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            high_threshold: 0.80,
            critical_threshold: 0.95,
            hysteresis: 0.05,
            utilization_weight: 0.7,
            queue_weight: 0.3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AlertConfig {
    pub dedupe_window_ms: u64,
    pub dispatch_max_attempts: u32,
    pub dispatch_initial_backoff_ms: u64,
    pub dispatch_max_backoff_ms: u64,
    /// Pending dispatches buffered before new ones are dropped
    pub dispatch_buffer: usize,
}

impl AlertConfig {
    pub fn dedupe_window(&self) -> Duration {
        Duration::from_millis(self.dedupe_window_ms)
    }
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            dedupe_window_ms: 300_000,
            dispatch_max_attempts: 5,
            dispatch_initial_backoff_ms: 500,
            dispatch_max_backoff_ms: 30_000,
            dispatch_buffer: 256,
        }
    }
}

/// Window for the rolling average response time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResponseWindow {
    /// Last N completed items
    Count(usize),
    /// Items completed within the last T milliseconds
    DurationMs(u64),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnalyticsConfig {
    pub response_window: ResponseWindow,
    pub retention_ms: u64,
    pub max_records: usize,
}

impl AnalyticsConfig {
    pub fn retention(&self) -> Duration {
        Duration::from_millis(self.retention_ms)
    }
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            response_window: ResponseWindow::Count(100),
            retention_ms: 86_400_000,
            max_records: 100_000,
        }
    }
}

/// Worker selection policy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SelectionStrategy {
    RoundRobin,
    #[default]
    LeastLoaded,
    SkillWeighted,
}

/// Everything supplied once at initialize
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CoreConfig {
    pub queues: QueuesConfig,
    pub load: LoadConfig,
    pub tick_interval_ms: u64,
    /// Faster timeout sweep; `None` sweeps on the metrics tick only
    pub sweep_interval_ms: Option<u64>,
    pub alerts: AlertConfig,
    pub analytics: AnalyticsConfig,
    pub selection: SelectionStrategy,
    pub shutdown_grace_ms: u64,
    pub event_buffer: usize,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            queues: QueuesConfig::default(),
            load: LoadConfig::default(),
            tick_interval_ms: 5_000,
            sweep_interval_ms: None,
            alerts: AlertConfig::default(),
            analytics: AnalyticsConfig::default(),
            selection: SelectionStrategy::default(),
            shutdown_grace_ms: 30_000,
            event_buffer: 1024,
        }
    }
}

impl CoreConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn sweep_interval(&self) -> Option<Duration> {
        self.sweep_interval_ms
            .filter(|ms| *ms < self.tick_interval_ms)
            .map(Duration::from_millis)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    /// Reject configurations the core cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let load = &self.load;
        if self.tick_interval_ms == 0 {
            return Err(ConfigError::invalid("tickIntervalMs must be greater than zero"));
        }
        if matches!(self.sweep_interval_ms, Some(0)) {
            return Err(ConfigError::invalid("sweepIntervalMs must be greater than zero"));
        }
        if !(load.high_threshold > 0.0) {
            return Err(ConfigError::invalid("load.highThreshold must be greater than zero"));
        }
        if !(load.critical_threshold > load.high_threshold) {
            return Err(ConfigError::invalid("load.criticalThreshold must exceed load.highThreshold"));
        }
        if load.critical_threshold > 1.5 {
            return Err(ConfigError::invalid("load.criticalThreshold must not exceed 1.5"));
        }
        if !(load.hysteresis > 0.0 && load.hysteresis < load.high_threshold) {
            return Err(ConfigError::invalid("load.hysteresis must be in (0, highThreshold)"));
        }
        if load.utilization_weight < 0.0 || load.queue_weight < 0.0 {
            return Err(ConfigError::invalid("load weights must not be negative"));
        }
        if load.utilization_weight + load.queue_weight <= 0.0 {
            return Err(ConfigError::invalid("load weights must not both be zero"));
        }
        if self.alerts.dedupe_window_ms == 0 {
            return Err(ConfigError::invalid("alerts.dedupeWindowMs must be greater than zero"));
        }
        if self.alerts.dispatch_max_attempts == 0 {
            return Err(ConfigError::invalid("alerts.dispatchMaxAttempts must be at least 1"));
        }
        if self.alerts.dispatch_buffer == 0 {
            return Err(ConfigError::invalid("alerts.dispatchBuffer must be at least 1"));
        }
        match self.analytics.response_window {
            ResponseWindow::Count(0) | ResponseWindow::DurationMs(0) => {
                return Err(ConfigError::invalid("analytics.responseWindow must not be empty"));
            }
            _ => {}
        }
        if self.event_buffer == 0 {
            return Err(ConfigError::invalid("eventBuffer must be at least 1"));
        }
        Ok(())
    }
}

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

impl ConfigError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(CoreConfig::default().validate().is_ok());
    }

    #[test]
    fn test_critical_must_exceed_high() {
        let mut config = CoreConfig::default();
        config.load.critical_threshold = config.load.high_threshold;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_hysteresis_must_fit_below_high() {
        let mut config = CoreConfig::default();
        config.load.hysteresis = 0.0;
        assert!(config.validate().is_err());
        config.load.hysteresis = config.load.high_threshold;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_parses_camel_case_with_defaults() {
        let json = r#"{
            "queues": { "call": { "capacity": 5, "maxWaitMs": 2000 } },
            "load": { "highThreshold": 0.8, "hysteresis": 0.05 },
            "analytics": { "responseWindow": { "durationMs": 60000 } },
            "selection": "roundRobin"
        }"#;
        let config: CoreConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.queues.call.capacity, 5);
        assert_eq!(config.queues.call.max_wait(), Duration::from_millis(2000));
        assert_eq!(config.queues.message, QueuesConfig::default().message);
        assert_eq!(config.analytics.response_window, ResponseWindow::DurationMs(60_000));
        assert_eq!(config.selection, SelectionStrategy::RoundRobin);
        assert_eq!(config.tick_interval_ms, 5_000);
    }

    #[test]
    fn test_sweep_interval_only_when_faster_than_tick() {
        let mut config = CoreConfig::default();
        config.sweep_interval_ms = Some(1_000);
        assert_eq!(config.sweep_interval(), Some(Duration::from_secs(1)));
        config.sweep_interval_ms = Some(10_000);
        assert_eq!(config.sweep_interval(), None);
    }

    #[test]
    fn test_event_wire_names() {
        let event = CoreEvent::LoadHigh { load: 0.82 };
        assert_eq!(event.name(), "load:high");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "load:high");
    }

    #[test]
    fn test_priority_service_order() {
        let mut bands = Priority::SERVICE_ORDER.to_vec();
        bands.sort();
        bands.reverse();
        assert_eq!(bands, Priority::SERVICE_ORDER.to_vec());
    }
}
