//! Switchyard Routing Core
//!
//! This crate provides the traffic admission and routing core with:
//! - Orchestrator: Public API and lifecycle (initialize, route, complete, shutdown)
//! - QueueStore: Bounded per-kind queues with priority bands and timeout sweeps
//! - Router: Worker assignment with pluggable selection policies
//! - LoadMonitor: Utilization, blended system load and threshold hysteresis
//! - Analytics: Transition counters, rolling response time and timeframe reports
//! - AlertManager: Deduplicated alerts with asynchronous, retried dispatch
//! - Lifecycle: Metrics tick, timeout sweep and gauge export

pub mod alert;
pub mod analytics;
pub mod clock;
pub mod config;
mod engine;
pub mod directory;
pub mod error;
pub mod lifecycle;
pub mod load;
pub mod notification;
pub mod orchestrator;
pub mod queue;
pub mod router;
pub mod selection;

pub use alert::{AlertManager, Triggered};
pub use analytics::{Analytics, KindCounters};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{apply_env_overrides, load_config};
pub use directory::{StaticWorkerDirectory, WorkerDirectory};
pub use error::{CoreError, DirectoryError, NotifyError};
pub use lifecycle::{LifecycleConfig, LifecycleManager, TickOutcome};
pub use load::{LoadLevel, LoadMonitor};
pub use notification::{
    LogNotificationChannel, NoOpNotificationChannel, NotificationChannel, WebhookNotificationChannel,
};
pub use orchestrator::{Orchestrator, OrchestratorState};
pub use queue::QueueStore;
pub use router::Router;
pub use selection::{
    LeastLoadedSelector, RoundRobinSelector, SkillWeightedSelector, WorkerSelector,
};

pub type Result<T> = std::result::Result<T, CoreError>;
