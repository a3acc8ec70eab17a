//! Synthetic traffic for local runs.
//!
//! One task routes random calls and messages at a fixed rate. A second task
//! watches `routed` events and completes each simulated item after a random
//! handling time, so work released from the queues is completed as well.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use sy_common::{CoreEvent, Priority, WorkKind, WorkRequest};
use sy_router::{CoreError, Orchestrator};

const ID_PREFIX: &str = "sim-";
/// Share of arrivals that are messages
const MESSAGE_SHARE: f64 = 0.6;
const CALL_HANDLE_MS: (u64, u64) = (2_000, 20_000);
const MESSAGE_HANDLE_MS: (u64, u64) = (200, 3_000);
const SKILLS: [&str; 3] = ["billing", "support", "sales"];

pub struct Simulator {
    tasks: Vec<JoinHandle<()>>,
}

impl Simulator {
    pub async fn join(self) {
        for task in self.tasks {
            let _ = task.await;
        }
    }
}

fn random_request(sequence: u64) -> (WorkKind, WorkRequest) {
    let mut rng = rand::thread_rng();
    let kind = if rng.gen_bool(MESSAGE_SHARE) {
        WorkKind::Message
    } else {
        WorkKind::Call
    };
    let priority = match rng.gen_range(0..20) {
        0 => Priority::Urgent,
        1..=3 => Priority::High,
        4..=5 => Priority::Low,
        _ => Priority::Normal,
    };
    let mut request = WorkRequest::new(
        format!("{}{}-{}", ID_PREFIX, kind, sequence),
        format!("payload/{}/{}", kind, sequence),
    )
    .with_priority(priority);
    if rng.gen_bool(0.3) {
        request = request.with_skills([SKILLS[rng.gen_range(0..SKILLS.len())]]);
    }
    (kind, request)
}

fn handling_time(kind: WorkKind) -> Duration {
    let (low, high) = match kind {
        WorkKind::Call => CALL_HANDLE_MS,
        WorkKind::Message => MESSAGE_HANDLE_MS,
    };
    Duration::from_millis(rand::thread_rng().gen_range(low..=high))
}

pub fn spawn(
    orchestrator: Arc<Orchestrator>,
    rate_per_sec: u32,
    shutdown_rx: broadcast::Receiver<()>,
) -> sy_router::Result<Simulator> {
    let events = orchestrator.subscribe()?;
    let completer = spawn_completer(orchestrator.clone(), events, shutdown_rx.resubscribe());
    let generator = spawn_generator(orchestrator, rate_per_sec, shutdown_rx);
    Ok(Simulator {
        tasks: vec![generator, completer],
    })
}

fn spawn_generator(
    orchestrator: Arc<Orchestrator>,
    rate_per_sec: u32,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    let period = Duration::from_secs_f64(1.0 / f64::from(rate_per_sec.max(1)));

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut sequence: u64 = 0;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    sequence += 1;
                    let (kind, request) = random_request(sequence);
                    match orchestrator.route(kind, request).await {
                        Ok(outcome) => debug!(?outcome, "Simulated arrival"),
                        Err(CoreError::ShuttingDown) => break,
                        Err(e) => warn!(error = %e, "Simulated arrival failed"),
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!(generated = sequence, "Traffic simulator stopping");
                    break;
                }
            }
        }
    })
}

fn spawn_completer(
    orchestrator: Arc<Orchestrator>,
    mut events: broadcast::Receiver<CoreEvent>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Ok(CoreEvent::Routed { kind, decision, .. })
                        if decision.work_item_id.starts_with(ID_PREFIX) =>
                    {
                        let orchestrator = orchestrator.clone();
                        let delay = handling_time(kind);
                        tokio::spawn(async move {
                            tokio::time::sleep(delay).await;
                            // Items force-failed at shutdown are no longer known
                            if let Err(e) = orchestrator.complete(&decision.work_item_id).await {
                                debug!(error = %e, work_item_id = %decision.work_item_id, "Simulated completion dropped");
                            }
                        });
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Simulator missed routed events; those items stay active");
                    }
                    Err(RecvError::Closed) => break,
                },
                _ = shutdown_rx.recv() => break,
            }
        }
    })
}
