//! Alert Manager - deduplicated alerts with asynchronous dispatch
//!
//! Alerts are keyed by `(type, dedupe_key)`. A repeat trigger inside the
//! dedupe window folds into the existing alert; only the first occurrence
//! is dispatched. Dispatch is a non-blocking hand-off to a bounded channel
//! drained by [`crate::notification::spawn_dispatcher`].

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use sy_common::{Alert, AlertType};

struct ActiveAlert {
    alert: Alert,
    last_seen: Instant,
}

/// Result of a trigger: the alert as it now stands, and whether it is new
#[derive(Debug, Clone)]
pub struct Triggered {
    pub alert: Alert,
    pub is_new: bool,
}

pub struct AlertManager {
    window: Duration,
    /// First-seen order
    active: IndexMap<(AlertType, String), ActiveAlert>,
    dispatch_tx: Option<mpsc::Sender<Alert>>,
}

impl AlertManager {
    pub fn new(window: Duration, dispatch_tx: Option<mpsc::Sender<Alert>>) -> Self {
        Self {
            window,
            active: IndexMap::new(),
            dispatch_tx,
        }
    }

    pub fn trigger_alert(
        &mut self,
        alert_type: AlertType,
        dedupe_key: impl Into<String>,
        payload: serde_json::Value,
        now: Instant,
        now_utc: DateTime<Utc>,
    ) -> Triggered {
        let key = (alert_type, dedupe_key.into());

        if let Some(entry) = self.active.get_mut(&key) {
            if now.saturating_duration_since(entry.last_seen) < self.window {
                entry.last_seen = now;
                entry.alert.last_seen_at = now_utc;
                entry.alert.occurrences += 1;
                entry.alert.payload = payload;
                debug!(
                    alert_type = alert_type.as_str(),
                    dedupe_key = %key.1,
                    occurrences = entry.alert.occurrences,
                    "Alert deduplicated"
                );
                return Triggered {
                    alert: entry.alert.clone(),
                    is_new: false,
                };
            }
        }

        let alert = Alert::new(alert_type, key.1.clone(), payload, now_utc);
        warn!(
            alert_id = %alert.id,
            alert_type = alert_type.as_str(),
            severity = ?alert.severity,
            dedupe_key = %alert.dedupe_key,
            "Alert triggered"
        );
        // Re-inserting an expired key moves it to the end of first-seen order
        self.active.shift_remove(&key);
        self.active.insert(
            key,
            ActiveAlert {
                alert: alert.clone(),
                last_seen: now,
            },
        );
        self.dispatch(&alert);

        Triggered { alert, is_new: true }
    }

    fn dispatch(&self, alert: &Alert) {
        let Some(tx) = &self.dispatch_tx else {
            return;
        };
        match tx.try_send(alert.clone()) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(dropped)) => {
                metrics::counter!("switchyard_alert_dispatch_dropped_total").increment(1);
                warn!(alert_id = %dropped.id, "Alert dispatch queue full, dropping notification");
            }
            Err(mpsc::error::TrySendError::Closed(dropped)) => {
                debug!(alert_id = %dropped.id, "Alert dispatcher stopped, notification not sent");
            }
        }
    }

    /// Resolve every active alert of `alert_type`.
    pub fn resolve(&mut self, alert_type: AlertType) -> Vec<Alert> {
        let mut resolved = Vec::new();
        self.active.retain(|(t, _), entry| {
            if *t == alert_type {
                resolved.push(entry.alert.clone());
                false
            } else {
                true
            }
        });
        for alert in &resolved {
            info!(alert_id = %alert.id, alert_type = alert_type.as_str(), "Alert resolved");
        }
        resolved
    }

    /// Drop alerts whose dedupe window has lapsed.
    pub fn prune_expired(&mut self, now: Instant) -> usize {
        let before = self.active.len();
        let window = self.window;
        self.active
            .retain(|_, entry| now.saturating_duration_since(entry.last_seen) < window);
        before - self.active.len()
    }

    pub fn get_active_alerts(&self) -> Vec<Alert> {
        self.active.values().map(|e| e.alert.clone()).collect()
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }
}
