//! Analytics Aggregator - counters, rolling response time and history
//!
//! Every transition reaches the aggregator exactly once, through
//! [`Analytics::record_event`]. Counters are derived from events only so
//! that `active + queued = accepted - completed - rejected - timed_out - failed`
//! holds per kind after every event.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::error;

use sy_common::{
    AnalyticsConfig, AnalyticsReport, CoreEvent, FailedStage, KindReport, KindStats,
    ResponseWindow, Timeframe, WorkKind,
};

/// Live counters for one kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KindCounters {
    pub totals: KindStats,
    pub active: u64,
    pub queued: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transition {
    Routed,
    Queued,
    Completed,
    Rejected,
    TimedOut,
    Failed,
    Alert,
}

#[derive(Debug, Clone)]
struct Record {
    at: Instant,
    kind: Option<WorkKind>,
    transition: Transition,
    /// Direct routes count as accepted on arrival
    arrival: bool,
    response: Option<Duration>,
    wait: Option<Duration>,
}

pub struct Analytics {
    config: AnalyticsConfig,
    calls: KindCounters,
    messages: KindCounters,
    responses: VecDeque<(Instant, Duration)>,
    records: VecDeque<Record>,
    alerts_triggered: u64,
}

fn decrement(counter: &mut u64, what: &str, kind: WorkKind) {
    if *counter == 0 {
        debug_assert!(false, "{} counter underflow for {}", what, kind);
        error!(kind = %kind, counter = what, "Counter decrement without matching increment");
        return;
    }
    *counter -= 1;
}

impl Analytics {
    pub fn new(config: AnalyticsConfig) -> Self {
        Self {
            config,
            calls: KindCounters::default(),
            messages: KindCounters::default(),
            responses: VecDeque::new(),
            records: VecDeque::new(),
            alerts_triggered: 0,
        }
    }

    fn counters_mut(&mut self, kind: WorkKind) -> &mut KindCounters {
        match kind {
            WorkKind::Call => &mut self.calls,
            WorkKind::Message => &mut self.messages,
        }
    }

    pub fn counters(&self, kind: WorkKind) -> KindCounters {
        match kind {
            WorkKind::Call => self.calls,
            WorkKind::Message => self.messages,
        }
    }

    /// Apply one event to the counters and history.
    pub fn record_event(&mut self, event: &CoreEvent, now: Instant) {
        let base = |kind, transition| Record {
            at: now,
            kind: Some(kind),
            transition,
            arrival: false,
            response: None,
            wait: None,
        };

        let record = match event {
            CoreEvent::Routed { kind, from_queue, waited_ms, .. } => {
                let c = self.counters_mut(*kind);
                if *from_queue {
                    decrement(&mut c.queued, "queued", *kind);
                } else {
                    c.totals.accepted += 1;
                }
                c.totals.routed += 1;
                c.active += 1;
                Record {
                    arrival: !from_queue,
                    wait: from_queue.then(|| Duration::from_millis(*waited_ms)),
                    ..base(*kind, Transition::Routed)
                }
            }
            CoreEvent::Queued { kind, .. } => {
                let c = self.counters_mut(*kind);
                c.totals.accepted += 1;
                c.totals.queued += 1;
                c.queued += 1;
                base(*kind, Transition::Queued)
            }
            CoreEvent::Completed { kind, response_time_ms, .. } => {
                let c = self.counters_mut(*kind);
                decrement(&mut c.active, "active", *kind);
                c.totals.completed += 1;
                let response = Duration::from_millis(*response_time_ms);
                self.push_response(now, response);
                Record {
                    response: Some(response),
                    ..base(*kind, Transition::Completed)
                }
            }
            CoreEvent::Overflow { kind, .. } => {
                let c = self.counters_mut(*kind);
                c.totals.accepted += 1;
                c.totals.rejected += 1;
                base(*kind, Transition::Rejected)
            }
            CoreEvent::TimedOut { kind, waited_ms, .. } => {
                let c = self.counters_mut(*kind);
                decrement(&mut c.queued, "queued", *kind);
                c.totals.timed_out += 1;
                Record {
                    wait: Some(Duration::from_millis(*waited_ms)),
                    ..base(*kind, Transition::TimedOut)
                }
            }
            CoreEvent::Failed { kind, stage, .. } => {
                let c = self.counters_mut(*kind);
                match stage {
                    FailedStage::Queued => decrement(&mut c.queued, "queued", *kind),
                    FailedStage::Active => decrement(&mut c.active, "active", *kind),
                }
                c.totals.failed += 1;
                base(*kind, Transition::Failed)
            }
            CoreEvent::AlertTriggered { .. } => {
                self.alerts_triggered += 1;
                Record {
                    at: now,
                    kind: None,
                    transition: Transition::Alert,
                    arrival: false,
                    response: None,
                    wait: None,
                }
            }
            CoreEvent::LoadHigh { .. }
            | CoreEvent::LoadCritical { .. }
            | CoreEvent::LoadRecovered { .. }
            | CoreEvent::MetricsUpdated { .. } => return,
        };

        self.records.push_back(record);
        self.prune_records(now);
    }

    fn push_response(&mut self, now: Instant, response: Duration) {
        self.responses.push_back((now, response));
        if let ResponseWindow::Count(n) = self.config.response_window {
            while self.responses.len() > n {
                self.responses.pop_front();
            }
        }
    }

    fn prune_records(&mut self, now: Instant) {
        let retention = self.config.retention();
        while let Some(front) = self.records.front() {
            let expired = now.saturating_duration_since(front.at) > retention;
            if expired || self.records.len() > self.config.max_records {
                self.records.pop_front();
            } else {
                break;
            }
        }
    }

    /// Rolling mean response time in milliseconds; 0 with no samples.
    pub fn get_average_response_time(&mut self, now: Instant) -> f64 {
        if let ResponseWindow::DurationMs(ms) = self.config.response_window {
            let window = Duration::from_millis(ms);
            while let Some((at, _)) = self.responses.front() {
                if now.saturating_duration_since(*at) > window {
                    self.responses.pop_front();
                } else {
                    break;
                }
            }
        }
        mean_ms(self.responses.iter().map(|(_, d)| *d))
    }

    pub fn get_analytics(&self, timeframe: Timeframe, now: Instant, now_utc: DateTime<Utc>) -> AnalyticsReport {
        let span = timeframe.duration();
        let in_window: Vec<&Record> = self
            .records
            .iter()
            .filter(|r| now.saturating_duration_since(r.at) <= span)
            .collect();

        let kinds = WorkKind::ALL
            .iter()
            .map(|kind| {
                let mut window = KindStats::default();
                for r in in_window.iter().filter(|r| r.kind == Some(*kind)) {
                    match r.transition {
                        Transition::Routed => {
                            window.routed += 1;
                            if r.arrival {
                                window.accepted += 1;
                            }
                        }
                        Transition::Queued => {
                            window.queued += 1;
                            window.accepted += 1;
                        }
                        Transition::Completed => window.completed += 1,
                        Transition::Rejected => {
                            window.rejected += 1;
                            window.accepted += 1;
                        }
                        Transition::TimedOut => window.timed_out += 1,
                        Transition::Failed => window.failed += 1,
                        Transition::Alert => {}
                    }
                }
                let counters = self.counters(*kind);
                KindReport {
                    kind: *kind,
                    window,
                    totals: counters.totals,
                    active: counters.active,
                    queued: counters.queued,
                }
            })
            .collect();

        let from = window_start(now_utc, span);
        AnalyticsReport {
            timeframe,
            from,
            to: now_utc,
            kinds,
            average_response_time_ms: mean_ms(in_window.iter().filter_map(|r| r.response)),
            average_queue_wait_ms: mean_ms(in_window.iter().filter_map(|r| r.wait)),
            alerts_triggered: in_window
                .iter()
                .filter(|r| r.transition == Transition::Alert)
                .count() as u64,
        }
    }

    pub fn total_alerts_triggered(&self) -> u64 {
        self.alerts_triggered
    }
}

/// `now_utc - span`, clamped to the earliest representable time.
fn window_start(now_utc: DateTime<Utc>, span: Duration) -> DateTime<Utc> {
    i64::try_from(span.as_millis())
        .ok()
        .and_then(chrono::TimeDelta::try_milliseconds)
        .and_then(|delta| now_utc.checked_sub_signed(delta))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

fn mean_ms(samples: impl Iterator<Item = Duration>) -> f64 {
    let (sum, count) = samples.fold((0.0, 0u64), |(sum, count), d| {
        (sum + d.as_secs_f64() * 1000.0, count + 1)
    });
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sy_common::RoutingDecision;

    fn routed(id: &str, kind: WorkKind, from_queue: bool) -> CoreEvent {
        CoreEvent::Routed {
            kind,
            decision: RoutingDecision {
                work_item_id: id.to_string(),
                worker_id: "w1".to_string(),
                score: 1.0,
                decided_at: Utc::now(),
            },
            from_queue,
            waited_ms: if from_queue { 250 } else { 0 },
        }
    }

    fn completed(id: &str, kind: WorkKind, ms: u64) -> CoreEvent {
        CoreEvent::Completed {
            work_item_id: id.to_string(),
            kind,
            worker_id: "w1".to_string(),
            response_time_ms: ms,
        }
    }

    fn queued(id: &str, kind: WorkKind) -> CoreEvent {
        CoreEvent::Queued { work_item_id: id.to_string(), kind, depth: 1 }
    }

    fn assert_balanced(analytics: &Analytics) {
        for kind in WorkKind::ALL {
            let c = analytics.counters(kind);
            let t = c.totals;
            assert_eq!(
                c.active + c.queued,
                t.accepted - t.completed - t.rejected - t.timed_out - t.failed,
                "counters out of balance for {}",
                kind
            );
        }
    }

    #[test]
    fn test_counters_stay_balanced() {
        let now = Instant::now();
        let mut a = Analytics::new(AnalyticsConfig::default());

        a.record_event(&routed("c1", WorkKind::Call, false), now);
        a.record_event(&queued("c2", WorkKind::Call), now);
        a.record_event(&queued("c3", WorkKind::Call), now);
        a.record_event(
            &CoreEvent::Overflow { work_item_id: "c4".into(), kind: WorkKind::Call, capacity: 2 },
            now,
        );
        assert_balanced(&a);

        a.record_event(&completed("c1", WorkKind::Call, 400), now);
        a.record_event(&routed("c2", WorkKind::Call, true), now);
        a.record_event(
            &CoreEvent::TimedOut { work_item_id: "c3".into(), kind: WorkKind::Call, waited_ms: 2_000 },
            now,
        );
        a.record_event(
            &CoreEvent::Failed {
                work_item_id: "c2".into(),
                kind: WorkKind::Call,
                stage: FailedStage::Active,
                reason: "shutdown".into(),
            },
            now,
        );
        assert_balanced(&a);

        let c = a.counters(WorkKind::Call);
        assert_eq!(c.totals.accepted, 4);
        assert_eq!(c.totals.routed, 2);
        assert_eq!(c.active, 0);
        assert_eq!(c.queued, 0);
        assert_eq!(a.counters(WorkKind::Message), KindCounters::default());
    }

    #[test]
    fn test_count_window_keeps_last_n() {
        let now = Instant::now();
        let mut a = Analytics::new(AnalyticsConfig {
            response_window: ResponseWindow::Count(2),
            ..AnalyticsConfig::default()
        });
        for (i, ms) in [100, 200, 400].iter().enumerate() {
            let id = format!("c{}", i);
            a.record_event(&routed(&id, WorkKind::Call, false), now);
            a.record_event(&completed(&id, WorkKind::Call, *ms), now);
        }
        assert!((a.get_average_response_time(now) - 300.0).abs() < 1e-6);
    }

    #[test]
    fn test_duration_window_drops_old_samples() {
        let start = Instant::now();
        let mut a = Analytics::new(AnalyticsConfig {
            response_window: ResponseWindow::DurationMs(1_000),
            ..AnalyticsConfig::default()
        });
        a.record_event(&routed("c1", WorkKind::Call, false), start);
        a.record_event(&completed("c1", WorkKind::Call, 100), start);
        let later = start + Duration::from_millis(1_500);
        a.record_event(&routed("c2", WorkKind::Call, false), later);
        a.record_event(&completed("c2", WorkKind::Call, 300), later);

        assert!((a.get_average_response_time(later) - 300.0).abs() < 1e-6);
        assert_eq!(a.get_average_response_time(later + Duration::from_secs(5)), 0.0);
    }

    #[test]
    fn test_timeframe_report_counts_only_window() {
        let start = Instant::now();
        let mut a = Analytics::new(AnalyticsConfig::default());
        a.record_event(&routed("m1", WorkKind::Message, false), start);
        a.record_event(&completed("m1", WorkKind::Message, 1_000), start);

        let later = start + Duration::from_secs(120);
        a.record_event(&queued("m2", WorkKind::Message), later);

        let report = a.get_analytics(Timeframe::LastMinute, later, Utc::now());
        let messages = report.kind(WorkKind::Message).unwrap();
        assert_eq!(messages.window.accepted, 1);
        assert_eq!(messages.window.queued, 1);
        assert_eq!(messages.window.completed, 0);
        assert_eq!(messages.totals.completed, 1);
        assert_eq!(messages.queued, 1);
        assert_eq!(report.average_response_time_ms, 0.0);

        let report = a.get_analytics(Timeframe::LastHour, later, Utc::now());
        assert_eq!(report.kind(WorkKind::Message).unwrap().window.accepted, 2);
        assert!((report.average_response_time_ms - 1_000.0).abs() < 1e-6);
    }

    #[test]
    fn test_history_respects_max_records() {
        let now = Instant::now();
        let mut a = Analytics::new(AnalyticsConfig {
            max_records: 3,
            ..AnalyticsConfig::default()
        });
        for i in 0..5 {
            a.record_event(&queued(&format!("c{}", i), WorkKind::Call), now);
        }
        let report = a.get_analytics(Timeframe::LastMinute, now, Utc::now());
        assert_eq!(report.kind(WorkKind::Call).unwrap().window.queued, 3);
        assert_eq!(a.counters(WorkKind::Call).queued, 5);
    }

    #[test]
    fn test_huge_custom_timeframe_clamps_window_start() {
        let now = Instant::now();
        let now_utc = Utc::now();
        let mut a = Analytics::new(AnalyticsConfig::default());
        a.record_event(&queued("c1", WorkKind::Call), now);

        for millis in [10_u64.pow(16), u64::MAX] {
            let report = a.get_analytics(Timeframe::Custom { millis }, now, now_utc);
            assert_eq!(report.from, DateTime::<Utc>::MIN_UTC);
            assert!(report.from <= report.to);
            assert_eq!(report.kind(WorkKind::Call).unwrap().window.queued, 1);
        }

        let report = a.get_analytics(Timeframe::Custom { millis: 1_500 }, now, now_utc);
        assert_eq!((report.to - report.from).num_milliseconds(), 1_500);
    }
}
