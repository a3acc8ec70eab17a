//! Queue Store - bounded per-kind queues with priority bands
//!
//! Each work kind has one queue with a fixed capacity and a maximum wait.
//! Within a queue items are held in priority bands; the highest band is
//! served first and each band is strict FIFO by arrival.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use sy_common::{Priority, QueueLimits, QueuesConfig, WorkItem, WorkKind};

/// Rejected enqueue. The item is handed back to the caller.
#[derive(Debug)]
pub struct Overflow {
    pub item: WorkItem,
    pub capacity: usize,
}

/// Item removed by a timeout sweep
#[derive(Debug)]
pub struct TimedOut {
    pub item: WorkItem,
    pub waited: Duration,
}

struct KindQueue {
    limits: QueueLimits,
    /// Indexed by `Priority as usize`
    bands: [VecDeque<WorkItem>; 4],
    len: usize,
}

impl KindQueue {
    fn new(limits: QueueLimits) -> Self {
        Self {
            limits,
            bands: Default::default(),
            len: 0,
        }
    }

    fn band_mut(&mut self, priority: Priority) -> &mut VecDeque<WorkItem> {
        &mut self.bands[priority as usize]
    }

    fn service_order_mut(&mut self) -> impl Iterator<Item = &mut VecDeque<WorkItem>> {
        self.bands.iter_mut().rev()
    }
}

pub struct QueueStore {
    calls: KindQueue,
    messages: KindQueue,
}

impl QueueStore {
    pub fn new(config: &QueuesConfig) -> Self {
        Self {
            calls: KindQueue::new(config.call.clone()),
            messages: KindQueue::new(config.message.clone()),
        }
    }

    fn queue(&self, kind: WorkKind) -> &KindQueue {
        match kind {
            WorkKind::Call => &self.calls,
            WorkKind::Message => &self.messages,
        }
    }

    fn queue_mut(&mut self, kind: WorkKind) -> &mut KindQueue {
        match kind {
            WorkKind::Call => &mut self.calls,
            WorkKind::Message => &mut self.messages,
        }
    }

    fn all_queues(&self) -> [&KindQueue; 2] {
        [&self.calls, &self.messages]
    }

    /// Append an item to its kind's queue. Returns the queue depth after insertion.
    pub fn enqueue(&mut self, item: WorkItem) -> Result<usize, Overflow> {
        let queue = self.queue_mut(item.kind);
        if queue.len >= queue.limits.capacity {
            return Err(Overflow {
                item,
                capacity: queue.limits.capacity,
            });
        }
        queue.band_mut(item.priority).push_back(item);
        queue.len += 1;
        Ok(queue.len)
    }

    pub fn dequeue_next(&mut self, kind: WorkKind) -> Option<WorkItem> {
        self.dequeue_next_where(kind, |_| true)
    }

    /// Remove the first item in service order that `accept` takes.
    ///
    /// Items passed over keep their relative order.
    pub fn dequeue_next_where<F>(&mut self, kind: WorkKind, mut accept: F) -> Option<WorkItem>
    where
        F: FnMut(&WorkItem) -> bool,
    {
        let queue = self.queue_mut(kind);
        let mut taken = None;
        for band in queue.service_order_mut() {
            if let Some(pos) = band.iter().position(|item| accept(item)) {
                taken = band.remove(pos);
                break;
            }
        }
        if taken.is_some() {
            queue.len -= 1;
        }
        taken
    }

    /// Put a just-dequeued item back at the head of its band.
    pub fn restore(&mut self, item: WorkItem) {
        let queue = self.queue_mut(item.kind);
        queue.band_mut(item.priority).push_front(item);
        queue.len += 1;
    }

    /// Remove every item whose wait has reached its kind's `max_wait`.
    pub fn sweep_timeouts(&mut self, now: Instant) -> Vec<TimedOut> {
        let mut expired = Vec::new();
        for queue in [&mut self.calls, &mut self.messages] {
            let max_wait = queue.limits.max_wait();
            let mut removed = 0;
            for band in queue.bands.iter_mut() {
                let mut kept = VecDeque::with_capacity(band.len());
                for item in band.drain(..) {
                    let waited = item.waited(now);
                    if waited >= max_wait {
                        expired.push(TimedOut { item, waited });
                        removed += 1;
                    } else {
                        kept.push_back(item);
                    }
                }
                *band = kept;
            }
            queue.len -= removed;
        }
        expired.sort_by_key(|t| t.item.enqueued_at);
        expired
    }

    /// Empty every queue, in service order per kind.
    pub fn drain_all(&mut self) -> Vec<WorkItem> {
        let mut drained = Vec::new();
        for kind in WorkKind::ALL {
            let queue = self.queue_mut(kind);
            for band in queue.service_order_mut() {
                drained.extend(band.drain(..));
            }
            queue.len = 0;
        }
        drained
    }

    pub fn len(&self, kind: WorkKind) -> usize {
        self.queue(kind).len
    }

    pub fn capacity(&self, kind: WorkKind) -> usize {
        self.queue(kind).limits.capacity
    }

    pub fn total_len(&self) -> usize {
        self.all_queues().iter().map(|q| q.len).sum()
    }

    pub fn total_capacity(&self) -> usize {
        self.all_queues().iter().map(|q| q.limits.capacity).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total_len() == 0
    }

    pub fn contains(&self, id: &str) -> bool {
        self.all_queues()
            .iter()
            .flat_map(|q| q.bands.iter())
            .any(|band| band.iter().any(|item| item.id == id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sy_common::WorkRequest;

    fn config(capacity: usize, max_wait_ms: u64) -> QueuesConfig {
        let limits = QueueLimits { capacity, max_wait_ms };
        QueuesConfig {
            call: limits.clone(),
            message: limits,
        }
    }

    fn item(id: &str, kind: WorkKind, priority: Priority, at: Instant) -> WorkItem {
        let request = WorkRequest::new(id, format!("payload-{}", id)).with_priority(priority);
        WorkItem::new(kind, request, at, Utc::now())
    }

    #[test]
    fn test_overflow_rejects_without_dropping() {
        let now = Instant::now();
        let mut store = QueueStore::new(&config(2, 60_000));

        assert_eq!(store.enqueue(item("c1", WorkKind::Call, Priority::Normal, now)).unwrap(), 1);
        assert_eq!(store.enqueue(item("c2", WorkKind::Call, Priority::Normal, now)).unwrap(), 2);

        let overflow = store
            .enqueue(item("c3", WorkKind::Call, Priority::Normal, now))
            .unwrap_err();
        assert_eq!(overflow.item.id, "c3");
        assert_eq!(overflow.capacity, 2);
        assert_eq!(store.len(WorkKind::Call), 2);
        assert!(store.contains("c1"));
        assert!(store.contains("c2"));
    }

    #[test]
    fn test_zero_capacity_rejects_everything() {
        let mut store = QueueStore::new(&config(0, 60_000));
        let result = store.enqueue(item("m1", WorkKind::Message, Priority::Urgent, Instant::now()));
        assert!(result.is_err());
        assert!(store.is_empty());
    }

    #[test]
    fn test_kinds_are_independent() {
        let now = Instant::now();
        let mut store = QueueStore::new(&config(1, 60_000));
        store.enqueue(item("c1", WorkKind::Call, Priority::Normal, now)).unwrap();
        store.enqueue(item("m1", WorkKind::Message, Priority::Normal, now)).unwrap();
        assert_eq!(store.total_len(), 2);
        assert_eq!(store.dequeue_next(WorkKind::Message).unwrap().id, "m1");
        assert!(store.dequeue_next(WorkKind::Message).is_none());
        assert_eq!(store.len(WorkKind::Call), 1);
    }

    #[test]
    fn test_priority_bands_then_fifo() {
        let now = Instant::now();
        let mut store = QueueStore::new(&config(10, 60_000));
        store.enqueue(item("low", WorkKind::Call, Priority::Low, now)).unwrap();
        store.enqueue(item("n1", WorkKind::Call, Priority::Normal, now)).unwrap();
        store.enqueue(item("urgent", WorkKind::Call, Priority::Urgent, now)).unwrap();
        store.enqueue(item("n2", WorkKind::Call, Priority::Normal, now)).unwrap();

        let order: Vec<String> = std::iter::from_fn(|| store.dequeue_next(WorkKind::Call))
            .map(|i| i.id)
            .collect();
        assert_eq!(order, vec!["urgent", "n1", "n2", "low"]);
    }

    #[test]
    fn test_dequeue_where_preserves_skipped_order() {
        let now = Instant::now();
        let mut store = QueueStore::new(&config(10, 60_000));
        for id in ["a", "b", "c"] {
            store.enqueue(item(id, WorkKind::Call, Priority::Normal, now)).unwrap();
        }

        let taken = store.dequeue_next_where(WorkKind::Call, |i| i.id == "b").unwrap();
        assert_eq!(taken.id, "b");
        assert_eq!(store.len(WorkKind::Call), 2);
        assert_eq!(store.dequeue_next(WorkKind::Call).unwrap().id, "a");
        assert_eq!(store.dequeue_next(WorkKind::Call).unwrap().id, "c");
    }

    #[test]
    fn test_restore_puts_item_back_at_head() {
        let now = Instant::now();
        let mut store = QueueStore::new(&config(10, 60_000));
        store.enqueue(item("a", WorkKind::Call, Priority::Normal, now)).unwrap();
        store.enqueue(item("b", WorkKind::Call, Priority::Normal, now)).unwrap();

        let head = store.dequeue_next(WorkKind::Call).unwrap();
        store.restore(head);
        assert_eq!(store.len(WorkKind::Call), 2);
        assert_eq!(store.dequeue_next(WorkKind::Call).unwrap().id, "a");
    }

    #[test]
    fn test_sweep_removes_at_deadline_not_before() {
        let start = Instant::now();
        let mut store = QueueStore::new(&config(10, 2_000));
        store.enqueue(item("c1", WorkKind::Call, Priority::Normal, start)).unwrap();
        store
            .enqueue(item("c2", WorkKind::Call, Priority::High, start + Duration::from_millis(500)))
            .unwrap();

        assert!(store.sweep_timeouts(start + Duration::from_millis(1_999)).is_empty());

        let expired = store.sweep_timeouts(start + Duration::from_millis(2_000));
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].item.id, "c1");
        assert_eq!(expired[0].waited, Duration::from_millis(2_000));
        assert_eq!(store.len(WorkKind::Call), 1);

        let expired = store.sweep_timeouts(start + Duration::from_millis(2_600));
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].item.id, "c2");
        assert!(store.is_empty());
    }

    #[test]
    fn test_drain_all_empties_store() {
        let now = Instant::now();
        let mut store = QueueStore::new(&config(10, 60_000));
        store.enqueue(item("c1", WorkKind::Call, Priority::Low, now)).unwrap();
        store.enqueue(item("c2", WorkKind::Call, Priority::High, now)).unwrap();
        store.enqueue(item("m1", WorkKind::Message, Priority::Normal, now)).unwrap();

        let drained: Vec<String> = store.drain_all().into_iter().map(|i| i.id).collect();
        assert_eq!(drained, vec!["c2", "c1", "m1"]);
        assert!(store.is_empty());
    }
}
