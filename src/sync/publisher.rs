//! Progress, error and completion notifications.
//!
//! Every subscriber owns a queue. Progress events are superseded by newer
//! ones, so when a slow subscriber's queue already holds `capacity` of them
//! the oldest is discarded. Error and completion events are always kept.
//! Publishing never waits on a subscriber.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use serde::Serialize;
use tokio::sync::Notify;

use crate::types::EntityKind;

/// Notification emitted by a sync run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncEvent {
    Progress {
        kind: EntityKind,
        current: u64,
        /// `None` while the run's end is unknown.
        total: Option<u64>,
        id: u32,
        name: String,
    },
    Error {
        kind: EntityKind,
        message: String,
    },
    Complete {
        kind: EntityKind,
        message: String,
        paused: bool,
    },
}

impl SyncEvent {
    pub fn kind(&self) -> EntityKind {
        match self {
            Self::Progress { kind, .. } | Self::Error { kind, .. } | Self::Complete { kind, .. } => {
                *kind
            }
        }
    }

    fn is_progress(&self) -> bool {
        matches!(self, Self::Progress { .. })
    }
}

/// Which kinds a subscription receives.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventFilter {
    kinds: Option<Vec<EntityKind>>,
}

impl EventFilter {
    pub fn all() -> Self {
        Self { kinds: None }
    }

    pub fn kinds(kinds: impl IntoIterator<Item = EntityKind>) -> Self {
        Self {
            kinds: Some(kinds.into_iter().collect()),
        }
    }

    pub fn matches(&self, event: &SyncEvent) -> bool {
        self.kinds
            .as_ref()
            .map_or(true, |kinds| kinds.contains(&event.kind()))
    }
}

impl From<EntityKind> for EventFilter {
    fn from(kind: EntityKind) -> Self {
        Self::kinds([kind])
    }
}

#[derive(Debug, Default)]
struct QueueState {
    events: VecDeque<SyncEvent>,
    progress: usize,
}

#[derive(Debug)]
struct SubscriberQueue {
    filter: EventFilter,
    state: Mutex<QueueState>,
    notify: Notify,
    closed: AtomicBool,
    dropped: AtomicU64,
}

impl SubscriberQueue {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        // A panic while holding the lock cannot leave the queue inconsistent.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.notify.notify_one();
    }
}

#[derive(Debug)]
struct Shared {
    capacity: usize,
    subscribers: Mutex<Vec<Weak<SubscriberQueue>>>,
}

impl Drop for Shared {
    fn drop(&mut self) {
        let subscribers = self.subscribers.get_mut().unwrap_or_else(|e| e.into_inner());
        for queue in subscribers.iter().filter_map(Weak::upgrade) {
            queue.close();
        }
    }
}

/// Fan-out point for [`SyncEvent`]s.
#[derive(Debug, Clone)]
pub struct Publisher {
    shared: Arc<Shared>,
}

impl Publisher {
    /// `capacity` bounds the buffered progress events per subscriber.
    pub fn new(capacity: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                capacity: capacity.max(1),
                subscribers: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn subscribe(&self, filter: EventFilter) -> Subscription {
        let queue = Arc::new(SubscriberQueue {
            filter,
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
            closed: AtomicBool::new(false),
            dropped: AtomicU64::new(0),
        });
        self.subscribers().push(Arc::downgrade(&queue));
        Subscription { queue }
    }

    pub fn publish(&self, event: SyncEvent) {
        let mut subscribers = self.subscribers();
        subscribers.retain(|weak| weak.strong_count() > 0);

        for queue in subscribers.iter().filter_map(Weak::upgrade) {
            if !queue.filter.matches(&event) {
                continue;
            }
            {
                let mut state = queue.lock();
                if event.is_progress() {
                    if state.progress >= self.shared.capacity {
                        if let Some(pos) = state.events.iter().position(SyncEvent::is_progress) {
                            state.events.remove(pos);
                            state.progress -= 1;
                            queue.dropped.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                    state.progress += 1;
                }
                state.events.push_back(event.clone());
            }
            queue.notify.notify_one();
        }
    }

    /// End every subscription; buffered events can still be drained.
    pub fn close(&self) {
        for queue in self.subscribers().iter().filter_map(Weak::upgrade) {
            queue.close();
        }
    }

    fn subscribers(&self) -> MutexGuard<'_, Vec<Weak<SubscriberQueue>>> {
        self.shared
            .subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }
}

/// Receiving end of a subscription. Dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    queue: Arc<SubscriberQueue>,
}

impl Subscription {
    /// Next buffered event, if any.
    pub fn try_recv(&mut self) -> Option<SyncEvent> {
        let mut state = self.queue.lock();
        let event = state.events.pop_front()?;
        if event.is_progress() {
            state.progress -= 1;
        }
        Some(event)
    }

    /// Wait for the next event. Returns `None` once the publisher is closed
    /// and the queue is drained.
    pub async fn recv(&mut self) -> Option<SyncEvent> {
        loop {
            if let Some(event) = self.try_recv() {
                return Some(event);
            }
            if self.queue.closed.load(Ordering::SeqCst) {
                return self.try_recv();
            }
            self.queue.notify.notified().await;
        }
    }

    /// Progress events discarded because this subscriber fell behind.
    pub fn dropped(&self) -> u64 {
        self.queue.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn progress(kind: EntityKind, id: u32) -> SyncEvent {
        SyncEvent::Progress {
            kind,
            current: id as u64,
            total: None,
            id,
            name: String::new(),
        }
    }

    fn error(kind: EntityKind, message: &str) -> SyncEvent {
        SyncEvent::Error {
            kind,
            message: message.to_string(),
        }
    }

    #[test]
    fn test_fifo_delivery() {
        let publisher = Publisher::new(8);
        let mut sub = publisher.subscribe(EventFilter::all());
        publisher.publish(progress(EntityKind::Item, 1));
        publisher.publish(progress(EntityKind::Item, 2));
        assert_eq!(sub.try_recv(), Some(progress(EntityKind::Item, 1)));
        assert_eq!(sub.try_recv(), Some(progress(EntityKind::Item, 2)));
        assert_eq!(sub.try_recv(), None);
    }

    #[test]
    fn test_progress_drops_oldest() {
        let publisher = Publisher::new(2);
        let mut sub = publisher.subscribe(EventFilter::all());
        for id in 1..=5 {
            publisher.publish(progress(EntityKind::Item, id));
        }
        assert_eq!(sub.dropped(), 3);
        assert_eq!(sub.try_recv(), Some(progress(EntityKind::Item, 4)));
        assert_eq!(sub.try_recv(), Some(progress(EntityKind::Item, 5)));
        assert_eq!(sub.try_recv(), None);
    }

    #[test]
    fn test_errors_never_dropped() {
        let publisher = Publisher::new(1);
        let mut sub = publisher.subscribe(EventFilter::all());
        publisher.publish(error(EntityKind::Item, "a"));
        publisher.publish(progress(EntityKind::Item, 1));
        publisher.publish(error(EntityKind::Item, "b"));
        publisher.publish(progress(EntityKind::Item, 2));
        publisher.publish(SyncEvent::Complete {
            kind: EntityKind::Item,
            message: "done".into(),
            paused: false,
        });

        let events: Vec<_> = std::iter::from_fn(|| sub.try_recv()).collect();
        assert_eq!(
            events,
            vec![
                error(EntityKind::Item, "a"),
                error(EntityKind::Item, "b"),
                progress(EntityKind::Item, 2),
                SyncEvent::Complete {
                    kind: EntityKind::Item,
                    message: "done".into(),
                    paused: false,
                },
            ]
        );
        assert_eq!(sub.dropped(), 1);
    }

    #[test]
    fn test_filter_by_kind() {
        let publisher = Publisher::new(8);
        let mut quests = publisher.subscribe(EntityKind::Quest.into());
        publisher.publish(progress(EntityKind::Item, 1));
        publisher.publish(progress(EntityKind::Quest, 2));
        assert_eq!(quests.try_recv(), Some(progress(EntityKind::Quest, 2)));
        assert_eq!(quests.try_recv(), None);
    }

    #[test]
    fn test_slow_subscriber_does_not_affect_others() {
        let publisher = Publisher::new(1);
        let mut fast = publisher.subscribe(EventFilter::all());
        let slow = publisher.subscribe(EventFilter::all());
        for id in 1..=3 {
            publisher.publish(progress(EntityKind::Npc, id));
            assert_eq!(fast.try_recv(), Some(progress(EntityKind::Npc, id)));
        }
        assert_eq!(fast.dropped(), 0);
        assert_eq!(slow.dropped(), 2);
    }

    #[test]
    fn test_dropped_subscription_is_pruned() {
        let publisher = Publisher::new(4);
        let sub = publisher.subscribe(EventFilter::all());
        drop(sub);
        publisher.publish(progress(EntityKind::Item, 1));
        assert!(publisher.subscribers().is_empty());
    }

    #[tokio::test]
    async fn test_recv_waits_for_publish() {
        let publisher = Publisher::new(4);
        let mut sub = publisher.subscribe(EventFilter::all());
        let p = publisher.clone();
        tokio::spawn(async move {
            tokio::task::yield_now().await;
            p.publish(error(EntityKind::Spell, "late"));
        });
        assert_eq!(sub.recv().await, Some(error(EntityKind::Spell, "late")));
    }

    #[tokio::test]
    async fn test_recv_ends_after_close() {
        let publisher = Publisher::new(4);
        let mut sub = publisher.subscribe(EventFilter::all());
        publisher.publish(progress(EntityKind::Item, 1));
        publisher.close();
        assert_eq!(sub.recv().await, Some(progress(EntityKind::Item, 1)));
        assert_eq!(sub.recv().await, None);
    }

    #[tokio::test]
    async fn test_recv_ends_when_publisher_dropped() {
        let publisher = Publisher::new(4);
        let mut sub = publisher.subscribe(EventFilter::all());
        drop(publisher);
        assert_eq!(sub.recv().await, None);
    }
}
