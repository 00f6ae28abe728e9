use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use zw_core::definitions::{HomeId, NodeId};
use zw_core::value_id::ValueId;

/// The progress an active network-management command reports to the
/// embedder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Normal,
    Waiting,
    InProgress,
    Completed,
    Failed,
    NodeOk,
    NodeFailed,
}

/// Byte codes for the generic notification variant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationCode {
    MsgComplete,
    Timeout,
    MsgDropped,
    NodeAwake,
    NodeAsleep,
    NodeDead,
    NodeAlive,
    SecurityError,
    /// A frame for a controlled-only (after-mark) class arrived
    ControlledClassActivity,
}

/// Everything the library tells the embedding application, delivered in
/// production order through registered watchers.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    ValueAdded(ValueId),
    ValueChanged(ValueId),
    ValueRemoved(ValueId),
    ValueRefreshed(ValueId),
    Group { node_id: NodeId, group_idx: u8 },
    NodeNew(NodeId),
    NodeAdded(NodeId),
    NodeRemoved(NodeId),
    NodeProtocolInfo(NodeId),
    NodeNaming(NodeId),
    NodeEvent { node_id: NodeId, event: u8 },
    PollingEnabled(ValueId),
    PollingDisabled(ValueId),
    CreateButton(ValueId),
    DeleteButton(ValueId),
    ButtonOn(ValueId),
    ButtonOff(ValueId),
    DriverReady { home_id: HomeId, own_node_id: NodeId },
    DriverFailed,
    DriverReset,
    DriverRemoved,
    EssentialNodeQueriesComplete(NodeId),
    NodeQueriesComplete(NodeId),
    AwakeNodesQueried,
    AllNodesQueriedSomeDead,
    AllNodesQueried,
    Notification {
        node_id: NodeId,
        code: NotificationCode,
    },
    ControllerCommand {
        state: ControllerState,
        error: Option<u8>,
    },
}

pub type WatcherId = u64;
type Watcher = Box<dyn Fn(&Notification) + Send + Sync>;

/// The registered embedder callbacks. Shared between the driver handle
/// (registration) and the actor (delivery).
#[derive(Default)]
pub struct WatcherRegistry {
    watchers: Mutex<Vec<(WatcherId, Watcher)>>,
    next_id: AtomicU64,
    /// Detects watchers that call back into notification delivery
    notifying: AtomicUsize,
}

impl WatcherRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, watcher: impl Fn(&Notification) + Send + Sync + 'static) -> WatcherId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.watchers
            .lock()
            .expect("watcher registry poisoned")
            .push((id, Box::new(watcher)));
        id
    }

    pub fn remove(&self, id: WatcherId) -> bool {
        let mut watchers = self.watchers.lock().expect("watcher registry poisoned");
        let before = watchers.len();
        watchers.retain(|(watcher_id, _)| *watcher_id != id);
        watchers.len() != before
    }

    /// Invokes every watcher synchronously. Returns false if this was a
    /// re-entrant call from within a watcher; the notification is not
    /// delivered then (it would deadlock on the registry lock) and the
    /// caller should surface a warning.
    pub fn notify(&self, notification: &Notification) -> bool {
        let depth = self.notifying.fetch_add(1, Ordering::SeqCst);
        if depth > 0 {
            self.notifying.fetch_sub(1, Ordering::SeqCst);
            return false;
        }
        let watchers = self.watchers.lock().expect("watcher registry poisoned");
        for (_, watcher) in watchers.iter() {
            watcher(notification);
        }
        drop(watchers);
        self.notifying.fetch_sub(1, Ordering::SeqCst);
        true
    }
}

/// The ordered queue of notifications produced while the driver holds
/// node state. Drained only at safe points between transaction steps.
#[derive(Default)]
pub struct NotificationQueue {
    queue: VecDeque<Notification>,
}

impl NotificationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, notification: Notification) {
        self.queue.push_back(notification);
    }

    pub fn pop(&mut self) -> Option<Notification> {
        self.queue.pop_front()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_watchers_see_notifications_in_order() {
        let registry = WatcherRegistry::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        registry.add(move |n| seen_clone.lock().unwrap().push(n.clone()));

        registry.notify(&Notification::NodeAdded(NodeId::new(5)));
        registry.notify(&Notification::NodeQueriesComplete(NodeId::new(5)));

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0], Notification::NodeAdded(NodeId::new(5)));
    }

    #[test]
    fn test_remove_watcher() {
        let registry = WatcherRegistry::new();
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();
        let id = registry.add(move |_| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });

        registry.notify(&Notification::DriverReset);
        assert!(registry.remove(id));
        registry.notify(&Notification::DriverReset);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(!registry.remove(id));
    }

    #[test]
    fn test_queue_is_fifo() {
        let mut queue = NotificationQueue::new();
        queue.push(Notification::NodeNew(NodeId::new(1)));
        queue.push(Notification::NodeAdded(NodeId::new(1)));
        assert_eq!(queue.pop(), Some(Notification::NodeNew(NodeId::new(1))));
        assert_eq!(queue.pop(), Some(Notification::NodeAdded(NodeId::new(1))));
        assert_eq!(queue.pop(), None);
    }
}
