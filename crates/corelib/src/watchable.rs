//! Awaitable change feed over a keyed map.
//!
//! `WatchableMap` replaces registered callbacks with subscriptions a task can
//! await. Every subscriber owns an unbounded channel of changes, so a slow
//! subscriber never loses a change and never runs code on the publisher's
//! stack. Each change carries the value as of that change (`None` for a
//! deletion), so short-lived values are observed even if they are gone by
//! the time the subscriber runs.
//!
//! # Example
//!
//! ```rust
//! use corelib::watchable::{SubscribeMode, WatchableMap};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let map: WatchableMap<u32, &str> = WatchableMap::new();
//! map.set_key(1, "one");
//!
//! let mut subs = map.subscribe(SubscribeMode::Initial);
//! let change = subs.next().await.unwrap(); // existing entry
//! assert_eq!((change.key, change.value), (1, Some("one")));
//!
//! map.delete_key(&1);
//! let change = subs.next().await.unwrap();
//! assert_eq!((change.key, change.value), (1, None));
//! # }
//! ```

use std::collections::{BTreeMap, VecDeque};

use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;

/// How a new subscription treats entries that already exist.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubscribeMode {
    /// Deliver every existing key once before live changes.
    Initial,
    /// Deliver only changes made after subscribing.
    OnChange,
}

/// One observed mutation of a [`WatchableMap`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Change<K, V> {
    pub key: K,
    /// Value after the change; `None` when the key was deleted.
    pub value: Option<V>,
}

/// Map whose mutations are observable through [`MapSubscription`]s.
///
/// Values are read by cloning, so keep them small.
pub struct WatchableMap<K, V> {
    entries: RwLock<BTreeMap<K, V>>,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<Change<K, V>>>>,
}

impl<K, V> WatchableMap<K, V>
where
    K: Ord + Clone,
    V: Clone + PartialEq,
{
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    pub fn get_key(&self, key: &K) -> Option<V> {
        self.entries.read().get(key).cloned()
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.entries.read().contains_key(key)
    }

    /// Copy of the whole map.
    pub fn snapshot(&self) -> BTreeMap<K, V> {
        self.entries.read().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Insert or replace the value for `key`.
    ///
    /// Subscribers are notified unless the value is unchanged.
    pub fn set_key(&self, key: K, value: V) {
        let mut entries = self.entries.write();
        if entries.get(&key) == Some(&value) {
            return;
        }
        entries.insert(key.clone(), value.clone());
        // Notify under the write lock so `subscribe` sees either the old
        // state plus this change, or the new state without it.
        self.notify(key, Some(value));
    }

    /// Remove `key`, notifying subscribers if it was present.
    pub fn delete_key(&self, key: &K) -> Option<V> {
        let mut entries = self.entries.write();
        let removed = entries.remove(key);
        if removed.is_some() {
            self.notify(key.clone(), None);
        }
        removed
    }

    /// Open a subscription to key changes.
    pub fn subscribe(&self, mode: SubscribeMode) -> MapSubscription<K, V> {
        let (tx, rx) = mpsc::unbounded_channel();
        // Hold the entry lock so no change slips between snapshot and registration.
        let entries = self.entries.read();
        let pending = match mode {
            SubscribeMode::Initial => entries
                .iter()
                .map(|(key, value)| Change {
                    key: key.clone(),
                    value: Some(value.clone()),
                })
                .collect(),
            SubscribeMode::OnChange => VecDeque::new(),
        };
        self.subscribers.lock().push(tx);
        drop(entries);
        MapSubscription { pending, rx }
    }

    /// Number of live subscriptions, as of the last notification.
    pub fn subscriber_count(&self) -> usize {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| !tx.is_closed());
        subscribers.len()
    }

    fn notify(&self, key: K, value: Option<V>) {
        self.subscribers.lock().retain(|tx| {
            tx.send(Change {
                key: key.clone(),
                value: value.clone(),
            })
            .is_ok()
        });
    }
}

impl<K, V> Default for WatchableMap<K, V>
where
    K: Ord + Clone,
    V: Clone + PartialEq,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Stream of changes to a map. Dropping it unsubscribes.
pub struct MapSubscription<K, V> {
    pending: VecDeque<Change<K, V>>,
    rx: mpsc::UnboundedReceiver<Change<K, V>>,
}

impl<K, V> MapSubscription<K, V> {
    /// Next change.
    ///
    /// Returns `None` once the map has been dropped and every queued change
    /// has been delivered. Cancel safe.
    pub async fn next(&mut self) -> Option<Change<K, V>> {
        if let Some(change) = self.pending.pop_front() {
            return Some(change);
        }
        self.rx.recv().await
    }

    /// Next change if one is already queued.
    pub fn try_next(&mut self) -> Option<Change<K, V>> {
        self.pending.pop_front().or_else(|| self.rx.try_recv().ok())
    }
}
