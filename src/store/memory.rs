//! In-process store
//!
//! A JSON tree behind one lock plus a registry of subscribers. Every write
//! happens under the lock, and subscribers whose path overlaps the write are
//! notified before the lock is released, so each path sees changes in commit
//! order. A subscriber is only notified when its own value actually changed.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tracing::debug;

use super::{RemoteStore, StoreError, StorePath, Subscription};

struct Subscriber {
    path: StorePath,
    tx: mpsc::UnboundedSender<Option<Value>>,
}

pub struct MemoryStore {
    root: Mutex<Value>,
    subscribers: DashMap<u64, Subscriber>,
    next_subscriber: AtomicU64,
    push_seq: AtomicU64,
    /// Subtrees whose writes are rejected, like a store security rule.
    denied: DashMap<StorePath, ()>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            root: Mutex::new(Value::Object(Map::new())),
            subscribers: DashMap::new(),
            next_subscriber: AtomicU64::new(0),
            push_seq: AtomicU64::new(0),
            denied: DashMap::new(),
        }
    }

    /// Reject every write at or below `path` until [`MemoryStore::allow_writes`].
    pub fn deny_writes(&self, path: StorePath) {
        self.denied.insert(path, ());
    }

    pub fn allow_writes(&self, path: &StorePath) {
        self.denied.remove(path);
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    fn check_writable(&self, path: &StorePath) -> Result<(), StoreError> {
        if self.denied.iter().any(|entry| entry.key().contains(path)) {
            return Err(StoreError::PermissionDenied(path.to_string()));
        }
        Ok(())
    }

    fn lock_root(&self) -> Result<std::sync::MutexGuard<'_, Value>, StoreError> {
        self.root
            .lock()
            .map_err(|_| StoreError::Unavailable("store lock poisoned".to_string()))
    }

    /// Apply one write and notify overlapping subscribers.
    fn commit(&self, path: &StorePath, value: Option<Value>) -> Result<(), StoreError> {
        self.check_writable(path)?;
        let value = value.map(normalize).filter(|v| !is_empty(v));

        let mut root = self.lock_root()?;

        let affected: Vec<(u64, Option<Value>)> = self
            .subscribers
            .iter()
            .filter(|s| s.path.overlaps(path))
            .map(|s| (*s.key(), read_at(&root, s.path.segments()).cloned()))
            .collect();

        write_at(&mut root, path.segments(), value);

        let mut closed = Vec::new();
        for (id, before) in affected {
            let Some(sub) = self.subscribers.get(&id) else { continue };
            let after = read_at(&root, sub.path.segments()).cloned();
            if after != before && sub.tx.send(after).is_err() {
                closed.push(id);
            }
        }
        drop(root);

        for id in closed {
            self.subscribers.remove(&id);
        }
        debug!(path = %path, "Committed write");
        Ok(())
    }

    fn next_push_key(&self) -> String {
        let seq = self.push_seq.fetch_add(1, Ordering::Relaxed);
        let millis = chrono::Utc::now().timestamp_millis().max(0);
        format!("{millis:013}-{seq:08}")
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn get(&self, path: &StorePath) -> Result<Option<Value>, StoreError> {
        let root = self.lock_root()?;
        Ok(read_at(&root, path.segments()).cloned())
    }

    async fn set(&self, path: &StorePath, value: Value) -> Result<(), StoreError> {
        self.commit(path, Some(value))
    }

    async fn push(&self, path: &StorePath, value: Value) -> Result<String, StoreError> {
        let key = self.next_push_key();
        self.commit(&path.child(&key)?, Some(value))?;
        Ok(key)
    }

    async fn remove(&self, path: &StorePath) -> Result<(), StoreError> {
        self.commit(path, None)
    }

    async fn subscribe(&self, path: &StorePath) -> Result<Subscription, StoreError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let root = self.lock_root()?;

        // Initial value goes out under the lock so no write can slip in between.
        let _ = tx.send(read_at(&root, path.segments()).cloned());
        let id = self.next_subscriber.fetch_add(1, Ordering::Relaxed);
        self.subscribers.insert(
            id,
            Subscriber {
                path: path.clone(),
                tx,
            },
        );
        drop(root);

        debug!(path = %path, id, "Subscribed");
        Ok(Subscription::new(path.clone(), rx))
    }
}

fn read_at<'a>(node: &'a Value, segments: &[String]) -> Option<&'a Value> {
    let mut current = node;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    (!is_empty(current)).then_some(current)
}

fn write_at(node: &mut Value, segments: &[String], value: Option<Value>) {
    let Some((head, rest)) = segments.split_first() else {
        *node = value.unwrap_or_else(|| Value::Object(Map::new()));
        return;
    };

    if !node.is_object() {
        if value.is_none() {
            return;
        }
        *node = Value::Object(Map::new());
    }
    let Some(map) = node.as_object_mut() else { return };

    if rest.is_empty() {
        match value {
            Some(v) => {
                map.insert(head.clone(), v);
            }
            None => {
                map.remove(head);
            }
        }
        return;
    }

    let child = map.entry(head.clone()).or_insert(Value::Null);
    write_at(child, rest, value);
    if is_empty(child) {
        map.remove(head);
    }
}

/// Nulls and empty objects are absence, at any depth.
fn normalize(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, normalize(v)))
                .filter(|(_, v)| !is_empty(v))
                .collect(),
        ),
        other => other,
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}
