//! Client-local expiry timers
//!
//! Each armed timer deletes one store path when it fires. At most one timer is
//! armed per path: arming again cancels the previous one first. Timers live
//! only in this process; dropping [`ExpiryTimers`] aborts them and the paths
//! stay set.
//!
//! A fired timer checks that it is still the current one and removes the path
//! while holding the registry lock, so `arm` and `cancel` never interleave with
//! a removal that is already in flight.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::store::{RemoteStore, StorePath};

struct Armed {
    id: u64,
    handle: JoinHandle<()>,
}

type ArmedMap = Arc<Mutex<HashMap<StorePath, Armed>>>;

pub struct ExpiryTimers {
    store: Arc<dyn RemoteStore>,
    armed: ArmedMap,
    next_id: AtomicU64,
    closed: Arc<AtomicBool>,
}

impl ExpiryTimers {
    pub fn new(store: Arc<dyn RemoteStore>) -> Self {
        Self {
            store,
            armed: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(0),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Remove `path` from the store after `after`, replacing any timer
    /// already armed for it.
    pub async fn arm(&self, path: StorePath, after: Duration) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut armed = self.armed.lock().await;

        if let Some(previous) = armed.remove(&path) {
            previous.handle.abort();
            debug!(path = %path, "Cancelled previous expiry timer");
        }

        let store = Arc::clone(&self.store);
        let registry = Arc::clone(&self.armed);
        let closed = Arc::clone(&self.closed);
        let task_path = path.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(after).await;

            let mut armed = registry.lock().await;
            let current = armed.get(&task_path).is_some_and(|a| a.id == id);
            if closed.load(Ordering::Acquire) || !current {
                debug!(path = %task_path, "Superseded expiry timer skipped");
                return;
            }
            armed.remove(&task_path);
            match store.remove(&task_path).await {
                Ok(()) => info!(path = %task_path, "Expiry timer fired"),
                Err(e) => error!(path = %task_path, error = %e, "Expiry removal failed"),
            }
        });

        debug!(path = %path, secs = after.as_secs(), "Armed expiry timer");
        armed.insert(path, Armed { id, handle });
    }

    /// Cancel the timer for `path`. Returns whether one was armed.
    ///
    /// Waits for a removal that is already running, so once this returns the
    /// path can be written without a stale timer deleting it.
    pub async fn cancel(&self, path: &StorePath) -> bool {
        match self.armed.lock().await.remove(path) {
            Some(armed) => {
                armed.handle.abort();
                debug!(path = %path, "Cancelled expiry timer");
                true
            }
            None => false,
        }
    }

    pub async fn is_armed(&self, path: &StorePath) -> bool {
        self.armed.lock().await.contains_key(path)
    }
}

impl Drop for ExpiryTimers {
    fn drop(&mut self) {
        self.closed.store(true, Ordering::Release);
        // A firing task holds the lock; the flag stops every other one.
        if let Ok(mut armed) = self.armed.try_lock() {
            for (_, timer) in armed.drain() {
                timer.handle.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;

    fn override_path() -> StorePath {
        StorePath::root("glitches").child("override_state").unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_removes_path() {
        let store = Arc::new(MemoryStore::new());
        let timers = ExpiryTimers::new(store.clone());
        let path = StorePath::root("glitches").child("glitched_command").unwrap();
        store.set(&path, json!("scan")).await.unwrap();

        timers.arm(path.clone(), Duration::from_secs(30)).await;
        assert!(timers.is_armed(&path).await);

        tokio::time::sleep(Duration::from_millis(29_900)).await;
        assert_eq!(store.get(&path).await.unwrap(), Some(json!("scan")));

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(store.get(&path).await.unwrap(), None);
        assert!(!timers.is_armed(&path).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_keeps_value() {
        let store = Arc::new(MemoryStore::new());
        let timers = ExpiryTimers::new(store.clone());
        let path = override_path();
        store.set(&path, json!({"type": "warning", "message": "x"})).await.unwrap();

        timers.arm(path.clone(), Duration::from_secs(5)).await;
        assert!(timers.cancel(&path).await);
        assert!(!timers.cancel(&path).await);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(store.get(&path).await.unwrap().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_timers_leave_path() {
        let store = Arc::new(MemoryStore::new());
        let timers = ExpiryTimers::new(store.clone());
        let path = override_path();
        store.set(&path, json!({"type": "lockout", "message": "x"})).await.unwrap();

        timers.arm(path.clone(), Duration::from_secs(5)).await;
        drop(timers);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(store.get(&path).await.unwrap().is_some());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_replaced_timer_never_removes_new_value() {
        let store = Arc::new(MemoryStore::new());
        let timers = ExpiryTimers::new(store.clone());
        let path = override_path();

        for round in 0..2_000u64 {
            store.set(&path, json!({"message": "old"})).await.unwrap();
            timers.arm(path.clone(), Duration::from_millis(1)).await;
            tokio::time::sleep(Duration::from_micros(round % 1_500)).await;

            // Same order as a session re-trigger: cancel, write, arm.
            timers.cancel(&path).await;
            store.set(&path, json!({"message": "new"})).await.unwrap();
            timers.arm(path.clone(), Duration::from_secs(3600)).await;

            assert_eq!(
                store.get(&path).await.unwrap(),
                Some(json!({"message": "new"})),
                "round {round}"
            );
        }

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(
            store.get(&path).await.unwrap(),
            Some(json!({"message": "new"}))
        );
        assert!(timers.is_armed(&path).await);
    }
}
