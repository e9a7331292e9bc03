//! Remote store contract
//!
//! The console talks to a path-addressed, subscribable key-value store:
//! - atomic single-path writes
//! - every subscriber of a path receives the full value (never a diff) on
//!   subscribe and after each change, in commit order for that path
//! - no ordering guarantee across different paths
//! - `push` appends under an auto-generated, chronologically ordered key
//!
//! [`MemoryStore`] implements the contract in-process.

pub mod memory;
pub mod path;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;

pub use memory::MemoryStore;
pub use path::StorePath;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Invalid path segment: {0}")]
    InvalidPath(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Full-value change feed for one path. `None` means the path holds nothing.
pub struct Subscription {
    path: StorePath,
    rx: mpsc::UnboundedReceiver<Option<Value>>,
}

impl Subscription {
    pub fn new(path: StorePath, rx: mpsc::UnboundedReceiver<Option<Value>>) -> Self {
        Self { path, rx }
    }

    pub fn path(&self) -> &StorePath {
        &self.path
    }

    /// Next full value. Returns `None` once the store drops the feed.
    pub async fn next(&mut self) -> Option<Option<Value>> {
        self.rx.recv().await
    }
}

#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// One-shot read of the current value.
    async fn get(&self, path: &StorePath) -> Result<Option<Value>, StoreError>;

    /// Overwrite the value at `path`. Writing `null` or an empty object removes it.
    async fn set(&self, path: &StorePath, value: Value) -> Result<(), StoreError>;

    /// Append under a new auto-generated key and return that key.
    async fn push(&self, path: &StorePath, value: Value) -> Result<String, StoreError>;

    async fn remove(&self, path: &StorePath) -> Result<(), StoreError>;

    /// Subscribe to full-value changes. The current value arrives first.
    async fn subscribe(&self, path: &StorePath) -> Result<Subscription, StoreError>;
}

/// Serialize and write.
pub async fn write_typed<T: Serialize + ?Sized>(
    store: &dyn RemoteStore,
    path: &StorePath,
    value: &T,
) -> Result<(), StoreError> {
    store.set(path, serde_json::to_value(value)?).await
}

/// Read and deserialize. Absent values come back as `None`.
pub async fn read_typed<T: DeserializeOwned>(
    store: &dyn RemoteStore,
    path: &StorePath,
) -> Result<Option<T>, StoreError> {
    match store.get(path).await? {
        Some(value) => Ok(Some(serde_json::from_value(value)?)),
        None => Ok(None),
    }
}
