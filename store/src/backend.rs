use async_trait::async_trait;
use serde_json::{Map, Value};
use tandem_schema::Path;
use tokio::sync::{mpsc, watch};

use crate::StoreError;

/// One appended child of a watched collection.
#[derive(Debug, Clone)]
pub struct ChildEvent {
    pub key: String,
    pub value: Value,
    /// Server-assigned write time of the record, epoch millis.
    pub timestamp: u64,
}

/// Whole-value subscription. Every message is one complete snapshot of
/// the watched subtree; consumers never observe a torn value. `Null`
/// means the value was removed.
pub struct ValueFeed {
    pub rx: mpsc::UnboundedReceiver<Value>,
}

/// Child-append subscription over a collection path.
pub struct ChildFeed {
    /// Server clock at the moment the subscription was attached. Records
    /// timestamped earlier are history the subscriber may ignore.
    pub attached_at: u64,
    pub rx: mpsc::UnboundedReceiver<ChildEvent>,
}

/// A shared, eventually-consistent replicated store with path-level
/// subscriptions and server-assigned timestamps.
///
/// Write-side guarantees every backend must provide:
/// - writes to a single path are serialized;
/// - [`create`](Store::create) is a single atomic creation (fails on an
///   occupied path);
/// - [`remove_all`](Store::remove_all) removes every given path or none;
/// - timestamp sentinels in written values resolve to the store clock at
///   write time, not the client's.
#[async_trait]
pub trait Store: Send + Sync {
    async fn get(&self, path: &Path) -> Result<Option<Value>, StoreError>;

    async fn set(&self, path: &Path, value: Value) -> Result<(), StoreError>;

    /// Atomic shallow merge: each key in `updates` overwrites that direct
    /// child of `path`. A `Null` value removes the child.
    async fn update(&self, path: &Path, updates: Map<String, Value>) -> Result<(), StoreError>;

    /// Write `value` only if `path` is unoccupied.
    async fn create(&self, path: &Path, value: Value) -> Result<(), StoreError>;

    async fn remove(&self, path: &Path) -> Result<(), StoreError>;

    /// Remove every path atomically, or fail with `NotFound` leaving all
    /// of them intact. This is the critical step concurrent writers race
    /// on: exactly one contender observes success.
    async fn remove_all(&self, paths: &[Path]) -> Result<(), StoreError>;

    /// Append `value` under a fresh server-assigned, time-ordered key.
    async fn push(&self, path: &Path, value: Value) -> Result<String, StoreError>;

    /// A fresh child key without writing anything.
    fn generate_key(&self) -> String;

    async fn server_time(&self) -> Result<u64, StoreError>;

    fn watch(&self, path: &Path) -> ValueFeed;

    fn watch_children(&self, path: &Path) -> ChildFeed;

    /// `true` while the transport considers itself connected.
    fn connectivity(&self) -> watch::Receiver<bool>;

    /// Register a last-will write applied by the store when this client
    /// disconnects ungracefully.
    async fn on_disconnect_set(&self, path: &Path, value: Value) -> Result<(), StoreError>;

    async fn cancel_on_disconnect(&self, path: &Path) -> Result<(), StoreError>;
}
