//! In-process store backend.
//!
//! One `MemoryStore` plays the role of the shared remote database: every
//! client handle in a test (or an offline game) talks to the same
//! instance. Writes are serialized by a single mutex, which also gives
//! `remove_all` its all-or-nothing guarantee. Test controls
//! (`set_online`, `deny_writes`, `simulate_disconnect`) model transport
//! loss, permission failures, and ungraceful disconnects.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tandem_schema::Path;
use tandem_schema::timestamp::SERVER_VALUE_KEY;
use tokio::sync::{mpsc, watch};

use crate::backend::{ChildEvent, ChildFeed, Store, ValueFeed};
use crate::StoreError;

pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
    connectivity_tx: watch::Sender<bool>,
    key_counter: AtomicU64,
}

struct Inner {
    root: Value,
    value_watchers: Vec<ValueWatcher>,
    child_watchers: Vec<ChildWatcher>,
    wills: HashMap<Path, Value>,
    online: bool,
    deny_writes: bool,
}

struct ValueWatcher {
    path: Path,
    tx: mpsc::UnboundedSender<Value>,
}

struct ChildWatcher {
    path: Path,
    tx: mpsc::UnboundedSender<ChildEvent>,
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Replace every `{".sv":"timestamp"}` sentinel in the tree with the
/// store clock. Resolution happens at write time, server-side.
fn resolve_sentinels(value: &mut Value, now: u64) {
    match value {
        Value::Object(map) => {
            if map.len() == 1 && map.get(SERVER_VALUE_KEY).and_then(Value::as_str) == Some("timestamp") {
                *value = Value::from(now);
                return;
            }
            for child in map.values_mut() {
                resolve_sentinels(child, now);
            }
        }
        Value::Array(items) => {
            for item in items.iter_mut() {
                resolve_sentinels(item, now);
            }
        }
        _ => {}
    }
}

fn node<'a>(root: &'a Value, path: &Path) -> Option<&'a Value> {
    let mut current = root;
    for segment in path.segments() {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

fn exists(root: &Value, path: &Path) -> bool {
    node(root, path).is_some_and(|v| !v.is_null())
}

fn write_node(root: &mut Value, path: &Path, value: Value) {
    let mut current = root;
    for segment in path.segments() {
        if !current.is_object() {
            *current = Value::Object(Map::new());
        }
        current = current
            .as_object_mut()
            .expect("just coerced to object")
            .entry(segment.to_string())
            .or_insert(Value::Null);
    }
    *current = value;
}

fn remove_node(root: &mut Value, path: &Path) {
    let segments: Vec<&str> = path.segments().collect();
    let Some((leaf, parents)) = segments.split_last() else {
        return;
    };
    let mut current = root;
    for segment in parents {
        match current.as_object_mut().and_then(|m| m.get_mut(*segment)) {
            Some(next) => current = next,
            None => return,
        }
    }
    if let Some(map) = current.as_object_mut() {
        map.remove(*leaf);
    }
}

/// Records carry their own resolved write time; fall back to `default`
/// for plain values.
fn record_timestamp(value: &Value, default: u64) -> u64 {
    value
        .get("timestamp")
        .and_then(Value::as_u64)
        .unwrap_or(default)
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Flip transport connectivity. Going offline makes every round trip
    /// fail with `Unavailable`; coming back online only restores the
    /// signal — draining queues and re-probing is the client's job.
    pub fn set_online(&self, online: bool) {
        tracing::debug!(online, "connectivity changed");
        self.lock().online = online;
        let _ = self.connectivity_tx.send(online);
    }

    /// Make every write fail with `PermissionDenied`.
    pub fn deny_writes(&self, deny: bool) {
        self.lock().deny_writes = deny;
    }

    /// Model an ungraceful disconnect: registered last-wills are applied
    /// by the "server", then connectivity drops.
    pub fn simulate_disconnect(&self) {
        let mut inner = self.lock();
        let now = now_millis();
        let wills: Vec<(Path, Value)> = inner.wills.drain().collect();
        tracing::info!(wills = wills.len(), "ungraceful disconnect; applying last-wills");
        for (path, mut value) in wills {
            resolve_sentinels(&mut value, now);
            let before = inner.root.clone();
            write_node(&mut inner.root, &path, value);
            Self::notify(&mut inner, &path, &before, now);
        }
        inner.online = false;
        drop(inner);
        let _ = self.connectivity_tx.send(false);
    }

    fn guard_write(inner: &Inner, path: &Path) -> Result<(), StoreError> {
        if !inner.online {
            return Err(StoreError::Unavailable);
        }
        if inner.deny_writes {
            return Err(StoreError::PermissionDenied(path.clone()));
        }
        Ok(())
    }

    /// Notify watchers about a change at `written`. Value watchers whose
    /// subtree intersects the write get a fresh complete snapshot; child
    /// watchers get an event for a direct child that was absent in
    /// `before` — re-writing an existing child is not an append.
    fn notify(inner: &mut Inner, written: &Path, before: &Value, now: u64) {
        let root = inner.root.clone();

        inner.value_watchers.retain(|watcher| {
            if !(watcher.path.starts_with(written) || written.starts_with(&watcher.path)) {
                return !watcher.tx.is_closed();
            }
            let snapshot = node(&root, &watcher.path).cloned().unwrap_or(Value::Null);
            watcher.tx.send(snapshot).is_ok()
        });

        inner.child_watchers.retain(|watcher| {
            if watcher.tx.is_closed() {
                return false;
            }
            if !written.starts_with(&watcher.path) || *written == watcher.path {
                return true;
            }
            let depth = watcher.path.segments().count();
            let Some(key) = written.segments().nth(depth) else {
                return true;
            };
            let child_path = watcher.path.child(key);
            if exists(before, &child_path) {
                return true;
            }
            if let Some(value) = node(&root, &child_path) {
                if !value.is_null() {
                    let event = ChildEvent {
                        key: key.to_string(),
                        value: value.clone(),
                        timestamp: record_timestamp(value, now),
                    };
                    return watcher.tx.send(event).is_ok();
                }
            }
            true
        });
    }

    fn write(&self, path: &Path, mut value: Value) -> Result<(), StoreError> {
        let mut inner = self.lock();
        Self::guard_write(&inner, path)?;
        let now = now_millis();
        resolve_sentinels(&mut value, now);
        let before = inner.root.clone();
        if value.is_null() {
            remove_node(&mut inner.root, path);
        } else {
            write_node(&mut inner.root, path, value);
        }
        Self::notify(&mut inner, path, &before, now);
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        // Arc-free construction for embedding; `new` is the normal entry.
        let (connectivity_tx, _) = watch::channel(true);
        Self {
            inner: Arc::new(Mutex::new(Inner {
                root: Value::Object(Map::new()),
                value_watchers: Vec::new(),
                child_watchers: Vec::new(),
                wills: HashMap::new(),
                online: true,
                deny_writes: false,
            })),
            connectivity_tx,
            key_counter: AtomicU64::new(0),
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, path: &Path) -> Result<Option<Value>, StoreError> {
        let inner = self.lock();
        if !inner.online {
            return Err(StoreError::Unavailable);
        }
        Ok(node(&inner.root, path).filter(|v| !v.is_null()).cloned())
    }

    async fn set(&self, path: &Path, value: Value) -> Result<(), StoreError> {
        self.write(path, value)
    }

    async fn update(&self, path: &Path, updates: Map<String, Value>) -> Result<(), StoreError> {
        let mut inner = self.lock();
        Self::guard_write(&inner, path)?;
        let now = now_millis();
        let before = inner.root.clone();
        // Apply every child first, notify after: the merge is atomic and
        // watchers must never see it half-done.
        let mut touched = Vec::with_capacity(updates.len());
        for (key, mut value) in updates {
            resolve_sentinels(&mut value, now);
            let child = path.child(&key);
            if value.is_null() {
                remove_node(&mut inner.root, &child);
            } else {
                write_node(&mut inner.root, &child, value);
            }
            touched.push(child);
        }
        for child in &touched {
            Self::notify(&mut inner, child, &before, now);
        }
        Ok(())
    }

    async fn create(&self, path: &Path, mut value: Value) -> Result<(), StoreError> {
        // Check and write under one lock: this is the store's single
        // atomic creation primitive.
        let mut inner = self.lock();
        Self::guard_write(&inner, path)?;
        if exists(&inner.root, path) {
            return Err(StoreError::AlreadyExists(path.clone()));
        }
        let now = now_millis();
        resolve_sentinels(&mut value, now);
        let before = inner.root.clone();
        write_node(&mut inner.root, path, value);
        Self::notify(&mut inner, path, &before, now);
        Ok(())
    }

    async fn remove(&self, path: &Path) -> Result<(), StoreError> {
        let mut inner = self.lock();
        Self::guard_write(&inner, path)?;
        let now = now_millis();
        let before = inner.root.clone();
        remove_node(&mut inner.root, path);
        Self::notify(&mut inner, path, &before, now);
        Ok(())
    }

    async fn remove_all(&self, paths: &[Path]) -> Result<(), StoreError> {
        let mut inner = self.lock();
        if let Some(first) = paths.first() {
            Self::guard_write(&inner, first)?;
        }
        // All-or-nothing: verify every path before touching any of them.
        for path in paths {
            if !exists(&inner.root, path) {
                return Err(StoreError::NotFound(path.clone()));
            }
        }
        let now = now_millis();
        let before = inner.root.clone();
        for path in paths {
            remove_node(&mut inner.root, path);
            Self::notify(&mut inner, path, &before, now);
        }
        Ok(())
    }

    async fn push(&self, path: &Path, value: Value) -> Result<String, StoreError> {
        let key = self.generate_key();
        self.write(&path.child(&key), value)?;
        Ok(key)
    }

    fn generate_key(&self) -> String {
        let seq = self.key_counter.fetch_add(1, Ordering::Relaxed);
        format!("{:012x}{:06x}", now_millis(), seq)
    }

    async fn server_time(&self) -> Result<u64, StoreError> {
        if !self.lock().online {
            return Err(StoreError::Unavailable);
        }
        Ok(now_millis())
    }

    fn watch(&self, path: &Path) -> ValueFeed {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.lock();
        // Immediate snapshot of whatever is there now, Null included.
        let snapshot = node(&inner.root, path).cloned().unwrap_or(Value::Null);
        let _ = tx.send(snapshot);
        inner.value_watchers.push(ValueWatcher {
            path: path.clone(),
            tx,
        });
        ValueFeed { rx }
    }

    fn watch_children(&self, path: &Path) -> ChildFeed {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.lock();
        let attached_at = now_millis();
        // Existing children replay first, oldest key first; subscribers
        // that only want the live tail filter on record timestamps.
        if let Some(map) = node(&inner.root, path).and_then(Value::as_object) {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            for key in keys {
                if let Some(value) = map.get(key) {
                    if value.is_null() {
                        continue;
                    }
                    let _ = tx.send(ChildEvent {
                        key: key.clone(),
                        value: value.clone(),
                        timestamp: record_timestamp(value, 0),
                    });
                }
            }
        }
        inner.child_watchers.push(ChildWatcher {
            path: path.clone(),
            tx,
        });
        ChildFeed { attached_at, rx }
    }

    fn connectivity(&self) -> watch::Receiver<bool> {
        self.connectivity_tx.subscribe()
    }

    async fn on_disconnect_set(&self, path: &Path, value: Value) -> Result<(), StoreError> {
        let mut inner = self.lock();
        if !inner.online {
            return Err(StoreError::Unavailable);
        }
        inner.wills.insert(path.clone(), value);
        Ok(())
    }

    async fn cancel_on_disconnect(&self, path: &Path) -> Result<(), StoreError> {
        self.lock().wills.remove(path);
        Ok(())
    }
}
