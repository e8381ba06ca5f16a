//! # In-Memory Remote
//!
//! A process-local JSON tree with the same read/write/notify behaviour as
//! the realtime database, for exercising the synchronizer without a network.
//!
//! Writes notify every subscriber of the affected collection:
//! `set`/`remove` produce a `put` (null data for removals), `update`
//! produces a `patch` whose data holds the changed children.

use async_trait::async_trait;
use futures_util::StreamExt;
use serde_json::{Map, Value};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::debug;

use crate::error::{SyncError, SyncResult};
use crate::remote::{ChangeEvent, ChangeFeed, ChangeStream, Collection, RemotePath, RemoteStore};

#[derive(Debug)]
struct Subscriber {
    collection: Collection,
    tx: mpsc::UnboundedSender<SyncResult<ChangeEvent>>,
}

#[derive(Debug)]
struct Inner {
    root: Value,
    subscribers: Vec<Subscriber>,
    offline: bool,
}

/// Shared in-process remote store. Clones see the same tree.
#[derive(Debug, Clone)]
pub struct MemoryRemote {
    inner: Arc<Mutex<Inner>>,
}

impl Default for MemoryRemote {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRemote {
    pub fn new() -> Self {
        MemoryRemote {
            inner: Arc::new(Mutex::new(Inner {
                root: Value::Object(Map::new()),
                subscribers: Vec::new(),
                offline: false,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy of the whole tree.
    pub fn snapshot(&self) -> Value {
        self.lock().root.clone()
    }

    /// While offline, every request fails with `ConnectionFailed`.
    pub fn set_offline(&self, offline: bool) {
        self.lock().offline = offline;
    }

    /// Ends every open change stream.
    pub fn close_feeds(&self) {
        self.lock().subscribers.clear();
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        let mut inner = self.lock();
        inner.subscribers.retain(|s| !s.tx.is_closed());
        inner.subscribers.len()
    }

    fn guard(inner: &Inner) -> SyncResult<()> {
        if inner.offline {
            return Err(SyncError::ConnectionFailed("remote store is offline".into()));
        }
        Ok(())
    }
}

// =============================================================================
// Tree Helpers
// =============================================================================

fn lookup<'a>(root: &'a Value, segments: &[&str]) -> Option<&'a Value> {
    segments
        .iter()
        .try_fold(root, |node, seg| node.as_object()?.get(*seg))
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

/// Stores `value` at `segments`; null deletes.
fn write(root: &mut Value, segments: &[&str], value: Value) {
    let Some((last, parents)) = segments.split_last() else {
        *root = if value.is_null() {
            Value::Object(Map::new())
        } else {
            value
        };
        return;
    };

    let mut node = root;
    for seg in parents {
        if !node.is_object() {
            *node = Value::Object(Map::new());
        }
        node = match node {
            Value::Object(map) => map
                .entry((*seg).to_string())
                .or_insert_with(|| Value::Object(Map::new())),
            _ => return,
        };
    }

    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    if let Value::Object(map) = node {
        if value.is_null() {
            map.remove(*last);
        } else {
            map.insert((*last).to_string(), value);
        }
    }
}

impl Inner {
    /// Delivers an event for a write at `segments` to matching subscribers.
    fn notify(&mut self, segments: &[&str], make: impl Fn(String) -> ChangeEvent) {
        let root = self.root.clone();
        self.subscribers.retain(|sub| {
            let event = match segments.split_first() {
                None => ChangeEvent::put(
                    "/",
                    lookup(&root, &[sub.collection.as_str()])
                        .cloned()
                        .unwrap_or(Value::Null),
                ),
                Some((first, rest)) if *first == sub.collection.as_str() => {
                    make(format!("/{}", rest.join("/")))
                }
                Some(_) => return !sub.tx.is_closed(),
            };
            sub.tx.send(Ok(event)).is_ok()
        });
    }
}

#[async_trait]
impl RemoteStore for MemoryRemote {
    async fn get(&self, path: &str) -> SyncResult<Option<Value>> {
        let inner = self.lock();
        Self::guard(&inner)?;
        let path = RemotePath::new(path);
        let segments: Vec<&str> = path.segments().collect();
        Ok(lookup(&inner.root, &segments)
            .filter(|v| !is_empty(v))
            .cloned())
    }

    async fn set(&self, path: &str, value: &Value) -> SyncResult<()> {
        let mut inner = self.lock();
        Self::guard(&inner)?;
        let path = RemotePath::new(path);
        let segments: Vec<&str> = path.segments().collect();

        write(&mut inner.root, &segments, value.clone());
        inner.notify(&segments, |rel| ChangeEvent::put(rel, value.clone()));
        debug!(%path, "Memory remote set");
        Ok(())
    }

    async fn update(&self, path: &str, fields: &Map<String, Value>) -> SyncResult<()> {
        let mut inner = self.lock();
        Self::guard(&inner)?;
        let path = RemotePath::new(path);
        let segments: Vec<&str> = path.segments().collect();

        for (key, value) in fields {
            let child = path.join(key);
            let child_segments: Vec<&str> = child.segments().collect();
            write(&mut inner.root, &child_segments, value.clone());
        }
        let data = Value::Object(fields.clone());
        inner.notify(&segments, |rel| ChangeEvent::patch(rel, data.clone()));
        debug!(%path, fields = fields.len(), "Memory remote update");
        Ok(())
    }

    async fn remove(&self, path: &str) -> SyncResult<()> {
        let mut inner = self.lock();
        Self::guard(&inner)?;
        let path = RemotePath::new(path);
        let segments: Vec<&str> = path.segments().collect();

        write(&mut inner.root, &segments, Value::Null);
        inner.notify(&segments, |rel| ChangeEvent::put(rel, Value::Null));
        debug!(%path, "Memory remote remove");
        Ok(())
    }
}

impl ChangeFeed for MemoryRemote {
    fn subscribe(&self, collection: Collection) -> ChangeStream {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.lock();

        let current = lookup(&inner.root, &[collection.as_str()])
            .filter(|v| !is_empty(v))
            .cloned()
            .unwrap_or(Value::Null);
        let _ = tx.send(Ok(ChangeEvent::put("/", current)));

        inner.subscribers.push(Subscriber { collection, tx });
        UnboundedReceiverStream::new(rx).boxed()
    }
}
