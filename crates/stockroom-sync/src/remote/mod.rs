//! # Remote Store
//!
//! The realtime database is a JSON tree addressed by slash-separated paths.
//! Two traits split what the synchronizer needs from it:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  RemoteStore  get / set / update / remove   (request-response)          │
//! │  ChangeFeed   subscribe(collection)         (stream of ChangeEvent)     │
//! │                                                                         │
//! │         ┌──────────────────┐          ┌──────────────────┐              │
//! │         │  FirebaseClient  │          │   MemoryRemote   │              │
//! │         │  REST + SSE      │          │   in-process     │              │
//! │         └──────────────────┘          └──────────────────┘              │
//! │                                                                         │
//! │  /products/{id}   /sales/{id}   /users/{uid}   /backups/inventory_db    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A change event carries a path relative to the subscribed collection:
//! `/` (whole collection), `/14` (one record) or `/14/quantity` (one field).

pub mod firebase;
pub mod memory;
pub mod sse;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::error::SyncResult;

pub use firebase::{FirebaseClient, FirebaseConfig};
pub use memory::MemoryRemote;

// =============================================================================
// Paths
// =============================================================================

/// Top-level collections mirrored between devices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Products,
    Sales,
    Users,
}

impl Collection {
    /// Collections merged into the local database by listeners.
    pub const MIRRORED: [Collection; 2] = [Collection::Products, Collection::Sales];

    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Products => "products",
            Collection::Sales => "sales",
            Collection::Users => "users",
        }
    }

    /// Whether remote changes to this collection are applied locally.
    /// Users are push-only.
    pub fn is_mirrored(&self) -> bool {
        !matches!(self, Collection::Users)
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An absolute path in the remote tree, always `/`-prefixed and without a
/// trailing slash.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RemotePath(String);

impl RemotePath {
    /// Location of the whole-database snapshot blob.
    pub const BACKUP: &'static str = "/backups/inventory_db";

    pub fn new(path: &str) -> Self {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        RemotePath(format!("/{}", segments.join("/")))
    }

    pub fn collection(collection: Collection) -> Self {
        RemotePath(format!("/{collection}"))
    }

    pub fn record(collection: Collection, key: impl fmt::Display) -> Self {
        RemotePath(format!("/{collection}/{key}"))
    }

    pub fn product(id: i64) -> Self {
        Self::record(Collection::Products, id)
    }

    pub fn sale(id: i64) -> Self {
        Self::record(Collection::Sales, id)
    }

    pub fn user(uid: &str) -> Self {
        Self::record(Collection::Users, uid)
    }

    pub fn backup() -> Self {
        RemotePath(Self::BACKUP.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Path segments, empty for the root.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').filter(|s| !s.is_empty())
    }

    /// Appends a relative path (as found in patch payload keys).
    pub fn join(&self, relative: &str) -> Self {
        Self::new(&format!("{}/{}", self.0, relative))
    }
}

impl fmt::Display for RemotePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RemotePath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// =============================================================================
// Change Events
// =============================================================================

/// Kind of change reported by a feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    /// `data` replaces whatever was at `path` (null means deleted).
    Put,
    /// Each key of `data` is a path relative to `path` whose value was replaced.
    Patch,
}

/// One notification from a change feed.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub kind: EventKind,
    /// Path relative to the subscribed collection, `/`-prefixed.
    pub path: String,
    pub data: Value,
}

impl ChangeEvent {
    pub fn put(path: impl Into<String>, data: Value) -> Self {
        ChangeEvent {
            kind: EventKind::Put,
            path: path.into(),
            data,
        }
    }

    pub fn patch(path: impl Into<String>, data: Value) -> Self {
        ChangeEvent {
            kind: EventKind::Patch,
            path: path.into(),
            data,
        }
    }
}

/// Where inside a collection an event path points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventTarget<'a> {
    /// The whole collection; data is an object (or array) of records.
    Root,
    /// One complete record.
    Record(&'a str),
    /// A field (or deeper) inside a record.
    Field { key: &'a str, field: &'a str },
}

impl<'a> EventTarget<'a> {
    pub fn parse(path: &'a str) -> Self {
        let trimmed = path.trim_matches('/');
        if trimmed.is_empty() {
            return EventTarget::Root;
        }
        match trimmed.split_once('/') {
            None => EventTarget::Record(trimmed),
            Some((key, field)) => EventTarget::Field { key, field },
        }
    }
}

/// Children of a collection node.
///
/// The REST API returns a JSON array instead of an object when all keys are
/// small consecutive integers; array holes come back as `null` and are
/// skipped. Returns `None` for anything that is not a container.
pub fn children(value: &Value) -> Option<Vec<(String, &Value)>> {
    match value {
        Value::Object(map) => Some(
            map.iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k.clone(), v))
                .collect(),
        ),
        Value::Array(items) => Some(
            items
                .iter()
                .enumerate()
                .filter(|(_, v)| !v.is_null())
                .map(|(i, v)| (i.to_string(), v))
                .collect(),
        ),
        _ => None,
    }
}

// =============================================================================
// Traits
// =============================================================================

/// Request-response access to the remote tree.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Reads the value at `path`, `None` when nothing is stored there.
    async fn get(&self, path: &str) -> SyncResult<Option<Value>>;

    /// Overwrites the value at `path`.
    async fn set(&self, path: &str, value: &Value) -> SyncResult<()>;

    /// Overwrites only the given children of `path`.
    async fn update(&self, path: &str, fields: &Map<String, Value>) -> SyncResult<()>;

    /// Deletes the value at `path`.
    async fn remove(&self, path: &str) -> SyncResult<()>;
}

/// Stream of change events for one collection.
pub type ChangeStream = BoxStream<'static, SyncResult<ChangeEvent>>;

/// Subscription to remote changes.
///
/// The first event of a fresh subscription is a `put` at `/` carrying the
/// current contents of the collection. The stream ends when the feed gives
/// up; errors that end it are yielded first.
pub trait ChangeFeed: Send + Sync {
    fn subscribe(&self, collection: Collection) -> ChangeStream;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_remote_paths() {
        assert_eq!(RemotePath::product(14).as_str(), "/products/14");
        assert_eq!(RemotePath::sale(3).as_str(), "/sales/3");
        assert_eq!(RemotePath::user("u-1").as_str(), "/users/u-1");
        assert_eq!(RemotePath::backup().as_str(), "/backups/inventory_db");
        assert_eq!(RemotePath::new("products//14/").as_str(), "/products/14");
        assert_eq!(RemotePath::new("").as_str(), "/");
        assert_eq!(
            RemotePath::collection(Collection::Sales).join("7/quantity_sold").as_str(),
            "/sales/7/quantity_sold"
        );

        let path = RemotePath::product(14);
        let segments: Vec<_> = path.segments().collect();
        assert_eq!(segments, vec!["products", "14"]);
        assert_eq!(RemotePath::new("/").segments().count(), 0);
    }

    #[test]
    fn test_event_target() {
        assert_eq!(EventTarget::parse("/"), EventTarget::Root);
        assert_eq!(EventTarget::parse(""), EventTarget::Root);
        assert_eq!(EventTarget::parse("/14"), EventTarget::Record("14"));
        assert_eq!(
            EventTarget::parse("/14/quantity"),
            EventTarget::Field {
                key: "14",
                field: "quantity"
            }
        );
    }

    #[test]
    fn test_children_of_object_and_array() {
        let object = json!({"1": {"name": "Rice"}, "2": null});
        let kids = children(&object).unwrap();
        assert_eq!(kids.len(), 1);
        assert_eq!(kids[0].0, "1");

        let array = json!([null, {"name": "Rice"}, null, {"name": "Beans"}]);
        let keys: Vec<_> = children(&array).unwrap().into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["1", "3"]);

        assert!(children(&json!("scalar")).is_none());
    }

    #[test]
    fn test_mirrored_collections() {
        assert!(Collection::Products.is_mirrored());
        assert!(Collection::Sales.is_mirrored());
        assert!(!Collection::Users.is_mirrored());
        assert_eq!(Collection::MIRRORED.len(), 2);
    }
}
