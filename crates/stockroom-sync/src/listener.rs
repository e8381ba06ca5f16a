//! # Change Listeners
//!
//! One long-lived task per mirrored collection, applying remote changes as
//! they arrive.
//!
//! ## Task Layout
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   ChangeFeed::subscribe(products) ──► Listener task ──┐                 │
//! │                                                       ├─► Synchronizer  │
//! │   ChangeFeed::subscribe(sales)    ──► Listener task ──┘   handle_event  │
//! │                                                             │           │
//! │                                              pooled connection per call │
//! │                                                                         │
//! │   ListenerHandle: shutdown() ──► task exits, stream dropped             │
//! │                   is_running() / totals()                               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A stream error is logged and counted; the task keeps reading until the
//! stream itself ends (the transport decides whether to reconnect).

use futures_util::StreamExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::error::{SyncError, SyncResult};
use crate::merge::{SyncReport, Synchronizer};
use crate::remote::{ChangeFeed, ChangeStream, Collection};

// =============================================================================
// Listener
// =============================================================================

/// Consumes one collection's change stream.
pub struct Listener {
    collection: Collection,
    stream: ChangeStream,
    synchronizer: Synchronizer,
    running: Arc<AtomicBool>,
    totals: Arc<Mutex<SyncReport>>,
    shutdown_rx: mpsc::Receiver<()>,
}

/// Handle for controlling a spawned listener.
pub struct ListenerHandle {
    collection: Collection,
    shutdown_tx: mpsc::Sender<()>,
    running: Arc<AtomicBool>,
    totals: Arc<Mutex<SyncReport>>,
    task: JoinHandle<()>,
}

impl ListenerHandle {
    pub fn collection(&self) -> Collection {
        self.collection
    }

    /// True until the task has exited.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst) && !self.task.is_finished()
    }

    /// Sum of every event report handled so far.
    pub fn totals(&self) -> SyncReport {
        *self.totals.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stops the task and waits for it to exit.
    pub async fn shutdown(self) -> SyncResult<()> {
        if self.shutdown_tx.send(()).await.is_err() {
            debug!(collection = %self.collection, "Listener already stopped");
        }
        self.task
            .await
            .map_err(|e| SyncError::ChannelError(format!("Listener task failed: {e}")))
    }
}

impl Listener {
    /// Subscribes to `collection` and spawns the consuming task.
    pub fn spawn(
        collection: Collection,
        feed: Arc<dyn ChangeFeed>,
        synchronizer: Synchronizer,
    ) -> ListenerHandle {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let running = Arc::new(AtomicBool::new(true));
        let totals = Arc::new(Mutex::new(SyncReport::default()));

        let listener = Listener {
            collection,
            stream: feed.subscribe(collection),
            synchronizer,
            running: Arc::clone(&running),
            totals: Arc::clone(&totals),
            shutdown_rx,
        };

        ListenerHandle {
            collection,
            shutdown_tx,
            running,
            totals,
            task: tokio::spawn(listener.run()),
        }
    }

    async fn run(mut self) {
        info!(collection = %self.collection, "Listener starting");

        loop {
            tokio::select! {
                next = self.stream.next() => {
                    match next {
                        Some(Ok(event)) => {
                            let report = self.synchronizer.handle_event(self.collection, &event).await;
                            *self.totals.lock().unwrap_or_else(PoisonError::into_inner) += report;
                        }
                        Some(Err(e)) => {
                            error!(collection = %self.collection, error = %e, "Change stream error");
                            self.totals.lock().unwrap_or_else(PoisonError::into_inner).failed += 1;
                        }
                        None => {
                            debug!(collection = %self.collection, "Change stream ended");
                            break;
                        }
                    }
                }

                _ = self.shutdown_rx.recv() => {
                    info!(collection = %self.collection, "Listener shutting down");
                    break;
                }
            }
        }

        self.running.store(false, Ordering::SeqCst);
        info!(collection = %self.collection, "Listener stopped");
    }
}

// =============================================================================
// Listener Pair
// =============================================================================

/// The products and sales listeners started together.
pub struct Listeners {
    pub products: ListenerHandle,
    pub sales: ListenerHandle,
}

impl Listeners {
    pub fn start(feed: Arc<dyn ChangeFeed>, synchronizer: &Synchronizer) -> Self {
        Listeners {
            products: Listener::spawn(Collection::Products, Arc::clone(&feed), synchronizer.clone()),
            sales: Listener::spawn(Collection::Sales, feed, synchronizer.clone()),
        }
    }

    pub fn is_running(&self) -> bool {
        self.products.is_running() && self.sales.is_running()
    }

    /// Combined totals of both listeners.
    pub fn totals(&self) -> SyncReport {
        let mut totals = self.products.totals();
        totals += self.sales.totals();
        totals
    }

    /// Stops both listeners; the first failure is returned after both ran.
    pub async fn shutdown(self) -> SyncResult<()> {
        let products = self.products.shutdown().await;
        let sales = self.sales.shutdown().await;
        products.and(sales)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::{MemoryRemote, RemoteStore};
    use serde_json::json;
    use std::time::Duration;
    use stockroom_db::{Database, DbConfig};

    async fn setup() -> (Synchronizer, MemoryRemote) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let remote = MemoryRemote::new();
        (Synchronizer::new(db, Arc::new(remote.clone())), remote)
    }

    async fn wait_for<F, Fut>(mut check: F)
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        for _ in 0..200 {
            if check().await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached in time");
    }

    #[tokio::test]
    async fn test_listener_applies_remote_changes() {
        let (sync, remote) = setup().await;
        remote
            .set("/products/1", &json!({"name": "Rice", "quantity": 4, "last_updated": 10.0}))
            .await
            .unwrap();

        let handle = Listener::spawn(Collection::Products, Arc::new(remote.clone()), sync.clone());
        assert!(handle.is_running());

        // Initial snapshot.
        let db = sync.database().clone();
        wait_for(|| {
            let db = db.clone();
            async move { db.products().get_by_id(1).await.unwrap().is_some() }
        })
        .await;

        // Live change.
        remote
            .set("/products/1", &json!({"name": "Rice", "quantity": 9, "last_updated": 20.0}))
            .await
            .unwrap();
        for _ in 0..200 {
            if handle.totals().applied == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(handle.totals().applied, 2);
        assert_eq!(db.products().require(1).await.unwrap().quantity, 9);
        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_listener_stops_when_stream_ends() {
        let (sync, remote) = setup().await;
        let handle = Listener::spawn(Collection::Sales, Arc::new(remote.clone()), sync);

        remote.close_feeds();
        for _ in 0..200 {
            if !handle.is_running() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(!handle.is_running());
        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_pair_shutdown_drops_subscriptions() {
        let (sync, remote) = setup().await;
        let listeners = Listeners::start(Arc::new(remote.clone()), &sync);
        assert!(listeners.is_running());
        assert_eq!(remote.subscriber_count(), 2);

        listeners.shutdown().await.unwrap();
        assert_eq!(remote.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_malformed_event_is_counted_not_fatal() {
        let (sync, remote) = setup().await;
        let listeners = Listeners::start(Arc::new(remote.clone()), &sync);

        remote.set("/products/5", &json!({"quantity": 1})).await.unwrap();
        remote
            .set("/products/6", &json!({"name": "Tea", "quantity": 1, "last_updated": 1.0}))
            .await
            .unwrap();

        let db = sync.database().clone();
        wait_for(|| {
            let db = db.clone();
            async move { db.products().get_by_id(6).await.unwrap().is_some() }
        })
        .await;

        let totals = listeners.totals();
        assert_eq!(totals.quarantined, 1);
        assert!(listeners.is_running());
        listeners.shutdown().await.unwrap();
    }
}
