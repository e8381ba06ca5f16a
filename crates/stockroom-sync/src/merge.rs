//! # Synchronizer
//!
//! Moves records between the local database and the remote store.
//!
//! ## Directions
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  PUSH  local row ──► stamp last_updated = now ──► remote set (always)   │
//! │                                                                         │
//! │  PULL  remote JSON ──► typed record ──► apply if remote_ts > local_ts   │
//! │                           │                                             │
//! │                           └─ malformed → quarantined (warn + count)     │
//! │                                                                         │
//! │  EVENT put/patch at "/"        → every child record                     │
//! │        put at "/{id}"          → that record                            │
//! │        any write "/{id}/field" → re-fetch "/{id}" then apply            │
//! │        null data               → ignored (deletes are not mirrored)     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every record is handled on its own: one failure is logged and counted in
//! the [`SyncReport`], and the batch carries on.

use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;
use std::ops::AddAssign;
use std::sync::Arc;
use stockroom_core::timestamp::now_epoch;
use stockroom_core::User;
use stockroom_db::{Database, MergeOutcome};
use tracing::{debug, error, info, warn};

use crate::error::{SyncError, SyncResult};
use crate::record::{ProductRecord, SaleRecord, UserRecord};
use crate::remote::{children, ChangeEvent, Collection, EventKind, EventTarget, RemotePath, RemoteStore};

// =============================================================================
// Report
// =============================================================================

/// Per-batch counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// Remote records that replaced (or created) local rows.
    pub applied: usize,
    /// Remote records that were not newer than the local row.
    pub skipped: usize,
    /// Local records written to the remote store.
    pub pushed: usize,
    /// Records that hit a database or network error.
    pub failed: usize,
    /// Remote records rejected as malformed.
    pub quarantined: usize,
}

impl SyncReport {
    /// True when nothing failed or was quarantined.
    pub fn is_clean(&self) -> bool {
        self.failed == 0 && self.quarantined == 0
    }

    fn record(&mut self, result: SyncResult<MergeOutcome>, path: &RemotePath) {
        match result {
            Ok(MergeOutcome::Applied) => self.applied += 1,
            Ok(MergeOutcome::Skipped { .. }) => self.skipped += 1,
            Err(SyncError::MalformedRecord { path, reason }) => {
                warn!(%path, %reason, "Quarantined malformed remote record");
                self.quarantined += 1;
            }
            Err(e) => {
                error!(%path, error = %e, "Failed to apply remote record");
                self.failed += 1;
            }
        }
    }
}

impl AddAssign for SyncReport {
    fn add_assign(&mut self, other: Self) {
        self.applied += other.applied;
        self.skipped += other.skipped;
        self.pushed += other.pushed;
        self.failed += other.failed;
        self.quarantined += other.quarantined;
    }
}

impl fmt::Display for SyncReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "applied={} skipped={} pushed={} failed={} quarantined={}",
            self.applied, self.skipped, self.pushed, self.failed, self.quarantined
        )
    }
}

// =============================================================================
// Synchronizer
// =============================================================================

/// Push/pull engine shared by the agent, the listeners and one-shot commands.
#[derive(Clone)]
pub struct Synchronizer {
    db: Database,
    remote: Arc<dyn RemoteStore>,
}

impl Synchronizer {
    pub fn new(db: Database, remote: Arc<dyn RemoteStore>) -> Self {
        Synchronizer { db, remote }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn remote(&self) -> &Arc<dyn RemoteStore> {
        &self.remote
    }

    // =========================================================================
    // Push
    // =========================================================================

    /// Stamps the product and writes it to `/products/{id}`.
    ///
    /// Returns false when the product does not exist locally.
    pub async fn push_product(&self, id: i64) -> SyncResult<bool> {
        let Some(product) = self.db.products().get_by_id(id).await? else {
            return Ok(false);
        };

        let now = now_epoch();
        self.db.merge().stamp_product(id, now).await?;

        let record = ProductRecord {
            last_updated: now,
            ..ProductRecord::from(&product)
        };
        self.remote
            .set(RemotePath::product(id).as_str(), &serde_json::to_value(&record)?)
            .await?;

        debug!(id, ts = now, "Pushed product");
        Ok(true)
    }

    /// Stamps the sale and writes it to `/sales/{id}`.
    ///
    /// Returns false when the sale does not exist locally.
    pub async fn push_sale(&self, id: i64) -> SyncResult<bool> {
        let Some(sale) = self.db.sales().get(id).await? else {
            return Ok(false);
        };

        let now = now_epoch();
        self.db.merge().stamp_sale(id, now).await?;

        let record = SaleRecord {
            last_updated: now,
            ..SaleRecord::from(&sale)
        };
        self.remote
            .set(RemotePath::sale(id).as_str(), &serde_json::to_value(&record)?)
            .await?;

        debug!(id, ts = now, "Pushed sale");
        Ok(true)
    }

    /// Pushes every local product and sale.
    pub async fn push_all(&self) -> SyncReport {
        let mut report = SyncReport::default();

        match self.db.products().ids().await {
            Ok(ids) => {
                for id in ids {
                    Self::count_push(&mut report, "product", id, self.push_product(id).await);
                }
            }
            Err(e) => {
                error!(error = %e, "Could not list local products for upload");
                report.failed += 1;
            }
        }

        match self.db.sales().ids().await {
            Ok(ids) => {
                for id in ids {
                    Self::count_push(&mut report, "sale", id, self.push_sale(id).await);
                }
            }
            Err(e) => {
                error!(error = %e, "Could not list local sales for upload");
                report.failed += 1;
            }
        }

        info!(%report, "Upload complete");
        report
    }

    fn count_push(report: &mut SyncReport, kind: &str, id: i64, result: SyncResult<bool>) {
        match result {
            Ok(true) => report.pushed += 1,
            Ok(false) => debug!(kind, id, "Row vanished before upload"),
            Err(e) => {
                error!(kind, id, error = %e, "Upload failed");
                report.failed += 1;
            }
        }
    }

    /// Removes a deleted product from the remote store.
    pub async fn remove_product(&self, id: i64) -> SyncResult<()> {
        self.remote.remove(RemotePath::product(id).as_str()).await?;
        debug!(id, "Removed remote product");
        Ok(())
    }

    /// Mirrors a staff account (name and role only) to `/users/{uid}`.
    pub async fn push_user(&self, user: &User, email: Option<String>) -> SyncResult<()> {
        let record = UserRecord::new(user, email);
        self.remote
            .set(RemotePath::user(&user.uid).as_str(), &serde_json::to_value(&record)?)
            .await?;
        debug!(username = %user.username, "Pushed user");
        Ok(())
    }

    /// Changes only the `role` field of a mirrored account.
    pub async fn update_user_role(&self, user: &User) -> SyncResult<()> {
        let mut fields = Map::new();
        fields.insert("role".into(), Value::String(user.role.as_str().into()));
        self.remote
            .update(RemotePath::user(&user.uid).as_str(), &fields)
            .await?;
        debug!(username = %user.username, role = %user.role, "Updated remote role");
        Ok(())
    }

    /// Removes a staff account from the remote directory.
    pub async fn remove_user(&self, user: &User) -> SyncResult<()> {
        self.remote.remove(RemotePath::user(&user.uid).as_str()).await?;
        debug!(username = %user.username, "Removed remote user");
        Ok(())
    }

    // =========================================================================
    // Pull
    // =========================================================================

    /// Applies one remote record found at `path` through the newer-wins rule.
    pub async fn apply_record(
        &self,
        collection: Collection,
        path: &RemotePath,
        key: Option<&str>,
        value: &Value,
    ) -> SyncResult<MergeOutcome> {
        let outcome = match collection {
            Collection::Products => {
                let record = ProductRecord::decode(path.as_str(), key, value)?;
                self.db.merge().apply_product(&record.into()).await?
            }
            Collection::Sales => {
                let record = SaleRecord::decode(path.as_str(), key, value)?;
                self.db.merge().apply_sale(&record.into()).await?
            }
            Collection::Users => {
                return Err(SyncError::InvalidConfig("users are not mirrored locally".into()))
            }
        };
        Ok(outcome)
    }

    async fn apply_children(&self, collection: Collection, value: &Value, report: &mut SyncReport) {
        let root = RemotePath::collection(collection);
        let Some(records) = children(value) else {
            report.record(
                Err(SyncError::malformed(root.as_str(), "collection is not an object")),
                &root,
            );
            return;
        };

        for (key, child) in records {
            let path = root.join(&key);
            let result = self.apply_record(collection, &path, Some(&key), child).await;
            report.record(result, &path);
        }
    }

    /// Pulls one whole collection.
    pub async fn pull_collection(&self, collection: Collection) -> SyncResult<SyncReport> {
        let mut report = SyncReport::default();
        let root = RemotePath::collection(collection);

        if let Some(value) = self.remote.get(root.as_str()).await? {
            self.apply_children(collection, &value, &mut report).await;
        }

        debug!(%collection, %report, "Pulled collection");
        Ok(report)
    }

    /// Pulls products, then sales.
    pub async fn pull_all(&self) -> SyncReport {
        let mut report = SyncReport::default();

        for collection in Collection::MIRRORED {
            match self.pull_collection(collection).await {
                Ok(part) => report += part,
                Err(e) => {
                    error!(%collection, error = %e, "Download failed");
                    report.failed += 1;
                }
            }
        }

        info!(%report, "Download complete");
        report
    }

    // =========================================================================
    // Change Events
    // =========================================================================

    /// Applies one change-feed event for `collection`.
    pub async fn handle_event(&self, collection: Collection, event: &ChangeEvent) -> SyncReport {
        let mut report = SyncReport::default();
        if !collection.is_mirrored() {
            return report;
        }

        match event.kind {
            EventKind::Put => {
                self.apply_at(collection, &event.path, &event.data, &mut report)
                    .await;
            }
            EventKind::Patch => match event.data.as_object() {
                Some(fields) => {
                    for (relative, value) in fields {
                        let path = format!("{}/{}", event.path.trim_end_matches('/'), relative);
                        self.apply_at(collection, &path, value, &mut report).await;
                    }
                }
                None => {
                    let path = RemotePath::collection(collection).join(&event.path);
                    report.record(
                        Err(SyncError::malformed(path.as_str(), "patch data is not an object")),
                        &path,
                    );
                }
            },
        }

        if report != SyncReport::default() {
            debug!(%collection, path = %event.path, %report, "Change event handled");
        }
        report
    }

    /// Applies `data` written at `path` (relative to the collection).
    async fn apply_at(&self, collection: Collection, path: &str, data: &Value, report: &mut SyncReport) {
        if data.is_null() {
            debug!(%collection, path, "Remote deletion not mirrored");
            return;
        }

        match EventTarget::parse(path) {
            EventTarget::Root => self.apply_children(collection, data, report).await,
            EventTarget::Record(key) => {
                let full = RemotePath::record(collection, key);
                let result = self.apply_record(collection, &full, Some(key), data).await;
                report.record(result, &full);
            }
            EventTarget::Field { key, .. } => {
                let full = RemotePath::record(collection, key);
                let result = match self.remote.get(full.as_str()).await {
                    Ok(Some(value)) => self.apply_record(collection, &full, Some(key), &value).await,
                    Ok(None) => {
                        debug!(%full, "Record vanished before re-fetch");
                        return;
                    }
                    Err(e) => Err(e),
                };
                report.record(result, &full);
            }
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
