//! # Application State
//!
//! The open database, the loaded config and, when enabled, the remote store.
//!
//! ## After-Change Hooks
//! ```text
//! product add/update/restock ──► after_product_change(ids)
//! sale sell/checkout ──────────► after_sales(sales)
//!                                    │
//!                                    ├─ remote enabled? push each record
//!                                    │  (stamp now + overwrite remote copy)
//!                                    │
//!                                    └─ checkpoint WAL, write backup_*.zip,
//!                                       prune to max_backups
//! ```
//!
//! Hook failures are logged and never fail the command: the local write
//! has already happened.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use stockroom_core::Sale;
use stockroom_db::{Database, DbConfig};
use stockroom_sync::{
    ChangeFeed, FirebaseClient, RemotePath, RemoteStore, RotatingBackup, StockroomConfig,
    Synchronizer,
};
use tracing::{debug, info, warn};

use crate::error::{ApiError, ApiResult};

// =============================================================================
// Remote
// =============================================================================

/// Both halves of the remote store, held as trait objects.
#[derive(Clone)]
pub struct Remote {
    store: Arc<dyn RemoteStore>,
    feed: Arc<dyn ChangeFeed>,
}

impl Remote {
    pub fn new<R>(remote: Arc<R>) -> Self
    where
        R: RemoteStore + ChangeFeed + 'static,
    {
        Remote {
            store: remote.clone(),
            feed: remote,
        }
    }

    /// Builds the Firebase client, or `None` while the remote is disabled.
    pub fn from_config(config: &StockroomConfig) -> ApiResult<Option<Self>> {
        let Some(settings) = config.firebase_config()? else {
            debug!("Remote store disabled");
            return Ok(None);
        };

        let client = FirebaseClient::new(settings)?;
        info!(url = %client.base_url(), "Remote store enabled");
        Ok(Some(Remote::new(Arc::new(client))))
    }

    pub fn store(&self) -> Arc<dyn RemoteStore> {
        Arc::clone(&self.store)
    }

    pub fn feed(&self) -> Arc<dyn ChangeFeed> {
        Arc::clone(&self.feed)
    }
}

// =============================================================================
// Opening
// =============================================================================

/// Opens (creating if needed) the configured database file.
pub async fn open_database(config: &StockroomConfig) -> ApiResult<Database> {
    let path = &config.database.path;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(|e| {
            ApiError::config(format!("Cannot create {}: {e}", parent.display()))
        })?;
    }

    let db_config =
        DbConfig::new(path).bootstrap_admin_password(config.auth.bootstrap_admin_password.clone());
    Ok(Database::new(db_config).await?)
}

/// Archive rotation for the configured database and backup directory.
pub fn rotating_backup(config: &StockroomConfig) -> RotatingBackup {
    RotatingBackup::new(&config.database.path, config.backup_dir())
        .with_max_backups(config.backup.max_backups)
}

// =============================================================================
// AppState
// =============================================================================

/// Everything a command runs against.
pub struct AppState {
    config: StockroomConfig,
    db: Database,
    remote: Option<Remote>,
}

impl AppState {
    /// Opens the database and builds the remote client from `config`.
    pub async fn open(config: StockroomConfig) -> ApiResult<Self> {
        let remote = Remote::from_config(&config)?;
        Self::open_with(config, remote).await
    }

    /// Opens the database with an already-built remote.
    pub async fn open_with(config: StockroomConfig, remote: Option<Remote>) -> ApiResult<Self> {
        let db = open_database(&config).await?;
        Ok(Self::with_parts(config, db, remote))
    }

    pub fn with_parts(config: StockroomConfig, db: Database, remote: Option<Remote>) -> Self {
        AppState { config, db, remote }
    }

    pub fn config(&self) -> &StockroomConfig {
        &self.config
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn remote(&self) -> Option<&Remote> {
        self.remote.as_ref()
    }

    /// Push/pull engine, `None` while the remote is disabled.
    pub fn synchronizer(&self) -> Option<Synchronizer> {
        self.remote
            .as_ref()
            .map(|remote| Synchronizer::new(self.db.clone(), remote.store()))
    }

    /// Like [`Self::synchronizer`], for commands that cannot work offline.
    pub fn require_synchronizer(&self) -> ApiResult<Synchronizer> {
        self.synchronizer().ok_or_else(ApiError::remote_disabled)
    }

    // =========================================================================
    // After-Change Hooks
    // =========================================================================

    /// Pushes changed products, then rotates the local backup.
    pub async fn after_product_change(&self, ids: &[i64]) {
        if let Some(sync) = self.synchronizer() {
            for &id in ids {
                if let Err(e) = sync.push_product(id).await {
                    warn!(id, error = %e, "Failed to push product");
                }
            }
        }
        self.auto_backup().await;
    }

    /// Removes deleted products from the remote, then rotates the backup.
    pub async fn after_products_removed(&self, ids: &[i64]) {
        if let Some(sync) = self.synchronizer() {
            for &id in ids {
                if let Err(e) = sync.remove_product(id).await {
                    warn!(id, error = %e, "Failed to remove remote product");
                }
            }
        }
        self.auto_backup().await;
    }

    /// Pushes new sales and the products whose stock they changed.
    pub async fn after_sales(&self, sales: &[Sale]) {
        if let Some(sync) = self.synchronizer() {
            for sale in sales {
                if let Err(e) = sync.push_sale(sale.id).await {
                    warn!(id = sale.id, error = %e, "Failed to push sale");
                }
            }
            let products: BTreeSet<i64> = sales.iter().map(|s| s.product_id).collect();
            for id in products {
                if let Err(e) = sync.push_product(id).await {
                    warn!(id, error = %e, "Failed to push product");
                }
            }
        }
        self.auto_backup().await;
    }

    /// Removes deleted sales from the remote, then rotates the backup.
    pub async fn after_sales_removed(&self, ids: &[i64]) {
        if let Some(remote) = &self.remote {
            for &id in ids {
                let path = RemotePath::sale(id);
                if let Err(e) = remote.store.remove(path.as_str()).await {
                    warn!(id, error = %e, "Failed to remove remote sale");
                }
            }
        }
        self.auto_backup().await;
    }

    // =========================================================================
    // Local Backups
    // =========================================================================

    /// Writes an archive now. The WAL is folded in first so the file is whole.
    pub async fn backup_now(&self) -> ApiResult<PathBuf> {
        self.db.checkpoint().await?;
        let rotation = rotating_backup(&self.config);
        tokio::task::spawn_blocking(move || rotation.create())
            .await
            .map_err(|e| ApiError::internal(format!("Backup task failed: {e}")))?
            .map_err(ApiError::from)
    }

    /// Best-effort archive after a mutation.
    pub async fn auto_backup(&self) {
        if !self.db.path().is_file() {
            debug!(path = %self.db.path().display(), "No database file to back up");
            return;
        }
        match self.backup_now().await {
            Ok(path) => debug!(path = %path.display(), "Automatic backup written"),
            Err(e) => warn!(error = %e, "Automatic backup failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use stockroom_core::NewProduct;
    use stockroom_sync::MemoryRemote;

    fn file_config(dir: &std::path::Path) -> StockroomConfig {
        let mut config = StockroomConfig::default();
        config.database.path = dir.join("data").join("inventory.db");
        config.backup.dir = Some(dir.join("backups"));
        config.backup.max_backups = 2;
        config
    }

    fn rice() -> NewProduct {
        NewProduct {
            name: "Rice".into(),
            category: Some("Grains".into()),
            quantity: 10,
            price: 100.0,
            cost_price: 60.0,
        }
    }

    #[tokio::test]
    async fn test_open_creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let state = AppState::open(file_config(dir.path())).await.unwrap();
        assert!(dir.path().join("data").join("inventory.db").is_file());
        assert!(state.synchronizer().is_none());
        assert!(state.require_synchronizer().is_err());
    }

    #[tokio::test]
    async fn test_product_change_pushes_and_rotates() {
        let dir = tempfile::tempdir().unwrap();
        let remote = Arc::new(MemoryRemote::new());
        let state = AppState::open_with(file_config(dir.path()), Some(Remote::new(remote.clone())))
            .await
            .unwrap();

        let product = state.db().products().insert(&rice()).await.unwrap();
        for _ in 0..3 {
            state.after_product_change(&[product.id]).await;
        }

        let stored = remote
            .get(&format!("/products/{}", product.id))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored["name"], "Rice");
        assert_eq!(rotating_backup(state.config()).list().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_sales_push_sale_and_product() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let remote = Arc::new(MemoryRemote::new());
        let state = AppState::with_parts(
            StockroomConfig::default(),
            db,
            Some(Remote::new(remote.clone())),
        );

        let product = state.db().products().insert(&rice()).await.unwrap();
        let outcome = state
            .db()
            .sales()
            .record_sale(product.id, 3, None)
            .await
            .unwrap();
        state.after_sales(&[outcome.sale.clone()]).await;

        let snapshot = remote.snapshot();
        assert_eq!(snapshot["products"][product.id.to_string()]["quantity"], json!(7));
        assert_eq!(
            snapshot["sales"][outcome.sale.id.to_string()]["quantity_sold"],
            json!(3)
        );

        state.after_sales_removed(&[outcome.sale.id]).await;
        assert!(remote.get("/sales").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_offline_remote_does_not_fail_hooks() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let remote = Arc::new(MemoryRemote::new());
        remote.set_offline(true);
        let state = AppState::with_parts(StockroomConfig::default(), db, Some(Remote::new(remote)));

        let product = state.db().products().insert(&rice()).await.unwrap();
        state.after_product_change(&[product.id]).await;
        state.after_products_removed(&[product.id]).await;
    }
}
