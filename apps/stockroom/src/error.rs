//! # API Error Type
//!
//! Unified error type for CLI commands.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Flow in Stockroom                              │
//! │                                                                         │
//! │  Command Function -> ApiResult<String>                                  │
//! │         │                                                               │
//! │         ├── DbError::Rejected(InsufficientStock) ──┐                    │
//! │         ├── DbError::QueryFailed("...") ───────────┤                    │
//! │         ├── SyncError::ConnectionFailed ───────────┼──► ApiError        │
//! │         └── CoreError::Validation ─────────────────┘      │             │
//! │                                                           ▼             │
//! │                                       stderr: status line, exit 1       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The serialized shape matches what a UI client would receive:
//! `{ "code": "INSUFFICIENT_STOCK", "message": "..." }`.

use serde::Serialize;
use stockroom_core::{CoreError, ValidationError};
use stockroom_db::DbError;
use stockroom_sync::SyncError;

/// Result type for commands.
pub type ApiResult<T> = Result<T, ApiError>;

/// Error returned from commands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiError {
    /// Machine-readable error code
    pub code: ErrorCode,

    /// Human-readable status line
    pub message: String,
}

/// Error codes for command failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Product, sale, transaction or user missing
    NotFound,

    /// Input validation failed
    ValidationError,

    /// Database operation failed
    DatabaseError,

    /// Sale quantity above the available stock
    InsufficientStock,

    /// Wrong username or password
    AuthFailed,

    /// Remote store unreachable or rejected the request
    RemoteError,

    /// Snapshot or archive operation failed
    BackupError,

    /// Config file or settings invalid
    ConfigError,

    /// Internal error
    Internal,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        ApiError {
            code,
            message: message.into(),
        }
    }

    pub fn not_found(resource: &str, id: impl std::fmt::Display) -> Self {
        ApiError::new(ErrorCode::NotFound, format!("{resource} not found: {id}"))
    }

    pub fn validation(message: impl Into<String>) -> Self {
        ApiError::new(ErrorCode::ValidationError, message)
    }

    pub fn auth(message: impl Into<String>) -> Self {
        ApiError::new(ErrorCode::AuthFailed, message)
    }

    pub fn backup(message: impl Into<String>) -> Self {
        ApiError::new(ErrorCode::BackupError, message)
    }

    pub fn config(message: impl Into<String>) -> Self {
        ApiError::new(ErrorCode::ConfigError, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        ApiError::new(ErrorCode::Internal, message)
    }

    /// Error for commands that need a remote store.
    pub fn remote_disabled() -> Self {
        ApiError::config("Remote store is not configured. Set [remote] url and enabled = true.")
    }
}

/// Converts database errors to API errors.
impl From<DbError> for ApiError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => ApiError::not_found(&entity, id),
            DbError::UniqueViolation { field, value } => {
                ApiError::validation(format!("{field} '{value}' already exists"))
            }
            DbError::Rejected(core) => core.into(),
            DbError::ConnectionFailed(e) => {
                tracing::error!("Database connection failed: {}", e);
                ApiError::new(ErrorCode::DatabaseError, "Database connection failed")
            }
            DbError::MigrationFailed(e) => {
                tracing::error!("Migration failed: {}", e);
                ApiError::new(ErrorCode::DatabaseError, "Database migration failed")
            }
            DbError::QueryFailed(e) => {
                tracing::error!("Database query failed: {}", e);
                ApiError::new(ErrorCode::DatabaseError, "Database operation failed")
            }
            DbError::TransactionFailed(e) => {
                tracing::error!("Transaction failed: {}", e);
                ApiError::new(ErrorCode::DatabaseError, "Database transaction failed")
            }
            DbError::ForeignKeyViolation { message } => {
                tracing::error!("Foreign key violation: {}", message);
                ApiError::validation("Invalid reference")
            }
            DbError::PoolExhausted => {
                ApiError::new(ErrorCode::DatabaseError, "Database pool exhausted")
            }
            DbError::Internal(e) => {
                tracing::error!("Internal database error: {}", e);
                ApiError::new(ErrorCode::DatabaseError, "Database operation failed")
            }
        }
    }
}

/// Converts core errors to API errors.
impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ProductNotFound(id) => ApiError::not_found("Product", id),
            CoreError::SaleNotFound(id) => ApiError::not_found("Sale", id),
            CoreError::TransactionNotFound(id) => ApiError::not_found("Transaction", id),
            e @ CoreError::InsufficientStock { .. } => {
                ApiError::new(ErrorCode::InsufficientStock, e.to_string())
            }
            CoreError::EmptyCart => ApiError::validation("Cart is empty"),
            CoreError::Validation(e) => e.into(),
        }
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::validation(err.to_string())
    }
}

/// Converts sync errors to API errors.
impl From<SyncError> for ApiError {
    fn from(err: SyncError) -> Self {
        if err.is_config_error() {
            return ApiError::config(err.to_string());
        }
        match err {
            SyncError::DatabaseError(e) => {
                tracing::error!("Database error during sync: {}", e);
                ApiError::new(ErrorCode::DatabaseError, "Database operation failed")
            }
            e @ (SyncError::BackupFailed(_)
            | SyncError::ArchiveEntryMissing { .. }
            | SyncError::Io(_)) => ApiError::backup(e.to_string()),
            e @ SyncError::ChannelError(_) => ApiError::internal(e.to_string()),
            e => ApiError::new(ErrorCode::RemoteError, e.to_string()),
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{:?}] {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}
