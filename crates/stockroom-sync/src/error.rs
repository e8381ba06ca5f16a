//! # Sync Error Types
//!
//! Error types for remote mirroring and backups.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sync Error Categories                             │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │   Transport     │  │     Protocol            │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  InvalidConfig  │  │  Connection     │  │  InvalidEvent           │ │
//! │  │  InvalidUrl     │  │  Timeout        │  │  MalformedRecord        │ │
//! │  │  ConfigLoad/Save│  │  HttpStatus     │  │  SerializationFailed    │ │
//! │  └─────────────────┘  │  StreamCancelled│  └─────────────────────────┘ │
//! │                       │  AuthRevoked    │                              │
//! │                       └─────────────────┘                              │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │    Database     │  │     Backup      │  │      Internal           │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  DatabaseError  │  │  BackupFailed   │  │  ChannelError           │ │
//! │  │                 │  │  EntryMissing   │  │                         │ │
//! │  │                 │  │  Io             │  │                         │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Sync error type covering remote, merge and backup failures.
#[derive(Debug, Error)]
pub enum SyncError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid configuration value.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Invalid remote store URL.
    #[error("Invalid remote URL: {0}")]
    InvalidUrl(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to save config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Transport Errors
    // =========================================================================
    /// Could not reach the remote store.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Request took longer than the configured timeout.
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// The remote store answered with a non-success status.
    #[error("Remote store returned {status} for {path}")]
    HttpStatus { status: u16, path: String },

    /// The server cancelled the change stream (e.g. security rules changed).
    #[error("Change stream cancelled: {0}")]
    StreamCancelled(String),

    /// The auth token used by the change stream is no longer valid.
    #[error("Change stream credentials revoked")]
    AuthRevoked,

    // =========================================================================
    // Protocol Errors
    // =========================================================================
    /// A change-stream frame could not be understood.
    #[error("Invalid change event: {0}")]
    InvalidEvent(String),

    /// A remote record failed validation and was quarantined.
    #[error("Malformed record at {path}: {reason}")]
    MalformedRecord { path: String, reason: String },

    /// Failed to serialize or parse JSON.
    #[error("Serialization failed: {0}")]
    SerializationFailed(String),

    // =========================================================================
    // Database Errors
    // =========================================================================
    /// Local database operation failed.
    #[error("Database error: {0}")]
    DatabaseError(String),

    // =========================================================================
    // Backup Errors
    // =========================================================================
    /// Backup creation or restore failed.
    #[error("Backup failed: {0}")]
    BackupFailed(String),

    /// The archive does not contain the database entry.
    #[error("Archive {archive} has no '{entry}' entry")]
    ArchiveEntryMissing { archive: String, entry: String },

    /// File system error.
    #[error("I/O error: {0}")]
    Io(String),

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// Channel send/receive failed.
    #[error("Channel error: {0}")]
    ChannelError(String),
}

impl SyncError {
    /// Shorthand for a quarantined record.
    pub fn malformed(path: impl Into<String>, reason: impl Into<String>) -> Self {
        SyncError::MalformedRecord {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<stockroom_db::DbError> for SyncError {
    fn from(err: stockroom_db::DbError) -> Self {
        SyncError::DatabaseError(err.to_string())
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::SerializationFailed(err.to_string())
    }
}

impl From<url::ParseError> for SyncError {
    fn from(err: url::ParseError) -> Self {
        SyncError::InvalidUrl(err.to_string())
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SyncError::Timeout(err.to_string())
        } else if let Some(status) = err.status() {
            SyncError::HttpStatus {
                status: status.as_u16(),
                path: err.url().map(|u| u.path().to_string()).unwrap_or_default(),
            }
        } else if err.is_decode() {
            SyncError::SerializationFailed(err.to_string())
        } else {
            SyncError::ConnectionFailed(err.to_string())
        }
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::Io(err.to_string())
    }
}

impl From<zip::result::ZipError> for SyncError {
    fn from(err: zip::result::ZipError) -> Self {
        SyncError::BackupFailed(err.to_string())
    }
}

impl From<base64::DecodeError> for SyncError {
    fn from(err: base64::DecodeError) -> Self {
        SyncError::BackupFailed(format!("invalid base64 snapshot: {err}"))
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for SyncError {
    fn from(err: toml::ser::Error) -> Self {
        SyncError::ConfigSaveFailed(err.to_string())
    }
}

// =============================================================================
// Error Categorization (for reconnect logic)
// =============================================================================

impl SyncError {
    /// Returns true if a dropped change stream should be reopened after
    /// this error.
    ///
    /// ## Retryable Errors
    /// - Connection failures and timeouts
    /// - Server-side errors (5xx) and rate limiting (429)
    ///
    /// ## Non-Retryable Errors
    /// - Configuration errors
    /// - Rejected credentials (401/403, `auth_revoked`)
    /// - Cancelled streams and malformed data
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::ConnectionFailed(_) | SyncError::Timeout(_) => true,
            SyncError::HttpStatus { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            SyncError::InvalidConfig(_)
                | SyncError::InvalidUrl(_)
                | SyncError::ConfigLoadFailed(_)
                | SyncError::ConfigSaveFailed(_)
        )
    }

    /// Returns true if a remote record was rejected by validation.
    pub fn is_malformed(&self) -> bool {
        matches!(self, SyncError::MalformedRecord { .. })
    }
}
