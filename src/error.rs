use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] tokio_rusqlite::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Config error: {0}")]
    Config(String),

    /// The write would not fit in the storage area. The message mirrors the
    /// browser storage wording, e.g. `QUOTA_BYTES_PER_ITEM quota exceeded`.
    #[error("{0}")]
    QuotaExceeded(String),

    #[error("Post not found")]
    PostNotFound,

    #[error("Category not found")]
    CategoryNotFound,

    #[error("Cannot remove the reserved category")]
    ReservedCategory,

    #[error("Invalid category: {0}")]
    Validation(String),

    #[error("Unknown action: {0}")]
    UnknownAction(String),

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Coordinator is not running")]
    Disconnected,

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// True when the underlying persistence layer rejected or failed the
    /// operation, as opposed to a lookup or validation miss.
    pub fn is_storage_failure(&self) -> bool {
        matches!(
            self,
            AppError::Database(_) | AppError::Sqlite(_) | AppError::Json(_) | AppError::QuotaExceeded(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
