use thiserror::Error;

/// Errors from store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A SQLite operation failed.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A row that must exist for the operation does not.
    #[error("not found: {what}")]
    NotFound { what: String },

    /// A stored value could not be decoded (bad enum tag, bad timestamp).
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;
