// ⚠️ Error taxonomy for the catalog
// Lookups that miss return Ok(None); the boundary decides when that becomes NotFound.

use thiserror::Error;

/// Result type for catalog operations
pub type Result<T> = std::result::Result<T, CatalogError>;

#[derive(Error, Debug)]
pub enum CatalogError {
    /// Requested bank/branch does not exist
    #[error("{0} not found")]
    NotFound(String),

    /// Malformed filter, pagination or create input
    #[error("{0}")]
    Validation(String),

    /// Create operation collided with an existing primary key
    #[error("{0} already exists")]
    Conflict(String),

    /// Any failure talking to SQLite
    #[error("Database error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A previous holder of the shared connection panicked
    #[error("Database lock poisoned")]
    LockPoisoned,
}

impl CatalogError {
    pub fn not_found(what: &str) -> Self {
        CatalogError::NotFound(what.to_string())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        CatalogError::Validation(message.into())
    }

    /// True for errors caused by the caller's input rather than the store
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            CatalogError::NotFound(_) | CatalogError::Validation(_) | CatalogError::Conflict(_)
        )
    }
}
