//! Engine error type and result alias.

/// Engine error type
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    /// Referenced memory id absent
    #[error("{0}")]
    NotFound(String),
    /// Promotion draft violates validation rules
    #[error("{0}")]
    PromotionValidation(String),
    /// Scope or payload failed field-level validation
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Serialization error
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
    /// Initialization error
    #[error("Initialization error: {0}")]
    Init(String),
}

impl MemoryError {
    /// Stable string code for the result envelope, when the variant has one.
    pub fn error_code(&self) -> Option<&'static str> {
        match self {
            MemoryError::NotFound(_) => Some("NOT_FOUND"),
            MemoryError::PromotionValidation(_) => Some("PROMOTION_VALIDATION_FAILED"),
            _ => None,
        }
    }
}

/// Engine result type
pub type Result<T> = std::result::Result<T, MemoryError>;
