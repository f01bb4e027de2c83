// Error types shared by the store, the workflow layer and the API

use crate::validation::FieldError;
use thiserror::Error;

pub type Result<T, E = SipmsError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum SipmsError {
    /// Request payload failed field validation.
    #[error("Validation failed: {}", summarize(.0))]
    Validation(Vec<FieldError>),

    /// Referenced record does not exist.
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    /// Operation requires an authenticated actor.
    #[error("Authentication credentials were not provided")]
    Unauthorized,

    /// Actor is known but not allowed to perform the operation.
    #[error("Permission denied: {0}")]
    Forbidden(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] figment::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SipmsError {
    /// Shorthand for a single-field validation failure.
    pub fn invalid(field: &str, message: impl Into<String>) -> Self {
        SipmsError::Validation(vec![FieldError::new(field, message)])
    }

    pub fn not_found(entity: &'static str, id: i64) -> Self {
        SipmsError::NotFound { entity, id }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, SipmsError::NotFound { .. })
    }
}

fn summarize(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Map "no rows" from a single-row query into a typed not-found error.
pub(crate) fn or_not_found<T>(
    result: rusqlite::Result<T>,
    entity: &'static str,
    id: i64,
) -> Result<T> {
    match result {
        Ok(value) => Ok(value),
        Err(rusqlite::Error::QueryReturnedNoRows) => Err(SipmsError::not_found(entity, id)),
        Err(e) => Err(e.into()),
    }
}
