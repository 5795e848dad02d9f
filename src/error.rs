use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    /// The caller passed something that does not belong to the target vote.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    /// A record that the numbering invariant says must exist is missing.
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Validation failed for {field}: {message}")]
    Validation { field: String, message: String },
    /// The vote is in a stage that does not allow the requested change.
    #[error("Invalid state: {0}")]
    InvalidState(String),
    /// A uniqueness constraint would have been violated.
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error(transparent)]
    Storage(#[from] sqlx::Error),
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.to_string(),
            message: message.into(),
        }
    }

    /// Map unique violations reported by the database onto [`Error::Conflict`].
    pub(crate) fn from_write(err: sqlx::Error, what: &str) -> Self {
        if let sqlx::Error::Database(ref db_err) = err {
            if db_err.is_unique_violation() {
                return Self::Conflict(format!("{what}: {}", db_err.message()));
            }
        }
        Self::Storage(err)
    }
}
