use miette::Diagnostic;
use sea_orm::{DbErr, SqlErr};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum PermsError {
    #[error("Invalid input: {0}")]
    #[diagnostic(code(permissions::invalid_input))]
    InvalidInput(String),

    #[error("Not found: {0}")]
    #[diagnostic(code(permissions::not_found))]
    NotFound(String),

    #[error("Store unavailable: {0}")]
    #[diagnostic(
        code(permissions::store_unavailable),
        help("The backing database failed or timed out; the operation can be retried")
    )]
    StoreUnavailable(String),

    #[error("Constraint violation: {0}")]
    #[diagnostic(
        code(permissions::constraint_violation),
        help("A uniqueness or reference invariant was broken inside the store")
    )]
    ConstraintViolation(String),

    #[error("Config error: {0}")]
    #[diagnostic(code(permissions::config))]
    Config(#[from] config::ConfigError),

    #[error("I/O error: {0}")]
    #[diagnostic(code(permissions::io))]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    #[diagnostic(code(permissions::serde))]
    Serde(#[from] serde_json::Error),
}

/// Failure category carried across the HTTP boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidInput,
    NotFound,
    StoreUnavailable,
    ConstraintViolation,
    Internal,
}

impl PermsError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PermsError::InvalidInput(_) => ErrorKind::InvalidInput,
            PermsError::NotFound(_) => ErrorKind::NotFound,
            PermsError::StoreUnavailable(_) => ErrorKind::StoreUnavailable,
            PermsError::ConstraintViolation(_) => ErrorKind::ConstraintViolation,
            PermsError::Config(_) | PermsError::Io(_) | PermsError::Serde(_) => {
                ErrorKind::Internal
            }
        }
    }

    /// Only transient storage failures are worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PermsError::StoreUnavailable(_))
    }
}

impl From<DbErr> for PermsError {
    fn from(value: DbErr) -> Self {
        match value.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(detail))
            | Some(SqlErr::ForeignKeyConstraintViolation(detail)) => {
                tracing::error!(%detail, "store constraint violated");
                return PermsError::ConstraintViolation(detail);
            }
            _ => {}
        }
        match value {
            DbErr::RecordNotFound(what) => PermsError::NotFound(what),
            other => PermsError::StoreUnavailable(other.to_string()),
        }
    }
}
