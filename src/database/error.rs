use thiserror::Error;

/// Error raised by the persistence layer.
#[derive(Debug, Error)]
#[error("{kind}")]
pub struct DatabaseError {
    pub kind: DatabaseErrorKind,
}

#[derive(Debug, Error)]
pub enum DatabaseErrorKind {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("unique constraint violated: {constraint}")]
    UniqueViolation { constraint: String },

    #[error("database connection failure: {message}")]
    Connection { message: String },

    #[error("database error: {message}")]
    Unknown { message: String },
}

impl DatabaseError {
    pub fn new(kind: DatabaseErrorKind) -> Self {
        Self { kind }
    }

    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::new(DatabaseErrorKind::NotFound {
            entity,
            id: id.into(),
        })
    }

    /// Map a raw sqlx error into the domain error vocabulary.
    pub fn from_sqlx(error: sqlx::Error) -> Self {
        match &error {
            sqlx::Error::Database(db_error) => {
                // Postgres 23505 = unique_violation
                if db_error.code().as_deref() == Some("23505") {
                    return Self::new(DatabaseErrorKind::UniqueViolation {
                        constraint: db_error
                            .constraint()
                            .unwrap_or("unknown constraint")
                            .to_string(),
                    });
                }
                Self::new(DatabaseErrorKind::Unknown {
                    message: db_error.to_string(),
                })
            }
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                Self::new(DatabaseErrorKind::Connection {
                    message: error.to_string(),
                })
            }
            _ => Self::new(DatabaseErrorKind::Unknown {
                message: error.to_string(),
            }),
        }
    }

    pub fn is_unique_violation(&self) -> bool {
        matches!(self.kind, DatabaseErrorKind::UniqueViolation { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self.kind, DatabaseErrorKind::NotFound { .. })
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self.kind, DatabaseErrorKind::Connection { .. })
    }
}

impl From<DatabaseError> for crate::error::AppError {
    fn from(err: DatabaseError) -> Self {
        use crate::error::{AppError, AppErrorKind, DomainError, InfrastructureError};

        let retryable = err.is_retryable();
        let kind = match err.kind {
            DatabaseErrorKind::NotFound { id, .. } => {
                AppErrorKind::Domain(DomainError::PaymentNotFound { reference: id })
            }
            other => AppErrorKind::Infrastructure(InfrastructureError::Database {
                message: other.to_string(),
                is_retryable: retryable,
            }),
        };

        AppError::new(kind)
    }
}
