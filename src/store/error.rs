use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

/// Persistence-layer error.
#[derive(Debug, Error)]
#[error("{kind}")]
pub struct StoreError {
    pub kind: StoreErrorKind,
}

#[derive(Debug, Error)]
pub enum StoreErrorKind {
    #[error("{entity} '{id}' not found")]
    NotFound { entity: &'static str, id: String },

    #[error("unique constraint violated: {constraint}")]
    UniqueViolation { constraint: String },

    #[error("foreign key constraint violated: {constraint}")]
    ForeignKeyViolation { constraint: String },

    /// Rejected before touching the database: pre-set IDs on insert,
    /// method/mandate inconsistencies, empty batches.
    #[error("invalid store input: {message}")]
    InvalidInput { message: String },

    /// Stored data that cannot be mapped back to the domain, for example a
    /// status column holding an unrecognized value.
    #[error("corrupted stored data: {message}")]
    Corrupted { message: String },

    #[error("connection pool timed out")]
    PoolTimeout,

    #[error("database connection failed: {message}")]
    ConnectionFailed { message: String },

    #[error("database error: {message}")]
    Unknown { message: String },
}

impl StoreError {
    pub fn new(kind: StoreErrorKind) -> Self {
        Self { kind }
    }

    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::NotFound {
            entity,
            id: id.into(),
        })
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::InvalidInput {
            message: message.into(),
        })
    }

    pub fn corrupted(message: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::Corrupted {
            message: message.into(),
        })
    }

    pub fn from_sqlx(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => Self::new(StoreErrorKind::NotFound {
                entity: "row",
                id: String::new(),
            }),
            sqlx::Error::PoolTimedOut => Self::new(StoreErrorKind::PoolTimeout),
            sqlx::Error::Io(_) | sqlx::Error::Tls(_) => {
                Self::new(StoreErrorKind::ConnectionFailed {
                    message: err.to_string(),
                })
            }
            sqlx::Error::Database(db) => {
                let constraint = db.constraint().unwrap_or("unknown").to_string();
                match db.code().as_deref() {
                    Some("23505") => Self::new(StoreErrorKind::UniqueViolation { constraint }),
                    Some("23503") => Self::new(StoreErrorKind::ForeignKeyViolation { constraint }),
                    _ => Self::new(StoreErrorKind::Unknown {
                        message: db.to_string(),
                    }),
                }
            }
            _ => Self::new(StoreErrorKind::Unknown {
                message: err.to_string(),
            }),
        }
    }

    /// Transient connectivity failures may succeed on retry; constraint
    /// violations and data corruption will not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind,
            StoreErrorKind::PoolTimeout | StoreErrorKind::ConnectionFailed { .. }
        )
    }

    pub fn is_unique_violation(&self) -> bool {
        matches!(self.kind, StoreErrorKind::UniqueViolation { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self.kind, StoreErrorKind::NotFound { .. })
    }
}
