use sqlx::error::ErrorKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("referential integrity violation: {0}")]
    ForeignKeyViolation(String),

    #[error("not-null violation: {0}")]
    NotNullViolation(String),

    #[error("malformed input rejected by database: {0}")]
    Malformed(String),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i32 },

    #[error("database error: {0}")]
    Database(sqlx::Error),

    #[error("database migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

pub type Result<T> = std::result::Result<T, StoreError>;

impl StoreError {
    /// True for failures caused by the caller's input rather than the database.
    pub fn is_constraint_violation(&self) -> bool {
        matches!(
            self,
            StoreError::MissingField(_)
                | StoreError::ForeignKeyViolation(_)
                | StoreError::NotNullViolation(_)
        )
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        let sqlx::Error::Database(db_err) = &err else {
            return StoreError::Database(err);
        };

        let message = db_err.message().to_string();
        let kind = db_err.kind();
        let data_exception = is_data_exception(db_err.code().as_deref());

        match kind {
            ErrorKind::ForeignKeyViolation => StoreError::ForeignKeyViolation(message),
            ErrorKind::NotNullViolation => StoreError::NotNullViolation(message),
            _ if data_exception => StoreError::Malformed(message),
            _ => StoreError::Database(err),
        }
    }
}

/// SQLSTATE class 22 covers bad numeric, date and array literals.
fn is_data_exception(code: Option<&str>) -> bool {
    code.is_some_and(|code| code.starts_with("22"))
}
