use std::path::PathBuf;

use rusqlite::ffi;
use sqlx::error::ErrorKind;
use thiserror::Error;

/// Errors raised by the database helpers.
///
/// Driver failures are wrapped as-is so callers can still reach the
/// engine-specific details.
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("mysql error: {0}")]
    MySql(#[from] sqlx::Error),

    #[error("io error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("DDL location not found: {}", .0.display())]
    DdlNotFound(PathBuf),

    #[error("DDL location is not a directory: {}", .0.display())]
    DdlNotDirectory(PathBuf),

    #[error("no DDL location given to build database at {}", .0.display())]
    MissingDdl(PathBuf),

    #[error("failed to walk DDL directory: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    #[error("invalid SQL identifier: {0:?}")]
    InvalidIdentifier(String),

    #[error("update on `{0}` has no columns to set")]
    EmptyUpdate(String),

    #[error("blocking database task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl From<figment::Error> for DatabaseError {
    fn from(e: figment::Error) -> Self {
        DatabaseError::Config(Box::new(e))
    }
}

impl DatabaseError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        DatabaseError::Io {
            path: path.into(),
            source,
        }
    }

    /// True when the engine rejected a write because of a constraint
    /// (unique, primary key, foreign key, not-null or check).
    pub fn is_constraint_violation(&self) -> bool {
        match self {
            DatabaseError::Sqlite(rusqlite::Error::SqliteFailure(e, _)) => {
                e.code == rusqlite::ErrorCode::ConstraintViolation
            }
            DatabaseError::MySql(sqlx::Error::Database(e)) => matches!(
                e.kind(),
                ErrorKind::UniqueViolation
                    | ErrorKind::ForeignKeyViolation
                    | ErrorKind::NotNullViolation
                    | ErrorKind::CheckViolation
            ),
            _ => false,
        }
    }

    /// True for duplicate-key failures only.
    pub fn is_unique_violation(&self) -> bool {
        match self {
            DatabaseError::Sqlite(rusqlite::Error::SqliteFailure(e, _)) => matches!(
                e.extended_code,
                ffi::SQLITE_CONSTRAINT_UNIQUE | ffi::SQLITE_CONSTRAINT_PRIMARYKEY
            ),
            DatabaseError::MySql(sqlx::Error::Database(e)) => e.is_unique_violation(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, DatabaseError>;
