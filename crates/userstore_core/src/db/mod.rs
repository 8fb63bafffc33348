//! Document storage on top of embedded SQLite.
//!
//! # Responsibility
//! - Own the long-lived backend handle and hand out scoped sessions.
//! - Expose collection-level document operations (insert/find/partial set).
//! - Translate backend error codes into [`DbError`] at first contact.
//!
//! # Invariants
//! - No handle is returned from [`Database::connect`] before a liveness
//!   probe succeeded.
//! - Storage calls only ever run on a [`Session`], never on the primary
//!   handle.
//! - Nothing outside this module inspects `rusqlite` error codes.

use crate::error::ErrorKind;
use rusqlite::ErrorCode;
use std::error::Error;
use std::fmt::{Display, Formatter};

mod collection;
mod database;
mod url;

pub use collection::{Collection, IndexSpec};
pub use database::{Database, DbOptions, PoolStatus, Session};
pub use url::{ConnectionUrl, StoreTarget};

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug)]
pub enum DbError {
    InvalidUrl(String),
    Connect {
        target: String,
        source: rusqlite::Error,
    },
    ConnectivityCheck(rusqlite::Error),
    Index {
        index: String,
        failure: IndexFailure,
    },
    DuplicateKey {
        detail: String,
    },
    Timeout(rusqlite::Error),
    Closed,
    InvalidName(String),
    EmptyUpdate,
    Serialization(serde_json::Error),
    Sqlite(rusqlite::Error),
}

/// Reason an index could not be provisioned.
#[derive(Debug)]
pub enum IndexFailure {
    /// An index with the same name exists with different uniqueness.
    Conflict { existing_unique: bool },
    /// Existing documents already violate the requested constraint.
    DuplicateValues(rusqlite::Error),
    Rejected(rusqlite::Error),
}

impl DbError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidUrl(_) | Self::Connect { .. } => ErrorKind::Connection,
            Self::ConnectivityCheck(_) => ErrorKind::ConnectivityCheck,
            Self::Index { .. } => ErrorKind::Index,
            // users is the only collection carrying a unique index
            Self::DuplicateKey { .. } => ErrorKind::DuplicateUser,
            Self::Timeout(_)
            | Self::Closed
            | Self::InvalidName(_)
            | Self::EmptyUpdate
            | Self::Serialization(_)
            | Self::Sqlite(_) => ErrorKind::Storage,
        }
    }

    /// Returns whether retrying the same call later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidUrl(message) => write!(f, "invalid connection url: {message}"),
            Self::Connect { target, source } => {
                write!(f, "failed to open database `{target}`: {source}")
            }
            Self::ConnectivityCheck(err) => write!(f, "database liveness probe failed: {err}"),
            Self::Index { index, failure } => {
                write!(f, "failed to ensure index `{index}`: {failure}")
            }
            Self::DuplicateKey { detail } => write!(f, "duplicate key: {detail}"),
            Self::Timeout(err) => write!(f, "storage call timed out: {err}"),
            Self::Closed => write!(f, "database handle is closed"),
            Self::InvalidName(name) => write!(f, "invalid collection or field name `{name}`"),
            Self::EmptyUpdate => write!(f, "update has no fields to set"),
            Self::Serialization(err) => write!(f, "document serialization failed: {err}"),
            Self::Sqlite(err) => write!(f, "{err}"),
        }
    }
}

impl Display for IndexFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Conflict { existing_unique } => write!(
                f,
                "an index with the same name already exists with unique={existing_unique}"
            ),
            Self::DuplicateValues(err) => write!(f, "existing documents hold duplicate values: {err}"),
            Self::Rejected(err) => write!(f, "{err}"),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Connect { source, .. } => Some(source),
            Self::ConnectivityCheck(err) | Self::Timeout(err) | Self::Sqlite(err) => Some(err),
            Self::Index { failure, .. } => match failure {
                IndexFailure::DuplicateValues(err) | IndexFailure::Rejected(err) => Some(err),
                IndexFailure::Conflict { .. } => None,
            },
            Self::Serialization(err) => Some(err),
            Self::InvalidUrl(_)
            | Self::DuplicateKey { .. }
            | Self::Closed
            | Self::InvalidName(_)
            | Self::EmptyUpdate => None,
        }
    }
}

impl From<serde_json::Error> for DbError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization(value)
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        translate(value)
    }
}

/// Maps a raw backend error onto the storage taxonomy.
pub(crate) fn translate(err: rusqlite::Error) -> DbError {
    let codes = err
        .sqlite_error()
        .map(|inner| (inner.code, inner.extended_code));

    match codes {
        Some((ErrorCode::ConstraintViolation, extended))
            if extended == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                || extended == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY =>
        {
            DbError::DuplicateKey {
                detail: err.to_string(),
            }
        }
        // busy: the busy timeout elapsed; interrupted: the session deadline fired
        Some((ErrorCode::DatabaseBusy, _)) | Some((ErrorCode::OperationInterrupted, _)) => {
            DbError::Timeout(err)
        }
        _ => DbError::Sqlite(err),
    }
}

#[cfg(test)]
mod tests {
    use super::{translate, DbError};
    use crate::error::ErrorKind;
    use rusqlite::Connection;

    #[test]
    fn unique_violation_translates_to_duplicate_key() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE t (v TEXT);
             CREATE UNIQUE INDEX t_v ON t (v);
             INSERT INTO t (v) VALUES ('a');",
        )
        .unwrap();

        let err = conn
            .execute("INSERT INTO t (v) VALUES ('a');", [])
            .unwrap_err();
        let translated = translate(err);
        assert!(matches!(translated, DbError::DuplicateKey { .. }));
        assert_eq!(translated.kind(), ErrorKind::DuplicateUser);
    }

    #[test]
    fn table_lock_conflicts_are_not_reported_as_timeouts() {
        let err = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_LOCKED),
            Some("database table is locked: users".to_string()),
        );
        let translated = translate(err);
        assert!(matches!(translated, DbError::Sqlite(_)));
        assert!(!translated.is_transient());
    }

    #[test]
    fn busy_and_interrupted_calls_are_transient_timeouts() {
        for code in [rusqlite::ffi::SQLITE_BUSY, rusqlite::ffi::SQLITE_INTERRUPT] {
            let err = rusqlite::Error::SqliteFailure(rusqlite::ffi::Error::new(code), None);
            let translated = translate(err);
            assert!(matches!(translated, DbError::Timeout(_)), "code {code}");
            assert!(translated.is_transient());
        }
    }

    #[test]
    fn other_failures_stay_generic_storage_errors() {
        let conn = Connection::open_in_memory().unwrap();
        let err = conn.execute("SELECT * FROM missing_table;", []).unwrap_err();
        let translated = translate(err);
        assert!(matches!(translated, DbError::Sqlite(_)));
        assert_eq!(translated.kind(), ErrorKind::Storage);
        assert!(!translated.is_transient());
    }
}
