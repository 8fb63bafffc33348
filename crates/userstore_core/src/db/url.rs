//! Connection URL parsing.
//!
//! Accepted forms:
//! - `sqlite://<path>` and `sqlite:<path>` for a database file.
//! - `sqlite::memory:` for a private in-memory database that lives as long
//!   as the owning [`super::Database`]. It is served by the `memdb` VFS, so
//!   sessions lock it like a file database and honor the busy timeout.

use super::{DbError, DbResult};
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use uuid::Uuid;

const SCHEME_PREFIX: &str = "sqlite:";
const MEMORY_TARGET: &str = ":memory:";

/// Backend target resolved from a connection URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreTarget {
    File(PathBuf),
    /// In-memory database shared by every session, addressed by a generated
    /// `memdb` URI.
    Memory(String),
}

/// Parsed connection URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionUrl {
    raw: String,
    target: StoreTarget,
}

impl ConnectionUrl {
    pub fn parse(raw: &str) -> DbResult<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(DbError::InvalidUrl("connection url is empty".to_string()));
        }

        let rest = trimmed.strip_prefix(SCHEME_PREFIX).ok_or_else(|| {
            DbError::InvalidUrl(format!(
                "unsupported scheme in `{trimmed}`; expected `{SCHEME_PREFIX}`"
            ))
        })?;

        let target = if rest == MEMORY_TARGET {
            StoreTarget::Memory(format!(
                "file:/userstore-{}?vfs=memdb",
                Uuid::new_v4().simple()
            ))
        } else {
            let path = rest.strip_prefix("//").unwrap_or(rest);
            if path.is_empty() {
                return Err(DbError::InvalidUrl(format!(
                    "missing database path in `{trimmed}`"
                )));
            }
            StoreTarget::File(PathBuf::from(path))
        };

        Ok(Self {
            raw: trimmed.to_string(),
            target,
        })
    }

    pub fn target(&self) -> &StoreTarget {
        &self.target
    }

    pub fn is_memory(&self) -> bool {
        matches!(self.target, StoreTarget::Memory(_))
    }

    /// Short label for log events (`file` or `memory`).
    pub fn mode(&self) -> &'static str {
        match self.target {
            StoreTarget::File(_) => "file",
            StoreTarget::Memory(_) => "memory",
        }
    }

    /// Path or URI handed to the backend when opening a connection.
    pub(crate) fn open_target(&self) -> PathBuf {
        match &self.target {
            StoreTarget::File(path) => path.clone(),
            StoreTarget::Memory(uri) => PathBuf::from(uri),
        }
    }
}

impl Display for ConnectionUrl {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::{ConnectionUrl, StoreTarget};
    use crate::db::DbError;
    use std::path::PathBuf;

    #[test]
    fn parses_file_urls_with_and_without_authority_slashes() {
        let absolute = ConnectionUrl::parse("sqlite:///var/lib/userstore/users.db").unwrap();
        assert_eq!(
            absolute.target(),
            &StoreTarget::File(PathBuf::from("/var/lib/userstore/users.db"))
        );

        let relative = ConnectionUrl::parse(" sqlite:data/users.db ").unwrap();
        assert_eq!(
            relative.target(),
            &StoreTarget::File(PathBuf::from("data/users.db"))
        );
        assert_eq!(relative.to_string(), "sqlite:data/users.db");
        assert_eq!(relative.mode(), "file");
    }

    #[test]
    fn memory_urls_get_distinct_memdb_names() {
        let first = ConnectionUrl::parse("sqlite::memory:").unwrap();
        let second = ConnectionUrl::parse("sqlite::memory:").unwrap();

        assert!(first.is_memory());
        assert_ne!(first.target(), second.target());
        match first.target() {
            StoreTarget::Memory(uri) => {
                assert!(uri.starts_with("file:/userstore-"));
                assert!(uri.ends_with("?vfs=memdb"));
            }
            other => panic!("unexpected target: {other:?}"),
        }
    }

    #[test]
    fn rejects_empty_foreign_scheme_and_missing_path() {
        for raw in ["", "   ", "mongodb://localhost/users", "sqlite://"] {
            let err = ConnectionUrl::parse(raw).unwrap_err();
            assert!(matches!(err, DbError::InvalidUrl(_)), "input `{raw}`");
        }
    }
}
