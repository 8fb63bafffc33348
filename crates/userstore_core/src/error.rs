//! Caller-facing error classification.
//!
//! Every error surfaced by the crate maps onto exactly one [`ErrorKind`], so
//! transport layers can translate outcomes (not-found, conflict, internal)
//! without inspecting storage-specific error values.

use std::fmt::{Display, Formatter};

/// Stable error classes shared by the connection manager and repositories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Backend address could not be parsed or opened.
    Connection,
    /// Backend opened but the initial liveness probe failed.
    ConnectivityCheck,
    /// Index provisioning was rejected.
    Index,
    /// Caller supplied a malformed identifier or value.
    InvalidArgument,
    /// No record matched the lookup key.
    NotFound,
    /// A unique constraint rejected the write.
    DuplicateUser,
    /// Update set was empty after stripping immutable fields.
    NoOpUpdate,
    /// Any other backend failure, including timeouts.
    Storage,
}

impl ErrorKind {
    /// Stable snake_case code used in log events.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connection => "connection",
            Self::ConnectivityCheck => "connectivity_check",
            Self::Index => "index",
            Self::InvalidArgument => "invalid_argument",
            Self::NotFound => "not_found",
            Self::DuplicateUser => "duplicate_user",
            Self::NoOpUpdate => "noop_update",
            Self::Storage => "storage",
        }
    }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
