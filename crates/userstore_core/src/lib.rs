//! Data-access layer for user documents.
//!
//! A [`Database`] owns the long-lived backend handle and hands out scoped
//! sessions; [`DocumentUserRepository`] runs every user operation on its own
//! session against the `users` collection.

pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use config::{ConfigError, StoreConfig};
pub use db::{Database, DbError, DbOptions, DbResult, PoolStatus, Session};
pub use error::ErrorKind;
pub use logging::{default_log_level, init_logging, logging_status, redact_phone, LogTarget};
pub use model::phone::{normalize_phone, PhoneError};
pub use model::user::{
    NewUser, Timestamp, UpdateValidationError, User, UserField, UserId, UserUpdates,
    UserValidationError,
};
pub use repo::user_repo::{
    DocumentUserRepository, RepoError, RepoResult, UserLookup, UserRepository, USER_COLLECTION,
};
pub use service::user_service::UserService;

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
