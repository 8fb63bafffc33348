//! Repository layer for the `users` collection.
//!
//! # Responsibility
//! - Define the use-case oriented user data access contract.
//! - Translate storage outcomes into the caller-facing error taxonomy.
//!
//! # Invariants
//! - Each repository operation runs on its own scoped session and performs
//!   one storage interaction.
//! - Callers never see backend error codes; only `RepoError` variants.

pub mod user_repo;
