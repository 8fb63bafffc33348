//! User domain model.
//!
//! # Responsibility
//! - Define the persisted `User` document and its creation input.
//! - Define the typed update set accepted by repository updates.
//! - Normalize phone numbers before they reach storage.
//!
//! # Invariants
//! - `User::id` is assigned by the repository and never supplied by callers.
//! - Update sets can only name mutable fields.

pub mod phone;
pub mod user;
