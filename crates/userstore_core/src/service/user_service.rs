//! User use-case service.
//!
//! # Responsibility
//! - Provide caller-facing entry points for user registration and profile
//!   edits.
//! - Normalize phone numbers before they reach the repository.
//!
//! # Invariants
//! - Phone values passed to storage are always E.164.
//! - Service APIs never bypass repository persistence contracts.

use crate::model::phone::normalize_phone;
use crate::model::user::{NewUser, User, UserField, UserUpdates};
use crate::repo::user_repo::{RepoResult, UserRepository};
use log::debug;

/// Use-case wrapper around a [`UserRepository`].
pub struct UserService<R: UserRepository> {
    repo: R,
}

impl<R: UserRepository> UserService<R> {
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Provisions storage indexes; safe to call repeatedly.
    pub fn ensure_indexes(&self) -> RepoResult<()> {
        self.repo.ensure_indexes()
    }

    /// Registers a user after normalizing its phone number.
    ///
    /// Fails with an invalid-argument error for unparseable phones and with
    /// a duplicate-user error when the normalized phone is taken.
    pub fn register_user(&self, mut user: NewUser) -> RepoResult<User> {
        user.phone = normalize_phone(&user.phone)?;
        user.first_name = user.first_name.trim().to_string();
        user.last_name = user.last_name.trim().to_string();
        user.picture = user.picture.trim().to_string();
        self.repo.create_user(user)
    }

    pub fn get_user(&self, id: &str) -> RepoResult<User> {
        self.repo.get_user(id)
    }

    /// Looks a user up by any accepted spelling of their phone number.
    pub fn find_user_by_phone(&self, phone: &str) -> RepoResult<User> {
        let phone = normalize_phone(phone)?;
        self.repo.get_user_by_phone(&phone)
    }

    /// Applies a partial profile update, normalizing `phone` when present.
    pub fn update_user(&self, id: &str, mut updates: UserUpdates) -> RepoResult<()> {
        let normalized = updates
            .get(UserField::Phone)
            .map(normalize_phone)
            .transpose()?;
        if let Some(normalized) = normalized {
            debug!("event=user_update module=service status=normalized field=phone");
            updates.insert(UserField::Phone, normalized);
        }
        self.repo.update_user(id, updates)
    }
}
