//! User document model.
//!
//! # Responsibility
//! - Define the canonical user document stored in the `users` collection.
//! - Define the typed partial-update set for mutable fields.
//!
//! # Invariants
//! - `id` is generated once at creation and never changes.
//! - `updated_at >= created_at` for every persisted record.
//! - Timestamps are Unix epoch milliseconds.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Primary key of a user document.
pub type UserId = Uuid;

/// Unix epoch milliseconds.
pub type Timestamp = i64;

/// Update-map keys that are accepted and silently dropped: `id` is immutable,
/// timestamps are managed by the repository.
const STRIPPED_UPDATE_KEYS: &[&str] = &["id", "_id", "created_at", "updated_at"];

/// Persisted user document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    /// Globally unique; enforced by the `users_phone_1` index.
    pub phone: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    /// Picture URL, or empty.
    #[serde(default)]
    pub picture: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl User {
    /// Builds the record inserted for `input`, stamping both timestamps with
    /// `now`.
    pub fn from_new(id: UserId, input: NewUser, now: Timestamp) -> Self {
        Self {
            id,
            phone: input.phone,
            first_name: input.first_name,
            last_name: input.last_name,
            picture: input.picture,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn validate(&self) -> Result<(), UserValidationError> {
        if self.id.is_nil() {
            return Err(UserValidationError::NilId);
        }
        if self.phone.trim().is_empty() {
            return Err(UserValidationError::EmptyPhone);
        }
        if self.updated_at < self.created_at {
            return Err(UserValidationError::UpdatedBeforeCreated {
                created_at: self.created_at,
                updated_at: self.updated_at,
            });
        }
        Ok(())
    }
}

/// Creation input. Carries no id or timestamps; the repository assigns them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewUser {
    pub phone: String,
    pub first_name: String,
    pub last_name: String,
    pub picture: String,
}

impl NewUser {
    pub fn new(phone: impl Into<String>) -> Self {
        Self {
            phone: phone.into(),
            ..Self::default()
        }
    }

    pub fn with_first_name(mut self, first_name: impl Into<String>) -> Self {
        self.first_name = first_name.into();
        self
    }

    pub fn with_last_name(mut self, last_name: impl Into<String>) -> Self {
        self.last_name = last_name.into();
        self
    }

    pub fn with_picture(mut self, picture: impl Into<String>) -> Self {
        self.picture = picture.into();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserValidationError {
    NilId,
    EmptyPhone,
    UpdatedBeforeCreated {
        created_at: Timestamp,
        updated_at: Timestamp,
    },
}

impl Display for UserValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NilId => write!(f, "user id must not be nil"),
            Self::EmptyPhone => write!(f, "user phone must not be empty"),
            Self::UpdatedBeforeCreated {
                created_at,
                updated_at,
            } => write!(
                f,
                "updated_at ({updated_at}) is earlier than created_at ({created_at})"
            ),
        }
    }
}

impl Error for UserValidationError {}

/// Mutable user fields that an update may name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum UserField {
    Phone,
    FirstName,
    LastName,
    Picture,
}

impl UserField {
    pub const ALL: [UserField; 4] = [
        UserField::Phone,
        UserField::FirstName,
        UserField::LastName,
        UserField::Picture,
    ];

    /// Document field name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Phone => "phone",
            Self::FirstName => "first_name",
            Self::LastName => "last_name",
            Self::Picture => "picture",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|field| field.as_str() == value)
    }
}

/// Partial update over mutable user fields.
///
/// Only fields present in the set are written; the repository adds
/// `updated_at` itself.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserUpdates {
    fields: BTreeMap<UserField, String>,
}

impl UserUpdates {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `field` to `value`, replacing an earlier value for the same field.
    pub fn set(mut self, field: UserField, value: impl Into<String>) -> Self {
        self.insert(field, value);
        self
    }

    pub fn insert(&mut self, field: UserField, value: impl Into<String>) {
        self.fields.insert(field, value.into());
    }

    pub fn get(&self, field: UserField) -> Option<&str> {
        self.fields.get(&field).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (UserField, &str)> + '_ {
        self.fields
            .iter()
            .map(|(field, value)| (*field, value.as_str()))
    }

    /// Builds an update set from a loosely typed key/value map.
    ///
    /// `id`, `_id`, `created_at` and `updated_at` are dropped without error.
    ///
    /// # Errors
    /// - [`UpdateValidationError::UnknownField`] for any other unknown key.
    /// - [`UpdateValidationError::InvalidValue`] for non-string values.
    pub fn from_map<I, K>(entries: I) -> Result<Self, UpdateValidationError>
    where
        I: IntoIterator<Item = (K, Value)>,
        K: AsRef<str>,
    {
        let mut updates = Self::new();
        for (key, value) in entries {
            let key = key.as_ref();
            if STRIPPED_UPDATE_KEYS.contains(&key) {
                continue;
            }

            let field = UserField::parse(key)
                .ok_or_else(|| UpdateValidationError::UnknownField(key.to_string()))?;
            match value {
                Value::String(text) => updates.insert(field, text),
                other => {
                    return Err(UpdateValidationError::InvalidValue {
                        field: field.as_str(),
                        reason: format!("expected a string, got `{other}`"),
                    });
                }
            }
        }
        Ok(updates)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateValidationError {
    UnknownField(String),
    InvalidValue { field: &'static str, reason: String },
}

impl Display for UpdateValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownField(key) => write!(f, "unknown or immutable user field `{key}`"),
            Self::InvalidValue { field, reason } => {
                write!(f, "invalid value for `{field}`: {reason}")
            }
        }
    }
}

impl Error for UpdateValidationError {}

/// Current wall-clock time in epoch milliseconds.
pub fn now_epoch_ms() -> Timestamp {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| Timestamp::try_from(elapsed.as_millis()).unwrap_or(Timestamp::MAX))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::{UpdateValidationError, UserField, UserUpdates};
    use serde_json::json;

    #[test]
    fn from_map_strips_immutable_keys_silently() {
        let updates = UserUpdates::from_map([
            ("id", json!("5f1c0b0e-0000-4000-8000-000000000000")),
            ("_id", json!("abc")),
            ("created_at", json!(1)),
            ("updated_at", json!(2)),
        ])
        .unwrap();
        assert!(updates.is_empty());
    }

    #[test]
    fn from_map_rejects_unknown_keys_and_non_string_values() {
        let unknown = UserUpdates::from_map([("email", json!("a@b.c"))]).unwrap_err();
        assert_eq!(unknown, UpdateValidationError::UnknownField("email".into()));

        let invalid = UserUpdates::from_map([("picture", json!(null))]).unwrap_err();
        assert!(matches!(
            invalid,
            UpdateValidationError::InvalidValue {
                field: "picture",
                ..
            }
        ));
    }

    #[test]
    fn field_names_roundtrip_through_parse() {
        for field in UserField::ALL {
            assert_eq!(UserField::parse(field.as_str()), Some(field));
        }
        assert_eq!(UserField::parse("id"), None);
    }
}
