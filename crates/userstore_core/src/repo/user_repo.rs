//! User repository contract and document-store implementation.
//!
//! # Responsibility
//! - Provide create/read/update APIs over the `users` collection.
//! - Provision the unique `phone` index on demand.
//! - Map storage outcomes onto [`RepoError`] / [`ErrorKind`].
//!
//! # Invariants
//! - Ids and timestamps are assigned here, never by callers.
//! - Updates never touch `id` or `created_at`; `updated_at` strictly
//!   increases on every successful update.
//! - An empty update set is rejected before any storage access.

use crate::db::{Database, DbError, DbOptions, IndexSpec};
use crate::error::ErrorKind;
use crate::logging::redact_phone;
use crate::model::phone::PhoneError;
use crate::model::user::{
    now_epoch_ms, NewUser, UpdateValidationError, User, UserField, UserId, UserUpdates,
    UserValidationError,
};
use log::{error, info, warn};
use serde_json::{Map, Value};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

/// Collection holding user documents.
pub const USER_COLLECTION: &str = "users";
const PHONE_FIELD: &str = "phone";
const UPDATED_AT_FIELD: &str = "updated_at";

pub type RepoResult<T> = Result<T, RepoError>;

/// Key a failed lookup was made with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserLookup {
    Id(UserId),
    Phone(String),
}

impl Display for UserLookup {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Id(id) => write!(f, "id {id}"),
            Self::Phone(phone) => write!(f, "phone {phone}"),
        }
    }
}

/// Repository error taxonomy for user operations.
#[derive(Debug)]
pub enum RepoError {
    InvalidId(String),
    Validation(UserValidationError),
    InvalidUpdate(UpdateValidationError),
    InvalidPhone(PhoneError),
    NotFound(UserLookup),
    /// Unique `phone` constraint rejected the write. `attempted` holds the
    /// record a create tried to insert; it was not persisted.
    DuplicateUser {
        phone: String,
        attempted: Option<Box<User>>,
    },
    NoOpUpdate,
    InvalidData(String),
    Db(DbError),
}

impl RepoError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidId(_)
            | Self::Validation(_)
            | Self::InvalidUpdate(_)
            | Self::InvalidPhone(_) => ErrorKind::InvalidArgument,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::DuplicateUser { .. } => ErrorKind::DuplicateUser,
            Self::NoOpUpdate => ErrorKind::NoOpUpdate,
            Self::InvalidData(_) => ErrorKind::Storage,
            Self::Db(err) => err.kind(),
        }
    }

    /// Returns whether retrying the same call later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Db(err) if err.is_transient())
    }
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidId(value) => write!(f, "malformed user id `{value}`"),
            Self::Validation(err) => write!(f, "{err}"),
            Self::InvalidUpdate(err) => write!(f, "{err}"),
            Self::InvalidPhone(err) => write!(f, "{err}"),
            Self::NotFound(lookup) => write!(f, "user not found: {lookup}"),
            Self::DuplicateUser { phone, .. } => {
                write!(f, "user already exists with phone {phone}")
            }
            Self::NoOpUpdate => write!(f, "nothing to update"),
            Self::InvalidData(message) => write!(f, "invalid persisted user data: {message}"),
            Self::Db(err) => write!(f, "{err}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::InvalidUpdate(err) => Some(err),
            Self::InvalidPhone(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::InvalidId(_)
            | Self::NotFound(_)
            | Self::DuplicateUser { .. }
            | Self::NoOpUpdate
            | Self::InvalidData(_) => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<UserValidationError> for RepoError {
    fn from(value: UserValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<UpdateValidationError> for RepoError {
    fn from(value: UpdateValidationError) -> Self {
        Self::InvalidUpdate(value)
    }
}

impl From<PhoneError> for RepoError {
    fn from(value: PhoneError) -> Self {
        Self::InvalidPhone(value)
    }
}

/// Repository interface for user CRUD operations.
pub trait UserRepository {
    /// Idempotently provisions the unique index on `phone`.
    fn ensure_indexes(&self) -> RepoResult<()>;
    /// Inserts a new user with a generated id and fresh timestamps.
    fn create_user(&self, user: NewUser) -> RepoResult<User>;
    fn get_user(&self, id: &str) -> RepoResult<User>;
    fn get_user_by_phone(&self, phone: &str) -> RepoResult<User>;
    /// Applies a partial update and refreshes `updated_at`.
    fn update_user(&self, id: &str, updates: UserUpdates) -> RepoResult<()>;

    /// Applies a loosely typed update map; see [`UserUpdates::from_map`].
    fn update_user_from_map(&self, id: &str, updates: Map<String, Value>) -> RepoResult<()> {
        let updates = UserUpdates::from_map(updates)?;
        self.update_user(id, updates)
    }
}

/// User repository over the document store.
///
/// Holds the shared connection manager; every call acquires its own session.
#[derive(Debug, Clone)]
pub struct DocumentUserRepository {
    db: Arc<Database>,
}

impl DocumentUserRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Connects to `url` and provisions indexes before returning.
    ///
    /// Connection, probe and index failures stay distinguishable through
    /// [`RepoError::kind`].
    pub fn bootstrap(url: &str, options: DbOptions) -> RepoResult<Self> {
        let repo = Self::new(Arc::new(Database::connect(url, options)?));
        repo.ensure_indexes()?;
        Ok(repo)
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }
}

impl UserRepository for DocumentUserRepository {
    fn ensure_indexes(&self) -> RepoResult<()> {
        let session = self.db.acquire()?;
        let users = session.collection(USER_COLLECTION)?;
        users.ensure_index(&IndexSpec::unique(PHONE_FIELD))?;
        Ok(())
    }

    fn create_user(&self, user: NewUser) -> RepoResult<User> {
        let started_at = Instant::now();
        let record = User::from_new(Uuid::new_v4(), user, now_epoch_ms());
        record.validate()?;

        let session = self.db.acquire()?;
        let users = session.collection(USER_COLLECTION)?;
        match users.insert(&record.id.to_string(), &record) {
            Ok(()) => {
                info!(
                    "event=user_create module=repo status=ok user_id={} duration_ms={}",
                    record.id,
                    started_at.elapsed().as_millis()
                );
                Ok(record)
            }
            Err(DbError::DuplicateKey { .. }) => {
                warn!(
                    "event=user_create module=repo status=error error_code=duplicate_user phone={} duration_ms={}",
                    redact_phone(&record.phone),
                    started_at.elapsed().as_millis()
                );
                Err(RepoError::DuplicateUser {
                    phone: record.phone.clone(),
                    attempted: Some(Box::new(record)),
                })
            }
            Err(err) => {
                error!(
                    "event=user_create module=repo status=error error_code={} duration_ms={} error={}",
                    err.kind(),
                    started_at.elapsed().as_millis(),
                    err
                );
                Err(err.into())
            }
        }
    }

    fn get_user(&self, id: &str) -> RepoResult<User> {
        let user_id = parse_user_id(id)?;

        let session = self.db.acquire()?;
        let users = session.collection(USER_COLLECTION)?;
        let user: User = users
            .find_by_id(&user_id.to_string())?
            .ok_or(RepoError::NotFound(UserLookup::Id(user_id)))?;
        ensure_valid_record(&user)?;
        Ok(user)
    }

    fn get_user_by_phone(&self, phone: &str) -> RepoResult<User> {
        let session = self.db.acquire()?;
        let users = session.collection(USER_COLLECTION)?;
        // Two rows are enough to detect a violated uniqueness constraint.
        let mut matches = users.find_eq::<User>(PHONE_FIELD, phone, 2)?.into_iter();

        let user = match (matches.next(), matches.next()) {
            (None, _) => return Err(RepoError::NotFound(UserLookup::Phone(phone.to_string()))),
            (Some(first), None) => first,
            (Some(first), Some(second)) => {
                warn!(
                    "event=user_get_by_phone module=repo status=anomaly reason=multiple_matches phone={} returned_id={} other_id={}",
                    redact_phone(phone),
                    first.id,
                    second.id
                );
                first
            }
        };
        ensure_valid_record(&user)?;
        Ok(user)
    }

    fn update_user(&self, id: &str, updates: UserUpdates) -> RepoResult<()> {
        let started_at = Instant::now();
        if updates.is_empty() {
            info!("event=user_update module=repo status=rejected error_code=noop_update");
            return Err(RepoError::NoOpUpdate);
        }
        let user_id = parse_user_id(id)?;
        if updates
            .get(UserField::Phone)
            .is_some_and(|phone| phone.trim().is_empty())
        {
            return Err(UserValidationError::EmptyPhone.into());
        }

        let fields: Vec<(&str, Value)> = updates
            .iter()
            .map(|(field, value)| (field.as_str(), Value::String(value.to_string())))
            .collect();

        let session = self.db.acquire()?;
        let users = session.collection(USER_COLLECTION)?;
        let outcome = users.set_fields(
            &user_id.to_string(),
            &fields,
            Some((UPDATED_AT_FIELD, now_epoch_ms())),
        );

        match outcome {
            Ok(0) => Err(RepoError::NotFound(UserLookup::Id(user_id))),
            Ok(_) => {
                info!(
                    "event=user_update module=repo status=ok user_id={} fields={} duration_ms={}",
                    user_id,
                    fields.len(),
                    started_at.elapsed().as_millis()
                );
                Ok(())
            }
            Err(DbError::DuplicateKey { .. }) => {
                let phone = updates.get(UserField::Phone).unwrap_or_default();
                warn!(
                    "event=user_update module=repo status=error error_code=duplicate_user user_id={} phone={}",
                    user_id,
                    redact_phone(phone)
                );
                Err(RepoError::DuplicateUser {
                    phone: phone.to_string(),
                    attempted: None,
                })
            }
            Err(err) => {
                error!(
                    "event=user_update module=repo status=error user_id={} error_code={} duration_ms={} error={}",
                    user_id,
                    err.kind(),
                    started_at.elapsed().as_millis(),
                    err
                );
                Err(err.into())
            }
        }
    }
}

fn parse_user_id(value: &str) -> RepoResult<UserId> {
    Uuid::parse_str(value.trim()).map_err(|_| RepoError::InvalidId(value.to_string()))
}

fn ensure_valid_record(user: &User) -> RepoResult<()> {
    user.validate()
        .map_err(|err| RepoError::InvalidData(format!("users/{}: {err}", user.id)))
}
