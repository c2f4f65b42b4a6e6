use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{
    ApplicationRow, NewApplication, NewUser, SubjectDeletion, SubjectRow, UserCredentials,
};

#[cfg(test)]
pub mod fake;
pub mod postgres;

pub use postgres::PgStore;

pub type StoreResult<T> = Result<T, StoreError>;

/// Failure reported by a storage backend.
#[derive(Debug)]
pub enum StoreError {
    /// A uniqueness constraint rejected the write. Carries the offending field.
    Conflict(&'static str),
    NotFound,
    Backend(anyhow::Error),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Conflict(field) => write!(f, "duplicate value for {field}"),
            StoreError::NotFound => f.write_str("record not found"),
            StoreError::Backend(err) => write!(f, "storage backend error: {err:#}"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Backend(err.into())
    }
}

/// Relational storage used by the portal handlers.
///
/// Implementations must enforce uniqueness of application emails, subject
/// names, usernames and user emails themselves and report violations as
/// [`StoreError::Conflict`]; handlers never rely on a prior existence check.
#[async_trait]
pub trait PortalStore: Send + Sync {
    async fn create_user(&self, user: NewUser) -> StoreResult<i64>;

    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<UserCredentials>>;

    async fn admin_exists(&self) -> StoreResult<bool>;

    async fn application_email_exists(&self, email: &str) -> StoreResult<bool>;

    /// Inserts the application and its subject links atomically. Subject names
    /// that do not match a registered subject are skipped.
    async fn insert_application(&self, application: NewApplication) -> StoreResult<i64>;

    /// All applications, newest first.
    async fn list_applications(&self) -> StoreResult<Vec<ApplicationRow>>;

    async fn count_applications_since(&self, since: DateTime<Utc>) -> StoreResult<i64>;

    /// All subjects ordered by name.
    async fn list_subjects(&self) -> StoreResult<Vec<SubjectRow>>;

    async fn create_subject(&self, name: &str) -> StoreResult<i64>;

    async fn rename_subject(&self, id: i64, name: &str) -> StoreResult<()>;

    /// Deletes the unreferenced subjects among `ids` in one transaction and
    /// reports the referenced ones as in use.
    async fn delete_subjects(&self, ids: &[i64]) -> StoreResult<SubjectDeletion>;
}
