//! Storage for users, roles and sessions.
//!
//! Each concern has its own narrow trait so handlers depend only on what they
//! use. Two implementations exist:
//! - [`postgres`]: sqlx repositories over a `PgPool`
//! - [`memory`]: process-local maps, used when no database is configured

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use pocketbook_access::{Role, RoleLoader, StoreError, User};
use pocketbook_core::{Result, UserId};
use rootcause::Report;

pub use memory::{MemoryRoleStore, MemoryUserStore};
pub use postgres::{RoleRepository, SessionRepository, UserRepository};

/// User accounts.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Inserts a new user. Fails with `Conflict` if the email is taken.
    async fn create_user(&self, user: &User) -> Result<(), StoreError>;

    async fn get_user(&self, id: &UserId) -> Result<User, StoreError>;

    /// Looks up a user by normalized email.
    async fn get_user_by_email(&self, email: &str) -> Result<User, StoreError>;

    async fn list_users(&self) -> Result<Vec<User>, StoreError>;

    async fn update_password(
        &self,
        id: &UserId,
        password_hash: &str,
    ) -> Result<(), StoreError>;

    /// Deletes a user, returning whether one existed.
    async fn delete_user(&self, id: &UserId) -> Result<bool, StoreError>;
}

/// Durable role grants. Reading goes through [`RoleLoader`].
#[async_trait]
pub trait RoleStore: RoleLoader {
    /// Grants `role`. Granting a held role is a no-op.
    async fn grant_role(&self, user_id: &UserId, role: Role) -> Result<(), StoreError>;

    /// Revokes `role`. Revoking a role not held is a no-op.
    async fn revoke_role(&self, user_id: &UserId, role: Role) -> Result<(), StoreError>;
}

/// Classifies a sqlx failure.
pub(crate) fn store_error(err: sqlx::Error) -> Report<StoreError> {
    let kind = match &err {
        sqlx::Error::RowNotFound => StoreError::NotFound,
        sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::Conflict {
            reason: db.message().to_string(),
        },
        sqlx::Error::PoolTimedOut => StoreError::Timeout,
        other => StoreError::Unavailable {
            reason: other.to_string(),
        },
    };
    kind.into()
}
