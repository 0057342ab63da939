//! Postgres repositories.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pocketbook_access::{
    Role, RoleLoader, RoleSet, Session, SessionLookup, SessionStore, StoreError, User,
};
use pocketbook_core::{DeviceId, UserId};
use rootcause::Report;
use sqlx::{FromRow, PgPool};
use tracing::{instrument, warn};

use super::{RoleStore, UserStore, store_error};

/// Row type for user queries.
#[derive(FromRow)]
struct UserRow {
    id: String,
    email: String,
    password_hash: String,
    created_at: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: UserId::from(row.id),
            email: row.email,
            password_hash: row.password_hash,
            created_at: row.created_at,
        }
    }
}

/// Row type for session queries.
#[derive(FromRow)]
struct SessionRow {
    user_id: String,
    device_id: String,
    refresh_token: String,
    expires_at: i64,
}

impl From<SessionRow> for Session {
    fn from(row: SessionRow) -> Self {
        Self {
            user_id: UserId::from(row.user_id),
            device_id: DeviceId::from(row.device_id),
            refresh_token: row.refresh_token,
            expires_at: row.expires_at,
        }
    }
}

/// Repository for user operations.
#[derive(Clone)]
pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for UserRepository {
    #[instrument(skip(self, user), fields(user_id = %user.id))]
    async fn create_user(&self, user: &User) -> Result<(), Report<StoreError>> {
        sqlx::query(
            r#"
            INSERT INTO users (id, email, password_hash, created_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(user.id.as_str())
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.created_at)
        .execute(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(())
    }

    async fn get_user(&self, id: &UserId) -> Result<User, Report<StoreError>> {
        let row: UserRow = sqlx::query_as(
            r#"
            SELECT id, email, password_hash, created_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(row.into())
    }

    async fn get_user_by_email(&self, email: &str) -> Result<User, Report<StoreError>> {
        let row: UserRow = sqlx::query_as(
            r#"
            SELECT id, email, password_hash, created_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_one(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(row.into())
    }

    async fn list_users(&self) -> Result<Vec<User>, Report<StoreError>> {
        let rows: Vec<UserRow> = sqlx::query_as(
            r#"
            SELECT id, email, password_hash, created_at
            FROM users
            ORDER BY created_at
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(rows.into_iter().map(User::from).collect())
    }

    #[instrument(skip(self, password_hash))]
    async fn update_password(
        &self,
        id: &UserId,
        password_hash: &str,
    ) -> Result<(), Report<StoreError>> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET password_hash = $2
            WHERE id = $1
            "#,
        )
        .bind(id.as_str())
        .bind(password_hash)
        .execute(&self.pool)
        .await
        .map_err(store_error)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound.into());
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_user(&self, id: &UserId) -> Result<bool, Report<StoreError>> {
        let result = sqlx::query(
            r#"
            DELETE FROM users
            WHERE id = $1
            "#,
        )
        .bind(id.as_str())
        .execute(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(result.rows_affected() > 0)
    }
}

/// Repository for refresh-token sessions.
#[derive(Clone)]
pub struct SessionRepository {
    pool: PgPool,
}

impl SessionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Deletes sessions whose refresh token has expired.
    pub async fn delete_expired(&self) -> Result<u64, Report<StoreError>> {
        let result = sqlx::query(
            r#"
            DELETE FROM sessions
            WHERE to_timestamp(expires_at) <= NOW()
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl SessionStore for SessionRepository {
    #[instrument(skip(self, session), fields(user_id = %session.user_id, device_id = %session.device_id))]
    async fn save_refresh_token(&self, session: &Session) -> Result<(), Report<StoreError>> {
        sqlx::query(
            r#"
            INSERT INTO sessions (user_id, device_id, refresh_token, expires_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id, device_id)
            DO UPDATE SET refresh_token = EXCLUDED.refresh_token,
                          expires_at = EXCLUDED.expires_at
            "#,
        )
        .bind(session.user_id.as_str())
        .bind(session.device_id.as_str())
        .bind(&session.refresh_token)
        .bind(session.expires_at)
        .execute(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(())
    }

    #[instrument(skip(self, lookup), fields(user_id = %lookup.user_id, device_id = %lookup.device_id))]
    async fn get_session(&self, lookup: &SessionLookup) -> Result<Session, Report<StoreError>> {
        let row: SessionRow = sqlx::query_as(
            r#"
            SELECT user_id, device_id, refresh_token, expires_at
            FROM sessions
            WHERE user_id = $1
              AND device_id = $2
              AND refresh_token = $3
              AND to_timestamp(expires_at) > NOW()
            "#,
        )
        .bind(lookup.user_id.as_str())
        .bind(lookup.device_id.as_str())
        .bind(&lookup.refresh_token)
        .fetch_one(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(row.into())
    }
}

/// Repository for role grants.
#[derive(Clone)]
pub struct RoleRepository {
    pool: PgPool,
}

impl RoleRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RoleLoader for RoleRepository {
    async fn load_roles(&self, user_id: &UserId) -> Result<RoleSet, Report<StoreError>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT role
            FROM user_roles
            WHERE user_id = $1
            "#,
        )
        .bind(user_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(rows
            .into_iter()
            .filter_map(|(tag,)| match tag.parse::<Role>() {
                Ok(role) => Some(role),
                Err(err) => {
                    warn!(%user_id, error = %err, "ignoring stored role");
                    None
                }
            })
            .collect())
    }
}

#[async_trait]
impl RoleStore for RoleRepository {
    #[instrument(skip(self))]
    async fn grant_role(&self, user_id: &UserId, role: Role) -> Result<(), Report<StoreError>> {
        sqlx::query(
            r#"
            INSERT INTO user_roles (user_id, role)
            VALUES ($1, $2)
            ON CONFLICT (user_id, role) DO NOTHING
            "#,
        )
        .bind(user_id.as_str())
        .bind(role.as_str())
        .execute(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn revoke_role(&self, user_id: &UserId, role: Role) -> Result<(), Report<StoreError>> {
        sqlx::query(
            r#"
            DELETE FROM user_roles
            WHERE user_id = $1 AND role = $2
            "#,
        )
        .bind(user_id.as_str())
        .bind(role.as_str())
        .execute(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(())
    }
}
