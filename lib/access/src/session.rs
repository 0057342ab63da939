//! Refresh-token sessions.
//!
//! A session binds a `(user, device)` pair to the one refresh token that may
//! currently be exchanged for new tokens. Saving a session for a pair that
//! already has one replaces it, which implicitly retires the old refresh
//! token.

use async_trait::async_trait;
use chrono::Utc;
use pocketbook_core::{DeviceId, UserId};
use rootcause::Report;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::StoreError;
use crate::token::TokenPair;

/// The durable record of a device's active refresh token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub user_id: UserId,
    pub device_id: DeviceId,
    pub refresh_token: String,
    /// Unix seconds.
    pub expires_at: i64,
}

impl Session {
    /// Builds the session that persists `tokens` for a device.
    #[must_use]
    pub fn for_tokens(user_id: UserId, device_id: DeviceId, tokens: &TokenPair) -> Self {
        Self {
            user_id,
            device_id,
            refresh_token: tokens.refresh_token.clone(),
            expires_at: tokens.refresh_token_expires_at,
        }
    }

    #[must_use]
    pub fn is_live_at(&self, now: i64) -> bool {
        self.expires_at > now
    }

    #[must_use]
    pub fn matches(&self, lookup: &SessionLookup) -> bool {
        self.user_id == lookup.user_id
            && self.device_id == lookup.device_id
            && self.refresh_token == lookup.refresh_token
    }
}

/// Key fields a presented refresh token must match exactly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionLookup {
    pub user_id: UserId,
    pub device_id: DeviceId,
    pub refresh_token: String,
}

/// Durable storage for sessions.
///
/// Implementations must make each call atomic. Concurrent saves for the same
/// `(user, device)` resolve last-writer-wins.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Inserts the session, or overwrites the refresh token and expiry of the
    /// existing session for the same `(user, device)`.
    async fn save_refresh_token(&self, session: &Session) -> Result<(), Report<StoreError>>;

    /// Returns the session matching all lookup fields whose expiry is strictly
    /// in the future.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] for a missing, mismatched, or expired
    /// session alike.
    async fn get_session(&self, lookup: &SessionLookup) -> Result<Session, Report<StoreError>>;
}

/// In-process session store.
///
/// Used when the server runs without a database, and as the reference
/// behaviour for other implementations.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<(UserId, DeviceId), Session>>,
}

impl MemorySessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.read().map(|s| s.len()).unwrap_or_default()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned() -> Report<StoreError> {
    StoreError::Unavailable {
        reason: "session map lock poisoned".to_string(),
    }
    .into()
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn save_refresh_token(&self, session: &Session) -> Result<(), Report<StoreError>> {
        let mut sessions = self.sessions.write().map_err(|_| poisoned())?;
        sessions.insert(
            (session.user_id.clone(), session.device_id.clone()),
            session.clone(),
        );
        Ok(())
    }

    async fn get_session(&self, lookup: &SessionLookup) -> Result<Session, Report<StoreError>> {
        let now = Utc::now().timestamp();
        let sessions = self.sessions.read().map_err(|_| poisoned())?;
        sessions
            .get(&(lookup.user_id.clone(), lookup.device_id.clone()))
            .filter(|s| s.matches(lookup) && s.is_live_at(now))
            .cloned()
            .ok_or_else(|| StoreError::NotFound.into())
    }
}
