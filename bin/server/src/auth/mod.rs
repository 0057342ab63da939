//! Authentication and authorization for the HTTP surface.
//!
//! This module provides:
//! - [`authenticate`]: middleware that turns the `Authorization` header into a
//!   [`Principal`](pocketbook_access::Principal) on every request
//! - [`CurrentPrincipal`]: the extractor handlers read it through
//! - [`require`]: per-route permission guards
//! - login and refresh handlers that issue token pairs
//!
//! # Request flow
//!
//! `authenticate` runs on every request, before routing. A missing header
//! yields the anonymous principal; a malformed header or a bad token ends the
//! request with 401. Guards run after routing, so they see the route's path
//! parameters. An anonymous caller that fails a guard gets 401, an
//! authenticated one 403.

pub mod middleware;
pub mod routes;

use pocketbook_access::{
    PasswordHasher, PermissionEngine, RoleCache, RoleCacheConfig, SessionStore, TokenCodec,
};
use std::sync::Arc;

use crate::db::{RoleStore, UserStore};

pub use middleware::{CurrentPrincipal, authenticate, bearer_token, require};
pub use routes::{login, refresh};

/// Shared application state.
pub struct AppState {
    pub codec: TokenCodec,
    pub permissions: PermissionEngine,
    pub users: Arc<dyn UserStore>,
    pub sessions: Arc<dyn SessionStore>,
    pub roles: Arc<dyn RoleStore>,
    pub hasher: Arc<dyn PasswordHasher>,
}

impl AppState {
    /// Wires the stores together. `roles` backs both the role cache and the
    /// role administration routes.
    pub fn new<R>(
        codec: TokenCodec,
        cache: &RoleCacheConfig,
        users: Arc<dyn UserStore>,
        sessions: Arc<dyn SessionStore>,
        roles: Arc<R>,
        hasher: Arc<dyn PasswordHasher>,
    ) -> Self
    where
        R: RoleStore + 'static,
    {
        let role_cache = RoleCache::new(roles.clone(), cache);
        Self {
            codec,
            permissions: PermissionEngine::new(Arc::new(role_cache)),
            users,
            sessions,
            roles,
            hasher,
        }
    }

    #[must_use]
    pub fn role_cache(&self) -> &RoleCache {
        self.permissions.roles()
    }
}
