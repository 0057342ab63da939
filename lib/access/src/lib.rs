//! Authentication and authorization core for pocketbook.
//!
//! This crate knows nothing about HTTP or SQL. It provides:
//! - [`TokenCodec`]: issuing and verifying signed access/refresh tokens
//! - [`SessionStore`]: the contract for persisting refresh-token sessions
//! - [`RoleCache`]: a shared, expiring cache over a [`RoleLoader`]
//! - [`PermissionEngine`]: evaluation of [`Requirement`] lists
//!
//! The server crate wires these into request middleware.

pub mod cache;
pub mod claims;
pub mod error;
pub mod password;
pub mod permission;
pub mod principal;
pub mod role;
pub mod session;
pub mod token;
pub mod user;

pub use cache::{RoleCache, RoleCacheConfig};
pub use claims::{Claims, TokenKind};
pub use error::{AuthenticationError, AuthorizationError, StoreError};
pub use password::{Argon2Hasher, PasswordHasher};
pub use permission::{PathParams, PermissionEngine, Requirement, TARGET_USER_PARAM};
pub use principal::Principal;
pub use role::{Role, RoleLoader, RoleSet, UnknownRole};
pub use session::{MemorySessionStore, Session, SessionLookup, SessionStore};
pub use token::{InvalidTokenConfig, SigningAlgorithm, TokenCodec, TokenConfig, TokenPair};
pub use user::{User, normalize_email};
