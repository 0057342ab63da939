//! Error types for the access crate.
//!
//! Errors are designed for layered context using rootcause:
//! - `AuthenticationError`: credential and token failures
//! - `AuthorizationError`: permission evaluation failures
//! - `StoreError`: failures of the durable collaborators (sessions, roles)

use std::fmt;

/// Errors from authentication operations.
///
/// These errors represent failures in establishing who the caller is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthenticationError {
    /// The authorization header is not of the form `Bearer <token>`.
    MalformedCredential,
    /// A token cannot be issued for the nil principal.
    InvalidPrincipal,
    /// The token signature does not match the signing key.
    InvalidSignature,
    /// The token is well-signed but its expiry has elapsed.
    Expired,
    /// The token could not be decoded or is of the wrong kind.
    InvalidToken { reason: String },
    /// No live session matches the presented refresh token.
    SessionNotFound,
    /// Email/password pair did not match a user.
    InvalidCredentials,
    /// Token signing or password hashing failed.
    Internal { reason: String },
}

impl AuthenticationError {
    /// Message safe to show to clients.
    ///
    /// Signature and decoding detail never leaves the process.
    #[must_use]
    pub fn public_message(&self) -> &'static str {
        match self {
            Self::MalformedCredential => "Authorization header format must be Bearer {token}",
            Self::InvalidPrincipal => "invalid principal",
            Self::InvalidSignature | Self::InvalidToken { .. } => "invalid token",
            Self::Expired => "token has expired",
            Self::SessionNotFound => "session not found",
            Self::InvalidCredentials => "invalid email or password",
            Self::Internal { .. } => "internal error",
        }
    }
}

impl fmt::Display for AuthenticationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedCredential => write!(f, "malformed authorization header"),
            Self::InvalidPrincipal => write!(f, "invalid principal"),
            Self::InvalidSignature => write!(f, "token signature is invalid"),
            Self::Expired => write!(f, "token has expired"),
            Self::InvalidToken { reason } => write!(f, "invalid token: {reason}"),
            Self::SessionNotFound => write!(f, "session not found"),
            Self::InvalidCredentials => write!(f, "invalid email or password"),
            Self::Internal { reason } => write!(f, "internal authentication error: {reason}"),
        }
    }
}

impl std::error::Error for AuthenticationError {}

/// Errors from authorization operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorizationError {
    /// No requirement in the list was satisfied.
    PermissionDenied,
    /// A role lookup failed and no other requirement could grant access.
    RoleLookupFailed { reason: String },
}

impl fmt::Display for AuthorizationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PermissionDenied => write!(f, "permission denied"),
            Self::RoleLookupFailed { reason } => {
                write!(f, "authorization check failed: {reason}")
            }
        }
    }
}

impl std::error::Error for AuthorizationError {}

/// Errors from durable stores consumed by the access core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The requested record does not exist (or is no longer live).
    NotFound,
    /// A uniqueness constraint rejected the write.
    Conflict { reason: String },
    /// The store could not be reached or failed the query.
    Unavailable { reason: String },
    /// The call did not finish before its deadline.
    Timeout,
}

impl StoreError {
    /// Returns true if repeating the call later may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable { .. } | Self::Timeout)
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "record not found"),
            Self::Conflict { reason } => write!(f, "conflicting record: {reason}"),
            Self::Unavailable { reason } => write!(f, "store unavailable: {reason}"),
            Self::Timeout => write!(f, "store call timed out"),
        }
    }
}

impl std::error::Error for StoreError {}
