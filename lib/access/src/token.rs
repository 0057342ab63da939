//! Issuing and verifying signed session tokens.
//!
//! Tokens are HMAC-signed JWTs. The codec holds the only copy of the signing
//! key; it is built once from [`TokenConfig`] at startup and never mutated.

use chrono::Utc;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;
use ulid::Ulid;

use crate::claims::{Claims, TokenKind};
use crate::error::AuthenticationError;
use crate::principal::Principal;

/// HMAC signing algorithms accepted for session tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SigningAlgorithm {
    HS256,
    HS384,
    #[default]
    HS512,
}

impl SigningAlgorithm {
    fn as_jwt(self) -> Algorithm {
        match self {
            Self::HS256 => Algorithm::HS256,
            Self::HS384 => Algorithm::HS384,
            Self::HS512 => Algorithm::HS512,
        }
    }
}

/// Token-related configuration.
#[derive(Clone, Deserialize)]
pub struct TokenConfig {
    /// Symmetric signing secret. Must not be empty.
    pub secret: String,

    /// Access token lifetime in minutes.
    #[serde(default = "default_access_ttl_minutes")]
    pub access_ttl_minutes: i64,

    /// Refresh token lifetime in days.
    #[serde(default = "default_refresh_ttl_days")]
    pub refresh_ttl_days: i64,

    #[serde(default)]
    pub algorithm: SigningAlgorithm,

    /// How far before `iat` a token is already accepted, to absorb clock skew
    /// between hosts.
    #[serde(default = "default_not_before_skew_seconds")]
    pub not_before_skew_seconds: i64,
}

fn default_access_ttl_minutes() -> i64 {
    30
}

fn default_refresh_ttl_days() -> i64 {
    30
}

fn default_not_before_skew_seconds() -> i64 {
    120
}

impl TokenConfig {
    #[must_use]
    pub fn with_secret(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            access_ttl_minutes: default_access_ttl_minutes(),
            refresh_ttl_days: default_refresh_ttl_days(),
            algorithm: SigningAlgorithm::default(),
            not_before_skew_seconds: default_not_before_skew_seconds(),
        }
    }
}

impl fmt::Debug for TokenConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenConfig")
            .field("secret", &"<redacted>")
            .field("access_ttl_minutes", &self.access_ttl_minutes)
            .field("refresh_ttl_days", &self.refresh_ttl_days)
            .field("algorithm", &self.algorithm)
            .field("not_before_skew_seconds", &self.not_before_skew_seconds)
            .finish()
    }
}

/// Rejected token configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidTokenConfig {
    pub reason: String,
}

impl fmt::Display for InvalidTokenConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid token configuration: {}", self.reason)
    }
}

impl std::error::Error for InvalidTokenConfig {}

/// The result of issuing tokens for a principal.
///
/// Serializes as the `tokens` object of the login/refresh response. The
/// refresh token's expiry is kept server-side only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    #[serde(rename = "expiresAt")]
    pub access_token_expires_at: i64,
    pub refresh_token: String,
    #[serde(skip)]
    pub refresh_token_expires_at: i64,
}

/// Signs and verifies session tokens.
#[derive(Clone)]
pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    algorithm: Algorithm,
    access_ttl_secs: i64,
    refresh_ttl_secs: i64,
    not_before_skew_secs: i64,
}

impl fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenCodec")
            .field("algorithm", &self.algorithm)
            .field("access_ttl_secs", &self.access_ttl_secs)
            .field("refresh_ttl_secs", &self.refresh_ttl_secs)
            .finish_non_exhaustive()
    }
}

impl TokenCodec {
    /// Builds a codec from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the secret is empty or a lifetime is not positive.
    pub fn new(config: &TokenConfig) -> Result<Self, InvalidTokenConfig> {
        if config.secret.is_empty() {
            return Err(InvalidTokenConfig {
                reason: "signing secret is empty".to_string(),
            });
        }
        if config.access_ttl_minutes <= 0 || config.refresh_ttl_days <= 0 {
            return Err(InvalidTokenConfig {
                reason: "token lifetimes must be positive".to_string(),
            });
        }
        if config.not_before_skew_seconds < 0 {
            return Err(InvalidTokenConfig {
                reason: "not-before skew must not be negative".to_string(),
            });
        }

        let secret = config.secret.as_bytes();
        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            algorithm: config.algorithm.as_jwt(),
            access_ttl_secs: config.access_ttl_minutes * 60,
            refresh_ttl_secs: config.refresh_ttl_days * 24 * 60 * 60,
            not_before_skew_secs: config.not_before_skew_seconds,
        })
    }

    /// Issues an access/refresh pair for `principal` at the current time.
    pub fn issue(&self, principal: &Principal) -> Result<TokenPair, AuthenticationError> {
        self.issue_at(principal, Utc::now().timestamp())
    }

    /// Issues an access/refresh pair as if the current time were `now`.
    pub fn issue_at(
        &self,
        principal: &Principal,
        now: i64,
    ) -> Result<TokenPair, AuthenticationError> {
        if principal.is_anonymous() {
            return Err(AuthenticationError::InvalidPrincipal);
        }

        let access_token_expires_at = now + self.access_ttl_secs;
        let refresh_token_expires_at = now + self.refresh_ttl_secs;

        let access_token = self.sign(&self.claims(
            principal,
            TokenKind::Access,
            now,
            access_token_expires_at,
        ))?;
        let refresh_token = self.sign(&self.claims(
            principal,
            TokenKind::Refresh,
            now,
            refresh_token_expires_at,
        ))?;

        Ok(TokenPair {
            access_token,
            access_token_expires_at,
            refresh_token,
            refresh_token_expires_at,
        })
    }

    /// Verifies an access token and returns its principal.
    ///
    /// The signature is checked before the expiry. Expired tokens are always
    /// rejected.
    pub fn verify(&self, token: &str) -> Result<Principal, AuthenticationError> {
        self.verify_at(token, Utc::now().timestamp())
    }

    pub fn verify_at(&self, token: &str, now: i64) -> Result<Principal, AuthenticationError> {
        self.verify_kind(token, TokenKind::Access, now)
    }

    /// Verifies a refresh token and returns its principal.
    ///
    /// This only proves the token is authentic and unexpired; the caller must
    /// still match it against the stored session.
    pub fn verify_refresh(&self, token: &str) -> Result<Principal, AuthenticationError> {
        self.verify_refresh_at(token, Utc::now().timestamp())
    }

    pub fn verify_refresh_at(
        &self,
        token: &str,
        now: i64,
    ) -> Result<Principal, AuthenticationError> {
        self.verify_kind(token, TokenKind::Refresh, now)
    }

    fn claims(&self, principal: &Principal, typ: TokenKind, now: i64, exp: i64) -> Claims {
        Claims {
            user_id: principal.user_id().clone(),
            typ,
            jti: Ulid::new().to_string(),
            iat: now,
            nbf: Some(now - self.not_before_skew_secs),
            exp,
        }
    }

    fn sign(&self, claims: &Claims) -> Result<String, AuthenticationError> {
        jsonwebtoken::encode(&Header::new(self.algorithm), claims, &self.encoding_key).map_err(
            |e| AuthenticationError::Internal {
                reason: format!("token signing failed: {e}"),
            },
        )
    }

    fn verify_kind(
        &self,
        token: &str,
        expected: TokenKind,
        now: i64,
    ) -> Result<Principal, AuthenticationError> {
        // Time checks run against `now` below, not the library's clock.
        let mut validation = Validation::new(self.algorithm);
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.leeway = 0;

        let claims = jsonwebtoken::decode::<Claims>(token, &self.decoding_key, &validation)
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidSignature => AuthenticationError::InvalidSignature,
                _ => AuthenticationError::InvalidToken {
                    reason: e.to_string(),
                },
            })?
            .claims;

        if let Err(e) = claims.validate_time(now) {
            if e == AuthenticationError::Expired {
                debug!(user_id = %claims.user_id, "rejecting expired token");
            }
            return Err(e);
        }

        if claims.typ != expected {
            return Err(AuthenticationError::InvalidToken {
                reason: format!("expected {expected:?} token, got {:?}", claims.typ),
            });
        }

        if claims.user_id.is_nil() {
            return Err(AuthenticationError::InvalidToken {
                reason: "token names no user".to_string(),
            });
        }

        Ok(Principal::new(claims.user_id))
    }
}
