//! Signed token payload.

use pocketbook_core::UserId;
use serde::{Deserialize, Serialize};

use crate::error::AuthenticationError;

/// Which half of a token pair a token is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    /// Short-lived token presented on every request.
    Access,
    /// Long-lived token exchanged for a new pair.
    Refresh,
}

/// Claims carried inside a signed token. All times are unix seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    #[serde(rename = "userID")]
    pub user_id: UserId,
    pub typ: TokenKind,
    /// Unique per token, so pairs issued within the same second differ.
    #[serde(default)]
    pub jti: String,
    pub iat: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,
    pub exp: i64,
}

impl Claims {
    /// Checks the time window of already signature-verified claims.
    ///
    /// `exp` is exclusive: a token is expired at the second it names.
    pub fn validate_time(&self, now: i64) -> Result<(), AuthenticationError> {
        if self.exp <= self.iat {
            return Err(AuthenticationError::InvalidToken {
                reason: "expiry is not after issue time".to_string(),
            });
        }
        if let Some(nbf) = self.nbf {
            if now < nbf {
                return Err(AuthenticationError::InvalidToken {
                    reason: "token is not yet valid".to_string(),
                });
            }
        }
        if now >= self.exp {
            return Err(AuthenticationError::Expired);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(iat: i64, nbf: Option<i64>, exp: i64) -> Claims {
        Claims {
            user_id: UserId::from("usr_1"),
            typ: TokenKind::Access,
            jti: "01HZX".to_string(),
            iat,
            nbf,
            exp,
        }
    }

    #[test]
    fn valid_window() {
        assert!(claims(100, Some(0), 200).validate_time(150).is_ok());
    }

    #[test]
    fn expired_at_and_after_exp() {
        let c = claims(100, None, 200);
        assert_eq!(c.validate_time(200), Err(AuthenticationError::Expired));
        assert_eq!(c.validate_time(10_000), Err(AuthenticationError::Expired));
    }

    #[test]
    fn before_nbf_is_rejected() {
        let c = claims(100, Some(90), 200);
        assert!(matches!(
            c.validate_time(80),
            Err(AuthenticationError::InvalidToken { .. })
        ));
    }

    #[test]
    fn inverted_window_is_rejected() {
        let c = claims(200, None, 200);
        assert!(matches!(
            c.validate_time(150),
            Err(AuthenticationError::InvalidToken { .. })
        ));
    }

    #[test]
    fn wire_names() {
        let json = serde_json::to_value(claims(1, None, 2)).expect("serialize");
        assert_eq!(json["userID"], "usr_1");
        assert_eq!(json["typ"], "access");
        assert!(json.get("nbf").is_none());
    }
}
