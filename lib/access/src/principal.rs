//! The identity attached to a request.

use pocketbook_core::UserId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The authenticated identity of a caller.
///
/// A principal with a nil user ID is anonymous: no token was presented.
/// Principals are immutable once built.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Principal {
    #[serde(rename = "userID")]
    user_id: UserId,
}

impl Principal {
    #[must_use]
    pub fn new(user_id: UserId) -> Self {
        Self { user_id }
    }

    /// The principal used when a request carries no credential.
    #[must_use]
    pub const fn anonymous() -> Self {
        Self {
            user_id: UserId::nil(),
        }
    }

    #[must_use]
    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    #[must_use]
    pub fn is_anonymous(&self) -> bool {
        self.user_id.is_nil()
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_anonymous() {
            f.write_str("anonymous")
        } else {
            write!(f, "user:{}", self.user_id)
        }
    }
}
