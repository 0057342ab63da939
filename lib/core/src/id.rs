//! Opaque identifier types.
//!
//! Identifiers are opaque strings. The empty string is the "nil" value of
//! each type: a nil [`UserId`] marks an anonymous caller, a nil [`DeviceId`]
//! means the client did not name its device.

use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;
use ulid::Ulid;

/// Generates a string-backed identifier newtype.
macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident, $prefix:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wraps an existing identifier string.
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Returns the nil (empty) identifier.
            #[must_use]
            pub const fn nil() -> Self {
                Self(String::new())
            }

            /// Generates a fresh identifier of the form `<prefix>_<ulid>`.
            #[must_use]
            pub fn generate() -> Self {
                Self(format!("{}_{}", $prefix, Ulid::new()))
            }

            /// Returns true for the empty identifier.
            #[must_use]
            pub fn is_nil(&self) -> bool {
                self.0.is_empty()
            }

            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            #[must_use]
            pub fn into_string(self) -> String {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = Infallible;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(s.to_string()))
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

define_id!(
    /// Identifier of a user account.
    UserId,
    "usr"
);

define_id!(
    /// Client-chosen identifier of the device a session belongs to.
    DeviceId,
    "dev"
);
