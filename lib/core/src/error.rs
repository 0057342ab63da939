//! Shared result alias.
//!
//! Crates define their own error enums and carry them inside a rootcause
//! [`Report`], so storage failures keep their causal chain while callers can
//! still match on the typed context at the top of the report.

use rootcause::Report;

/// Result carrying a [`Report`] whose current context is `C`.
pub type Result<T, C = ()> = std::result::Result<T, Report<C>>;
