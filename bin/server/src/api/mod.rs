//! REST handlers under `/api/v1`, plus `/version`.

pub mod roles;
pub mod users;
pub mod version;

use serde::Serialize;

/// Acknowledges a create action.
#[derive(Debug, Serialize)]
pub struct Created {
    pub created: bool,
}

/// Acknowledges a delete action.
#[derive(Debug, Serialize)]
pub struct Deleted {
    pub deleted: bool,
}
