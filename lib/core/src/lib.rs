//! Core domain types and utilities for the pocketbook bookkeeping API.
//!
//! This crate provides the identifier types and error handling shared by
//! the access-control library and the HTTP server.

pub mod error;
pub mod id;

pub use error::Result;
pub use id::{DeviceId, UserId};
