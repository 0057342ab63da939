//! pocketbook HTTP server.
//!
//! This crate exposes the bookkeeping API over axum. Authentication and
//! authorization come from `pocketbook-access`; this crate supplies the
//! request pipeline, the route table and the storage backends.

pub mod api;
pub mod app;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;

pub use app::router;
