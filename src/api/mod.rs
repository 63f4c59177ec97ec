//! HTTP route definitions
//!
//! Handlers are thin: they resolve the caller, then hand off to the export core
//! or the auth service.

pub mod auth;
pub mod extract;
pub mod files;
pub mod health;
