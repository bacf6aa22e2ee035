//! services/api/src/lib.rs
//!
//! The adapters and the web surface of the error-review service, shared by
//! the `api` and `openapi` binaries.

pub mod adapters;
pub mod config;
pub mod error;
pub mod web;
