//! Core types, validation, access rules, and the offline sync reconciler
//! for the Urbanwatch incident service.
//!
//! This crate is free of HTTP and database dependencies. Storage backends
//! implement [`store::IncidentStore`]; the server depends only on that trait.

pub mod access;
pub mod error;
pub mod identity;
pub mod incident;
pub mod reconcile;
pub mod store;
pub mod validate;

pub use error::{Error, Result};
