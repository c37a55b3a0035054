//! # Pitwall Common Library
//!
//! Shared code for the pitwall client including:
//! - Configuration loading
//! - Backend wire types (request/response bodies)
//! - Canonical persisted session schema and the credential store
//! - Session event types (SessionEvent enum) and the event bus
//! - Timestamp utilities

pub mod api;
pub mod config;
pub mod error;
pub mod events;
pub mod store;
pub mod tier;
pub mod time;

pub use error::{Error, Result};
pub use tier::Tier;
