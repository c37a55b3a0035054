//! pitwall-client library interface
//!
//! Session and entitlement reconciliation for the pitwall race prediction
//! client:
//! - [`session`]: who is signed in, from a provider session or stored credential
//! - [`entitlement`]: the backend's authoritative tier, cached read-through
//! - [`gating`]: tier → feature parameters
//! - [`prediction`]: ranked predictions at the gated depth
//! - [`client`]: the composed flow used by gated pages and the CLI

pub mod backend;
pub mod cancel;
pub mod catalog;
pub mod client;
pub mod entitlement;
pub mod error;
pub mod gating;
pub mod prediction;
pub mod session;

pub use crate::client::{PageState, PitwallClient};
pub use crate::error::{ClientError, Disposition, Result};
pub use crate::gating::{derive_parameters, CalendarScope, GatedParameters};
