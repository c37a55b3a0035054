//! Test helper modules for pitwall-client integration tests
//!
//! - ScriptedBackend: in-memory backend with call counting, held lookups
//!   and scripted prediction outcomes
//! - MockServer: axum server on an ephemeral port speaking the real HTTP
//!   surface

#![allow(dead_code)]

pub mod mock_server;
pub mod scripted_backend;

pub use mock_server::MockServer;
pub use scripted_backend::{PredictOutcome, ScriptedBackend};

use pitwall_client::session::{Actor, ActorSource};
use pitwall_common::store::{Credential, ProfileSnapshot, StoredSession};

/// Signed-in actor backed by a stored credential
pub fn actor(email: &str, token: &str) -> Actor {
    Actor {
        id: None,
        email: email.to_string(),
        display_name: "Test Driver".to_string(),
        credential: Some(Credential::new(token)),
        source: ActorSource::StoredCredential,
    }
}

/// Store document for a signed-in user
pub fn stored_session(email: &str, token: &str) -> StoredSession {
    StoredSession::new(
        Some(Credential::new(token)),
        Some(ProfileSnapshot {
            id: None,
            email: email.to_string(),
            display_name: "Test Driver".to_string(),
        }),
    )
}
