//! Session event types and event bus
//!
//! Session transitions (sign-in, forced sign-out, entitlement changes) are
//! published on a [`SessionEventBus`] so that the presentation layer can
//! react to them: a `SignInRequired` event is the redirect to the sign-in
//! entry point.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::Tier;

/// Session lifecycle events
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SessionEvent {
    /// Credential obtained and persisted
    SignedIn {
        email: String,
        timestamp: DateTime<Utc>,
    },

    /// User-initiated logout
    SignedOut { timestamp: DateTime<Utc> },

    /// Stored credential and profile were invalidated; the caller must send
    /// the user to the sign-in entry point
    SignInRequired {
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// Entitlement sync finished
    ///
    /// `tier` is `None` when the backend could not confirm the tier.
    EntitlementSynced {
        email: String,
        tier: Option<Tier>,
        timestamp: DateTime<Utc>,
    },

    /// Backend confirmed a tier upgrade
    TierUpgraded {
        email: String,
        tier: Tier,
        timestamp: DateTime<Utc>,
    },
}

impl SessionEvent {
    /// Event type name, matching the serde tag
    pub fn event_type(&self) -> &'static str {
        match self {
            SessionEvent::SignedIn { .. } => "SignedIn",
            SessionEvent::SignedOut { .. } => "SignedOut",
            SessionEvent::SignInRequired { .. } => "SignInRequired",
            SessionEvent::EntitlementSynced { .. } => "EntitlementSynced",
            SessionEvent::TierUpgraded { .. } => "TierUpgraded",
        }
    }
}

// ========================================
// SessionEventBus Implementation
// ========================================

/// Broadcast bus for session events
///
/// Uses tokio::broadcast internally:
/// - Non-blocking publish (slow subscribers don't block producers)
/// - Multiple concurrent subscribers
/// - Events emitted before subscription are not received
///
/// # Examples
///
/// ```
/// use pitwall_common::events::{SessionEvent, SessionEventBus};
///
/// let bus = SessionEventBus::new(16);
/// let mut rx = bus.subscribe();
///
/// bus.emit_lossy(SessionEvent::SignedOut { timestamp: chrono::Utc::now() });
/// assert_eq!(rx.try_recv().unwrap().event_type(), "SignedOut");
/// ```
#[derive(Debug, Clone)]
pub struct SessionEventBus {
    tx: broadcast::Sender<SessionEvent>,
}

impl SessionEventBus {
    /// Creates a new bus buffering up to `capacity` events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: SessionEvent) {
        let _ = self.tx.send(event);
    }
}

impl Default for SessionEventBus {
    fn default() -> Self {
        Self::new(64)
    }
}
