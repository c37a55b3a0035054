//! Entitlement synchronization
//!
//! Keeps a read-through cache of the backend's authoritative tier record.
//! The client never originates a tier: every cached value was returned by
//! the backend, and the cache is a UI hint only.
//!
//! # Ordering
//!
//! Requests take an issuance number when they are made and run one at a
//! time, in issuance order, through a FIFO gate. When a `sync` read
//! completes after a newer request was issued, its result is discarded
//! (`Superseded`) and the cache is left untouched: the newer request runs
//! after it and observes backend state at least as recent. The backend
//! identifier a superseded read learned is still kept, so an `upgrade`
//! queued behind the first `sync` of a page can proceed.
//!
//! # Failure
//!
//! Transport errors and backend-side failures degrade a `sync` to
//! [`TierStatus::Unknown`], which is distinct from a confirmed `Free`.
//! A cancelled request writes nothing.

use chrono::{DateTime, Utc};
use pitwall_common::api::{UserRecordBody, UserUpsert};
use pitwall_common::events::{SessionEvent, SessionEventBus};
use pitwall_common::time::now;
use pitwall_common::Tier;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backend::Backend;
use crate::cancel::run_cancellable;
use crate::error::{ClientError, Result};
use crate::session::Actor;

/// Outcome of an entitlement lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TierStatus {
    Confirmed(Tier),
    /// The backend could not be reached or failed; blocks gated actions
    Unknown,
}

impl TierStatus {
    pub fn tier(&self) -> Option<Tier> {
        match self {
            TierStatus::Confirmed(tier) => Some(*tier),
            TierStatus::Unknown => None,
        }
    }
}

/// Client-side view of the backend user record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntitlementRecord {
    /// Backend identifier; absent only when the tier is unknown and no
    /// earlier sync succeeded
    pub actor_id: Option<String>,
    pub email: String,
    pub tier: TierStatus,
    pub last_synced_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct SyncState {
    /// Last confirmed record
    cached: Option<EntitlementRecord>,
    /// Issuance number of the request that produced `cached`
    applied: u64,
    /// Issued requests that have not finished yet
    outstanding: BTreeSet<u64>,
    /// Backend identifiers by normalized email, including those learned by
    /// superseded reads; an identifier never changes for an account
    known_ids: HashMap<String, String>,
}

impl SyncState {
    fn remember_id(&mut self, email: &str, id: &str) {
        self.known_ids.insert(email_key(email), id.to_string());
    }

    fn id_for(&self, email: &str) -> Option<String> {
        self.cached
            .as_ref()
            .filter(|c| same_email(&c.email, email))
            .and_then(|c| c.actor_id.clone())
            .or_else(|| self.known_ids.get(&email_key(email)).cloned())
    }
}

/// Reconciles an [`Actor`] against the backend's tier record
pub struct EntitlementSynchronizer {
    backend: Arc<dyn Backend>,
    events: SessionEventBus,
    state: Mutex<SyncState>,
    /// FIFO: tokio's mutex grants the lock in request order
    gate: tokio::sync::Mutex<()>,
    next_ticket: AtomicU64,
}

/// Issuance record of one request; leaves the outstanding set when dropped,
/// including when the request future is dropped mid-flight
struct Ticket<'a> {
    owner: &'a EntitlementSynchronizer,
    number: u64,
}

impl Drop for Ticket<'_> {
    fn drop(&mut self) {
        if let Ok(mut state) = self.owner.state.lock() {
            state.outstanding.remove(&self.number);
        }
    }
}

impl EntitlementSynchronizer {
    pub fn new(backend: Arc<dyn Backend>, events: SessionEventBus) -> Self {
        Self {
            backend,
            events,
            state: Mutex::new(SyncState::default()),
            gate: tokio::sync::Mutex::new(()),
            next_ticket: AtomicU64::new(1),
        }
    }

    /// Last confirmed record (UI hint only)
    pub fn cached(&self) -> Option<EntitlementRecord> {
        self.lock_state().ok().and_then(|s| s.cached.clone())
    }

    /// Forget the cached record, e.g. after sign-out
    pub fn reset(&self) {
        if let Ok(mut state) = self.lock_state() {
            state.cached = None;
            state.known_ids.clear();
        }
    }

    /// Upsert the actor's user record, then read the canonical record
    pub async fn sync(&self, actor: &Actor) -> Result<EntitlementRecord> {
        self.sync_cancellable(actor, &CancellationToken::new()).await
    }

    /// [`sync`](Self::sync), abandoned when `cancel` fires
    pub async fn sync_cancellable(
        &self,
        actor: &Actor,
        cancel: &CancellationToken,
    ) -> Result<EntitlementRecord> {
        ensure_identity(actor)?;
        let ticket = self.issue()?;
        let _turn = run_cancellable(cancel, async { Ok(self.gate.lock().await) }).await?;

        debug!(email = %actor.email, ticket = ticket.number, "Syncing entitlement");
        let outcome = run_cancellable(cancel, self.fetch_record(actor)).await;

        if matches!(outcome, Err(ClientError::Cancelled)) {
            info!(email = %actor.email, "Entitlement sync cancelled");
            return Err(ClientError::Cancelled);
        }

        let mut state = self.lock_state()?;
        if state.outstanding.range(ticket.number + 1..).next().is_some() {
            // Tier is stale; the identifier is not
            if let Ok(body) = &outcome {
                if same_email(&body.email, &actor.email) {
                    state.remember_id(&body.email, &body.id);
                }
            }
            debug!(ticket = ticket.number, "Discarding superseded entitlement read");
            return Err(ClientError::Superseded);
        }

        match outcome {
            Ok(body) => {
                let record = confirmed_record(actor, body)?;
                if let Some(id) = &record.actor_id {
                    state.remember_id(&record.email, id);
                }
                if ticket.number > state.applied {
                    state.cached = Some(record.clone());
                    state.applied = ticket.number;
                }
                drop(state);

                info!(email = %record.email, tier = ?record.tier, "Entitlement synced");
                self.events.emit_lossy(SessionEvent::EntitlementSynced {
                    email: record.email.clone(),
                    tier: record.tier.tier(),
                    timestamp: record.last_synced_at,
                });
                Ok(record)
            }
            Err(e) if degrades_to_unknown(&e) => {
                let actor_id = state.id_for(&actor.email);
                drop(state);

                warn!(email = %actor.email, error = %e, "Entitlement could not be confirmed");
                self.events.emit_lossy(SessionEvent::EntitlementSynced {
                    email: actor.email.clone(),
                    tier: None,
                    timestamp: now(),
                });
                Ok(EntitlementRecord {
                    actor_id,
                    email: actor.email.clone(),
                    tier: TierStatus::Unknown,
                    last_synced_at: now(),
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Ask the backend to move the actor to the pro tier
    ///
    /// Keyed by the backend identifier learned by an earlier read (including
    /// one superseded by this request), never by email. Fails with
    /// `NotReady` if no read for this actor has succeeded.
    pub async fn upgrade(&self, actor: &Actor) -> Result<EntitlementRecord> {
        self.upgrade_cancellable(actor, &CancellationToken::new()).await
    }

    /// [`upgrade`](Self::upgrade), abandoned when `cancel` fires
    pub async fn upgrade_cancellable(
        &self,
        actor: &Actor,
        cancel: &CancellationToken,
    ) -> Result<EntitlementRecord> {
        ensure_identity(actor)?;
        let ticket = self.issue()?;
        let _turn = run_cancellable(cancel, async { Ok(self.gate.lock().await) }).await?;

        let actor_id = self
            .lock_state()?
            .id_for(&actor.email)
            .ok_or_else(|| {
                ClientError::NotReady(format!(
                    "Entitlement for {} has not been synced yet",
                    actor.email
                ))
            })?;

        info!(email = %actor.email, actor_id = %actor_id, "Requesting tier upgrade");
        let body = run_cancellable(
            cancel,
            self.backend
                .set_user_tier(actor.credential(), &actor_id, Tier::Pro),
        )
        .await?;

        if body.id != actor_id {
            return Err(ClientError::MalformedResponse(format!(
                "Upgrade of user {} returned user {}",
                actor_id, body.id
            )));
        }
        let record = confirmed_record(actor, body)?;

        let mut state = self.lock_state()?;
        if ticket.number > state.applied {
            state.cached = Some(record.clone());
            state.applied = ticket.number;
        }
        drop(state);

        match record.tier {
            TierStatus::Confirmed(Tier::Pro) => {
                info!(email = %record.email, "Tier upgraded");
                self.events.emit_lossy(SessionEvent::TierUpgraded {
                    email: record.email.clone(),
                    tier: Tier::Pro,
                    timestamp: record.last_synced_at,
                });
            }
            other => {
                warn!(email = %record.email, tier = ?other, "Backend did not apply the upgrade");
            }
        }
        Ok(record)
    }

    fn issue(&self) -> Result<Ticket<'_>> {
        let number = self.next_ticket.fetch_add(1, Ordering::SeqCst);
        self.lock_state()?.outstanding.insert(number);
        Ok(Ticket {
            owner: self,
            number,
        })
    }

    async fn fetch_record(&self, actor: &Actor) -> Result<UserRecordBody> {
        let upsert = UserUpsert {
            email: actor.email.clone(),
            name: actor.display_name.clone(),
            tier: Tier::Free,
        };
        self.backend
            .upsert_user(actor.credential(), &upsert)
            .await?;
        self.backend
            .user_by_email(actor.credential(), &actor.email)
            .await
    }

    fn lock_state(&self) -> Result<MutexGuard<'_, SyncState>> {
        self.state.lock().map_err(|_| {
            pitwall_common::Error::Store("Entitlement cache lock poisoned".to_string()).into()
        })
    }
}

fn ensure_identity(actor: &Actor) -> Result<()> {
    if actor.has_profile() {
        Ok(())
    } else {
        Err(ClientError::NotReady(
            "Actor profile has not been loaded".to_string(),
        ))
    }
}

fn same_email(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}

fn email_key(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

fn confirmed_record(actor: &Actor, body: UserRecordBody) -> Result<EntitlementRecord> {
    if !same_email(&body.email, &actor.email) {
        return Err(ClientError::MalformedResponse(format!(
            "Requested record for {} but backend returned {}",
            actor.email, body.email
        )));
    }
    Ok(EntitlementRecord {
        actor_id: Some(body.id),
        email: body.email,
        tier: TierStatus::Confirmed(body.tier),
        last_synced_at: now(),
    })
}

/// Failures that leave the tier unconfirmed rather than failing the sync
fn degrades_to_unknown(err: &ClientError) -> bool {
    matches!(
        err,
        ClientError::NetworkFailure(_) | ClientError::Backend { .. } | ClientError::NotFound(_)
    )
}
