//! Session resolution
//!
//! Determines who the current caller is from whichever credential
//! representation exists, in priority order:
//!
//! 1. An active provider-issued (federated) session, if one is configured
//! 2. A bearer credential in the credential store (with its cached profile)
//! 3. A cached profile snapshot alone
//!
//! Resolution never contacts the backend. The credential is validated
//! lazily by the first backend call that uses it; when any such call comes
//! back with an authorization failure, [`SessionResolver::observe`] clears
//! the stored credential and profile in one operation and publishes
//! `SignInRequired`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pitwall_common::api::SignupRequest;
use pitwall_common::events::{SessionEvent, SessionEventBus};
use pitwall_common::store::{Credential, CredentialStore, ProfileSnapshot, StoredSession};
use pitwall_common::time::{deserialize_timestamp, now};
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::backend::Backend;
use crate::error::{ClientError, Result};

// ========================================
// Actor
// ========================================

/// Where an [`Actor`] was resolved from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorSource {
    Federated,
    StoredCredential,
    ProfileSnapshot,
}

/// Resolved identity of the current session holder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub id: Option<String>,
    pub email: String,
    pub display_name: String,
    pub credential: Option<Credential>,
    pub source: ActorSource,
}

impl Actor {
    /// Email is the identity key for entitlement; without it the profile
    /// must be fetched from `GET /me` first
    pub fn has_profile(&self) -> bool {
        !self.email.trim().is_empty()
    }

    pub fn credential(&self) -> Option<&Credential> {
        self.credential.as_ref()
    }

    fn snapshot(&self) -> ProfileSnapshot {
        ProfileSnapshot {
            id: self.id.clone(),
            email: self.email.clone(),
            display_name: self.display_name.clone(),
        }
    }
}

/// Outcome of [`SessionResolver::resolve`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Authenticated(Actor),
    Unauthenticated,
}

impl Resolution {
    /// The actor, or `Unauthenticated` as an error
    pub fn into_actor(self) -> Result<Actor> {
        match self {
            Resolution::Authenticated(actor) => Ok(actor),
            Resolution::Unauthenticated => Err(ClientError::Unauthenticated),
        }
    }
}

// ========================================
// Federated sessions
// ========================================

/// Session issued by an external identity provider
#[derive(Debug, Clone, Deserialize)]
pub struct FederatedSession {
    pub access_token: Credential,
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub expires_at: DateTime<Utc>,
}

impl FederatedSession {
    pub fn is_active_at(&self, at: DateTime<Utc>) -> bool {
        self.expires_at > at && !self.access_token.is_blank() && !self.email.trim().is_empty()
    }
}

/// Source of provider-issued sessions
#[async_trait]
pub trait FederatedSessionSource: Send + Sync {
    /// Current provider session, active or not
    async fn current(&self) -> Result<Option<FederatedSession>>;

    /// Drop the provider session after the backend rejected its token
    async fn end(&self) -> Result<()>;
}

/// Provider session handed over as a JSON document on disk
#[derive(Debug, Clone)]
pub struct FileFederatedSession {
    path: PathBuf,
}

impl FileFederatedSession {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl FederatedSessionSource for FileFederatedSession {
    async fn current(&self) -> Result<Option<FederatedSession>> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Cannot read federated session");
                return Ok(None);
            }
        };
        match serde_json::from_slice::<FederatedSession>(&bytes) {
            Ok(session) => Ok(Some(session)),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Ignoring unreadable federated session");
                Ok(None)
            }
        }
    }

    async fn end(&self) -> Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(pitwall_common::Error::Io(e).into()),
        }
    }
}

// ========================================
// Resolver
// ========================================

fn required_credentials<'a>(email: &'a str, password: &str) -> Result<&'a str> {
    let email = email.trim();
    if email.is_empty() || password.is_empty() {
        return Err(pitwall_common::Error::InvalidInput(
            "Email and password are required".to_string(),
        )
        .into());
    }
    Ok(email)
}

/// Produces the canonical [`Actor`] and owns credential invalidation
pub struct SessionResolver {
    store: Arc<dyn CredentialStore>,
    federated: Option<Arc<dyn FederatedSessionSource>>,
    events: SessionEventBus,
}

impl SessionResolver {
    pub fn new(store: Arc<dyn CredentialStore>, events: SessionEventBus) -> Self {
        Self {
            store,
            federated: None,
            events,
        }
    }

    /// Consult a provider session before the stored credential
    pub fn with_federated(mut self, source: Arc<dyn FederatedSessionSource>) -> Self {
        self.federated = Some(source);
        self
    }

    pub fn events(&self) -> &SessionEventBus {
        &self.events
    }

    /// Resolve the current caller without contacting the backend
    pub async fn resolve(&self) -> Result<Resolution> {
        if let Some(source) = &self.federated {
            match source.current().await? {
                Some(session) if session.is_active_at(now()) => {
                    debug!(email = %session.email, "Resolved actor from federated session");
                    return Ok(Resolution::Authenticated(Actor {
                        id: session.user_id,
                        display_name: session.name.unwrap_or_default(),
                        email: session.email,
                        credential: Some(session.access_token),
                        source: ActorSource::Federated,
                    }));
                }
                Some(session) => {
                    debug!(expired_at = %session.expires_at, "Federated session inactive");
                }
                None => {}
            }
        }

        let stored = self.store.load().await?;
        let resolution = match (stored.credential, stored.profile) {
            (Some(credential), profile) => {
                let profile = profile.unwrap_or_else(|| ProfileSnapshot {
                    id: None,
                    email: String::new(),
                    display_name: String::new(),
                });
                Resolution::Authenticated(Actor {
                    id: profile.id,
                    email: profile.email,
                    display_name: profile.display_name,
                    credential: Some(credential),
                    source: ActorSource::StoredCredential,
                })
            }
            (None, Some(profile)) if !profile.email.trim().is_empty() => {
                Resolution::Authenticated(Actor {
                    id: profile.id,
                    email: profile.email,
                    display_name: profile.display_name,
                    credential: None,
                    source: ActorSource::ProfileSnapshot,
                })
            }
            _ => Resolution::Unauthenticated,
        };

        debug!(
            authenticated = matches!(resolution, Resolution::Authenticated(_)),
            "Resolved session from credential store"
        );
        Ok(resolution)
    }

    /// Exchange email and password for a credential and persist it together
    /// with the profile from `GET /me`
    pub async fn sign_in(&self, backend: &dyn Backend, email: &str, password: &str) -> Result<Actor> {
        let email = required_credentials(email, password)?;

        // A 401 here is a bad password; nothing is stored yet
        let login = backend.login(email, password).await?;
        if !login.token_type.eq_ignore_ascii_case("bearer") {
            return Err(ClientError::MalformedResponse(format!(
                "Unsupported token type '{}'",
                login.token_type
            )));
        }

        let credential = Credential::new(login.access_token);
        if credential.is_blank() {
            return Err(ClientError::MalformedResponse("Empty access token".to_string()));
        }

        let me = backend.me(&credential).await?;
        let actor = Actor {
            id: me.id,
            display_name: me.name.unwrap_or_default(),
            email: me.email,
            credential: Some(credential),
            source: ActorSource::StoredCredential,
        };

        self.store
            .save(&StoredSession::new(actor.credential.clone(), Some(actor.snapshot())))
            .await?;

        info!(email = %actor.email, "Signed in");
        self.events.emit_lossy(SessionEvent::SignedIn {
            email: actor.email.clone(),
            timestamp: now(),
        });
        Ok(actor)
    }

    /// Create an account, then sign in with it
    ///
    /// A duplicate email comes back as [`ClientError::Rejected`] carrying the
    /// backend's message; nothing is stored in that case.
    pub async fn register(
        &self,
        backend: &dyn Backend,
        email: &str,
        password: &str,
    ) -> Result<Actor> {
        let email = required_credentials(email, password)?;

        backend
            .signup(&SignupRequest {
                email: email.to_string(),
                password: password.to_string(),
            })
            .await
            .map_err(|e| {
                if let ClientError::Rejected(detail) = &e {
                    info!(email = %email, detail = %detail, "Registration refused");
                }
                e
            })?;
        info!(email = %email, "Account registered");

        self.sign_in(backend, email, password).await
    }

    /// Fill in the actor's profile from `GET /me`
    ///
    /// For a stored credential the fresh snapshot is persisted alongside the
    /// credential in a single write.
    pub async fn refresh_profile(&self, backend: &dyn Backend, actor: &Actor) -> Result<Actor> {
        let credential = actor.credential.as_ref().ok_or(ClientError::Unauthenticated)?;
        let me = backend.me(credential).await?;

        let refreshed = Actor {
            id: me.id.or_else(|| actor.id.clone()),
            display_name: me
                .name
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| actor.display_name.clone()),
            email: me.email,
            credential: actor.credential.clone(),
            source: actor.source,
        };

        if refreshed.source == ActorSource::StoredCredential {
            self.store
                .save(&StoredSession::new(
                    refreshed.credential.clone(),
                    Some(refreshed.snapshot()),
                ))
                .await?;
        }

        debug!(email = %refreshed.email, "Profile refreshed");
        Ok(refreshed)
    }

    /// User-initiated logout
    pub async fn sign_out(&self) -> Result<()> {
        self.store.clear().await?;
        info!("Signed out");
        self.events.emit_lossy(SessionEvent::SignedOut { timestamp: now() });
        Ok(())
    }

    /// Clear credential and profile together and require a fresh sign-in
    ///
    /// `SignInRequired` is published even if ending the provider session or
    /// clearing the store fails; the store error is returned afterwards.
    pub async fn invalidate(&self, reason: &str) -> Result<()> {
        let cleared = self.store.clear().await;
        if let Err(e) = &cleared {
            warn!(error = %e, "Failed to clear credential store");
        }
        if let Some(source) = &self.federated {
            if let Err(e) = source.end().await {
                warn!(error = %e, "Failed to end federated session");
            }
        }

        warn!(reason = %reason, "Session invalidated, sign-in required");
        self.events.emit_lossy(SessionEvent::SignInRequired {
            reason: reason.to_string(),
            timestamp: now(),
        });
        cleared.map_err(ClientError::from)
    }

    /// Pass a backend result through, invalidating the session when the
    /// backend rejected the credential
    pub async fn observe<T>(&self, result: Result<T>) -> Result<T> {
        if let Err(ClientError::AuthorizationFailure(reason)) = &result {
            if let Err(e) = self.invalidate(reason).await {
                warn!(error = %e, "Failed to clear rejected credential");
                return Err(e);
            }
        }
        result
    }
}
