//! Client composition and the gated page flow
//!
//! Wires the credential store, session resolver, entitlement synchronizer,
//! catalog and prediction pipeline together. Every backend result passes
//! through [`SessionResolver::observe`], so a rejected credential anywhere
//! ends the session the same way.
//!
//! Gated page bootstrap:
//!
//! ```text
//! resolve ─ Unauthenticated ─► redirect (no backend call)
//!    │
//!    ├─ profile missing? ─► GET /me
//!    ▼
//! sync ─► GatedParameters ─ TierUnknown ─► banner
//!    │
//!    ▼
//! races + drivers ─► PageState
//! ```

use pitwall_common::api::{ProfileBody, RaceDetailBody};
use pitwall_common::config::ClientConfig;
use pitwall_common::events::SessionEventBus;
use pitwall_common::store::{CredentialStore, FileCredentialStore};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::backend::{Backend, HttpBackend};
use crate::cancel::run_cancellable;
use crate::catalog::{Catalog, DriverDirectory, Race};
use crate::entitlement::{EntitlementRecord, EntitlementSynchronizer};
use crate::error::{ClientError, Result};
use crate::gating::GatedParameters;
use crate::prediction::{PredictionPipeline, PredictionResult};
use crate::session::{Actor, FileFederatedSession, SessionResolver};

/// Everything a gated page needs to render
#[derive(Debug, Clone)]
pub struct PageState {
    pub actor: Actor,
    pub entitlement: EntitlementRecord,
    pub params: GatedParameters,
    pub races: Vec<Race>,
    pub drivers: DriverDirectory,
}

/// One client session
pub struct PitwallClient {
    backend: Arc<dyn Backend>,
    resolver: SessionResolver,
    entitlement: EntitlementSynchronizer,
    predictions: PredictionPipeline,
    catalog: Catalog,
}

impl PitwallClient {
    /// Build from resolved configuration (HTTP backend, file store)
    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        let backend: Arc<dyn Backend> =
            Arc::new(HttpBackend::new(&config.api_url, config.request_timeout)?);
        let store: Arc<dyn CredentialStore> =
            Arc::new(FileCredentialStore::new(config.store_path.clone()));

        let events = SessionEventBus::default();
        let mut resolver = SessionResolver::new(store, events.clone());
        if let Some(path) = &config.federated_session_path {
            resolver = resolver.with_federated(Arc::new(FileFederatedSession::new(path.clone())));
        }

        Ok(Self::from_parts(backend, resolver, events, config.retry_backoff))
    }

    pub fn from_parts(
        backend: Arc<dyn Backend>,
        resolver: SessionResolver,
        events: SessionEventBus,
        retry_backoff: Duration,
    ) -> Self {
        Self {
            entitlement: EntitlementSynchronizer::new(backend.clone(), events),
            predictions: PredictionPipeline::new(backend.clone(), retry_backoff),
            catalog: Catalog::new(backend.clone()),
            resolver,
            backend,
        }
    }

    pub fn resolver(&self) -> &SessionResolver {
        &self.resolver
    }

    pub fn entitlement(&self) -> &EntitlementSynchronizer {
        &self.entitlement
    }

    pub fn events(&self) -> &SessionEventBus {
        self.resolver.events()
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Actor> {
        self.entitlement.reset();
        self.resolver.sign_in(&*self.backend, email, password).await
    }

    pub async fn register(&self, email: &str, password: &str) -> Result<Actor> {
        self.entitlement.reset();
        self.resolver.register(&*self.backend, email, password).await
    }

    pub async fn sign_out(&self) -> Result<()> {
        self.entitlement.reset();
        self.resolver.sign_out().await
    }

    /// Resolve the actor, loading the profile from `GET /me` if the store
    /// only holds a credential
    pub async fn current_actor(&self, cancel: &CancellationToken) -> Result<Actor> {
        let actor = self.resolver.resolve().await?.into_actor().map_err(|e| {
            info!("No usable credential, sign-in required");
            e
        })?;
        if actor.has_profile() {
            return Ok(actor);
        }

        let refreshed = run_cancellable(
            cancel,
            self.resolver.refresh_profile(&*self.backend, &actor),
        )
        .await;
        self.guard(refreshed).await
    }

    /// Bootstrap a gated page
    pub async fn open_gated_page(&self, cancel: &CancellationToken) -> Result<PageState> {
        let actor = self.current_actor(cancel).await?;

        let synced = self.entitlement.sync_cancellable(&actor, cancel).await;
        let entitlement = self.guard(synced).await?;
        let params = GatedParameters::for_status(entitlement.tier)?;

        let loaded = run_cancellable(cancel, async {
            tokio::try_join!(
                self.catalog.races(&actor, &params),
                self.catalog.drivers(&actor)
            )
        })
        .await;
        let (races, drivers) = self.guard(loaded).await?;

        Ok(PageState {
            actor,
            entitlement,
            params,
            races,
            drivers,
        })
    }

    /// Rank candidates for `race_id` at the page's gated depth
    pub async fn predict(
        &self,
        page: &PageState,
        race_id: i64,
        cancel: &CancellationToken,
    ) -> Result<PredictionResult> {
        let result = self
            .predictions
            .predict_cancellable(&page.actor, race_id, &page.params, cancel)
            .await;
        self.guard(result).await
    }

    /// Upgrade the current actor; the entitlement must have been synced
    pub async fn upgrade(&self, cancel: &CancellationToken) -> Result<EntitlementRecord> {
        let actor = self.current_actor(cancel).await?;
        let result = self.entitlement.upgrade_cancellable(&actor, cancel).await;
        self.guard(result).await
    }

    /// Sync the current actor's entitlement without loading page data
    pub async fn sync(&self, cancel: &CancellationToken) -> Result<EntitlementRecord> {
        let actor = self.current_actor(cancel).await?;
        let result = self.entitlement.sync_cancellable(&actor, cancel).await;
        self.guard(result).await
    }

    /// Race details; a 403 means the plan does not cover this race yet
    pub async fn race(&self, race_id: i64, cancel: &CancellationToken) -> Result<RaceDetailBody> {
        let actor = self.current_actor(cancel).await?;
        let result = run_cancellable(cancel, self.catalog.race(&actor, race_id)).await;
        self.guard(result).await
    }

    pub async fn profile(&self, cancel: &CancellationToken) -> Result<ProfileBody> {
        let actor = self.current_actor(cancel).await?;
        let result = run_cancellable(cancel, self.catalog.profile(&actor)).await;
        self.guard(result).await
    }

    /// Route a result through session invalidation and log contract errors
    async fn guard<T>(&self, result: Result<T>) -> Result<T> {
        if matches!(result, Err(ClientError::AuthorizationFailure(_))) {
            self.entitlement.reset();
        }
        let result = self.resolver.observe(result).await;
        if let Err(e) = &result {
            if e.is_contract_violation() {
                error!(error = %e, "Backend contract violation");
            }
        }
        result
    }
}
