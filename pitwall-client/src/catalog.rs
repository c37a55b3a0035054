//! Race calendar, driver lookup and profile display data

use pitwall_common::api::{DriverBody, ProfileBody, RaceBody, RaceDetailBody};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::backend::Backend;
use crate::error::{ClientError, Result};
use crate::gating::GatedParameters;
use crate::session::Actor;

pub type Race = RaceBody;

/// Driver display names keyed by id
#[derive(Debug, Clone, Default)]
pub struct DriverDirectory {
    drivers: HashMap<i64, DriverBody>,
}

impl DriverDirectory {
    pub fn new(drivers: Vec<DriverBody>) -> Self {
        Self {
            drivers: drivers.into_iter().map(|d| (d.id, d)).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.drivers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drivers.is_empty()
    }

    /// Drivers ordered by id
    pub fn sorted(&self) -> Vec<&DriverBody> {
        let mut drivers: Vec<&DriverBody> = self.drivers.values().collect();
        drivers.sort_by_key(|d| d.id);
        drivers
    }

    /// `Name (Team)`, `Name`, or `Driver #id` when unknown
    pub fn display_name(&self, id: i64) -> String {
        match self.drivers.get(&id) {
            Some(DriverBody {
                name,
                team: Some(team),
                ..
            }) if !team.trim().is_empty() => format!("{} ({})", name, team),
            Some(driver) => driver.name.clone(),
            None => format!("Driver #{}", id),
        }
    }
}

/// Read-only catalog lookups
pub struct Catalog {
    backend: Arc<dyn Backend>,
}

impl Catalog {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    /// Races visible under `params.calendar_scope`
    pub async fn races(&self, actor: &Actor, params: &GatedParameters) -> Result<Vec<Race>> {
        let scope = params.calendar_scope.race_query();
        let races = self.backend.races(actor.credential(), scope).await?;
        debug!(scope, count = races.len(), "Loaded races");
        Ok(races)
    }

    /// One race's details; the backend may refuse it for the actor's tier
    pub async fn race(&self, actor: &Actor, race_id: i64) -> Result<RaceDetailBody> {
        let race = self.backend.race(actor.credential(), race_id).await?;
        debug!(race_id, "Loaded race details");
        Ok(race)
    }

    pub async fn drivers(&self, actor: &Actor) -> Result<DriverDirectory> {
        let drivers = self.backend.drivers(actor.credential()).await?;
        debug!(count = drivers.len(), "Loaded drivers");
        Ok(DriverDirectory::new(drivers))
    }

    /// Profile details for display; requires a credential
    pub async fn profile(&self, actor: &Actor) -> Result<ProfileBody> {
        let credential = actor.credential().ok_or(ClientError::Unauthenticated)?;
        self.backend.profile(credential).await
    }
}
