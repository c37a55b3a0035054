//! In-memory backend for ordering, cancellation and retry tests

use async_trait::async_trait;
use chrono::Utc;
use pitwall_client::backend::Backend;
use pitwall_client::error::{ClientError, Result};
use pitwall_common::api::{
    DriverBody, LoginBody, MeBody, PredictRequest, PredictResponse, PredictedPosition,
    ProfileBody, RaceBody, RaceDetailBody, SignupRequest, UserRecordBody, UserUpsert,
};
use pitwall_common::store::Credential;
use pitwall_common::Tier;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::sync::Notify;

/// Scripted result of one `POST /predict`
#[derive(Debug, Clone)]
pub enum PredictOutcome {
    /// Respond with these probabilities for drivers 1, 2, 3...
    Probabilities(Vec<f64>),
    NetworkDown,
    Status(u16),
}

#[derive(Default)]
pub struct ScriptedBackend {
    users: Mutex<HashMap<String, UserRecordBody>>,
    registered: Mutex<HashSet<String>>,
    tokens: Mutex<HashSet<String>>,
    next_id: AtomicUsize,
    calls: AtomicUsize,
    lookups: AtomicUsize,
    predict_calls: AtomicUsize,
    predict_script: Mutex<VecDeque<PredictOutcome>>,
    last_race_scope: Mutex<Option<String>>,
    network_down: AtomicBool,
    hold_next_lookup: AtomicBool,
    held: Notify,
    release: Notify,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self {
            next_id: AtomicUsize::new(1),
            ..Default::default()
        }
    }

    /// Accept `token` as a valid bearer credential
    pub fn accept_token(&self, token: &str) {
        self.tokens.lock().unwrap().insert(token.to_string());
    }

    /// Change the tier the backend holds for `email`
    pub fn set_tier(&self, email: &str, tier: Tier) {
        if let Some(user) = self.users.lock().unwrap().get_mut(email) {
            user.tier = tier;
        }
    }

    pub fn tier_of(&self, email: &str) -> Option<Tier> {
        self.users.lock().unwrap().get(email).map(|u| u.tier)
    }

    pub fn set_network_down(&self, down: bool) {
        self.network_down.store(down, Ordering::SeqCst);
    }

    /// Make the next `user_by_email` read the record, then block until
    /// [`release`](Self::release)
    pub fn hold_next_lookup(&self) {
        self.hold_next_lookup.store(true, Ordering::SeqCst);
    }

    /// Wait until a held lookup has read its record
    pub async fn wait_until_held(&self) {
        self.held.notified().await;
    }

    pub fn release(&self) {
        self.release.notify_one();
    }

    pub fn script_predictions(&self, outcomes: Vec<PredictOutcome>) {
        self.predict_script.lock().unwrap().extend(outcomes);
    }

    /// Total backend calls of any kind
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    pub fn predict_calls(&self) -> usize {
        self.predict_calls.load(Ordering::SeqCst)
    }

    pub fn last_race_scope(&self) -> Option<String> {
        self.last_race_scope.lock().unwrap().clone()
    }

    fn enter(&self, credential: Option<&Credential>) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.network_down.load(Ordering::SeqCst) {
            return Err(ClientError::NetworkFailure("connection refused".to_string()));
        }
        if let Some(credential) = credential {
            if !self.tokens.lock().unwrap().contains(credential.expose()) {
                return Err(ClientError::AuthorizationFailure(
                    "Could not validate credentials".to_string(),
                ));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Backend for ScriptedBackend {
    async fn signup(&self, request: &SignupRequest) -> Result<()> {
        self.enter(None)?;
        if !self.registered.lock().unwrap().insert(request.email.clone()) {
            return Err(ClientError::Rejected("Email already registered".to_string()));
        }
        Ok(())
    }

    async fn login(&self, email: &str, password: &str) -> Result<LoginBody> {
        self.enter(None)?;
        if password != "correct horse" {
            return Err(ClientError::AuthorizationFailure(
                "Incorrect username or password".to_string(),
            ));
        }
        let token = format!("token-{}", email);
        self.accept_token(&token);
        Ok(LoginBody {
            access_token: token,
            token_type: "bearer".to_string(),
        })
    }

    async fn me(&self, credential: &Credential) -> Result<MeBody> {
        self.enter(Some(credential))?;
        let email = credential
            .expose()
            .strip_prefix("token-")
            .unwrap_or("racer@example.com")
            .to_string();
        Ok(MeBody {
            id: None,
            email,
            name: Some("Test Driver".to_string()),
        })
    }

    async fn profile(&self, credential: &Credential) -> Result<ProfileBody> {
        let me = self.me(credential).await?;
        Ok(ProfileBody {
            email: me.email,
            name: me.name,
            plan: None,
            favorite_team: None,
            favorite_driver: None,
        })
    }

    async fn upsert_user(&self, credential: Option<&Credential>, user: &UserUpsert) -> Result<()> {
        self.enter(credential)?;
        let mut users = self.users.lock().unwrap();
        if !users.contains_key(&user.email) {
            let id = self.next_id.fetch_add(1, Ordering::SeqCst);
            users.insert(
                user.email.clone(),
                UserRecordBody {
                    id: id.to_string(),
                    email: user.email.clone(),
                    tier: user.tier,
                    name: Some(user.name.clone()),
                },
            );
        }
        Ok(())
    }

    async fn user_by_email(
        &self,
        credential: Option<&Credential>,
        email: &str,
    ) -> Result<UserRecordBody> {
        self.enter(credential)?;
        self.lookups.fetch_add(1, Ordering::SeqCst);
        let record = self
            .users
            .lock()
            .unwrap()
            .get(email)
            .cloned()
            .ok_or_else(|| ClientError::NotFound("User not found".to_string()))?;

        if self.hold_next_lookup.swap(false, Ordering::SeqCst) {
            self.held.notify_one();
            self.release.notified().await;
        }
        Ok(record)
    }

    async fn set_user_tier(
        &self,
        credential: Option<&Credential>,
        user_id: &str,
        tier: Tier,
    ) -> Result<UserRecordBody> {
        self.enter(credential)?;
        let mut users = self.users.lock().unwrap();
        let user = users
            .values_mut()
            .find(|u| u.id == user_id)
            .ok_or_else(|| ClientError::NotFound("User not found".to_string()))?;
        user.tier = tier;
        Ok(user.clone())
    }

    async fn races(&self, credential: Option<&Credential>, scope: &str) -> Result<Vec<RaceBody>> {
        self.enter(credential)?;
        *self.last_race_scope.lock().unwrap() = Some(scope.to_string());
        let count = if scope == "pro" { 4 } else { 2 };
        Ok((1..=count)
            .map(|id| RaceBody {
                id,
                name: format!("Grand Prix {}", id),
                season: Some(2025),
                round: Some(id as u32),
            })
            .collect())
    }

    async fn race(&self, credential: Option<&Credential>, race_id: i64) -> Result<RaceDetailBody> {
        self.enter(credential)?;
        Ok(RaceDetailBody {
            id: race_id,
            name: format!("Grand Prix {}", race_id),
            race_date: None,
            winner: None,
            highlights: None,
        })
    }

    async fn drivers(&self, credential: Option<&Credential>) -> Result<Vec<DriverBody>> {
        self.enter(credential)?;
        Ok(vec![
            DriverBody {
                id: 1,
                name: "Max Verstappen".to_string(),
                team: Some("Red Bull".to_string()),
            },
            DriverBody {
                id: 2,
                name: "Lando Norris".to_string(),
                team: Some("McLaren".to_string()),
            },
        ])
    }

    async fn predict(
        &self,
        credential: Option<&Credential>,
        request: &PredictRequest,
    ) -> Result<PredictResponse> {
        self.enter(credential)?;
        self.predict_calls.fetch_add(1, Ordering::SeqCst);

        let outcome = self.predict_script.lock().unwrap().pop_front();
        let probabilities = match outcome {
            Some(PredictOutcome::Probabilities(p)) => p,
            Some(PredictOutcome::NetworkDown) => {
                return Err(ClientError::NetworkFailure("timed out".to_string()))
            }
            Some(PredictOutcome::Status(status)) => {
                return Err(ClientError::Backend {
                    status,
                    message: "Prediction failed".to_string(),
                })
            }
            None => (0..request.top_n)
                .map(|i| 0.9 - 0.1 * f64::from(i))
                .collect(),
        };

        Ok(PredictResponse {
            race_id: request.race_id,
            created_at: Utc::now(),
            predicted: probabilities
                .into_iter()
                .enumerate()
                .map(|(i, probability)| PredictedPosition {
                    driver_id: i as i64 + 1,
                    probability,
                })
                .collect(),
        })
    }
}
