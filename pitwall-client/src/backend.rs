//! Backend HTTP client
//!
//! Typed access to the backend HTTP surface. Every call carries the bearer
//! credential when one is available and is bounded by the configured
//! request timeout.
//!
//! # Status mapping
//! - 400 → [`ClientError::Rejected`] (invalid request, e.g. duplicate signup)
//! - 401 → [`ClientError::AuthorizationFailure`] (credential rejected)
//! - 403 → [`ClientError::Forbidden`] (account not entitled)
//! - 404 → [`ClientError::NotFound`]
//! - other non-2xx → [`ClientError::Backend`]
//! - timeout / connect / body read errors → [`ClientError::NetworkFailure`]
//! - undecodable 2xx body → [`ClientError::MalformedResponse`]

use async_trait::async_trait;
use pitwall_common::api::{
    DriverBody, ErrorBody, LoginBody, MeBody, PredictRequest, PredictResponse, ProfileBody,
    RaceBody, RaceDetailBody, SignupRequest, UserRecordBody, UserUpsert,
};
use pitwall_common::store::Credential;
use pitwall_common::Tier;
use reqwest::{Client, RequestBuilder, StatusCode, Url};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

use crate::error::{ClientError, Result};

/// Backend operations consumed by the client
#[async_trait]
pub trait Backend: Send + Sync {
    /// `POST /signup`; 400 when the email is already registered
    async fn signup(&self, request: &SignupRequest) -> Result<()>;

    /// `POST /login` (form: username, password)
    async fn login(&self, email: &str, password: &str) -> Result<LoginBody>;

    /// `GET /me`
    async fn me(&self, credential: &Credential) -> Result<MeBody>;

    /// `GET /profile`
    async fn profile(&self, credential: &Credential) -> Result<ProfileBody>;

    /// `POST /users` (create-if-absent, else no-op)
    async fn upsert_user(&self, credential: Option<&Credential>, user: &UserUpsert) -> Result<()>;

    /// `GET /users/by-email/{email}`
    async fn user_by_email(
        &self,
        credential: Option<&Credential>,
        email: &str,
    ) -> Result<UserRecordBody>;

    /// `PUT /users/{id}/tier?tier=...`
    async fn set_user_tier(
        &self,
        credential: Option<&Credential>,
        user_id: &str,
        tier: Tier,
    ) -> Result<UserRecordBody>;

    /// `GET /races?tier=...`
    async fn races(&self, credential: Option<&Credential>, scope: &str) -> Result<Vec<RaceBody>>;

    /// `GET /races/{race_id}`; the backend revalidates the tier (403)
    async fn race(&self, credential: Option<&Credential>, race_id: i64) -> Result<RaceDetailBody>;

    /// `GET /drivers`
    async fn drivers(&self, credential: Option<&Credential>) -> Result<Vec<DriverBody>>;

    /// `POST /predict`
    async fn predict(
        &self,
        credential: Option<&Credential>,
        request: &PredictRequest,
    ) -> Result<PredictResponse>;
}

/// reqwest-backed [`Backend`]
#[derive(Debug, Clone)]
pub struct HttpBackend {
    http_client: Client,
    base_url: Url,
}

impl HttpBackend {
    /// Create a client for `base_url` with a per-request timeout
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let base_url = Url::parse(base_url).map_err(|e| {
            pitwall_common::Error::Config(format!("Invalid API URL '{}': {}", base_url, e))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(pitwall_common::Error::Config(format!(
                "API URL '{}' cannot carry a path",
                base_url
            ))
            .into());
        }

        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClientError::NetworkFailure(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            base_url,
        })
    }

    /// Join path segments onto the base URL, percent-encoding each segment
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn authorize(builder: RequestBuilder, credential: Option<&Credential>) -> RequestBuilder {
        match credential {
            Some(credential) => builder.bearer_auth(credential.expose()),
            None => builder,
        }
    }

    /// Send and return the raw body of a successful response
    async fn send_raw(&self, builder: RequestBuilder, what: &str) -> Result<Vec<u8>> {
        let response = builder.send().await.map_err(|e| classify_transport(e, what))?;
        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| classify_transport(e, what))?;

        debug!(request = what, status = status.as_u16(), bytes = body.len(), "Backend responded");

        if status.is_success() {
            return Ok(body.to_vec());
        }

        let detail = serde_json::from_slice::<ErrorBody>(&body)
            .ok()
            .and_then(|b| b.detail)
            .unwrap_or_else(|| format!("{} returned {}", what, status));

        Err(match status {
            StatusCode::BAD_REQUEST => ClientError::Rejected(detail),
            StatusCode::UNAUTHORIZED => ClientError::AuthorizationFailure(detail),
            StatusCode::FORBIDDEN => ClientError::Forbidden(detail),
            StatusCode::NOT_FOUND => ClientError::NotFound(detail),
            _ => ClientError::Backend {
                status: status.as_u16(),
                message: detail,
            },
        })
    }

    async fn send_json<T: DeserializeOwned>(&self, builder: RequestBuilder, what: &str) -> Result<T> {
        let body = self.send_raw(builder, what).await?;
        serde_json::from_slice(&body)
            .map_err(|e| ClientError::MalformedResponse(format!("{}: {}", what, e)))
    }
}

fn classify_transport(err: reqwest::Error, what: &str) -> ClientError {
    let kind = if err.is_timeout() {
        "timed out"
    } else if err.is_connect() {
        "connection failed"
    } else {
        "transport error"
    };
    ClientError::NetworkFailure(format!("{} {}: {}", what, kind, err))
}

#[async_trait]
impl Backend for HttpBackend {
    async fn signup(&self, request: &SignupRequest) -> Result<()> {
        let builder = self.http_client.post(self.endpoint(&["signup"])).json(request);
        self.send_raw(builder, "POST /signup").await.map(|_| ())
    }

    async fn login(&self, email: &str, password: &str) -> Result<LoginBody> {
        let builder = self
            .http_client
            .post(self.endpoint(&["login"]))
            .form(&[("username", email), ("password", password)]);
        self.send_json(builder, "POST /login").await
    }

    async fn me(&self, credential: &Credential) -> Result<MeBody> {
        let builder = Self::authorize(self.http_client.get(self.endpoint(&["me"])), Some(credential));
        self.send_json(builder, "GET /me").await
    }

    async fn profile(&self, credential: &Credential) -> Result<ProfileBody> {
        let builder =
            Self::authorize(self.http_client.get(self.endpoint(&["profile"])), Some(credential));
        self.send_json(builder, "GET /profile").await
    }

    async fn upsert_user(&self, credential: Option<&Credential>, user: &UserUpsert) -> Result<()> {
        let builder = Self::authorize(
            self.http_client.post(self.endpoint(&["users"])).json(user),
            credential,
        );
        self.send_raw(builder, "POST /users").await.map(|_| ())
    }

    async fn user_by_email(
        &self,
        credential: Option<&Credential>,
        email: &str,
    ) -> Result<UserRecordBody> {
        let builder = Self::authorize(
            self.http_client
                .get(self.endpoint(&["users", "by-email", email])),
            credential,
        );
        self.send_json(builder, "GET /users/by-email").await
    }

    async fn set_user_tier(
        &self,
        credential: Option<&Credential>,
        user_id: &str,
        tier: Tier,
    ) -> Result<UserRecordBody> {
        let builder = Self::authorize(
            self.http_client
                .put(self.endpoint(&["users", user_id, "tier"]))
                .query(&[("tier", tier.as_str())]),
            credential,
        );
        self.send_json(builder, "PUT /users/{id}/tier").await
    }

    async fn races(&self, credential: Option<&Credential>, scope: &str) -> Result<Vec<RaceBody>> {
        let builder = Self::authorize(
            self.http_client
                .get(self.endpoint(&["races"]))
                .query(&[("tier", scope)]),
            credential,
        );
        self.send_json(builder, "GET /races").await
    }

    async fn race(&self, credential: Option<&Credential>, race_id: i64) -> Result<RaceDetailBody> {
        let id = race_id.to_string();
        let builder = Self::authorize(
            self.http_client.get(self.endpoint(&["races", id.as_str()])),
            credential,
        );
        self.send_json(builder, "GET /races/{id}").await
    }

    async fn drivers(&self, credential: Option<&Credential>) -> Result<Vec<DriverBody>> {
        let builder =
            Self::authorize(self.http_client.get(self.endpoint(&["drivers"])), credential);
        self.send_json(builder, "GET /drivers").await
    }

    async fn predict(
        &self,
        credential: Option<&Credential>,
        request: &PredictRequest,
    ) -> Result<PredictResponse> {
        let builder = Self::authorize(
            self.http_client.post(self.endpoint(&["predict"])).json(request),
            credential,
        );
        self.send_json(builder, "POST /predict").await
    }
}
