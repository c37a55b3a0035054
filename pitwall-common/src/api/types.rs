//! Request/response bodies for the backend HTTP surface

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::time::deserialize_timestamp;
use crate::Tier;

// ========================================
// Users / identity
// ========================================

/// `POST /users` body: create-if-absent, else no-op
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct UserUpsert {
    pub email: String,
    pub name: String,
    /// Initial tier for a newly created record only
    pub tier: Tier,
}

/// User record returned by `POST /users`, `GET /users/by-email/{email}`
/// and `PUT /users/{id}/tier`
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct UserRecordBody {
    #[serde(deserialize_with = "deserialize_opaque_id")]
    pub id: String,
    pub email: String,
    pub tier: Tier,
    #[serde(default)]
    pub name: Option<String>,
}

/// `GET /me` response
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct MeBody {
    #[serde(default, deserialize_with = "deserialize_optional_opaque_id")]
    pub id: Option<String>,
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// `POST /signup` body
#[derive(Clone, Serialize)]
pub struct SignupRequest {
    pub email: String,
    pub password: String,
}

impl std::fmt::Debug for SignupRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignupRequest")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// `POST /login` response
#[derive(Debug, Clone, Deserialize)]
pub struct LoginBody {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

/// `GET /profile` response (display only)
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ProfileBody {
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub plan: Option<String>,
    #[serde(default)]
    pub favorite_team: Option<String>,
    #[serde(default)]
    pub favorite_driver: Option<String>,
}

/// Error body shape (`{"detail": "..."}`)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub detail: Option<String>,
}

// ========================================
// Catalog
// ========================================

/// Entry of `GET /races?tier=...`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RaceBody {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub season: Option<i32>,
    #[serde(default)]
    pub round: Option<u32>,
}

/// `GET /races/{race_id}` response
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct RaceDetailBody {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub race_date: Option<NaiveDate>,
    #[serde(default)]
    pub winner: Option<String>,
    #[serde(default)]
    pub highlights: Option<String>,
}

/// Entry of `GET /drivers`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DriverBody {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub team: Option<String>,
}

// ========================================
// Prediction
// ========================================

/// `POST /predict` body
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct PredictRequest {
    pub race_id: i64,
    pub top_n: u32,
}

/// `POST /predict` response
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct PredictResponse {
    pub race_id: i64,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub created_at: DateTime<Utc>,
    pub predicted: Vec<PredictedPosition>,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq)]
pub struct PredictedPosition {
    pub driver_id: i64,
    pub probability: f64,
}

// ========================================
// Helpers
// ========================================

/// Backend identifiers are opaque: accept JSON strings and integers alike.
fn deserialize_opaque_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) if !s.is_empty() => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "Expected string or integer id, got {}",
            other
        ))),
    }
}

fn deserialize_optional_opaque_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        Value::String(s) if s.is_empty() => Ok(None),
        Value::String(s) => Ok(Some(s)),
        Value::Number(n) => Ok(Some(n.to_string())),
        other => Err(serde::de::Error::custom(format!(
            "Expected string or integer id, got {}",
            other
        ))),
    }
}
