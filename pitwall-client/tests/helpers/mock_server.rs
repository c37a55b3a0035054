//! Mock backend served over real HTTP
//!
//! Binds 127.0.0.1:0 and serves the backend routes from in-memory state.
//! Users are keyed by email; tokens are issued by `POST /login` or
//! registered directly with [`MockServer::issue_token`]. Race 1 is held on
//! the current day, so free accounts get a 403 for its details.

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Form, Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;

#[derive(Debug, Clone)]
struct UserRow {
    id: u64,
    email: String,
    name: String,
    tier: String,
}

#[derive(Default)]
struct MockState {
    users: Mutex<HashMap<String, UserRow>>,
    passwords: Mutex<HashMap<String, String>>,
    tokens: Mutex<HashMap<String, String>>,
    next_id: AtomicU64,
    requests: AtomicUsize,
    predict_body: Mutex<Option<Value>>,
    predict_status: Mutex<Option<StatusCode>>,
    race_scopes: Mutex<Vec<String>>,
}

/// Running mock backend; aborted on drop
pub struct MockServer {
    addr: SocketAddr,
    state: Arc<MockState>,
    handle: JoinHandle<()>,
}

impl MockServer {
    pub async fn start() -> Self {
        let state = Arc::new(MockState {
            next_id: AtomicU64::new(100),
            ..Default::default()
        });

        let router = Router::new()
            .route("/signup", post(signup))
            .route("/login", post(login))
            .route("/me", get(me))
            .route("/profile", get(profile))
            .route("/users", post(upsert_user))
            .route("/users/by-email/:email", get(user_by_email))
            .route("/users/:id/tier", put(set_tier))
            .route("/races", get(races))
            .route("/races/:race_id", get(race_detail))
            .route("/drivers", get(drivers))
            .route("/predict", post(predict))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Should bind ephemeral port");
        let addr = listener.local_addr().expect("Should have local address");
        let handle = tokio::spawn(async move {
            axum::serve(listener, router).await.ok();
        });

        Self {
            addr,
            state,
            handle,
        }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Register an account that can sign in with `password`
    pub fn register(&self, email: &str, password: &str) {
        self.state
            .passwords
            .lock()
            .unwrap()
            .insert(email.to_string(), password.to_string());
    }

    /// Mint a valid token for `email` without going through `/login`
    pub fn issue_token(&self, email: &str) -> String {
        let token = format!("mock-{}", email);
        self.state
            .tokens
            .lock()
            .unwrap()
            .insert(token.clone(), email.to_string());
        token
    }

    pub fn revoke_all_tokens(&self) {
        self.state.tokens.lock().unwrap().clear();
    }

    pub fn tier_of(&self, email: &str) -> Option<String> {
        self.state
            .users
            .lock()
            .unwrap()
            .get(email)
            .map(|u| u.tier.clone())
    }

    /// Replace the `/predict` response body
    pub fn set_predict_body(&self, body: Value) {
        *self.state.predict_body.lock().unwrap() = Some(body);
    }

    pub fn set_predict_status(&self, status: StatusCode) {
        *self.state.predict_status.lock().unwrap() = Some(status);
    }

    pub fn race_scopes(&self) -> Vec<String> {
        self.state.race_scopes.lock().unwrap().clone()
    }

    pub fn requests(&self) -> usize {
        self.state.requests.load(Ordering::SeqCst)
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

// ========================================
// Handlers
// ========================================

type Shared = State<Arc<MockState>>;

fn detail(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "detail": message }))).into_response()
}

/// Email behind a valid bearer token. A missing header is allowed (`Ok(None)`)
/// for the open routes; a present but unknown token is a 401.
fn bearer(state: &MockState, headers: &HeaderMap) -> Result<Option<String>, Response> {
    state.requests.fetch_add(1, Ordering::SeqCst);
    let Some(value) = headers.get("authorization") else {
        return Ok(None);
    };
    let token = value
        .to_str()
        .ok()
        .and_then(|v| v.strip_prefix("Bearer "))
        .unwrap_or_default();
    match state.tokens.lock().unwrap().get(token) {
        Some(email) => Ok(Some(email.clone())),
        None => Err(detail(
            StatusCode::UNAUTHORIZED,
            "Could not validate credentials",
        )),
    }
}

fn require_bearer(state: &MockState, headers: &HeaderMap) -> Result<String, Response> {
    bearer(state, headers)?.ok_or_else(|| detail(StatusCode::UNAUTHORIZED, "Not authenticated"))
}

fn user_json(user: &UserRow) -> Value {
    json!({ "id": user.id, "email": user.email, "name": user.name, "tier": user.tier })
}

#[derive(Deserialize)]
struct SignupBody {
    email: String,
    password: String,
}

async fn signup(State(state): Shared, Json(body): Json<SignupBody>) -> Response {
    state.requests.fetch_add(1, Ordering::SeqCst);
    let mut passwords = state.passwords.lock().unwrap();
    if passwords.contains_key(&body.email) {
        return detail(StatusCode::BAD_REQUEST, "Email already registered");
    }
    passwords.insert(body.email, body.password);
    Json(json!({ "message": "User created successfully" })).into_response()
}

#[derive(Deserialize)]
struct LoginForm {
    username: String,
    password: String,
}

async fn login(State(state): Shared, Form(form): Form<LoginForm>) -> Response {
    state.requests.fetch_add(1, Ordering::SeqCst);
    let known = state.passwords.lock().unwrap().get(&form.username).cloned();
    if known.as_deref() != Some(form.password.as_str()) {
        return detail(StatusCode::UNAUTHORIZED, "Incorrect username or password");
    }
    let token = format!("login-{}", form.username);
    state
        .tokens
        .lock()
        .unwrap()
        .insert(token.clone(), form.username.clone());
    Json(json!({ "access_token": token, "token_type": "bearer" })).into_response()
}

async fn me(State(state): Shared, headers: HeaderMap) -> Response {
    let email = match require_bearer(&state, &headers) {
        Ok(email) => email,
        Err(response) => return response,
    };
    let user = state.users.lock().unwrap().get(&email).cloned();
    Json(json!({
        "id": user.as_ref().map(|u| u.id),
        "email": email,
        "name": user.map(|u| u.name).unwrap_or_else(|| "Mock Racer".to_string()),
    }))
    .into_response()
}

async fn profile(State(state): Shared, headers: HeaderMap) -> Response {
    let email = match require_bearer(&state, &headers) {
        Ok(email) => email,
        Err(response) => return response,
    };
    Json(json!({
        "email": email,
        "name": "Mock Racer",
        "plan": "free",
        "favorite_team": "McLaren",
        "favorite_driver": null,
    }))
    .into_response()
}

#[derive(Deserialize)]
struct UpsertBody {
    email: String,
    name: String,
    tier: String,
}

async fn upsert_user(
    State(state): Shared,
    headers: HeaderMap,
    Json(body): Json<UpsertBody>,
) -> Response {
    if let Err(response) = bearer(&state, &headers) {
        return response;
    }
    let user = {
        let mut users = state.users.lock().unwrap();
        users
            .entry(body.email.clone())
            .or_insert_with(|| UserRow {
                id: state.next_id.fetch_add(1, Ordering::SeqCst),
                email: body.email.clone(),
                name: body.name.clone(),
                tier: body.tier.clone(),
            })
            .clone()
    };
    Json(user_json(&user)).into_response()
}

async fn user_by_email(
    State(state): Shared,
    headers: HeaderMap,
    Path(email): Path<String>,
) -> Response {
    if let Err(response) = bearer(&state, &headers) {
        return response;
    }
    let user = state.users.lock().unwrap().get(&email).cloned();
    match user {
        Some(user) => Json(user_json(&user)).into_response(),
        None => detail(StatusCode::NOT_FOUND, "User not found"),
    }
}

#[derive(Deserialize)]
struct TierQuery {
    tier: String,
}

async fn set_tier(
    State(state): Shared,
    headers: HeaderMap,
    Path(id): Path<u64>,
    Query(query): Query<TierQuery>,
) -> Response {
    if let Err(response) = bearer(&state, &headers) {
        return response;
    }
    if query.tier != "free" && query.tier != "pro" {
        return detail(StatusCode::BAD_REQUEST, "Invalid tier");
    }
    let updated = {
        let mut users = state.users.lock().unwrap();
        users.values_mut().find(|u| u.id == id).map(|user| {
            user.tier = query.tier;
            user.clone()
        })
    };
    match updated {
        Some(user) => Json(user_json(&user)).into_response(),
        None => detail(StatusCode::NOT_FOUND, "User not found"),
    }
}

#[derive(Deserialize)]
struct RaceQuery {
    #[serde(default)]
    tier: Option<String>,
}

async fn races(State(state): Shared, headers: HeaderMap, Query(query): Query<RaceQuery>) -> Response {
    if let Err(response) = bearer(&state, &headers) {
        return response;
    }
    let scope = query.tier.unwrap_or_else(|| "free".to_string());
    state.race_scopes.lock().unwrap().push(scope.clone());
    let count = if scope == "pro" { 5 } else { 2 };
    let races: Vec<Value> = (1..=count)
        .map(|id| json!({ "id": id, "name": format!("Mock Grand Prix {}", id), "season": 2025, "round": id }))
        .collect();
    Json(Value::Array(races)).into_response()
}

async fn race_detail(
    State(state): Shared,
    headers: HeaderMap,
    Path(race_id): Path<i64>,
) -> Response {
    let email = match bearer(&state, &headers) {
        Ok(email) => email,
        Err(response) => return response,
    };
    if !(1..=5).contains(&race_id) {
        return detail(StatusCode::NOT_FOUND, "Race not found");
    }

    let tier = match email {
        Some(email) => state.users.lock().unwrap().get(&email).map(|u| u.tier.clone()),
        None => None,
    };
    let is_pro = tier.as_deref() == Some("pro");
    let today = chrono::Utc::now().date_naive();
    let race_date = if race_id == 1 {
        today
    } else {
        today - chrono::Duration::days(7 * race_id)
    };
    if !is_pro && race_date == today {
        return detail(
            StatusCode::FORBIDDEN,
            "Free users can view race details only after 1 day. Upgrade to Pro.",
        );
    }

    Json(json!({
        "id": race_id,
        "name": format!("Mock Grand Prix {}", race_id),
        "race_date": race_date.format("%Y-%m-%d").to_string(),
        "winner": if race_date == today { Value::Null } else { json!("Max Verstappen") },
        "highlights": null,
    }))
    .into_response()
}

async fn drivers(State(state): Shared, headers: HeaderMap) -> Response {
    if let Err(response) = bearer(&state, &headers) {
        return response;
    }
    Json(json!([
        { "id": 1, "name": "Max Verstappen", "team": "Red Bull" },
        { "id": 4, "name": "Lando Norris", "team": "McLaren" },
        { "id": 16, "name": "Charles Leclerc", "team": "Ferrari" },
        { "id": 44, "name": "Lewis Hamilton", "team": null },
        { "id": 81, "name": "Oscar Piastri", "team": "McLaren" }
    ]))
    .into_response()
}

#[derive(Deserialize)]
struct PredictBody {
    race_id: i64,
    top_n: usize,
}

async fn predict(
    State(state): Shared,
    headers: HeaderMap,
    Json(body): Json<PredictBody>,
) -> Response {
    if let Err(response) = bearer(&state, &headers) {
        return response;
    }
    if let Some(status) = *state.predict_status.lock().unwrap() {
        return detail(status, "Prediction unavailable");
    }
    if let Some(custom) = state.predict_body.lock().unwrap().clone() {
        return Json(custom).into_response();
    }
    let ids = [1, 4, 16, 44, 81];
    let predicted: Vec<Value> = ids
        .iter()
        .take(body.top_n)
        .enumerate()
        .map(|(i, id)| json!({ "driver_id": id, "probability": 0.8 - 0.15 * i as f64 }))
        .collect();
    Json(json!({
        "race_id": body.race_id,
        "created_at": "2025-03-16T05:00:00.123456",
        "predicted": predicted,
    }))
    .into_response()
}
