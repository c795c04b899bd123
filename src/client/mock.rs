//! In-process dashboard backend for client tests

use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const GOOD_REFRESH: &str = "good-refresh";
pub const FRESH_ACCESS: &str = "fresh-access";

/// How the refresh endpoint answers
#[derive(Debug, Clone, Copy)]
pub enum RefreshBehavior {
    /// Issues `FRESH_ACCESS`, which the API then accepts
    Rotate,
    /// Issues `FRESH_ACCESS` but the API keeps rejecting it
    IssueUnaccepted,
    /// 401 from the refresh endpoint
    Reject,
    /// 200 with an HTML body
    Malformed,
    /// 200 with JSON lacking `access`
    MissingAccess,
}

pub struct MockBackend {
    valid_token: Mutex<String>,
    refresh_behavior: RefreshBehavior,
    pub refresh_calls: AtomicUsize,
    pub data_calls: AtomicUsize,
    pub event_calls: AtomicUsize,
    pub last_headers: Mutex<Option<HeaderMap>>,
    pub last_query_token: Mutex<Option<String>>,
    pub bodies: Mutex<Vec<Value>>,
}

impl MockBackend {
    pub fn new(valid_token: &str, refresh_behavior: RefreshBehavior) -> Arc<Self> {
        Arc::new(Self {
            valid_token: Mutex::new(valid_token.to_string()),
            refresh_behavior,
            refresh_calls: AtomicUsize::new(0),
            data_calls: AtomicUsize::new(0),
            event_calls: AtomicUsize::new(0),
            last_headers: Mutex::new(None),
            last_query_token: Mutex::new(None),
            bodies: Mutex::new(Vec::new()),
        })
    }

    pub fn refresh_count(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn data_count(&self) -> usize {
        self.data_calls.load(Ordering::SeqCst)
    }

    pub fn event_count(&self) -> usize {
        self.event_calls.load(Ordering::SeqCst)
    }

    pub fn last_header(&self, name: &str) -> Option<String> {
        self.last_headers
            .lock()
            .unwrap()
            .as_ref()
            .and_then(|h| h.get(name))
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    }

    fn authorized(&self, headers: &HeaderMap) -> bool {
        let expected = format!("Bearer {}", self.valid_token.lock().unwrap());
        headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(|v| v == expected)
            .unwrap_or(false)
    }
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({"detail": "Given token not valid for any token type"})),
    )
        .into_response()
}

async fn data(State(backend): State<Arc<MockBackend>>, headers: HeaderMap) -> Response {
    backend.data_calls.fetch_add(1, Ordering::SeqCst);
    let authorized = backend.authorized(&headers);
    *backend.last_headers.lock().unwrap() = Some(headers);

    if !authorized {
        return unauthorized();
    }

    (
        StatusCode::OK,
        [(header::SET_COOKIE, "csrftoken=csrf-from-server; Path=/; SameSite=Lax")],
        Json(json!({"ok": true})),
    )
        .into_response()
}

/// Records every body it receives, accepted or not
async fn rules(
    State(backend): State<Arc<MockBackend>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    backend.data_calls.fetch_add(1, Ordering::SeqCst);
    backend.bodies.lock().unwrap().push(body.clone());
    let authorized = backend.authorized(&headers);
    *backend.last_headers.lock().unwrap() = Some(headers);

    if !authorized {
        return unauthorized();
    }
    (StatusCode::CREATED, Json(body)).into_response()
}

async fn refresh(State(backend): State<Arc<MockBackend>>, Json(body): Json<Value>) -> Response {
    backend.refresh_calls.fetch_add(1, Ordering::SeqCst);

    if body.get("refresh").and_then(Value::as_str) != Some(GOOD_REFRESH) {
        return unauthorized();
    }

    match backend.refresh_behavior {
        RefreshBehavior::Rotate => {
            *backend.valid_token.lock().unwrap() = FRESH_ACCESS.to_string();
            Json(json!({"access": FRESH_ACCESS})).into_response()
        }
        RefreshBehavior::IssueUnaccepted => Json(json!({"access": FRESH_ACCESS})).into_response(),
        RefreshBehavior::Reject => unauthorized(),
        RefreshBehavior::Malformed => (StatusCode::OK, "<html>oops</html>").into_response(),
        RefreshBehavior::MissingAccess => Json(json!({"detail": "ok"})).into_response(),
    }
}

async fn login(State(backend): State<Arc<MockBackend>>, Json(body): Json<Value>) -> Response {
    let username = body.get("username").and_then(Value::as_str);
    let password = body.get("password").and_then(Value::as_str);

    if username == Some("parent") && password == Some("secret") {
        *backend.valid_token.lock().unwrap() = "login-access".to_string();
        Json(json!({
            "access": "login-access",
            "refresh": GOOD_REFRESH,
            "user": {"username": "parent"}
        }))
        .into_response()
    } else {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({"detail": "No active account found with the given credentials"})),
        )
            .into_response()
    }
}

async fn events(
    State(backend): State<Arc<MockBackend>>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    backend.event_calls.fetch_add(1, Ordering::SeqCst);
    *backend.last_query_token.lock().unwrap() = params.get("token").cloned();

    if !backend.authorized(&headers) {
        return unauthorized();
    }
    Json(json!({"foo": 1})).into_response()
}

async fn usage(
    State(backend): State<Arc<MockBackend>>,
    Path(device_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    if !backend.authorized(&headers) {
        return unauthorized();
    }
    if device_id != "tablet-1" {
        return (
            StatusCode::FORBIDDEN,
            Json(json!({"error": "Device not found or access denied"})),
        )
            .into_response();
    }

    Json(json!({
        "labels": ["YouTube", "Minecraft", "Chrome"],
        "data": [1.5, 3.25, 0.5],
        "daily_labels": ["2026-10-16", "2026-10-17"],
        "daily_data": [2.0, 3.25],
        "device": "tablet-1"
    }))
    .into_response()
}

/// Serve the backend on an ephemeral port and return its base URL
pub async fn spawn(backend: Arc<MockBackend>) -> String {
    let app = Router::new()
        .route("/api/data/", get(data))
        .route("/api/rules/", post(rules))
        .route("/api/token/", post(login))
        .route("/api/token/refresh/", post(refresh))
        .route("/api/usage-data/:device_id/", get(usage))
        .route("/events/", get(events))
        .with_state(backend);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{}", addr)
}

/// Base URL of a port nothing is listening on
pub async fn closed_port() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}
