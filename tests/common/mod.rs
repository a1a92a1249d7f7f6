#![allow(dead_code)]

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, Method, StatusCode, Uri, header::AUTHORIZATION},
    response::{IntoResponse, Response},
};
use serde_json::{Value, json};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};
use tokio::time::sleep;

#[derive(Debug, Clone)]
struct Canned {
    status: u16,
    body: Value,
    delay: Duration,
}

#[derive(Debug, Clone)]
pub struct Hit {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub authorization: Option<String>,
    pub body: Option<Value>,
}

#[derive(Default)]
struct MockState {
    routes: Mutex<HashMap<(String, String), Canned>>,
    hits: Mutex<Vec<Hit>>,
}

/// Scriptable stand-in for the REST API.
#[derive(Clone)]
pub struct MockBackend {
    base_url: String,
    state: Arc<MockState>,
}

pub fn ok(result: Value) -> Value {
    json!({ "success": true, "message": "ok", "result": result, "errors": null, "except": null })
}

pub fn rejected(message: &str) -> Value {
    json!({ "success": false, "message": message, "errors": {}, "except": {} })
}

impl MockBackend {
    /// Serves from the current tokio runtime.
    pub async fn start() -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock backend");
        let state = Arc::new(MockState::default());
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let app = router(Arc::clone(&state));
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("mock backend");
        });
        Self { base_url, state }
    }

    /// Serves from a dedicated thread so the backend outlives any single test runtime.
    pub fn start_detached() -> Self {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind mock backend");
        listener.set_nonblocking(true).unwrap();
        let state = Arc::new(MockState::default());
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let app = router(Arc::clone(&state));
        std::thread::spawn(move || {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .expect("mock runtime");
            runtime.block_on(async move {
                let listener = tokio::net::TcpListener::from_std(listener).unwrap();
                axum::serve(listener, app).await.expect("mock backend");
            });
        });
        Self { base_url, state }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn respond(&self, method: Method, path: &str, status: u16, body: Value) {
        self.respond_after(method, path, status, body, Duration::ZERO);
    }

    pub fn respond_after(&self, method: Method, path: &str, status: u16, body: Value, delay: Duration) {
        self.state.routes.lock().unwrap().insert(
            (method.to_string(), path.to_string()),
            Canned { status, body, delay },
        );
    }

    pub fn hits(&self, path: &str) -> Vec<Hit> {
        self.state
            .hits
            .lock()
            .unwrap()
            .iter()
            .filter(|hit| hit.path == path)
            .cloned()
            .collect()
    }

    pub fn hit_count(&self, path: &str) -> usize {
        self.hits(path).len()
    }

    pub async fn wait_for_hits(&self, path: &str, count: usize, timeout: Duration) {
        let deadline = Instant::now() + timeout;
        loop {
            if self.hit_count(path) >= count {
                return;
            }
            if Instant::now() > deadline {
                panic!("expected {count} hits on {path}, saw {}", self.hit_count(path));
            }
            sleep(Duration::from_millis(20)).await;
        }
    }
}

fn router(state: Arc<MockState>) -> Router {
    Router::new().fallback(serve).with_state(state)
}

async fn serve(
    State(state): State<Arc<MockState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: String,
) -> Response {
    let path = uri.path().to_string();
    state.hits.lock().unwrap().push(Hit {
        method: method.to_string(),
        path: path.clone(),
        query: uri.query().map(str::to_string),
        authorization: headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string),
        body: serde_json::from_str(&body).ok(),
    });

    let canned = state
        .routes
        .lock()
        .unwrap()
        .get(&(method.to_string(), path))
        .cloned();
    let Some(canned) = canned else {
        return (StatusCode::NOT_FOUND, Json(rejected("not found"))).into_response();
    };
    if !canned.delay.is_zero() {
        sleep(canned.delay).await;
    }
    let status = StatusCode::from_u16(canned.status).unwrap();
    (status, Json(canned.body)).into_response()
}
