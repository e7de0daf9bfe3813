//! Shared fixtures: a mock Jellyfin server and a recording mailer.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    extract::{Path as UrlPath, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use newsletter::{ComposedMessage, Config, ConfigError, MailError, Mailer};

pub const TOKEN: &str = "test-token";

#[derive(Clone)]
struct MockState {
    listing_status: StatusCode,
    listing_body: String,
    posters: Arc<Mutex<HashSet<String>>>,
    logos: Arc<Mutex<HashSet<String>>>,
    images_broken: Arc<AtomicBool>,
    listing_hits: Arc<AtomicUsize>,
    image_hits: Arc<AtomicUsize>,
    image_requests: Arc<Mutex<Vec<String>>>,
}

/// In-process stand-in for the Jellyfin endpoints the digest calls.
pub struct MockJellyfin {
    pub addr: SocketAddr,
    state: MockState,
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == format!("MediaBrowser Token={TOKEN}"))
}

async fn latest(State(state): State<MockState>, headers: HeaderMap) -> Response {
    state.listing_hits.fetch_add(1, Ordering::SeqCst);
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    (state.listing_status, state.listing_body.clone()).into_response()
}

async fn image(
    State(state): State<MockState>,
    UrlPath((id, kind)): UrlPath<(String, String)>,
    headers: HeaderMap,
) -> Response {
    state.image_hits.fetch_add(1, Ordering::SeqCst);
    state.image_requests.lock().unwrap().push(format!("{kind}({id})"));
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    if state.images_broken.load(Ordering::SeqCst) {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    let available = match kind.as_str() {
        "Primary" => state.posters.lock().unwrap().contains(&id),
        "Logo" => state.logos.lock().unwrap().contains(&id),
        _ => false,
    };

    if available {
        (StatusCode::OK, image_bytes(&kind, &id)).into_response()
    } else {
        StatusCode::NOT_FOUND.into_response()
    }
}

/// Body the mock serves for an image.
pub fn image_bytes(kind: &str, id: &str) -> Vec<u8> {
    format!("{kind}-{id}").into_bytes()
}

impl MockJellyfin {
    pub async fn start(listing_status: StatusCode, listing_body: impl Into<String>) -> Self {
        let state = MockState {
            listing_status,
            listing_body: listing_body.into(),
            posters: Arc::default(),
            logos: Arc::default(),
            images_broken: Arc::default(),
            listing_hits: Arc::default(),
            image_hits: Arc::default(),
            image_requests: Arc::default(),
        };

        let app = Router::new()
            .route("/Users/u1/Items/Latest", get(latest))
            .route("/Items/:id/Images/:kind", get(image))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, state }
    }

    /// Serve `items` (`(id, title)` pairs) as the latest listing.
    pub async fn with_items(items: &[(&str, &str)]) -> Self {
        let body: Vec<serde_json::Value> = items
            .iter()
            .map(|(id, name)| serde_json::json!({"Id": id, "Name": name, "Type": "Movie"}))
            .collect();
        Self::start(StatusCode::OK, serde_json::to_string(&body).unwrap()).await
    }

    pub fn add_poster(&self, id: &str) {
        self.state.posters.lock().unwrap().insert(id.to_string());
    }

    pub fn add_logo(&self, id: &str) {
        self.state.logos.lock().unwrap().insert(id.to_string());
    }

    pub fn set_images_broken(&self, broken: bool) {
        self.state.images_broken.store(broken, Ordering::SeqCst);
    }

    pub fn listing_hits(&self) -> usize {
        self.state.listing_hits.load(Ordering::SeqCst)
    }

    pub fn image_hits(&self) -> usize {
        self.state.image_hits.load(Ordering::SeqCst)
    }

    /// Image requests in arrival order, as `Kind(id)`.
    pub fn image_requests(&self) -> Vec<String> {
        self.state.image_requests.lock().unwrap().clone()
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn listing_url(&self) -> String {
        format!("{}/Users/u1/Items/Latest", self.base_url())
    }

    pub fn vars(&self, cache_dir: &Path) -> HashMap<&'static str, String> {
        HashMap::from([
            ("JELLYFIN_API_URL", self.listing_url()),
            ("JELLYFIN_API_TOKEN", TOKEN.to_string()),
            ("SENDER_EMAIL", "bot@example.com".to_string()),
            ("SENDER_PASSWORD", "pw".to_string()),
            ("RECIPIENT_EMAILS", "a@example.com,b@example.com".to_string()),
            ("JELLYFIN_WEB_URL", "http://media.lan/web/index.html".to_string()),
            ("CACHE_DIR", cache_dir.display().to_string()),
            ("REQUEST_TIMEOUT_MS", "2000".to_string()),
        ])
    }

    pub fn config(&self, cache_dir: &Path) -> Config {
        config_from(&self.vars(cache_dir)).unwrap()
    }
}

pub fn config_from(vars: &HashMap<&'static str, String>) -> Result<Config, ConfigError> {
    Config::from_vars(|name| vars.get(name).cloned())
}

/// Mailer that keeps every message it is asked to send.
#[derive(Default)]
pub struct RecordingMailer {
    pub sent: Mutex<Vec<ComposedMessage>>,
    pub fail: bool,
}

impl RecordingMailer {
    pub fn failing() -> Self {
        Self {
            sent: Mutex::default(),
            fail: true,
        }
    }

    pub fn attempts(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    pub fn last(&self) -> ComposedMessage {
        self.sent.lock().unwrap().last().cloned().expect("no message sent")
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, message: &ComposedMessage) -> Result<(), MailError> {
        self.sent.lock().unwrap().push(message.clone());
        if self.fail {
            return Err(MailError::Smtp("connection refused".into()));
        }
        Ok(())
    }
}
