//! Loopback endpoint that turns browser callbacks into window messages, so
//! the authorization page can report back to a terminal opener.
//!
//! A completion only counts if it echoes the attempt's `state` token, which
//! the backend learns through the `returnTo` address.

use anyhow::{Context, Result};
use axum::extract::{Query, State};
use axum::http::header::ORIGIN;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chatbuilder_integrations::types::OAUTH_COMPLETE;
use chatbuilder_integrations::{MessageBus, WindowId, WindowMessage};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

const DONE_PAGE: &str = "<!doctype html><html><body style=\"font-family:sans-serif\">\
<p>Authorization finished. You can close this window and return to the terminal.</p>\
<script>window.close()</script></body></html>";

const MISSING_STATE_PAGE: &str = "<!doctype html><html><body style=\"font-family:sans-serif\">\
<p>This authorization link is incomplete. Start again from the terminal.</p></body></html>";

#[derive(Clone)]
struct RelayState {
    bus: MessageBus,
    origin: String,
}

pub struct Relay {
    origin: Url,
    completion_url: Url,
    token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl Relay {
    pub async fn start(bus: MessageBus, port: u16) -> Result<Self> {
        let listener = TcpListener::bind(("127.0.0.1", port))
            .await
            .with_context(|| format!("binding callback relay on port {port}"))?;
        let addr = listener.local_addr()?;
        let origin = Url::parse(&format!("http://{addr}"))?;
        let completion_url = origin.join("oauth-complete")?;

        let state = RelayState {
            bus,
            origin: origin.origin().ascii_serialization(),
        };
        let router = Router::new()
            .route("/healthz", get(|| async { "ok" }))
            .route("/oauth-complete", get(oauth_complete))
            .route("/message", post(message))
            .with_state(state);

        let token = CancellationToken::new();
        let shutdown = token.clone();
        let task = tokio::spawn(async move {
            let served = axum::serve(listener, router)
                .with_graceful_shutdown(async move { shutdown.cancelled().await })
                .await;
            if let Err(e) = served {
                warn!("Callback relay stopped: {}", e);
            }
        });
        info!("Callback relay listening on {}", addr);

        Ok(Self {
            origin,
            completion_url,
            token,
            task: Some(task),
        })
    }

    pub fn origin(&self) -> &Url {
        &self.origin
    }

    /// The address handed to the backend as `returnTo`.
    pub fn completion_url(&self) -> &Url {
        &self.completion_url
    }

    pub async fn shutdown(mut self) {
        self.token.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for Relay {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CompletionQuery {
    success: Option<bool>,
    workspace_name: Option<String>,
    error: Option<String>,
    source: Option<u64>,
    state: Option<String>,
}

/// Top-level navigations carry no `Origin` header, so those are labelled
/// with the relay's own origin.
fn request_origin(headers: &HeaderMap, fallback: &str) -> String {
    headers
        .get(ORIGIN)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .unwrap_or(fallback)
        .to_string()
}

async fn oauth_complete(
    State(state): State<RelayState>,
    headers: HeaderMap,
    Query(query): Query<CompletionQuery>,
) -> Response {
    let Some(attempt_state) = query.state.filter(|s| !s.is_empty()) else {
        warn!("Dropping completion callback without a state token");
        return (StatusCode::BAD_REQUEST, Html(MISSING_STATE_PAGE)).into_response();
    };
    let success = query.success.unwrap_or(query.error.is_none());
    let message = WindowMessage {
        origin: request_origin(&headers, &state.origin),
        source: query.source.map(WindowId),
        data: json!({
            "type": OAUTH_COMPLETE,
            "success": success,
            "workspaceName": query.workspace_name,
            "error": query.error,
            "state": attempt_state,
        }),
    };
    let delivered = state.bus.post(message);
    debug!("Relayed completion to {} listener(s)", delivered);
    Html(DONE_PAGE).into_response()
}

async fn message(
    State(state): State<RelayState>,
    headers: HeaderMap,
    Json(data): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let delivered = state
        .bus
        .post(WindowMessage::new(request_origin(&headers, &state.origin), data));
    (StatusCode::ACCEPTED, Json(json!({ "delivered": delivered })))
}
