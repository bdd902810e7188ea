//! The monitor server's axum router: permissive CORS plus a `/health`
//! liveness check, and a `/ws` push channel for the observability event
//! stream, minus any auth gate. Operators are assumed to reach this
//! port over an already-trusted network.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use tower_http::cors::{Any, CorsLayer};

use crate::sink::MonitorSink;

const SHARED_SECRET_HEADER: &str = "x-monitor-secret";

#[derive(Clone)]
struct AppState {
    sink: Arc<MonitorSink>,
    shared_secret: Option<Arc<str>>,
}

/// Builds the router; `shared_secret` is `None` when `MONITOR_SHARED_SECRET`
/// is unset, in which case every request is admitted (spec: "no auth layer
/// beyond an optional shared-secret header").
pub fn router(sink: Arc<MonitorSink>, shared_secret: Option<String>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers(Any);

    let state = AppState { sink, shared_secret: shared_secret.map(Arc::from) };

    Router::new()
        .route("/health", get(health))
        .route("/api/connections", get(list_connections))
        .route("/api/stats", get(stats))
        .route("/ws", get(ws_handler))
        .layer(cors)
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

fn authorized(state: &AppState, headers: &HeaderMap) -> bool {
    let Some(expected) = &state.shared_secret else {
        return true;
    };
    headers
        .get(SHARED_SECRET_HEADER)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == expected.as_ref())
}

async fn list_connections(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    if !authorized(&state, &headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    Json(state.sink.store().snapshot()).into_response()
}

async fn stats(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    if !authorized(&state, &headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    Json(state.sink.store().stats()).into_response()
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    State(state): State<AppState>,
) -> impl IntoResponse {
    if !authorized(&state, &headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    ws.on_upgrade(move |socket| handle_socket(socket, state)).into_response()
}

async fn handle_socket(mut socket: WebSocket, state: AppState) {
    let mut events = state.sink.subscribe();
    loop {
        tokio::select! {
            event = events.recv() => {
                let event = match event {
                    Ok(event) => event,
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "monitor ws client lagged, dropping events");
                        continue;
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                };
                let Ok(payload) = serde_json::to_string(&event) else { continue };
                if socket.send(Message::Text(payload)).await.is_err() {
                    break;
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(_)) => break,
                }
            }
        }
    }
}

/// Binds and serves the router on `addr`: bind, log, then serve until
/// the listener is dropped.
pub async fn serve(addr: SocketAddr, sink: Arc<MonitorSink>, shared_secret: Option<String>) -> std::io::Result<()> {
    let app = router(sink, shared_secret);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "observability monitor server starting");
    axum::serve(listener, app).await
}
