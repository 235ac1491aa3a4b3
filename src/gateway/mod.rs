/// HTTP surface of the bridge.
///
/// Serves the connection status query, cached media files, a WebSocket
/// stream of lifecycle events and a health check.
use std::io::ErrorKind;
use std::sync::Arc;

use anyhow::Result;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::{StatusCode, header};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};

use crate::lifecycle::{LifecycleBroadcaster, LifecycleEvent};
use crate::media::{MediaCache, PUBLIC_PREFIX};

/// Shared state for all handlers.
#[derive(Clone)]
pub struct GatewayState {
    pub broadcaster: Arc<LifecycleBroadcaster>,
    pub media: Arc<MediaCache>,
}

/// Build the gateway router.
pub fn build_router(state: GatewayState) -> Router {
    Router::new()
        .route("/status", get(status_handler))
        .route(&format!("{}/{{filename}}", PUBLIC_PREFIX), get(media_handler))
        .route("/ws", get(ws_handler))
        .route("/api/health", get(health_handler))
        .with_state(state)
}

/// GET /status: whether the session is authenticated.
async fn status_handler(State(state): State<GatewayState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "isConnected": state.broadcaster.is_connected()
    }))
}

/// GET /api/health: health check endpoint.
async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": crate::VERSION
    }))
}

/// GET /temp/{filename}: serve a cached media file.
async fn media_handler(
    State(state): State<GatewayState>,
    Path(filename): Path<String>,
) -> impl IntoResponse {
    let Some(path) = state.media.resolve(&filename) else {
        debug!("media: rejected file name {:?}", filename);
        return StatusCode::NOT_FOUND.into_response();
    };

    match tokio::fs::read(&path).await {
        Ok(bytes) => {
            ([(header::CONTENT_TYPE, content_type_for(&filename))], bytes).into_response()
        }
        Err(e) if e.kind() == ErrorKind::NotFound => StatusCode::NOT_FOUND.into_response(),
        Err(e) => {
            warn!("media: failed to read {}: {}", path.display(), e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Content type from the file extension of a cached file.
pub(crate) fn content_type_for(filename: &str) -> &'static str {
    let ext = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpeg" | "jpg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "mp4" => "video/mp4",
        "3gpp" => "video/3gpp",
        "ogg" => "audio/ogg",
        "pdf" => "application/pdf",
        _ => "application/octet-stream",
    }
}

/// GET /ws: push lifecycle events to the client.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<GatewayState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state.broadcaster))
}

async fn handle_socket(socket: WebSocket, broadcaster: Arc<LifecycleBroadcaster>) {
    // Subscribe before the snapshot so no transition falls in between.
    let mut events = broadcaster.subscribe();
    let (mut sender, mut receiver) = socket.split();
    debug!("ws: observer connected");

    let snapshot = LifecycleEvent::State {
        state: broadcaster.state().current(),
    };
    if send_event(&mut sender, &snapshot).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    if send_event(&mut sender, &event).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("ws: observer lagged, {} events dropped", skipped);
                }
                Err(RecvError::Closed) => break,
            },
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => {}
            },
        }
    }
    debug!("ws: observer disconnected");
}

async fn send_event<S>(sender: &mut S, event: &LifecycleEvent) -> Result<()>
where
    S: futures_util::Sink<Message, Error = axum::Error> + Unpin,
{
    let json = serde_json::to_string(event)?;
    sender.send(Message::Text(json.into())).await?;
    Ok(())
}

/// Start the gateway server.
pub async fn start(
    host: &str,
    port: u16,
    state: GatewayState,
) -> Result<tokio::task::JoinHandle<()>> {
    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("gateway listening on {}", addr);
    Ok(serve(listener, state))
}

/// Serve the gateway on an already bound listener.
pub fn serve(
    listener: tokio::net::TcpListener,
    state: GatewayState,
) -> tokio::task::JoinHandle<()> {
    let app = build_router(state);
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("gateway server error: {}", e);
        }
    })
}
