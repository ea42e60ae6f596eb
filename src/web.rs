//! HTTP and WebSocket front end.
//!
//! - `GET /` and assets: the control page from `server.static_dir`
//! - `GET /api/status`: engine status as JSON
//! - `WS /ws`: one dashboard session per connection, JSON text frames

use std::sync::Arc;

use axum::Router;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::http::{HeaderValue, Method};
use axum::response::{IntoResponse, Json};
use axum::routing::get;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::services::ServeDir;
use tracing::{debug, info, warn};

use crate::dashboard::{Dashboard, StatusReport};
use crate::protocol::Outbound;
use crate::{DashboardError, Result};

/// Build the application router around a dashboard.
pub fn app(dashboard: Arc<Dashboard>) -> Router {
    let config = dashboard.config();
    let cors = cors_layer(&config.network.cors_allowed_origins);
    let static_dir = config.server.static_dir.clone();

    let app = Router::new()
        .route("/ws", get(ws_upgrade))
        .route("/api/status", get(api_status))
        .layer(cors)
        .with_state(dashboard);

    if static_dir.is_dir() {
        info!("Serving static files from {:?}", static_dir);
        app.fallback_service(ServeDir::new(static_dir).append_index_html_on_directories(true))
    } else {
        warn!("Static directory {:?} does not exist, skipping static file serving", static_dir);
        app
    }
}

/// Bind the listen socket. `host` may be an address or a resolvable name.
pub async fn bind(host: &str, port: u16) -> Result<TcpListener> {
    TcpListener::bind((host, port))
        .await
        .map_err(|e| DashboardError::io(format!("bind {host}:{port}"), e))
}

/// Serve on `host:port` until `shutdown` is cancelled, then drain connections.
pub async fn serve(dashboard: Arc<Dashboard>, host: &str, port: u16, shutdown: CancellationToken) -> Result<()> {
    let listener = bind(host, port).await?;
    serve_on(listener, dashboard, shutdown).await
}

/// Serve on an already bound listener.
pub async fn serve_on(
    listener: TcpListener,
    dashboard: Arc<Dashboard>,
    shutdown: CancellationToken,
) -> Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!("Web server listening on http://{}", addr);
    }

    axum::serve(listener, app(dashboard))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| DashboardError::io("serve", e))
}

fn cors_layer(allowed: &str) -> CorsLayer {
    if allowed.trim() == "*" {
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = allowed
        .split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin {:?}", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET])
        .allow_headers(Any)
}

async fn ws_upgrade(ws: WebSocketUpgrade, State(dashboard): State<Arc<Dashboard>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| run_session(socket, dashboard))
}

async fn api_status(State(dashboard): State<Arc<Dashboard>>) -> Json<StatusReport> {
    Json(dashboard.status())
}

/// Drive one WebSocket session until either side closes or the server stops.
async fn run_session(socket: WebSocket, dashboard: Arc<Dashboard>) {
    let router = dashboard.router();
    let cancel = dashboard.cancellation_token();
    let mut session = router.connect();
    let id = session.id();
    let (mut ws_tx, mut ws_rx) = socket.split();

    loop {
        // Queued events go out before video, so a session always opens with
        // its status and log history
        tokio::select! {
            biased;

            _ = cancel.cancelled() => break,
            event = session.events.recv() => {
                let Some(event) = event else { break };
                if !send(&mut ws_tx, &event).await {
                    break;
                }
            }
            changed = session.video.changed() => {
                if changed.is_err() {
                    break;
                }
                // Release the watch guard before writing to the socket
                let latest = session.video.borrow_and_update().clone();
                let open = match latest {
                    Some(frame) => send(&mut ws_tx, &Outbound::VideoFrame { frame }).await,
                    None => true,
                };
                if !open {
                    break;
                }
            }
            message = ws_rx.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    // Rejections are logged by the router; the session stays open
                    let _ = router.dispatch(id, text.as_str()).await;
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(e)) => {
                    debug!(session = %id, "WebSocket error: {}", e);
                    break;
                }
                Some(Ok(_)) => {}
            }
        }
    }

    router.disconnect(id);
}

/// Write one message. Returns `false` once the socket is closed.
async fn send(ws_tx: &mut SplitSink<WebSocket, Message>, message: &Outbound) -> bool {
    match message.to_json() {
        Ok(text) => ws_tx.send(Message::Text(text.into())).await.is_ok(),
        Err(e) => {
            warn!("Could not serialize outbound message: {}", e);
            true
        }
    }
}
