// In crates/web-server/src/lib.rs

use app_config::types::ServerSettings;
use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, Query, State,
    },
    response::Json,
    routing::{get, post},
    Router,
};
use core_types::BotId;
use engine::{BotManager, BotSnapshot};
use events::{BotEvent, EventSender};
use futures::{sink::SinkExt, stream::StreamExt}; // for websocket send/receive
use std::collections::VecDeque;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use types::{StartBotResponse, StopParams, StopResponse};
use uuid::Uuid;

pub mod error;
pub mod types;

// Event replay cache type for late-joining WebSocket clients.
type EventCache = Arc<Mutex<VecDeque<BotEvent>>>;

// Re-export our custom error type for convenience.
pub use error::{Error, Result};

const EVENT_CACHE_SIZE: usize = 200; // The maximum number of events kept for replay.

/// The shared application state that is available to all API handlers.
///
/// It is wrapped in an `Arc` to allow for safe concurrent access.
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<BotManager>,
    pub events_tx: EventSender,     // For broadcasting live events
    pub event_cache: EventCache,    // For replaying recent events
}

/// Creates the main application router with all routes and middleware.
pub fn create_router(app_state: AppState) -> Router {
    // Allow the operational UI to be served from anywhere in development.
    let cors = tower_http::cors::CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods(tower_http::cors::Any)
        .allow_headers(tower_http::cors::Any);

    // Define the API sub-router
    let api_router = Router::new()
        .route("/bots", get(list_bots_handler).post(start_bot_handler))
        .route("/bots/stop-all", post(stop_all_handler))
        .route("/bots/{id}", get(get_bot_handler).delete(stop_bot_handler));

    // The main router.
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_check_handler))
        .nest("/api", api_router)
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer(cors)
        .with_state(app_state)
}

/// A simple health check handler.
/// Responds with a 200 OK and a JSON body.
async fn health_check_handler() -> &'static str {
    "OK"
}

fn parse_bot_id(raw: &str) -> Result<BotId> {
    Uuid::from_str(raw)
        .map(BotId)
        .map_err(|_| Error::InvalidId(raw.to_string()))
}

/// The handler for `POST /api/bots`.
/// Validates the configuration and spawns a new bot instance.
async fn start_bot_handler(
    State(state): State<AppState>,
    Json(config): Json<core_types::BotConfig>,
) -> Result<Json<StartBotResponse>> {
    let id = state.manager.start(config).await?;
    Ok(Json(StartBotResponse { id }))
}

/// Handler for `GET /api/bots`.
async fn list_bots_handler(State(state): State<AppState>) -> Json<Vec<BotSnapshot>> {
    Json(state.manager.list().await)
}

/// Handler for `GET /api/bots/:id`.
async fn get_bot_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<BotSnapshot>> {
    let id = parse_bot_id(&id)?;
    match state.manager.status(id).await {
        Some(snapshot) => Ok(Json(snapshot)),
        None => Err(Error::NotFound(format!("bot {id} is not in the active set"))),
    }
}

/// Handler for `DELETE /api/bots/:id`.
/// Signals cooperative cancellation and waits up to the requested timeout.
async fn stop_bot_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<StopParams>,
) -> Result<Json<StopResponse>> {
    let id = parse_bot_id(&id)?;
    let status = state
        .manager
        .stop(id, Duration::from_secs(params.timeout_secs))
        .await?;
    Ok(Json(StopResponse { id, status }))
}

/// Handler for `POST /api/bots/stop-all`.
async fn stop_all_handler(
    State(state): State<AppState>,
    Query(params): Query<StopParams>,
) -> Json<Vec<StopResponse>> {
    let results = state
        .manager
        .stop_all(Duration::from_secs(params.timeout_secs))
        .await;
    Json(
        results
            .into_iter()
            .map(|(id, status)| StopResponse { id, status })
            .collect(),
    )
}

/// The handler for `GET /ws`.
/// Upgrades the connection to a WebSocket and handles the real-time communication.
async fn ws_handler(
    ws: axum::extract::ws::WebSocketUpgrade,
    State(state): axum::extract::State<AppState>,
) -> impl axum::response::IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// The actual WebSocket handling logic after the connection is upgraded.
async fn handle_socket(mut socket: WebSocket, state: AppState) {
    tracing::info!("New WebSocket client connected.");

    // --- 1. The "Replay" ---
    // Get a lock on the cache and clone all recent events to a local vector.
    let replay_events: Vec<_> = {
        let cache = state.event_cache.lock().unwrap();
        cache.iter().cloned().collect()
    };
    for event in replay_events {
        let json_msg = match serde_json::to_string(&event) {
            Ok(json) => json,
            Err(_) => continue,
        };
        if socket.send(Message::Text(json_msg.into())).await.is_err() {
            // Client disconnected before replay was finished.
            tracing::info!("WebSocket client disconnected during replay.");
            return;
        }
    }

    // --- 2. "Going Live" ---
    // Subscribe to the broadcast channel to receive new, live events.
    let mut rx = state.events_tx.subscribe();

    // The main loop for this client.
    loop {
        tokio::select! {
            // Await a new event from the broadcast channel.
            Ok(event) = rx.recv() => {
                let json_msg = match serde_json::to_string(&event) {
                    Ok(json) => json,
                    Err(_) => continue,
                };
                if socket.send(Message::Text(json_msg.into())).await.is_err() {
                    // Client disconnected. Break the loop.
                    tracing::info!("WebSocket client disconnected.");
                    break;
                }
            }
            // Await a message from the client (e.g., a ping or a close frame).
            Some(Ok(msg)) = socket.next() => {
                if let Message::Close(_) = msg {
                    tracing::info!("WebSocket client sent close frame.");
                    break;
                }
            }
            // If both channels are closed, the select macro will terminate.
            else => {
                break;
            }
        }
    }
    tracing::info!("WebSocket client connection closed.");
}

/// Keeps the replay cache current by draining the live event stream.
fn spawn_cache_filler(events_tx: &EventSender, cache: EventCache) {
    let mut rx = events_tx.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = rx.recv().await {
            let mut cache = cache.lock().unwrap();
            if cache.len() >= EVENT_CACHE_SIZE {
                cache.pop_front();
            }
            cache.push_back(event);
        }
    });
}

/// The main entry point for running the operational API server.
///
/// This function sets up the TCP listener and serves the application router.
/// It will run until the process is terminated.
pub async fn run(
    settings: ServerSettings,
    manager: Arc<BotManager>,
    events_tx: EventSender,
) -> Result<()> {
    // 1. Create the event replay cache and keep it fed.
    let event_cache: EventCache = Arc::new(Mutex::new(VecDeque::with_capacity(EVENT_CACHE_SIZE)));
    spawn_cache_filler(&events_tx, event_cache.clone());

    // 2. Create the AppState.
    let app_state = AppState {
        manager,
        events_tx,
        event_cache,
    };

    // 3. Create and run the router.
    let app = create_router(app_state);

    let address = format!("{}:{}", settings.host, settings.port);
    tracing::info!("Operational API listening on {}", address);

    let listener = TcpListener::bind(&address).await.map_err(Error::ServerBindError)?;

    axum::serve(listener, app.into_make_service())
        .await
        .map_err(|e| Error::ServerBindError(std::io::Error::other(e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_params_default_the_timeout() {
        let params: StopParams = serde_json::from_str("{}").unwrap();
        assert_eq!(params.timeout_secs, 10);
    }

    #[test]
    fn bot_ids_must_be_uuids() {
        assert!(parse_bot_id("not-a-uuid").is_err());
        assert!(parse_bot_id("8c4a3b90-0e9c-4df2-b7a2-0c5cf7a0f6f4").is_ok());
    }
}
