mod clock;
mod config;
mod error;
mod game;
mod players;
mod session;
mod submissions;
mod tally;
mod types;

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Context;
use axum::Json;
use axum::Router;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::http::HeaderValue;
use axum::response::IntoResponse;
use axum::routing::get;
use futures::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::error::SessionError;
use crate::game::{GameEvent, Registry, SessionHandle};
use crate::types::*;

/// Messages queued for one socket. A single writer task drains it.
type Outbox = mpsc::UnboundedSender<ServerMsg>;

#[derive(Clone)]
struct AppState {
    registry: Arc<Registry>,
}

/// The session a socket is seated in, and the task forwarding its events.
struct Seat {
    handle: SessionHandle,
    player_id: PlayerId,
    forwarder: JoinHandle<()>,
}

impl Seat {
    fn new(handle: SessionHandle, player_id: PlayerId, outbox: &Outbox) -> Self {
        let forwarder = tokio::spawn(forward_events(handle.subscribe(), outbox.clone()));
        Self {
            handle,
            player_id,
            forwarder,
        }
    }
}

// ─── Routes ───────────────────────────────────────────────────────

async fn health() -> &'static str {
    "ok"
}

async fn list_templates(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.registry.templates().to_vec())
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let client_id = params
        .get("clientId")
        .filter(|id| !id.is_empty())
        .cloned()
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    ws.on_upgrade(move |socket| handle_socket(socket, state, client_id))
}

async fn handle_socket(socket: WebSocket, state: AppState, client_id: String) {
    let (mut sink, mut receiver) = socket.split();
    let (outbox, mut outgoing) = mpsc::unbounded_channel::<ServerMsg>();

    let writer = tokio::spawn(async move {
        while let Some(msg) = outgoing.recv().await {
            let json = match serde_json::to_string(&msg) {
                Ok(json) => json,
                Err(e) => {
                    tracing::warn!("Failed to encode message: {}", e);
                    continue;
                }
            };
            if sink.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    tracing::info!("WebSocket connected: client {}", client_id);

    let mut seat: Option<Seat> = None;

    while let Some(Ok(msg)) = receiver.next().await {
        let Message::Text(text) = msg else { continue };

        let client_msg: ClientMsg = match serde_json::from_str(&text) {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!("Invalid message: {}", e);
                continue;
            }
        };

        let result = dispatch(&state, &client_id, &outbox, &mut seat, client_msg).await;
        if let Err(err) = &result {
            tracing::debug!("client {} request failed: {}", client_id, err);
        }
        if let Some(out) = reply(result) {
            if outbox.send(out).is_err() {
                break;
            }
        }
    }

    // Socket disconnected
    tracing::info!("WebSocket disconnected: client {}", client_id);
    vacate(seat.take()).await;
    writer.abort();
}

/// Turns a dispatch result into the message sent back, if any.
fn reply(result: Result<Option<ServerMsg>, SessionError>) -> Option<ServerMsg> {
    match result {
        Ok(reply) => reply,
        Err(err) => Some(err.into()),
    }
}

/// The seat a message needs, or `SessionNotFound` when the socket has none.
fn seated(seat: &Option<Seat>) -> Result<(&SessionHandle, PlayerId), SessionError> {
    seat.as_ref()
        .map(|s| (&s.handle, s.player_id))
        .ok_or(SessionError::SessionNotFound)
}

fn profile(client_id: &str, name: String, avatar: Option<String>) -> Profile {
    Profile {
        client_id: client_id.to_string(),
        name,
        avatar,
    }
}

/// Runs one client message. `Ok(None)` means the reply arrives through the event stream.
async fn dispatch(
    state: &AppState,
    client_id: &str,
    outbox: &Outbox,
    seat: &mut Option<Seat>,
    msg: ClientMsg,
) -> Result<Option<ServerMsg>, SessionError> {
    let out = match msg {
        ClientMsg::CreateSession { name, avatar } => {
            let (handle, player_id, snapshot) =
                game::create_session(&state.registry, profile(client_id, name, avatar))?;
            take_seat(seat, Seat::new(handle, player_id, outbox));
            ServerMsg::Joined { player_id, snapshot }
        }
        ClientMsg::JoinSession {
            invite_code,
            name,
            avatar,
        } => {
            let handle = state.registry.find_by_code(&invite_code)?;
            let (player_id, snapshot) = handle.join(profile(client_id, name, avatar)).await?;
            take_seat(seat, Seat::new(handle, player_id, outbox));
            ServerMsg::Joined { player_id, snapshot }
        }
        ClientMsg::LeaveSession => {
            let current = seat.take().ok_or(SessionError::SessionNotFound)?;
            current.forwarder.abort();
            current.handle.leave(current.player_id).await?;
            ServerMsg::Left {
                session_id: current.handle.session_id,
            }
        }
        ClientMsg::CloseSession => {
            let (handle, player_id) = seated(seat)?;
            handle.close(player_id).await?;
            return Ok(None);
        }
        ClientMsg::StartRound => {
            let (handle, player_id) = seated(seat)?;
            ServerMsg::State {
                snapshot: handle.start_round(player_id).await?,
            }
        }
        ClientMsg::SubmitMeme {
            round,
            template,
            top_text,
            bottom_text,
        } => {
            let (handle, player_id) = seated(seat)?;
            let snapshot = handle
                .submit(player_id, round, template, top_text, bottom_text)
                .await?;
            ServerMsg::State { snapshot }
        }
        ClientMsg::CastVote { target, direction } => {
            let (handle, player_id) = seated(seat)?;
            ServerMsg::State {
                snapshot: handle.cast_vote(player_id, target, direction).await?,
            }
        }
        ClientMsg::PlayAgain => {
            let (handle, player_id) = seated(seat)?;
            ServerMsg::State {
                snapshot: handle.play_again(player_id).await?,
            }
        }
        ClientMsg::RequestState => {
            let (handle, player_id) = seated(seat)?;
            ServerMsg::State {
                snapshot: handle.state(Some(player_id)).await?,
            }
        }
    };
    Ok(Some(out))
}

/// Seats the socket, dropping the event stream of any earlier seat.
fn take_seat(seat: &mut Option<Seat>, new: Seat) {
    if let Some(old) = seat.replace(new) {
        old.forwarder.abort();
    }
}

/// Gives up a dropped socket's seat. The player keeps their place for the reconnect grace.
async fn vacate(seat: Option<Seat>) {
    if let Some(seat) = seat {
        seat.forwarder.abort();
        seat.handle.disconnect(seat.player_id).await;
    }
}

async fn forward_events(mut events: broadcast::Receiver<GameEvent>, outbox: Outbox) {
    loop {
        let msg = match events.recv().await {
            Ok(GameEvent::Snapshot(snapshot)) => ServerMsg::State { snapshot },
            Ok(GameEvent::Closed { session_id }) => {
                let _ = outbox.send(ServerMsg::Closed { session_id });
                return;
            }
            Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => return,
        };
        if outbox.send(msg).is_err() {
            return;
        }
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match o.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin {}", o);
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(origins))
}

fn app(state: AppState) -> Router {
    let cors = cors_layer(&state.registry.config().allowed_origins);
    Router::new()
        .route("/health", get(health))
        .route("/templates", get(list_templates))
        .route("/ws", get(ws_handler))
        .layer(cors)
        .with_state(state)
}

// ─── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    config::init()?;

    let port: u16 = std::env::var("PORT")
        .unwrap_or_else(|_| "3000".to_string())
        .parse()
        .context("Invalid PORT")?;

    let game_config = config::load_game_config()?;
    let templates = config::load_templates()?;
    let registry = Registry::new(game_config, templates);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port))
        .await
        .context("Failed to bind")?;

    tracing::info!("memebattle server running on port {}", port);

    axum::serve(listener, app(AppState { registry })).await?;
    Ok(())
}
