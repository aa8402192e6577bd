//! WebSocket Match Server
//!
//! Async WebSocket server for duel connections. Accepts participants,
//! decodes their actions at the wire boundary, and routes them into the
//! room state machine. Disconnection is handled as an implicit leave.

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use crate::game::error::GameError;
use crate::game::round;
use crate::game::state::{unix_ms, PlayerId};
use crate::game::store::RoomStore;
use crate::network::protocol::{decode_client_message, ClientMessage, ServerMessage};
use crate::network::session::SessionRegistry;

/// Greeting sent once per connection.
const HELLO_MESSAGE: &str = "Welcome to the Quickdraw duel server";

/// Fixed rejection for role-selection requests. Roles are positional by
/// design, not a player choice.
const ROLE_SELECTION_MESSAGE: &str =
    "Character selection is disabled. Player 1 is the Marshal, Player 2 is the Outlaw.";

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Server version string.
    pub version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:3001".parse().expect("static bind address"),
            max_connections: 1000,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Match server errors.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Failed to bind to address.
    #[error("Failed to bind: {0}")]
    BindFailed(#[from] std::io::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

/// The match server.
pub struct MatchServer {
    /// Server configuration.
    config: ServerConfig,
    /// Room store.
    store: Arc<RoomStore>,
    /// Live connection registry.
    registry: Arc<SessionRegistry>,
    /// Shutdown signal.
    shutdown_tx: broadcast::Sender<()>,
}

impl MatchServer {
    /// Create a new match server.
    pub fn new(config: ServerConfig) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            config,
            store: Arc::new(RoomStore::new()),
            registry: Arc::new(SessionRegistry::new()),
            shutdown_tx,
        }
    }

    /// Run the accept loop until shutdown.
    pub async fn run(&self) -> Result<(), ServerError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        info!("Match server listening on {}", self.config.bind_addr);

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            if self.registry.connection_count().await >= self.config.max_connections {
                                warn!("Connection limit reached, rejecting {}", addr);
                                continue;
                            }
                            self.handle_connection(stream, addr);
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }
        Ok(())
    }

    /// Handle a new WebSocket connection.
    fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let store = self.store.clone();
        let registry = self.registry.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let ws_stream = match accept_async(stream).await {
                Ok(ws) => ws,
                Err(e) => {
                    error!("WebSocket handshake failed for {}: {}", addr, e);
                    return;
                }
            };

            let (mut ws_sender, mut ws_receiver) = ws_stream.split();
            let (msg_tx, mut msg_rx) = mpsc::channel::<ServerMessage>(64);

            let player_id = registry.register("Player").await;
            info!("[conn open] participant {} from {}", player_id, addr);

            // Writer task: serialize outbound events onto the socket.
            let sender_task = tokio::spawn(async move {
                while let Some(msg) = msg_rx.recv().await {
                    let text = match msg.to_json() {
                        Ok(t) => t,
                        Err(e) => {
                            error!("Failed to serialize message: {}", e);
                            continue;
                        }
                    };
                    if ws_sender.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
            });

            let _ = msg_tx
                .send(ServerMessage::Hello {
                    message: HELLO_MESSAGE.to_string(),
                })
                .await;

            loop {
                tokio::select! {
                    msg = ws_receiver.next() => {
                        match msg {
                            Some(Ok(Message::Text(text))) => {
                                match decode_client_message(&text) {
                                    Ok(action) => {
                                        debug!("[recv] participant {} action {:?}", player_id, action);
                                        handle_client_message(
                                            player_id, action, &store, &registry, &msg_tx,
                                        ).await;
                                    }
                                    Err(e) => {
                                        debug!("[recv] rejected frame from {}: {}", player_id, e);
                                        let _ = msg_tx
                                            .send(ServerMessage::Error { message: e.to_string() })
                                            .await;
                                    }
                                }
                            }
                            Some(Ok(Message::Close(_))) | None => {
                                debug!("Participant {} disconnected", player_id);
                                break;
                            }
                            Some(Err(e)) => {
                                error!("WebSocket error for {}: {}", player_id, e);
                                break;
                            }
                            // Ping/pong and binary frames carry no actions.
                            _ => {}
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        break;
                    }
                }
            }

            sender_task.abort();

            // Disconnection is an implicit leave.
            leave_current_room(player_id, &store, &registry).await;
            registry.unregister(player_id).await;
            info!("[conn close] participant {}", player_id);
        });
    }

    /// Shutdown the server.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Get active connection count.
    pub async fn connection_count(&self) -> usize {
        self.registry.connection_count().await
    }

    /// Get live room count.
    pub async fn room_count(&self) -> usize {
        self.store.room_count().await
    }
}

// =============================================================================
// MESSAGE DISPATCH
// =============================================================================

/// Route one decoded client action into the match engine.
async fn handle_client_message(
    id: PlayerId,
    msg: ClientMessage,
    store: &Arc<RoomStore>,
    registry: &Arc<SessionRegistry>,
    tx: &mpsc::Sender<ServerMessage>,
) {
    match msg {
        ClientMessage::CreateRoom => handle_create_room(id, store, registry, tx).await,
        ClientMessage::Join { room_id } => {
            handle_join(id, &room_id, store, registry, tx).await;
        }
        ClientMessage::SelectCharacter => {
            let _ = tx
                .send(ServerMessage::Error {
                    message: ROLE_SELECTION_MESSAGE.to_string(),
                })
                .await;
        }
        ClientMessage::SetReady { ready } => {
            let Some(room) = current_room(id, store, registry).await else {
                return;
            };
            let mut room = room.lock().await;
            match room.set_ready(id, ready) {
                Ok(()) => {
                    debug!("[room {}] participant {} ready={}", room.code, id, ready);
                    room.publish_state().await;
                }
                Err(e) => send_error(tx, e).await,
            }
        }
        ClientMessage::SetBestOf { best_of } => {
            let Some(room) = current_room(id, store, registry).await else {
                return;
            };
            let mut room = room.lock().await;
            match room.set_best_of(id, best_of) {
                Ok(value) => {
                    info!("[room {}] best-of set to {} by host {}", room.code, value, id);
                    room.publish_state().await;
                }
                Err(e) => send_error(tx, e).await,
            }
        }
        ClientMessage::StartMatch => {
            let Some(room) = current_room(id, store, registry).await else {
                return;
            };
            {
                let mut locked = room.lock().await;
                if let Err(e) = locked.validate_start(id) {
                    send_error(tx, e).await;
                    return;
                }
                locked.prepare_match();
                info!(
                    "[room {}] match started by host {}; best of {}",
                    locked.code, id, locked.best_of
                );
            }
            round::start_round(&room).await;
        }
        ClientMessage::ForceStop => {
            let Some(room) = current_room(id, store, registry).await else {
                return;
            };
            let mut room = room.lock().await;
            if room.host != Some(id) {
                send_error(tx, GameError::NotHost).await;
                return;
            }
            room.force_stop();
            info!("[room {}] force-stopped by host {}", room.code, id);
            room.publish_state().await;
        }
        ClientMessage::Press => {
            let Some(room) = current_room(id, store, registry).await else {
                return;
            };
            round::handle_press(&room, id).await;
        }
        ClientMessage::Ping { t } => {
            let _ = tx
                .send(ServerMessage::Pong {
                    t: t.unwrap_or_else(unix_ms),
                })
                .await;
        }
        ClientMessage::ReportPing { ping_ms } => {
            let Some(room) = current_room(id, store, registry).await else {
                return;
            };
            let ping_ms = ping_ms.max(0.0).floor() as u64;
            let room = room.lock().await;
            room.broadcast(ServerMessage::OpponentPing {
                participant_id: id,
                ping_ms,
            })
            .await;
        }
        ClientMessage::DebugSetInfiniteStaring { enable } => {
            let Some(room) = current_room(id, store, registry).await else {
                return;
            };
            round::set_infinite_staring(&room, enable).await;
        }
        ClientMessage::DebugPressOther => {
            let Some(room) = current_room(id, store, registry).await else {
                return;
            };
            round::press_other(&room, id).await;
        }
    }
}

/// Create a fresh room with the caller as host and only member.
async fn handle_create_room(
    id: PlayerId,
    store: &Arc<RoomStore>,
    registry: &Arc<SessionRegistry>,
    tx: &mpsc::Sender<ServerMessage>,
) {
    leave_current_room(id, store, registry).await;

    let (code, room) = store.create_room().await;
    let name = registry
        .name_of(id)
        .await
        .unwrap_or_else(|| "Player".to_string());
    {
        let mut room = room.lock().await;
        let _ = room.add_player(id, name, tx.clone());
        info!("[room {}] created by {}; best of {}", code, id, room.best_of);
        let _ = tx
            .send(ServerMessage::Joined {
                participant_id: id,
                room_id: code.clone(),
            })
            .await;
        room.publish_state().await;
    }
    registry.set_room(id, Some(code)).await;
}

/// Join an existing room by code.
async fn handle_join(
    id: PlayerId,
    room_id: &str,
    store: &Arc<RoomStore>,
    registry: &Arc<SessionRegistry>,
    tx: &mpsc::Sender<ServerMessage>,
) {
    let code = room_id.trim();
    if code.is_empty() {
        let _ = tx
            .send(ServerMessage::Error {
                message: "roomId required".to_string(),
            })
            .await;
        return;
    }
    let Some(room) = store.get(code).await else {
        send_error(tx, GameError::RoomNotFound).await;
        return;
    };

    // Reject a full room before disturbing the caller's current membership.
    {
        let locked = room.lock().await;
        if locked.players.len() >= crate::game::room::ROOM_CAP && !locked.contains(id) {
            send_error(tx, GameError::RoomFull).await;
            return;
        }
    }

    // Switching rooms performs a full leave of the old one first.
    let current = registry.room_of(id).await;
    if current.is_some() && current.as_deref() != Some(code) {
        leave_current_room(id, store, registry).await;
    }

    let name = registry
        .name_of(id)
        .await
        .unwrap_or_else(|| "Player".to_string());
    {
        let mut locked = room.lock().await;
        if let Err(e) = locked.add_player(id, name, tx.clone()) {
            send_error(tx, e).await;
            return;
        }
        info!(
            "[room {}] participant {} joined; host {:?}",
            locked.code, id, locked.host
        );
        let _ = tx
            .send(ServerMessage::Joined {
                participant_id: id,
                room_id: code.to_string(),
            })
            .await;
        locked.publish_state().await;
    }
    registry.set_room(id, Some(code.to_string())).await;
}

/// Remove a participant from whatever room it occupies, if any.
async fn leave_current_room(
    id: PlayerId,
    store: &Arc<RoomStore>,
    registry: &Arc<SessionRegistry>,
) {
    let Some(code) = registry.room_of(id).await else {
        return;
    };
    registry.set_room(id, None).await;
    if let Some(room) = store.get(&code).await {
        let mut room = room.lock().await;
        if room.remove_player(id) {
            info!(
                "[room {}] participant {} left; host now {:?}",
                room.code, id, room.host
            );
            room.publish_state().await;
        }
    }
}

/// The room the participant currently occupies, if any.
async fn current_room(
    id: PlayerId,
    store: &Arc<RoomStore>,
    registry: &Arc<SessionRegistry>,
) -> Option<crate::game::room::SharedRoom> {
    let code = registry.room_of(id).await?;
    store.get(&code).await
}

/// Surface a domain rejection to the caller.
async fn send_error(tx: &mpsc::Sender<ServerMessage>, err: GameError) {
    let _ = tx
        .send(ServerMessage::Error {
            message: err.to_string(),
        })
        .await;
}
