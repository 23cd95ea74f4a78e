#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use server::config::RelayConfig;
use server::relay::{
    ClientMessage, Connection, ConnectionId, ConnectionManager, MemoryArchive, ServerMessage,
};
use tokio::sync::mpsc::UnboundedReceiver;

pub const GRACE: Duration = Duration::from_millis(100);

/// Relay settings for tests: short grace window, long retention.
pub fn config() -> RelayConfig {
    RelayConfig {
        grace_window: GRACE,
        retention: Duration::from_secs(60),
        ..RelayConfig::default()
    }
}

pub fn relay_with(config: RelayConfig) -> (Arc<ConnectionManager>, Arc<MemoryArchive>) {
    let archive = Arc::new(MemoryArchive::new());
    (ConnectionManager::new(config, archive.clone()), archive)
}

pub fn relay() -> (Arc<ConnectionManager>, Arc<MemoryArchive>) {
    relay_with(config())
}

/// A connected test peer.
pub struct Peer {
    pub id: ConnectionId,
    pub rx: UnboundedReceiver<ServerMessage>,
}

impl Peer {
    pub fn connect(relay: &ConnectionManager) -> Self {
        let Connection { id, outbound } = relay.connect();
        Self { id, rx: outbound }
    }

    /// Send a JSON message the way a websocket frame would arrive.
    pub async fn send(&self, relay: &Arc<ConnectionManager>, msg: Value) {
        relay.handle_text(self.id, &msg.to_string()).await;
    }

    pub async fn send_msg(&self, relay: &Arc<ConnectionManager>, msg: ClientMessage) {
        relay.handle(self.id, msg).await;
    }

    /// Everything queued for this peer so far.
    pub fn drain(&mut self) -> Vec<ServerMessage> {
        std::iter::from_fn(|| self.rx.try_recv().ok()).collect()
    }
}

pub fn start_game(title: &str, white: &str, black: &str) -> Value {
    json!({
        "type": "start_game",
        "title": title,
        "players": { "white": white, "black": black },
    })
}

pub fn position_fen(fen: &str) -> Value {
    json!({ "type": "position", "fen": fen })
}

pub fn position_move(mv: &str) -> Value {
    json!({ "type": "position", "move": mv })
}

pub fn get_game_state(game_id: &str) -> Value {
    json!({ "type": "get_game_state", "gameId": game_id })
}

/// Fens of the `position` events in `messages`, in order.
pub fn position_fens(messages: &[ServerMessage]) -> Vec<String> {
    messages
        .iter()
        .filter_map(|m| match m {
            ServerMessage::Position(update) => Some(update.fen.clone()),
            _ => None,
        })
        .collect()
}

pub fn errors(messages: &[ServerMessage]) -> Vec<String> {
    messages
        .iter()
        .filter_map(|m| match m {
            ServerMessage::Error { message } => Some(message.clone()),
            _ => None,
        })
        .collect()
}
