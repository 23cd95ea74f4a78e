//! Message vocabulary shared by every transport binding.
//!
//! JSON objects tagged by `type` (snake_case) with camelCase fields.

use chess_core::{BoardStatus, Side};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::session::{EndReason, GameId, MoveRecord, Players, SessionSnapshot, SessionSummary};

/// Client -> server messages
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    StartGame {
        #[serde(default, alias = "id")]
        game_id: Option<GameId>,
        #[serde(default)]
        title: Option<String>,
        #[serde(default)]
        players: Option<Players>,
    },
    Position {
        #[serde(default)]
        game_id: Option<GameId>,
        #[serde(default)]
        fen: Option<String>,
        #[serde(default, rename = "move")]
        mv: Option<String>,
    },
    EndGame {
        #[serde(default)]
        game_id: Option<GameId>,
    },
    GetGameState {
        game_id: GameId,
    },
    Subscribe {
        game_id: GameId,
    },
    Unsubscribe,
    GetLiveGames,
}

/// Incremental update for one accepted position change.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionUpdate {
    pub game_id: GameId,
    pub fen: String,
    pub move_number: usize,
    pub player: Side,
    pub algebraic: Option<String>,
    pub uci: Option<String>,
    pub is_legal: Option<bool>,
    pub from_square: Option<String>,
    pub to_square: Option<String>,
    pub piece_moved: Option<String>,
    pub board_status: BoardStatus,
    pub timestamp: DateTime<Utc>,
}

impl PositionUpdate {
    pub fn new(game_id: &str, move_number: usize, record: &MoveRecord, board_status: BoardStatus) -> Self {
        Self {
            game_id: game_id.to_string(),
            fen: record.fen.clone(),
            move_number,
            player: record.player,
            algebraic: record.algebraic.clone(),
            uci: record.uci.clone(),
            is_legal: record.is_legal,
            from_square: record.from_square.clone(),
            to_square: record.to_square.clone(),
            piece_moved: record.piece_moved.clone(),
            board_status,
            timestamp: record.timestamp,
        }
    }
}

/// Server -> client messages
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    GameStarted {
        game_id: GameId,
        initial_position: String,
        resumed: bool,
    },
    GameState(SessionSnapshot),
    Position(PositionUpdate),
    GameEnded {
        game_id: GameId,
        reason: EndReason,
    },
    LiveGamesList {
        games: Vec<SessionSummary>,
    },
    NewGame {
        game: SessionSummary,
    },
    ViewerCount {
        game_id: GameId,
        viewer_count: u32,
    },
    Error {
        message: String,
    },
}

impl ServerMessage {
    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error { message: message.into() }
    }
}
