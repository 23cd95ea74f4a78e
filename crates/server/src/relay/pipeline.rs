//! Validation and application of broadcaster position events.

use std::sync::Arc;

use chess_core::{apply_move, infer_move, normalize_placement, parse_lenient_with_turn, BoardStatus, ParseError};

use super::protocol::{PositionUpdate, ServerMessage};
use super::router::Router;
use super::session::{MoveRecord, SessionStatus};
use super::store::SessionStore;
use crate::error::RelayError;

/// What a broadcaster sent: a move in SAN/UCI or a board encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PositionInput {
    Move(String),
    Fen(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IgnoreReason {
    /// The session has ended; late events from slow transports land here.
    SessionEnded,
    /// The board already reached mate, stalemate or a draw.
    GameOver(BoardStatus),
    /// Same placement as the current board; hardware repeats itself.
    Unchanged,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Applied {
    Accepted {
        record: MoveRecord,
        move_number: usize,
        board_status: BoardStatus,
    },
    Ignored(IgnoreReason),
}

pub struct Pipeline {
    store: Arc<SessionStore>,
    router: Arc<Router>,
}

impl Pipeline {
    pub fn new(store: Arc<SessionStore>, router: Arc<Router>) -> Self {
        Self { store, router }
    }

    /// Apply one event to a session and fan the result out to its
    /// subscribers. Rejected events leave the session untouched.
    pub async fn apply(&self, game_id: &str, input: PositionInput) -> Result<Applied, RelayError> {
        let handle = self.store.get(game_id)?;
        let mut session = handle.lock().await;

        if session.status() == SessionStatus::Ended {
            tracing::debug!("Ignoring {input:?} for ended game {game_id}");
            return Ok(Applied::Ignored(IgnoreReason::SessionEnded));
        }
        if !session.accepts_moves() {
            tracing::debug!("Ignoring {input:?} for finished game {game_id}");
            return Ok(Applied::Ignored(IgnoreReason::GameOver(session.board_status())));
        }

        let (next, record) = match &input {
            PositionInput::Move(text) => {
                let (next, fields) = apply_move(session.board(), text)?;
                let record = MoveRecord::verified(&next, fields);
                (next, record)
            }
            PositionInput::Fen(text) => {
                let placement = text.split_whitespace().next().ok_or(ParseError::Empty)?;
                let normalized = normalize_placement(placement)?;
                if normalized == session.board().placement() {
                    tracing::debug!("Ignoring repeated placement for game {game_id}");
                    return Ok(Applied::Ignored(IgnoreReason::Unchanged));
                }

                match infer_move(session.board(), placement)? {
                    Some((next, fields)) => {
                        let record = MoveRecord::verified(&next, fields);
                        (next, record)
                    }
                    None => {
                        // The side to move made this change; the opponent moves next
                        let mover = session.board().turn();
                        let next = parse_lenient_with_turn(text, mover.opponent())?;
                        tracing::warn!(
                            "No legal move explains the new board in game {game_id}; trusting {}",
                            next.fen()
                        );
                        let record = MoveRecord::snapshot(&next, mover);
                        (next, record)
                    }
                }
            }
        };

        let board_status = session.append(next, record.clone());
        let move_number = session.move_count();
        self.router.publish_locked(
            &session,
            ServerMessage::Position(PositionUpdate::new(game_id, move_number, &record, board_status)),
        );

        tracing::info!(
            "Game {game_id} move {move_number}: {} ({:?})",
            record.algebraic.as_deref().unwrap_or("snapshot"),
            board_status
        );

        Ok(Applied::Accepted {
            record,
            move_number,
            board_status,
        })
    }
}
