//! Authoritative per-game state.

use chess_core::game_data::{GameData, GameMetadata};
use chess_core::{apply_move, derive_status, parse, pgn, BoardState, BoardStatus, MoveFields, RepetitionTracker, Side};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::error::RelayError;

pub type GameId = String;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Players {
    pub white: String,
    pub black: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Ended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    EndedByBroadcaster,
    /// The broadcaster vanished and did not return within the grace window.
    Abandoned,
    GameOver,
}

/// One accepted position change. Never mutated after it is appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveRecord {
    pub fen: String,
    pub player: Side,
    pub timestamp: DateTime<Utc>,
    pub algebraic: Option<String>,
    pub uci: Option<String>,
    /// `None` when legality was never checked, `Some(false)` when the board
    /// was trusted even though no legal move explains it.
    pub is_legal: Option<bool>,
    pub from_square: Option<String>,
    pub to_square: Option<String>,
    pub piece_moved: Option<String>,
}

impl MoveRecord {
    /// A move that was matched against the legal moves of the prior position.
    pub fn verified(next: &BoardState, fields: MoveFields) -> Self {
        Self {
            fen: next.fen(),
            player: fields.side,
            timestamp: Utc::now(),
            algebraic: Some(fields.san),
            uci: Some(fields.uci),
            is_legal: Some(true),
            from_square: Some(fields.from_square),
            to_square: Some(fields.to_square),
            piece_moved: Some(fields.piece),
        }
    }

    /// A board snapshot that no legal move explains, accepted as-is.
    pub fn snapshot(next: &BoardState, player: Side) -> Self {
        Self {
            fen: next.fen(),
            player,
            timestamp: Utc::now(),
            algebraic: None,
            uci: None,
            is_legal: Some(false),
            from_square: None,
            to_square: None,
            piece_moved: None,
        }
    }
}

/// Full view of a session, sent to spectators when they join.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub game_id: GameId,
    pub title: String,
    pub players: Players,
    pub status: SessionStatus,
    pub position: String,
    pub move_count: usize,
    pub viewer_count: u32,
    pub last_update: i64,
    pub board_status: BoardStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_reason: Option<EndReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub moves: Option<Vec<MoveRecord>>,
}

/// Entry of the live games listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub id: GameId,
    pub title: String,
    pub players: Players,
    pub status: SessionStatus,
    pub last_update: i64,
    pub current_position: String,
    pub move_count: usize,
    pub viewer_count: u32,
}

/// Record handed to the game archive once per ended session.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinishedGame {
    pub game_id: GameId,
    pub title: String,
    pub players: Players,
    pub moves: Vec<MoveRecord>,
    pub final_position: String,
    pub board_status: BoardStatus,
    pub end_reason: EndReason,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
}

impl FinishedGame {
    /// Every record was a verified move, so the SAN list replays the game.
    pub fn has_complete_move_list(&self) -> bool {
        self.moves.iter().all(|m| m.is_legal == Some(true) && m.algebraic.is_some())
    }

    pub fn to_game_data(&self) -> GameData {
        let final_state = parse(&self.final_position).unwrap_or_default();
        GameData {
            metadata: GameMetadata {
                white: self.players.white.clone(),
                black: self.players.black.clone(),
                result: pgn::result_token(self.board_status, &final_state).to_string(),
                date: Some(self.started_at.format("%Y.%m.%d").to_string()),
                event: Some(self.title.clone()),
            },
            moves: self.moves.iter().filter_map(|m| m.algebraic.clone()).collect(),
            final_fen: self.final_position.clone(),
        }
    }

    pub fn to_pgn(&self) -> String {
        pgn::write_pgn(&self.to_game_data(), self.has_complete_move_list())
    }
}

#[derive(Debug)]
pub struct GameSession {
    id: GameId,
    title: String,
    players: Players,
    status: SessionStatus,
    board: BoardState,
    board_status: BoardStatus,
    moves: Vec<MoveRecord>,
    repetitions: RepetitionTracker,
    viewer_count: u32,
    created_at: DateTime<Utc>,
    last_update: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
    ended_instant: Option<Instant>,
    end_reason: Option<EndReason>,
}

impl GameSession {
    pub fn new(id: GameId, title: String, players: Players) -> Self {
        let board = BoardState::initial();
        let now = Utc::now();
        Self {
            id,
            title,
            players,
            status: SessionStatus::Active,
            repetitions: RepetitionTracker::starting_at(&board),
            board,
            board_status: BoardStatus::Normal,
            moves: Vec::new(),
            viewer_count: 0,
            created_at: now,
            last_update: now,
            ended_at: None,
            ended_instant: None,
            end_reason: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }

    pub fn board(&self) -> &BoardState {
        &self.board
    }

    pub fn board_status(&self) -> BoardStatus {
        self.board_status
    }

    pub fn moves(&self) -> &[MoveRecord] {
        &self.moves
    }

    pub fn move_count(&self) -> usize {
        self.moves.len()
    }

    pub fn viewer_count(&self) -> u32 {
        self.viewer_count
    }

    pub fn last_update(&self) -> DateTime<Utc> {
        self.last_update
    }

    pub fn end_reason(&self) -> Option<EndReason> {
        self.end_reason
    }

    /// Position changes are accepted while active and before the board
    /// reaches a terminal status.
    pub fn accepts_moves(&self) -> bool {
        self.is_active() && !self.board_status.is_terminal()
    }

    /// Append a record whose resulting position is `next`. Returns the
    /// derived status of the new position.
    pub(crate) fn append(&mut self, next: BoardState, record: MoveRecord) -> BoardStatus {
        debug_assert_eq!(record.fen, next.fen());
        self.repetitions.record(&next);
        self.board_status = derive_status(&next, &self.repetitions);
        self.board = next;
        self.last_update = record.timestamp;
        self.moves.push(record);
        self.board_status
    }

    /// Flip to ended. Returns false if the session had already ended.
    pub(crate) fn end(&mut self, reason: EndReason) -> bool {
        if !self.is_active() {
            return false;
        }
        let now = Utc::now();
        self.status = SessionStatus::Ended;
        self.end_reason = Some(reason);
        self.ended_at = Some(now);
        self.ended_instant = Some(Instant::now());
        self.last_update = now;
        true
    }

    /// Whether the session ended at least `retention` ago.
    pub(crate) fn expired(&self, retention: std::time::Duration) -> bool {
        self.ended_instant.is_some_and(|at| at.elapsed() >= retention)
    }

    /// Apply a viewer delta, clamping at zero.
    pub(crate) fn adjust_viewers(&mut self, delta: i64) -> u32 {
        let next = (self.viewer_count as i64 + delta).max(0);
        self.viewer_count = u32::try_from(next).unwrap_or(u32::MAX);
        self.viewer_count
    }

    pub(crate) fn clear_viewers(&mut self) {
        self.viewer_count = 0;
    }

    pub fn snapshot(&self, include_moves: bool) -> SessionSnapshot {
        SessionSnapshot {
            game_id: self.id.clone(),
            title: self.title.clone(),
            players: self.players.clone(),
            status: self.status,
            position: self.board.fen(),
            move_count: self.moves.len(),
            viewer_count: self.viewer_count,
            last_update: self.last_update.timestamp_millis(),
            board_status: self.board_status,
            end_reason: self.end_reason,
            moves: include_moves.then(|| self.moves.clone()),
        }
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            id: self.id.clone(),
            title: self.title.clone(),
            players: self.players.clone(),
            status: self.status,
            last_update: self.last_update.timestamp_millis(),
            current_position: self.board.fen(),
            move_count: self.moves.len(),
            viewer_count: self.viewer_count,
        }
    }

    pub(crate) fn finished_game(&self) -> FinishedGame {
        FinishedGame {
            game_id: self.id.clone(),
            title: self.title.clone(),
            players: self.players.clone(),
            moves: self.moves.clone(),
            final_position: self.board.fen(),
            board_status: self.board_status,
            end_reason: self.end_reason.unwrap_or(EndReason::EndedByBroadcaster),
            started_at: self.created_at,
            ended_at: self.ended_at.unwrap_or(self.last_update),
        }
    }

    /// Rebuild the position from the initial board and the move log.
    /// Verified moves are played again; trusted snapshots reset the board.
    pub fn replay(&self) -> Result<BoardState, RelayError> {
        let mut state = BoardState::initial();
        for record in &self.moves {
            state = match (record.is_legal, record.uci.as_deref()) {
                (Some(true), Some(uci)) => apply_move(&state, uci)?.0,
                _ => parse(&record.fen)?,
            };
        }
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chess_core::{infer_move, parse_lenient};

    fn session() -> GameSession {
        GameSession::new(
            "g1".into(),
            "Test".into(),
            Players { white: "A".into(), black: "B".into() },
        )
    }

    fn play(session: &mut GameSession, san: &str) -> BoardStatus {
        let (next, fields) = apply_move(session.board(), san).unwrap();
        let record = MoveRecord::verified(&next, fields);
        session.append(next, record)
    }

    #[test]
    fn test_new_session_snapshot() {
        let snap = session().snapshot(false);
        assert_eq!(snap.status, SessionStatus::Active);
        assert_eq!(snap.move_count, 0);
        assert_eq!(snap.viewer_count, 0);
        assert_eq!(snap.position, chess_core::STARTING_FEN);
        assert!(snap.moves.is_none());
    }

    #[test]
    fn test_replay_matches_current_position() {
        let mut s = session();
        for san in ["e4", "e5", "Nf3", "Nc6", "Bb5", "a6"] {
            play(&mut s, san);
        }
        // A trusted snapshot in the middle of the log.
        let snapshot = parse_lenient("r1bqkbnr/1ppp1ppp/p1n5/1B2p3/4P3/5N2/PPPP1PPP/RNBQK2R").unwrap();
        s.append(snapshot.clone(), MoveRecord::snapshot(&snapshot, Side::White));

        assert_eq!(s.replay().unwrap(), *s.board());
        assert_eq!(s.move_count(), 7);
    }

    #[test]
    fn test_mate_sets_terminal_status() {
        let mut s = session();
        for san in ["f3", "e5", "g4"] {
            play(&mut s, san);
        }
        assert_eq!(play(&mut s, "Qh4"), BoardStatus::Checkmate);
        assert!(!s.accepts_moves());
        assert!(s.is_active());
    }

    #[test]
    fn test_end_is_idempotent() {
        let mut s = session();
        assert!(s.end(EndReason::EndedByBroadcaster));
        let first = s.snapshot(true);
        assert!(!s.end(EndReason::Abandoned));
        assert_eq!(s.snapshot(true), first);
        assert_eq!(s.end_reason(), Some(EndReason::EndedByBroadcaster));
    }

    #[test]
    fn test_viewer_count_clamps_at_zero() {
        let mut s = session();
        assert_eq!(s.adjust_viewers(2), 2);
        assert_eq!(s.adjust_viewers(-5), 0);
    }

    #[test]
    fn test_finished_game_pgn() {
        let mut s = session();
        let (next, fields) = infer_move(s.board(), "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR")
            .unwrap()
            .unwrap();
        s.append(next.clone(), MoveRecord::verified(&next, fields));
        s.end(EndReason::EndedByBroadcaster);

        let finished = s.finished_game();
        assert!(finished.has_complete_move_list());
        let pgn = finished.to_pgn();
        assert!(pgn.contains("[White \"A\"]"));
        assert!(pgn.ends_with("1. e4 *"));
    }
}
