use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use shakmaty::Position;

use crate::position::BoardState;

/// Legality-and-status judgment for a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoardStatus {
    Normal,
    Check,
    Checkmate,
    Stalemate,
    DrawByRepetition,
    DrawByInsufficientMaterial,
    DrawByFiftyMoves,
}

impl BoardStatus {
    /// No further moves are expected once the game reaches this status.
    pub fn is_terminal(self) -> bool {
        !matches!(self, BoardStatus::Normal | BoardStatus::Check)
    }

    pub fn is_draw(self) -> bool {
        matches!(
            self,
            BoardStatus::Stalemate
                | BoardStatus::DrawByRepetition
                | BoardStatus::DrawByInsufficientMaterial
                | BoardStatus::DrawByFiftyMoves
        )
    }
}

/// Counts how often each position (placement, turn, castling, en passant)
/// has occurred in a game.
#[derive(Debug, Clone, Default)]
pub struct RepetitionTracker {
    seen: HashMap<String, u32>,
}

impl RepetitionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking from `initial`, counted once.
    pub fn starting_at(initial: &BoardState) -> Self {
        let mut tracker = Self::new();
        tracker.record(initial);
        tracker
    }

    /// Record an occurrence of `state` and return its running count.
    pub fn record(&mut self, state: &BoardState) -> u32 {
        let count = self.seen.entry(state.repetition_key()).or_insert(0);
        *count += 1;
        *count
    }

    pub fn occurrences(&self, state: &BoardState) -> u32 {
        self.seen.get(&state.repetition_key()).copied().unwrap_or(0)
    }
}

/// Derive the status of `state`. `history` must already include `state`.
pub fn derive_status(state: &BoardState, history: &RepetitionTracker) -> BoardStatus {
    let pos = state.position();

    if pos.is_checkmate() {
        BoardStatus::Checkmate
    } else if pos.is_stalemate() {
        BoardStatus::Stalemate
    } else if pos.is_insufficient_material() {
        BoardStatus::DrawByInsufficientMaterial
    } else if history.occurrences(state) >= 3 {
        BoardStatus::DrawByRepetition
    } else if pos.halfmoves() >= 100 {
        BoardStatus::DrawByFiftyMoves
    } else if pos.is_check() {
        BoardStatus::Check
    } else {
        BoardStatus::Normal
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::moves::apply_move;
    use crate::position::parse;

    fn status_of(fen: &str) -> BoardStatus {
        let state = parse(fen).unwrap();
        let history = RepetitionTracker::starting_at(&state);
        derive_status(&state, &history)
    }

    #[test]
    fn test_starting_position_is_normal() {
        assert_eq!(status_of(crate::STARTING_FEN), BoardStatus::Normal);
    }

    #[test]
    fn test_fools_mate_is_checkmate() {
        let status = status_of("rnb1kbnr/pppp1ppp/8/4p3/6Pq/5P2/PPPPP2P/RNBQKBNR w KQkq - 1 3");
        assert_eq!(status, BoardStatus::Checkmate);
        assert!(status.is_terminal());
    }

    #[test]
    fn test_check_is_not_terminal() {
        let status = status_of("4k3/8/8/8/8/8/8/4RK2 b - - 0 1");
        assert_eq!(status, BoardStatus::Check);
        assert!(!status.is_terminal());
    }

    #[test]
    fn test_stalemate() {
        // Black king on a8 boxed in by the queen on b6.
        let status = status_of("k7/8/1Q6/8/8/8/8/7K b - - 0 1");
        assert_eq!(status, BoardStatus::Stalemate);
        assert!(status.is_draw());
    }

    #[test]
    fn test_insufficient_material() {
        assert_eq!(status_of("4k3/8/8/8/8/8/8/4KB2 w - - 0 1"), BoardStatus::DrawByInsufficientMaterial);
    }

    #[test]
    fn test_fifty_move_rule() {
        assert_eq!(status_of("4k3/8/8/8/8/8/4P3/4K3 w - - 100 80"), BoardStatus::DrawByFiftyMoves);
    }

    #[test]
    fn test_threefold_repetition() {
        let mut state = BoardState::initial();
        let mut history = RepetitionTracker::starting_at(&state);

        for mv in ["Nf3", "Nf6", "Ng1", "Ng8", "Nf3", "Nf6", "Ng1", "Ng8"] {
            let (next, _) = apply_move(&state, mv).unwrap();
            history.record(&next);
            state = next;
        }

        assert_eq!(history.occurrences(&state), 3);
        assert_eq!(derive_status(&state, &history), BoardStatus::DrawByRepetition);
    }

    #[test]
    fn test_status_wire_names() {
        assert_eq!(serde_json::to_string(&BoardStatus::DrawByRepetition).unwrap(), "\"draw_by_repetition\"");
        assert_eq!(serde_json::to_string(&BoardStatus::Checkmate).unwrap(), "\"checkmate\"");
        let parsed: BoardStatus = serde_json::from_str("\"draw_by_insufficient_material\"").unwrap();
        assert_eq!(parsed, BoardStatus::DrawByInsufficientMaterial);
    }
}
