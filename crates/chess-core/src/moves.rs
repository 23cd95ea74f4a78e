//! Move application and inference.

use serde::{Deserialize, Serialize};
use shakmaty::{san::San, uci::UciMove, CastlingMode, Chess, Move, Position, Role};

use crate::error::{IllegalMoveError, ParseError};
use crate::position::{normalize_placement, BoardState, Side};

/// Descriptive fields of a played move.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveFields {
    /// SAN with check (`+`) or mate (`#`) suffix.
    pub san: String,
    pub uci: String,
    pub from_square: String,
    pub to_square: String,
    pub piece: String,
    pub side: Side,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegalMove {
    pub uci: String,
    pub san: String,
}

/// Play `text` (SAN or UCI) from `state`.
pub fn apply_move(state: &BoardState, text: &str) -> Result<(BoardState, MoveFields), IllegalMoveError> {
    let mv = resolve(state, text.trim())?;
    Ok(play(state, mv))
}

/// Find the legal move from `before` that produces the piece placement
/// `placement`. Returns `Ok(None)` when no legal move explains it.
pub fn infer_move(
    before: &BoardState,
    placement: &str,
) -> Result<Option<(BoardState, MoveFields)>, ParseError> {
    let target = normalize_placement(placement)?;

    for mv in before.position().legal_moves() {
        let mut next = before.position().clone();
        next.play_unchecked(mv.clone());
        if BoardState::from_chess(next).placement() == target {
            return Ok(Some(play(before, mv)));
        }
    }
    Ok(None)
}

/// All legal moves for the side to move.
pub fn legal_moves(state: &BoardState) -> Vec<LegalMove> {
    let pos = state.position();
    pos.legal_moves()
        .into_iter()
        .map(|mv| LegalMove {
            uci: mv.to_uci(CastlingMode::Standard).to_string(),
            san: San::from_move(pos, mv.clone()).to_string(),
        })
        .collect()
}

fn resolve(state: &BoardState, text: &str) -> Result<Move, IllegalMoveError> {
    let pos = state.position();
    let not_legal = || IllegalMoveError::NotLegal {
        mv: text.to_string(),
        fen: state.fen(),
    };

    if let Ok(uci) = text.parse::<UciMove>() {
        return uci.to_move(pos).map_err(|_| not_legal());
    }

    // Boards and people both write castling with zeros.
    let normalized = text.replace("0-0", "O-O");
    let san_text = normalized.trim_end_matches(['+', '#', '!', '?']);
    let san: San = san_text
        .parse()
        .map_err(|_| IllegalMoveError::Unreadable(text.to_string()))?;
    san.to_move(pos).map_err(|_| not_legal())
}

fn play(state: &BoardState, mv: Move) -> (BoardState, MoveFields) {
    let pos: &Chess = state.position();
    let side = Side::from(pos.turn());
    let uci = mv.to_uci(CastlingMode::Standard);
    let (from_square, to_square) = match &uci {
        UciMove::Normal { from, to, .. } => (from.to_string(), to.to_string()),
        UciMove::Put { to, .. } => (String::new(), to.to_string()),
        UciMove::Null => (String::new(), String::new()),
    };
    let mut san = San::from_move(pos, mv.clone()).to_string();
    let piece = role_name(mv.role()).to_string();

    let mut next = pos.clone();
    next.play_unchecked(mv);
    if next.is_checkmate() {
        san.push('#');
    } else if next.is_check() {
        san.push('+');
    }

    let fields = MoveFields {
        san,
        uci: uci.to_string(),
        from_square,
        to_square,
        piece,
        side,
    };
    (BoardState::from_chess(next), fields)
}

fn role_name(role: Role) -> &'static str {
    match role {
        Role::Pawn => "pawn",
        Role::Knight => "knight",
        Role::Bishop => "bishop",
        Role::Rook => "rook",
        Role::Queen => "queen",
        Role::King => "king",
    }
}
