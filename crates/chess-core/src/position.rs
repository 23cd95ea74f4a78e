//! Position encodings: strict six-field parsing, hardware-lenient completion,
//! and rendering back to text.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use shakmaty::{fen::Fen, CastlingMode, Chess, Color, EnPassantMode, Position};

use crate::error::ParseError;

pub const STARTING_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

/// Defaults used to complete an encoding that carries fewer than six fields.
/// The fullmove number is 1-based in the encoding, so it completes to 1.
const DEFAULT_FIELDS: [&str; 6] = ["", "w", "-", "-", "0", "1"];

static PLACEMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[1-8pnbrqkPNBRQK/]+$").expect("valid placement regex"));

/// The color that moved or is to move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    White,
    Black,
}

impl Side {
    pub fn as_str(self) -> &'static str {
        match self {
            Side::White => "white",
            Side::Black => "black",
        }
    }

    pub fn opponent(self) -> Side {
        match self {
            Side::White => Side::Black,
            Side::Black => Side::White,
        }
    }
}

impl From<Color> for Side {
    fn from(color: Color) -> Self {
        match color {
            Color::White => Side::White,
            Color::Black => Side::Black,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fully validated board position.
#[derive(Debug, Clone, Default)]
pub struct BoardState {
    pos: Chess,
}

impl BoardState {
    pub fn initial() -> Self {
        Self::default()
    }

    pub(crate) fn from_chess(pos: Chess) -> Self {
        Self { pos }
    }

    pub fn position(&self) -> &Chess {
        &self.pos
    }

    /// Full six-field encoding. The en-passant square is only written when a
    /// legal en-passant capture exists.
    pub fn fen(&self) -> String {
        Fen::from_position(&self.pos, EnPassantMode::Legal).to_string()
    }

    /// Piece placement field only.
    pub fn placement(&self) -> String {
        let fen = self.fen();
        fen.split(' ').next().unwrap_or_default().to_string()
    }

    pub fn turn(&self) -> Side {
        self.pos.turn().into()
    }

    pub fn halfmoves(&self) -> u32 {
        self.pos.halfmoves()
    }

    pub fn fullmoves(&self) -> u32 {
        self.pos.fullmoves().get()
    }

    /// Placement, turn, castling and en passant: the fields that decide
    /// whether two positions repeat.
    pub fn repetition_key(&self) -> String {
        let fen = self.fen();
        fen.split(' ').take(4).collect::<Vec<_>>().join(" ")
    }

    pub fn same_placement(&self, other: &BoardState) -> bool {
        self.pos.board() == other.pos.board()
    }
}

impl PartialEq for BoardState {
    fn eq(&self, other: &Self) -> bool {
        self.fen() == other.fen()
    }
}

impl Eq for BoardState {}

impl fmt::Display for BoardState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.fen())
    }
}

/// Parse a complete six-field position encoding.
pub fn parse(encoding: &str) -> Result<BoardState, ParseError> {
    let fields: Vec<&str> = encoding.split_whitespace().collect();
    if fields.is_empty() {
        return Err(ParseError::Empty);
    }
    if fields.len() != 6 {
        return Err(ParseError::FieldCount { expected: "6", found: fields.len() });
    }
    build(&fields)
}

/// Parse a position encoding, completing missing trailing fields with safe
/// defaults (white to move, no castling, no en passant, fresh counters).
///
/// Board hardware frequently reports the piece placement alone. When only the
/// placement is given and white-to-move is not a legal setup (black is in
/// check), black-to-move is tried before giving up.
pub fn parse_lenient(encoding: &str) -> Result<BoardState, ParseError> {
    parse_lenient_with_turn(encoding, Side::White)
}

/// `parse_lenient` where a placement-only encoding is completed with
/// `to_move` to move, falling back to the other side when that is not a
/// legal setup. Encodings that carry a turn field keep it.
pub fn parse_lenient_with_turn(encoding: &str, to_move: Side) -> Result<BoardState, ParseError> {
    let fields: Vec<&str> = encoding.split_whitespace().collect();
    if fields.is_empty() {
        return Err(ParseError::Empty);
    }
    if fields.len() > 6 {
        return Err(ParseError::FieldCount { expected: "1 to 6", found: fields.len() });
    }

    let mut completed = fields.clone();
    completed.extend(DEFAULT_FIELDS.iter().skip(fields.len()).copied());
    if fields.len() == 1 {
        completed[1] = turn_field(to_move);
    }

    match build(&completed) {
        Err(ParseError::IllegalSetup { .. }) if fields.len() == 1 => {
            completed[1] = turn_field(to_move.opponent());
            build(&completed)
        }
        other => other,
    }
}

fn turn_field(side: Side) -> &'static str {
    match side {
        Side::White => "w",
        Side::Black => "b",
    }
}

/// Validate a piece-placement field and return it in canonical form
/// (consecutive empty squares merged into a single digit).
pub fn normalize_placement(placement: &str) -> Result<String, ParseError> {
    check_placement(placement)?;

    let mut out = String::with_capacity(placement.len());
    for (i, rank) in placement.split('/').enumerate() {
        if i > 0 {
            out.push('/');
        }
        let mut empty = 0u32;
        for c in rank.chars() {
            if let Some(d) = c.to_digit(10) {
                empty += d;
            } else {
                if empty > 0 {
                    out.push_str(&empty.to_string());
                    empty = 0;
                }
                out.push(c);
            }
        }
        if empty > 0 {
            out.push_str(&empty.to_string());
        }
    }
    Ok(out)
}

fn check_placement(placement: &str) -> Result<(), ParseError> {
    if !PLACEMENT_RE.is_match(placement) {
        if let Some(bad) = placement
            .chars()
            .find(|c| !matches!(c, '1'..='8' | '/' | 'p' | 'n' | 'b' | 'r' | 'q' | 'k' | 'P' | 'N' | 'B' | 'R' | 'Q' | 'K'))
        {
            return Err(ParseError::UnknownPiece(bad));
        }
    }
    let ranks = placement.split('/').count();
    if ranks != 8 {
        return Err(ParseError::RankCount(ranks));
    }
    Ok(())
}

fn build(fields: &[&str]) -> Result<BoardState, ParseError> {
    check_placement(fields[0])?;

    let text = fields.join(" ");
    let fen: Fen = text.parse().map_err(|e: shakmaty::fen::ParseFenError| ParseError::InvalidFen {
        fen: text.clone(),
        reason: e.to_string(),
    })?;
    let pos: Chess = fen
        .into_position(CastlingMode::Standard)
        .map_err(|e| ParseError::IllegalSetup {
            fen: text.clone(),
            reason: e.to_string(),
        })?;

    Ok(BoardState::from_chess(pos))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_starting_position() {
        let state = parse(STARTING_FEN).unwrap();
        assert_eq!(state.fen(), STARTING_FEN);
        assert_eq!(state.turn(), Side::White);
        assert_eq!(state, BoardState::initial());
    }

    #[test]
    fn test_parse_rejects_missing_fields() {
        let err = parse("rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq -").unwrap_err();
        assert_eq!(err, ParseError::FieldCount { expected: "6", found: 4 });
    }

    #[test]
    fn test_parse_rejects_unknown_piece() {
        let err = parse("rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNX w KQkq - 0 1").unwrap_err();
        assert_eq!(err, ParseError::UnknownPiece('X'));
    }

    #[test]
    fn test_parse_rejects_wrong_rank_count() {
        let err = parse("rnbqkbnr/pppppppp/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1").unwrap_err();
        assert_eq!(err, ParseError::RankCount(7));
    }

    #[test]
    fn test_parse_rejects_position_without_kings() {
        let err = parse("8/8/8/8/8/8/8/8 w - - 0 1").unwrap_err();
        assert!(matches!(err, ParseError::IllegalSetup { .. }));
    }

    #[test]
    fn test_lenient_completes_placement_only() {
        let state = parse_lenient("rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR").unwrap();
        assert_eq!(state.fen(), "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR w - - 0 1");
    }

    #[test]
    fn test_lenient_keeps_given_fields() {
        let state = parse_lenient("rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq").unwrap();
        assert_eq!(state.turn(), Side::Black);
        assert_eq!(state.fen(), "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1");
    }

    #[test]
    fn test_lenient_flips_turn_when_black_in_check() {
        // Black king on e8 attacked by the rook on e1.
        let state = parse_lenient("4k3/8/8/8/8/8/8/4RK2").unwrap();
        assert_eq!(state.turn(), Side::Black);
    }

    #[test]
    fn test_lenient_with_turn_completes_for_given_side() {
        let state = parse_lenient_with_turn("rnbqkbnr/pppppppp/8/8/3PP3/8/PPP2PPP/RNBQKBNR", Side::Black).unwrap();
        assert_eq!(state.turn(), Side::Black);
        assert_eq!(state.fen(), "rnbqkbnr/pppppppp/8/8/3PP3/8/PPP2PPP/RNBQKBNR b - - 0 1");

        // White in check cannot be black to move
        let state = parse_lenient_with_turn("4k3/8/8/8/8/8/8/4r1K1", Side::Black).unwrap();
        assert_eq!(state.turn(), Side::White);

        // An explicit turn field wins
        let state = parse_lenient_with_turn("4k3/8/8/8/8/8/8/6K1 w", Side::Black).unwrap();
        assert_eq!(state.turn(), Side::White);
    }

    #[test]
    fn test_lenient_rejects_too_many_fields() {
        let err = parse_lenient(&format!("{STARTING_FEN} extra")).unwrap_err();
        assert_eq!(err, ParseError::FieldCount { expected: "1 to 6", found: 7 });
    }

    #[test]
    fn test_normalize_placement_merges_empty_squares() {
        let normalized = normalize_placement("rnbqkbnr/pppppppp/44/8/8/8/PPPPPPPP/RNBQKBNR").unwrap();
        assert_eq!(normalized, "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR");
    }

    #[test]
    fn test_repetition_key_ignores_counters() {
        let a = parse("4k3/8/8/8/8/8/8/4K3 w - - 0 1").unwrap();
        let b = parse("4k3/8/8/8/8/8/8/4K3 w - - 12 30").unwrap();
        assert_eq!(a.repetition_key(), b.repetition_key());
        assert_ne!(a, b);
    }
}
