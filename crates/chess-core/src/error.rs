use thiserror::Error;

/// A position encoding that could not be turned into a board.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("Position encoding is empty")]
    Empty,

    #[error("Expected {expected} fields in position encoding, found {found}")]
    FieldCount { expected: &'static str, found: usize },

    #[error("Unrecognized piece letter '{0}' in piece placement")]
    UnknownPiece(char),

    #[error("Piece placement must have 8 ranks, found {0}")]
    RankCount(usize),

    #[error("Invalid position encoding '{fen}': {reason}")]
    InvalidFen { fen: String, reason: String },

    #[error("Position '{fen}' is not a legal setup: {reason}")]
    IllegalSetup { fen: String, reason: String },
}

/// A move that does not correspond to any legal move for the side to move.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IllegalMoveError {
    #[error("Could not read move '{0}' (expected SAN or UCI)")]
    Unreadable(String),

    #[error("Illegal move '{mv}' in position {fen}")]
    NotLegal { mv: String, fen: String },
}
