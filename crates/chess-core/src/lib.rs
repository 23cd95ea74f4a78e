//! Board-state codec for the live relay: position parsing with hardware
//! leniency, move application, move inference from placement snapshots, and
//! game-status derivation. Built on shakmaty.

pub mod error;
pub mod game_data;
pub mod moves;
pub mod pgn;
pub mod position;
pub mod status;

pub use error::{IllegalMoveError, ParseError};
pub use moves::{apply_move, infer_move, legal_moves, LegalMove, MoveFields};
pub use position::{
    normalize_placement, parse, parse_lenient, parse_lenient_with_turn, BoardState, Side, STARTING_FEN,
};
pub use status::{derive_status, BoardStatus, RepetitionTracker};
