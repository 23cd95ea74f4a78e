//! PGN export for finished live games.

use crate::game_data::GameData;
use crate::position::{BoardState, Side};
use crate::status::BoardStatus;

/// Game result token for a final position.
pub fn result_token(status: BoardStatus, final_state: &BoardState) -> &'static str {
    match status {
        BoardStatus::Checkmate => match final_state.turn() {
            // The side to move is the side that got mated.
            Side::White => "0-1",
            Side::Black => "1-0",
        },
        s if s.is_draw() => "1/2-1/2",
        _ => "*",
    }
}

/// Render a game as PGN text. Games whose log contains unverified snapshots
/// are exported from their final position with a `FEN` header instead of
/// a move list.
pub fn write_pgn(game: &GameData, complete_move_list: bool) -> String {
    let meta = &game.metadata;
    let mut out = String::new();

    push_header(&mut out, "Event", meta.event.as_deref().unwrap_or("Live game"));
    push_header(&mut out, "Date", meta.date.as_deref().unwrap_or("????.??.??"));
    push_header(&mut out, "White", &meta.white);
    push_header(&mut out, "Black", &meta.black);
    push_header(&mut out, "Result", &meta.result);

    if !complete_move_list {
        push_header(&mut out, "SetUp", "1");
        push_header(&mut out, "FEN", &game.final_fen);
        out.push('\n');
        out.push_str(&meta.result);
        return out;
    }

    out.push('\n');
    for (i, san) in game.moves.iter().enumerate() {
        if i % 2 == 0 {
            out.push_str(&format!("{}. ", i / 2 + 1));
        }
        out.push_str(san);
        out.push(' ');
    }
    out.push_str(&meta.result);
    out
}

fn push_header(out: &mut String, key: &str, value: &str) {
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    out.push_str(&format!("[{key} \"{escaped}\"]\n"));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game_data::GameMetadata;
    use crate::position::parse;

    fn game(moves: &[&str], result: &str) -> GameData {
        GameData {
            metadata: GameMetadata {
                white: "Player1".into(),
                black: "Player2".into(),
                result: result.into(),
                date: Some("2025.01.15".into()),
                event: Some("Club night".into()),
            },
            moves: moves.iter().map(|s| s.to_string()).collect(),
            final_fen: crate::STARTING_FEN.into(),
        }
    }

    #[test]
    fn test_write_pgn_basic() {
        let pgn = write_pgn(&game(&["e4", "e5", "Nf3"], "*"), true);
        assert!(pgn.contains("[White \"Player1\"]"));
        assert!(pgn.contains("[Event \"Club night\"]"));
        assert!(pgn.ends_with("1. e4 e5 2. Nf3 *"));
    }

    #[test]
    fn test_write_pgn_from_snapshot() {
        let pgn = write_pgn(&game(&[], "*"), false);
        assert!(pgn.contains("[SetUp \"1\"]"));
        assert!(pgn.contains(&format!("[FEN \"{}\"]", crate::STARTING_FEN)));
    }

    #[test]
    fn test_result_token_for_mate() {
        let mated_white = parse("rnb1kbnr/pppp1ppp/8/4p3/6Pq/5P2/PPPPP2P/RNBQKBNR w KQkq - 1 3").unwrap();
        assert_eq!(result_token(BoardStatus::Checkmate, &mated_white), "0-1");
        assert_eq!(result_token(BoardStatus::Stalemate, &mated_white), "1/2-1/2");
        assert_eq!(result_token(BoardStatus::Check, &mated_white), "*");
    }
}
