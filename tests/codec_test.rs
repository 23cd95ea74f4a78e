/// Board codec tests against the kind of input the physical board produces:
/// bare piece placements with no turn, castling or move counters.

use chess_core::{
    apply_move, derive_status, infer_move, legal_moves, parse, parse_lenient, BoardState, BoardStatus,
    ParseError, RepetitionTracker, Side, STARTING_FEN,
};

/// Placements a board would report while the given SAN moves are played.
fn hardware_feed(sans: &[&str]) -> Vec<String> {
    let mut state = BoardState::initial();
    sans.iter()
        .map(|san| {
            state = apply_move(&state, san).unwrap().0;
            state.placement()
        })
        .collect()
}

#[test]
fn test_hardware_feed_reconstructs_every_move() {
    let sans = [
        "e4", "e5", "Nf3", "Nc6", "Bc4", "Bc5", "O-O", "Nf6", "d4", "exd4", "e5", "d5", "exd6",
    ];
    let feed = hardware_feed(&sans);

    let mut state = BoardState::initial();
    let mut inferred = Vec::new();
    for placement in &feed {
        let (next, fields) = infer_move(&state, placement)
            .unwrap()
            .unwrap_or_else(|| panic!("no legal move reaches {placement}"));
        assert_eq!(next.placement(), *placement);
        inferred.push(fields.san);
        state = next;
    }

    assert_eq!(inferred, sans);
    assert_eq!(
        state.fen(),
        "r1bqk2r/ppp2ppp/2nP1n2/2b5/2Bp4/5N2/PPP2PPP/RNBQ1RK1 b kq - 0 7"
    );
}

#[test]
fn test_castling_is_recognised_from_king_and_rook_placement() {
    let feed = hardware_feed(&["e4", "e5", "Nf3", "Nc6", "Bc4", "Bc5", "O-O"]);
    let mut state = BoardState::initial();
    let mut last = None;
    for placement in &feed {
        let (next, fields) = infer_move(&state, placement).unwrap().unwrap();
        state = next;
        last = Some(fields);
    }

    let castle = last.unwrap();
    assert_eq!(castle.san, "O-O");
    assert_eq!(castle.uci, "e1g1");
    assert_eq!(castle.piece, "king");
    assert_eq!(castle.side, Side::White);
}

#[test]
fn test_unexplained_placement_is_not_inferred() {
    // Two white pawns moved at once
    let placement = "rnbqkbnr/pppppppp/8/8/3PP3/8/PPP2PPP/RNBQKBNR";
    assert_eq!(infer_move(&BoardState::initial(), placement).unwrap(), None);

    // The board is still accepted as a trusted snapshot
    let trusted = parse_lenient(placement).unwrap();
    assert_eq!(trusted.fen(), format!("{placement} w - - 0 1"));
}

#[test]
fn test_garbage_placement_is_rejected() {
    assert!(matches!(
        infer_move(&BoardState::initial(), "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP"),
        Err(ParseError::RankCount(7))
    ));
    assert!(matches!(parse_lenient("rnbqkbnx/8/8/8/8/8/8/4K3"), Err(ParseError::UnknownPiece('x'))));
    assert!(matches!(parse_lenient("   "), Err(ParseError::Empty)));
}

#[test]
fn test_strict_parse_requires_all_fields() {
    assert!(matches!(
        parse("rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR"),
        Err(ParseError::FieldCount { found: 1, .. })
    ));
    assert_eq!(parse(STARTING_FEN).unwrap(), BoardState::initial());
}

#[test]
fn test_placement_with_black_in_check_is_black_to_move() {
    let state = parse_lenient("4k3/8/8/8/8/8/8/4R1K1").unwrap();
    assert_eq!(state.turn(), Side::Black);
    assert_eq!(state.fen(), "4k3/8/8/8/8/8/8/4R1K1 b - - 0 1");
    assert_eq!(derive_status(&state, &RepetitionTracker::new()), BoardStatus::Check);
    assert!(legal_moves(&state).iter().all(|m| m.uci.starts_with("e8")));
}

#[test]
fn test_status_follows_the_final_position() {
    let mut state = BoardState::initial();
    let mut history = RepetitionTracker::starting_at(&state);
    for san in ["Nf3", "Nf6", "Ng1", "Ng8", "Nf3", "Nf6", "Ng1"] {
        state = apply_move(&state, san).unwrap().0;
        history.record(&state);
        assert_eq!(derive_status(&state, &history), BoardStatus::Normal);
    }
    state = apply_move(&state, "Ng8").unwrap().0;
    history.record(&state);
    assert_eq!(derive_status(&state, &history), BoardStatus::DrawByRepetition);
}
