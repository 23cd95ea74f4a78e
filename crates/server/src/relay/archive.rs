//! Hand-off of finished games to long-term storage.

use std::sync::Mutex;

use super::session::FinishedGame;

/// Receives each finished game exactly once. Storage lives outside the
/// relay; implementations should return quickly and spawn any slow work.
pub trait GameArchive: Send + Sync {
    fn store(&self, game: FinishedGame);
}

/// Default archive: writes the finished game to the log as PGN.
#[derive(Debug, Default)]
pub struct TracingArchive;

impl GameArchive for TracingArchive {
    fn store(&self, game: FinishedGame) {
        tracing::info!(
            game_id = %game.game_id,
            moves = game.moves.len(),
            reason = ?game.end_reason,
            "Finished game\n{}",
            game.to_pgn()
        );
    }
}

/// Keeps finished games in memory.
#[derive(Debug, Default)]
pub struct MemoryArchive {
    games: Mutex<Vec<FinishedGame>>,
}

impl MemoryArchive {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn games(&self) -> Vec<FinishedGame> {
        self.games.lock().map(|g| g.clone()).unwrap_or_default()
    }
}

impl GameArchive for MemoryArchive {
    fn store(&self, game: FinishedGame) {
        if let Ok(mut games) = self.games.lock() {
            games.push(game);
        }
    }
}
