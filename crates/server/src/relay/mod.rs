//! Live-game relay: takes position events from a board broadcaster, keeps
//! the authoritative state of each game, and fans updates out to spectators.

pub mod archive;
pub mod connection;
pub mod pipeline;
pub mod protocol;
pub mod router;
pub mod session;
pub mod store;

pub use archive::{GameArchive, MemoryArchive, TracingArchive};
pub use connection::{Connection, ConnectionManager, Role};
pub use pipeline::{Applied, IgnoreReason, Pipeline, PositionInput};
pub use protocol::{ClientMessage, PositionUpdate, ServerMessage};
pub use router::{ConnectionId, Router};
pub use session::{
    EndReason, FinishedGame, GameId, GameSession, MoveRecord, Players, SessionSnapshot, SessionStatus,
    SessionSummary,
};
pub use store::{SessionHandle, SessionStore};
