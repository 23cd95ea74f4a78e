//! Connection lifecycle: roles, grace windows and reconnection.
//!
//! `ConnectionManager` is transport-neutral. A transport binding calls
//! `connect` when a peer arrives, feeds every inbound frame to `handle_text`
//! (or `handle`), drains the returned outbound queue, and calls `disconnect`
//! when the peer goes away.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::archive::GameArchive;
use super::pipeline::{Applied, Pipeline, PositionInput};
use super::protocol::{ClientMessage, ServerMessage};
use super::router::{ConnectionId, Router};
use super::session::{EndReason, GameId, GameSession, Players, SessionStatus};
use super::store::{SessionHandle, SessionStore};
use crate::config::{DuplicatePolicy, RelayConfig};
use crate::error::RelayError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Role {
    Unassigned,
    Broadcaster(GameId),
    Spectator(GameId),
}

#[derive(Debug)]
struct ConnectionContext {
    role: Role,
    connected_at: DateTime<Utc>,
}

/// Who is broadcasting a game.
#[derive(Debug)]
enum Ownership {
    Live(ConnectionId),
    /// The broadcaster dropped; the timer ends the game unless it returns.
    Grace { token: u64, timer: JoinHandle<()> },
}

/// A freshly accepted connection and the queue of messages to send it.
#[derive(Debug)]
pub struct Connection {
    pub id: ConnectionId,
    pub outbound: mpsc::UnboundedReceiver<ServerMessage>,
}

pub struct ConnectionManager {
    config: RelayConfig,
    store: Arc<SessionStore>,
    router: Arc<Router>,
    pipeline: Pipeline,
    next_connection: AtomicU64,
    next_grace_token: AtomicU64,
    contexts: Mutex<HashMap<ConnectionId, ConnectionContext>>,
    owners: Mutex<HashMap<GameId, Ownership>>,
}

impl ConnectionManager {
    pub fn new(config: RelayConfig, archive: Arc<dyn GameArchive>) -> Arc<Self> {
        let store = Arc::new(SessionStore::new(archive));
        let router = Arc::new(Router::new(Arc::clone(&store), config.broadcast_viewer_counts));
        let pipeline = Pipeline::new(Arc::clone(&store), Arc::clone(&router));
        Arc::new(Self {
            config,
            store,
            router,
            pipeline,
            next_connection: AtomicU64::new(1),
            next_grace_token: AtomicU64::new(1),
            contexts: Mutex::new(HashMap::new()),
            owners: Mutex::new(HashMap::new()),
        })
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    fn contexts(&self) -> MutexGuard<'_, HashMap<ConnectionId, ConnectionContext>> {
        self.contexts.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn owners(&self) -> MutexGuard<'_, HashMap<GameId, Ownership>> {
        self.owners.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn connect(&self) -> Connection {
        let id = ConnectionId(self.next_connection.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::unbounded_channel();
        self.router.register(id, tx);
        self.contexts().insert(
            id,
            ConnectionContext {
                role: Role::Unassigned,
                connected_at: Utc::now(),
            },
        );
        tracing::info!("Connection {id} opened");
        Connection { id, outbound: rx }
    }

    /// Current role of a connection, `None` once it has disconnected.
    pub fn role(&self, conn: ConnectionId) -> Option<Role> {
        self.contexts().get(&conn).map(|c| c.role.clone())
    }

    fn set_role(&self, conn: ConnectionId, role: Role) {
        if let Some(ctx) = self.contexts().get_mut(&conn) {
            ctx.role = role;
        }
    }

    /// Whether a game currently has a broadcaster inside its grace window.
    pub fn in_grace(&self, game_id: &str) -> bool {
        matches!(self.owners().get(game_id), Some(Ownership::Grace { .. }))
    }

    /// Parse one inbound text frame and handle it. Malformed frames are
    /// answered with an error; the connection stays open.
    pub async fn handle_text(self: &Arc<Self>, conn: ConnectionId, text: &str) {
        match serde_json::from_str::<ClientMessage>(text) {
            Ok(msg) => self.handle(conn, msg).await,
            Err(e) => {
                self.router
                    .send_to(conn, ServerMessage::error(format!("Invalid message: {e}")));
            }
        }
    }

    /// Handle one inbound message. Failures are reported to `conn` only.
    pub async fn handle(self: &Arc<Self>, conn: ConnectionId, msg: ClientMessage) {
        if let Err(e) = self.dispatch(conn, msg).await {
            tracing::warn!("Request from {conn} rejected: {e}");
            self.router.send_to(conn, ServerMessage::error(e.to_string()));
        }
    }

    async fn dispatch(self: &Arc<Self>, conn: ConnectionId, msg: ClientMessage) -> Result<(), RelayError> {
        let role = self.role(conn).ok_or(RelayError::Connection)?;

        match msg {
            ClientMessage::StartGame { game_id, title, players } => {
                self.start_game(conn, role, game_id, title, players).await
            }
            ClientMessage::Position { game_id, fen, mv } => {
                let bound = bound_broadcast(&role, game_id.as_deref())?;
                let input = match (mv, fen) {
                    (Some(mv), _) => PositionInput::Move(mv),
                    (None, Some(fen)) => PositionInput::Fen(fen),
                    (None, None) => {
                        return Err(RelayError::Invalid("Position requires a fen or a move".into()))
                    }
                };
                self.submit_position(&bound, input).await
            }
            ClientMessage::EndGame { game_id } => {
                let bound = bound_broadcast(&role, game_id.as_deref())?;
                self.end_session(&bound, EndReason::EndedByBroadcaster).await
            }
            ClientMessage::GetGameState { game_id } | ClientMessage::Subscribe { game_id } => {
                self.watch(conn, role, &game_id).await
            }
            ClientMessage::Unsubscribe => {
                if let Role::Spectator(_) = role {
                    self.router.unsubscribe(conn).await;
                    self.set_role(conn, Role::Unassigned);
                }
                Ok(())
            }
            ClientMessage::GetLiveGames => {
                self.router.join_lobby(conn);
                let games = self.store.list_active().await;
                self.router.send_to(conn, ServerMessage::LiveGamesList { games });
                Ok(())
            }
        }
    }

    async fn start_game(
        self: &Arc<Self>,
        conn: ConnectionId,
        role: Role,
        game_id: Option<GameId>,
        title: Option<String>,
        players: Option<Players>,
    ) -> Result<(), RelayError> {
        match self.settle(conn, role).await {
            Role::Broadcaster(current) => {
                return Err(RelayError::Role(format!("Already broadcasting game {current}")));
            }
            Role::Spectator(current) => {
                return Err(RelayError::Role(format!(
                    "Spectating game {current}; unsubscribe before starting a game"
                )));
            }
            Role::Unassigned => {}
        }

        if let Some(id) = game_id.as_deref() {
            if let Ok(handle) = self.store.get(id) {
                if self.try_resume(conn, &handle).await? {
                    return Ok(());
                }
            }
        }

        let title = title.unwrap_or_else(|| "Live game".to_string());
        let handle = self.store.create_with(game_id, title, players.unwrap_or_default(), |id| {
            self.claim(conn, id);
        })?;
        let session = handle.lock().await;
        self.router.send_to(
            conn,
            ServerMessage::GameStarted {
                game_id: session.id().to_string(),
                initial_position: session.board().fen(),
                resumed: false,
            },
        );
        self.router.announce_new_game(session.summary());
        tracing::info!("Connection {conn} started game {}", session.id());
        Ok(())
    }

    /// Take over broadcasting for an existing active session. Returns false
    /// when the session has ended.
    async fn try_resume(self: &Arc<Self>, conn: ConnectionId, handle: &SessionHandle) -> Result<bool, RelayError> {
        let session = handle.lock().await;
        if !session.is_active() {
            return Ok(false);
        }
        let game_id = session.id().to_string();

        let previous = {
            let mut owners = self.owners();
            match owners.remove(&game_id) {
                Some(Ownership::Live(other)) if self.config.duplicate_policy == DuplicatePolicy::Reject => {
                    owners.insert(game_id.clone(), Ownership::Live(other));
                    return Err(RelayError::DuplicateId(game_id));
                }
                Some(Ownership::Live(other)) => Some(other),
                Some(Ownership::Grace { timer, .. }) => {
                    timer.abort();
                    None
                }
                // Claimed at creation, so an active game always has an owner
                None => return Err(RelayError::DuplicateId(game_id)),
            }
        };

        if let Some(other) = previous {
            self.set_role(other, Role::Unassigned);
            self.router.send_to(
                other,
                ServerMessage::error(format!("Broadcasting of game {game_id} was taken over by another connection")),
            );
            tracing::info!("Connection {conn} took over game {game_id} from {other}");
        } else {
            tracing::info!("Connection {conn} resumed game {game_id}");
        }

        self.claim(conn, &game_id);
        self.router.send_to(
            conn,
            ServerMessage::GameStarted {
                game_id: game_id.clone(),
                initial_position: chess_core::STARTING_FEN.to_string(),
                resumed: true,
            },
        );
        self.router.send_to(conn, ServerMessage::GameState(session.snapshot(true)));
        Ok(true)
    }

    /// A broadcaster stays bound to its game after the game ends, so late
    /// events are ignored quietly. Starting or watching releases the binding.
    async fn settle(&self, conn: ConnectionId, role: Role) -> Role {
        if let Role::Broadcaster(game_id) = &role {
            let live = match self.store.get(game_id) {
                Ok(handle) => handle.lock().await.is_active(),
                Err(_) => false,
            };
            if !live {
                self.set_role(conn, Role::Unassigned);
                return Role::Unassigned;
            }
        }
        role
    }

    fn claim(&self, conn: ConnectionId, game_id: &str) {
        self.owners().insert(game_id.to_string(), Ownership::Live(conn));
        self.router.set_broadcaster(game_id, conn);
        self.set_role(conn, Role::Broadcaster(game_id.to_string()));
    }

    async fn submit_position(self: &Arc<Self>, game_id: &str, input: PositionInput) -> Result<(), RelayError> {
        let applied = self.pipeline.apply(game_id, input).await?;
        if let Applied::Accepted { board_status, .. } = applied {
            if board_status.is_terminal() && self.config.auto_end_finished_games {
                tracing::info!("Game {game_id} is over ({board_status:?})");
                self.end_session(game_id, EndReason::GameOver).await?;
            }
        }
        Ok(())
    }

    async fn watch(self: &Arc<Self>, conn: ConnectionId, role: Role, game_id: &str) -> Result<(), RelayError> {
        match self.settle(conn, role).await {
            Role::Broadcaster(own) if own == game_id => {
                let handle = self.store.get(game_id)?;
                let snapshot = handle.lock().await.snapshot(true);
                self.router.send_to(conn, ServerMessage::GameState(snapshot));
                return Ok(());
            }
            Role::Broadcaster(own) => {
                return Err(RelayError::Role(format!(
                    "Broadcasting game {own}; cannot spectate game {game_id}"
                )));
            }
            Role::Spectator(current) if current != game_id => {
                self.router.unsubscribe(conn).await;
                self.set_role(conn, Role::Unassigned);
            }
            Role::Spectator(_) | Role::Unassigned => {}
        }

        let snapshot = self.router.subscribe(conn, game_id).await?;
        if snapshot.status == SessionStatus::Active {
            self.set_role(conn, Role::Spectator(game_id.to_string()));
        }
        Ok(())
    }

    /// End a session and release everyone attached to it. Ending an ended
    /// session does nothing.
    pub async fn end_session(self: &Arc<Self>, game_id: &str, reason: EndReason) -> Result<(), RelayError> {
        let handle = self.store.get(game_id)?;
        let mut session = handle.lock().await;
        self.finish_locked(&mut session, reason);
        Ok(())
    }

    fn finish_locked(self: &Arc<Self>, session: &mut GameSession, reason: EndReason) {
        if !self.store.end_locked(session, reason) {
            return;
        }
        let game_id = session.id().to_string();

        for spectator in self.router.broadcast_game_ended(session, reason) {
            self.set_role(spectator, Role::Unassigned);
        }
        if let Some(Ownership::Grace { timer, .. }) = self.owners().remove(&game_id) {
            timer.abort();
        }
        self.router.clear_broadcaster(&game_id);

        tracing::info!("Game {game_id} ended ({reason:?}) after {} moves", session.move_count());
        self.schedule_purge();
    }

    fn schedule_purge(&self) {
        let store = Arc::clone(&self.store);
        let retention = self.config.retention;
        tokio::spawn(async move {
            tokio::time::sleep(retention).await;
            store.purge_ended(retention).await;
        });
    }

    /// Tear down a connection. A broadcaster's game is held open for the
    /// grace window; spectators are simply unsubscribed.
    pub async fn disconnect(self: &Arc<Self>, conn: ConnectionId) {
        let ctx = self.contexts().remove(&conn);
        self.router.unsubscribe(conn).await;
        self.router.deregister(conn);

        let Some(ctx) = ctx else {
            return;
        };
        let lifetime = Utc::now() - ctx.connected_at;
        tracing::info!("Connection {conn} closed after {}s", lifetime.num_seconds());

        if let Role::Broadcaster(game_id) = ctx.role {
            self.start_grace(conn, &game_id).await;
        }
    }

    async fn start_grace(self: &Arc<Self>, conn: ConnectionId, game_id: &str) {
        let Ok(handle) = self.store.get(game_id) else {
            return;
        };
        let session = handle.lock().await;
        if !session.is_active() {
            return;
        }

        let mut owners = self.owners();
        if !matches!(owners.get(game_id), Some(Ownership::Live(owner)) if *owner == conn) {
            return;
        }

        let token = self.next_grace_token.fetch_add(1, Ordering::Relaxed);
        let grace = self.config.grace_window;
        let manager = Arc::clone(self);
        let id = game_id.to_string();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            manager.expire_grace(&id, token).await;
        });
        owners.insert(game_id.to_string(), Ownership::Grace { token, timer });
        drop(owners);
        drop(session);

        tracing::info!("Broadcaster of game {game_id} disconnected; holding the game for {grace:?}");
    }

    async fn expire_grace(self: &Arc<Self>, game_id: &str, token: u64) {
        let Ok(handle) = self.store.get(game_id) else {
            return;
        };
        let mut session = handle.lock().await;

        let expired = {
            let mut owners = self.owners();
            match owners.get(game_id) {
                Some(Ownership::Grace { token: t, .. }) if *t == token => {
                    owners.remove(game_id);
                    true
                }
                _ => false,
            }
        };
        if expired {
            tracing::info!("Broadcaster of game {game_id} did not return; ending the game");
            self.finish_locked(&mut session, EndReason::Abandoned);
        }
    }
}

/// The game a broadcaster is bound to, checked against an optional explicit
/// game id in the message.
fn bound_broadcast(role: &Role, requested: Option<&str>) -> Result<GameId, RelayError> {
    let Role::Broadcaster(bound) = role else {
        return Err(RelayError::Role("Only the broadcaster of a game can do that".into()));
    };
    match requested {
        Some(id) if id != bound => Err(RelayError::Role(format!(
            "This connection broadcasts game {bound}, not {id}"
        ))),
        _ => Ok(bound.clone()),
    }
}
