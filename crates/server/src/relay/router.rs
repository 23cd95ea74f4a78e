//! Subscription bookkeeping and fan-out.
//!
//! Every connection owns an unbounded outbound queue. Events for a game are
//! enqueued while the publisher holds that game's session lock, so each queue
//! sees a game's events in the order they were accepted, and a snapshot
//! enqueued on subscribe always precedes the increments that follow it.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc;

use super::protocol::ServerMessage;
use super::session::{EndReason, GameId, GameSession, SessionSnapshot, SessionSummary};
use super::store::SessionStore;
use crate::error::RelayError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "c{}", self.0)
    }
}

pub type Outbox = mpsc::UnboundedSender<ServerMessage>;

#[derive(Default)]
struct Registry {
    outboxes: HashMap<ConnectionId, Outbox>,
    subscribers: HashMap<GameId, HashSet<ConnectionId>>,
    subscribed_to: HashMap<ConnectionId, GameId>,
    broadcasters: HashMap<GameId, ConnectionId>,
    lobby: HashSet<ConnectionId>,
}

impl Registry {
    fn send(&self, conn: ConnectionId, msg: ServerMessage) -> bool {
        match self.outboxes.get(&conn) {
            Some(outbox) => outbox.send(msg).is_ok(),
            None => false,
        }
    }
}

pub struct Router {
    store: Arc<SessionStore>,
    registry: Mutex<Registry>,
    broadcast_viewer_counts: bool,
}

impl Router {
    pub fn new(store: Arc<SessionStore>, broadcast_viewer_counts: bool) -> Self {
        Self {
            store,
            registry: Mutex::new(Registry::default()),
            broadcast_viewer_counts,
        }
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn register(&self, conn: ConnectionId, outbox: Outbox) {
        self.registry().outboxes.insert(conn, outbox);
    }

    /// Forget a connection entirely. Call `unsubscribe` first so the viewer
    /// count of its game is released.
    pub fn deregister(&self, conn: ConnectionId) {
        let mut registry = self.registry();
        registry.outboxes.remove(&conn);
        registry.lobby.remove(&conn);
        registry.broadcasters.retain(|_, c| *c != conn);
    }

    /// Deliver a message to a single connection.
    pub fn send_to(&self, conn: ConnectionId, msg: ServerMessage) -> bool {
        self.registry().send(conn, msg)
    }

    pub fn set_broadcaster(&self, game_id: &str, conn: ConnectionId) {
        self.registry().broadcasters.insert(game_id.to_string(), conn);
    }

    pub fn clear_broadcaster(&self, game_id: &str) {
        self.registry().broadcasters.remove(game_id);
    }

    /// Register interest in `new_game` and `game_ended` announcements.
    pub fn join_lobby(&self, conn: ConnectionId) {
        self.registry().lobby.insert(conn);
    }

    pub fn subscription(&self, conn: ConnectionId) -> Option<GameId> {
        self.registry().subscribed_to.get(&conn).cloned()
    }

    pub fn subscriber_count(&self, game_id: &str) -> usize {
        self.registry().subscribers.get(game_id).map_or(0, HashSet::len)
    }

    /// Subscribe `conn` to a game and enqueue a full `game_state` snapshot to
    /// it. Ended games answer with their snapshot without subscribing.
    /// Subscribing again to the same game only re-sends the snapshot.
    pub async fn subscribe(&self, conn: ConnectionId, game_id: &str) -> Result<SessionSnapshot, RelayError> {
        let handle = self.store.get(game_id)?;
        let mut session = handle.lock().await;

        if !session.is_active() {
            let snapshot = session.snapshot(true);
            self.send_to(conn, ServerMessage::GameState(snapshot.clone()));
            return Ok(snapshot);
        }

        let newly = {
            let mut registry = self.registry();
            let newly = registry
                .subscribers
                .entry(game_id.to_string())
                .or_default()
                .insert(conn);
            registry.subscribed_to.insert(conn, game_id.to_string());
            newly
        };
        if newly {
            session.adjust_viewers(1);
        }

        let snapshot = session.snapshot(true);
        self.send_to(conn, ServerMessage::GameState(snapshot.clone()));
        if newly {
            self.publish_viewer_count(&session);
        }
        Ok(snapshot)
    }

    /// Drop whatever subscription `conn` holds. Safe to call on a connection
    /// without one. Returns the game it was subscribed to.
    pub async fn unsubscribe(&self, conn: ConnectionId) -> Option<GameId> {
        let game_id = {
            let mut registry = self.registry();
            let game_id = registry.subscribed_to.remove(&conn)?;
            if let Some(set) = registry.subscribers.get_mut(&game_id) {
                set.remove(&conn);
                if set.is_empty() {
                    registry.subscribers.remove(&game_id);
                }
            }
            game_id
        };

        if let Ok(handle) = self.store.get(&game_id) {
            let mut session = handle.lock().await;
            if session.is_active() {
                session.adjust_viewers(-1);
                self.publish_viewer_count(&session);
            }
        }
        Some(game_id)
    }

    /// Deliver `msg` to every subscriber of the session. The caller holds the
    /// session lock, which is what orders concurrent publishes.
    pub fn publish_locked(&self, session: &GameSession, msg: ServerMessage) {
        let registry = self.registry();
        if let Some(subscribers) = registry.subscribers.get(session.id()) {
            for conn in subscribers {
                registry.send(*conn, msg.clone());
            }
        }
    }

    pub async fn publish(&self, game_id: &str, msg: ServerMessage) -> Result<(), RelayError> {
        let handle = self.store.get(game_id)?;
        let session = handle.lock().await;
        self.publish_locked(&session, msg);
        Ok(())
    }

    fn publish_viewer_count(&self, session: &GameSession) {
        if !self.broadcast_viewer_counts {
            return;
        }
        let msg = ServerMessage::ViewerCount {
            game_id: session.id().to_string(),
            viewer_count: session.viewer_count(),
        };
        let registry = self.registry();
        let subscribers = registry.subscribers.get(session.id()).into_iter().flatten();
        let broadcaster = registry.broadcasters.get(session.id());
        for conn in subscribers.chain(broadcaster) {
            registry.send(*conn, msg.clone());
        }
    }

    /// Tell subscribers, the broadcaster and lobby watchers that the game is
    /// over, then drop its subscriber set. Returns the spectators that were
    /// released.
    pub fn broadcast_game_ended(&self, session: &mut GameSession, reason: EndReason) -> Vec<ConnectionId> {
        let game_id = session.id().to_string();
        let msg = ServerMessage::GameEnded { game_id: game_id.clone(), reason };

        let mut registry = self.registry();
        let released: Vec<ConnectionId> = registry
            .subscribers
            .remove(&game_id)
            .map(|set| set.into_iter().collect())
            .unwrap_or_default();
        for conn in &released {
            registry.subscribed_to.remove(conn);
        }
        let broadcaster = registry.broadcasters.remove(&game_id);

        let mut recipients: HashSet<ConnectionId> = released.iter().copied().collect();
        recipients.extend(broadcaster);
        recipients.extend(registry.lobby.iter().copied());
        for conn in recipients {
            registry.send(conn, msg.clone());
        }
        drop(registry);

        session.clear_viewers();
        released
    }

    /// Announce a freshly started game to lobby watchers.
    pub fn announce_new_game(&self, game: SessionSummary) {
        let registry = self.registry();
        for conn in &registry.lobby {
            registry.send(*conn, ServerMessage::NewGame { game: game.clone() });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::archive::MemoryArchive;
    use crate::relay::session::Players;

    async fn setup() -> (Arc<SessionStore>, Router) {
        let store = Arc::new(SessionStore::new(Arc::new(MemoryArchive::new())));
        store.create(None, "Test".into(), Players::default()).unwrap();
        let router = Router::new(Arc::clone(&store), true);
        (store, router)
    }

    fn connect(router: &Router, id: u64) -> (ConnectionId, mpsc::UnboundedReceiver<ServerMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let conn = ConnectionId(id);
        router.register(conn, tx);
        (conn, rx)
    }

    #[tokio::test]
    async fn test_subscribe_sends_snapshot_then_viewer_count() {
        let (_store, router) = setup().await;
        let (conn, mut rx) = connect(&router, 1);

        let snapshot = router.subscribe(conn, "g1").await.unwrap();
        assert_eq!(snapshot.viewer_count, 1);

        assert!(matches!(rx.try_recv(), Ok(ServerMessage::GameState(s)) if s.viewer_count == 1));
        assert!(matches!(rx.try_recv(), Ok(ServerMessage::ViewerCount { viewer_count: 1, .. })));
    }

    #[tokio::test]
    async fn test_subscribe_unknown_game_creates_nothing() {
        let (store, router) = setup().await;
        let (conn, mut rx) = connect(&router, 1);

        assert!(matches!(router.subscribe(conn, "g9").await, Err(RelayError::NotFound(_))));
        assert!(store.get("g9").is_err());
        assert!(rx.try_recv().is_err());
        assert_eq!(router.subscription(conn), None);
    }

    #[tokio::test]
    async fn test_resubscribe_does_not_double_count() {
        let (store, router) = setup().await;
        let (conn, _rx) = connect(&router, 1);

        router.subscribe(conn, "g1").await.unwrap();
        router.subscribe(conn, "g1").await.unwrap();
        assert_eq!(store.get("g1").unwrap().lock().await.viewer_count(), 1);
    }

    #[tokio::test]
    async fn test_unsubscribe_is_idempotent() {
        let (store, router) = setup().await;
        let (conn, _rx) = connect(&router, 1);

        router.subscribe(conn, "g1").await.unwrap();
        assert_eq!(router.unsubscribe(conn).await, Some("g1".to_string()));
        assert_eq!(router.unsubscribe(conn).await, None);
        assert_eq!(store.get("g1").unwrap().lock().await.viewer_count(), 0);
        assert_eq!(router.subscriber_count("g1"), 0);
    }

    #[tokio::test]
    async fn test_publish_reaches_only_subscribers() {
        let (_store, router) = setup().await;
        let (watcher, mut watcher_rx) = connect(&router, 1);
        let (_idle, mut idle_rx) = connect(&router, 2);

        router.subscribe(watcher, "g1").await.unwrap();
        while watcher_rx.try_recv().is_ok() {}

        router.publish("g1", ServerMessage::error("ping")).await.unwrap();
        assert!(matches!(watcher_rx.try_recv(), Ok(ServerMessage::Error { .. })));
        assert!(idle_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_game_ended_releases_subscribers() {
        let (store, router) = setup().await;
        let (watcher, mut watcher_rx) = connect(&router, 1);
        let (lobby, mut lobby_rx) = connect(&router, 2);
        router.join_lobby(lobby);
        router.subscribe(watcher, "g1").await.unwrap();
        while watcher_rx.try_recv().is_ok() {}

        let handle = store.get("g1").unwrap();
        let mut session = handle.lock().await;
        store.end_locked(&mut session, EndReason::EndedByBroadcaster);
        let released = router.broadcast_game_ended(&mut session, EndReason::EndedByBroadcaster);

        assert_eq!(released, vec![watcher]);
        assert_eq!(session.viewer_count(), 0);
        assert!(matches!(watcher_rx.try_recv(), Ok(ServerMessage::GameEnded { .. })));
        assert!(matches!(lobby_rx.try_recv(), Ok(ServerMessage::GameEnded { .. })));
        assert_eq!(router.subscriber_count("g1"), 0);
        assert_eq!(router.subscription(watcher), None);
    }
}
