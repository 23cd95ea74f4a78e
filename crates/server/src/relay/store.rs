//! In-memory registry of live sessions.
//!
//! The id -> session map sits behind a short-lived `RwLock` that is only
//! written for inserts and removals. Each session has its own async mutex, so
//! work on one game never waits on another.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use chess_core::{BoardState, BoardStatus};
use tokio::sync::{Mutex, MutexGuard};

use super::archive::GameArchive;
use super::session::{EndReason, GameId, GameSession, MoveRecord, Players, SessionSummary};
use crate::error::RelayError;

/// Shared handle to one session. Lock it to read or mutate the session.
#[derive(Debug)]
pub struct SessionHandle {
    id: GameId,
    session: Mutex<GameSession>,
}

impl SessionHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub async fn lock(&self) -> MutexGuard<'_, GameSession> {
        self.session.lock().await
    }
}

/// Sessions by id, plus every id ever handed out. Ids stay reserved after
/// their session is purged.
#[derive(Default)]
struct Sessions {
    live: HashMap<GameId, Arc<SessionHandle>>,
    issued: HashSet<GameId>,
}

pub struct SessionStore {
    sessions: RwLock<Sessions>,
    next_id: AtomicU64,
    archive: Arc<dyn GameArchive>,
}

impl SessionStore {
    pub fn new(archive: Arc<dyn GameArchive>) -> Self {
        Self {
            sessions: RwLock::new(Sessions::default()),
            next_id: AtomicU64::new(1),
            archive,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Sessions> {
        self.sessions.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Sessions> {
        self.sessions.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Create a session under a fresh id. Ids are unique for the lifetime of
    /// the store: a supplied id that was ever issued, ended or purged
    /// included, is a DuplicateId.
    pub fn create(
        &self,
        id: Option<GameId>,
        title: String,
        players: Players,
    ) -> Result<Arc<SessionHandle>, RelayError> {
        self.create_with(id, title, players, |_| {})
    }

    /// `create`, running `on_create` with the new id before the session can
    /// be looked up by anyone else.
    pub fn create_with(
        &self,
        id: Option<GameId>,
        title: String,
        players: Players,
        on_create: impl FnOnce(&str),
    ) -> Result<Arc<SessionHandle>, RelayError> {
        let mut sessions = self.write();
        let id = match id {
            Some(id) if !id.trim().is_empty() => {
                if sessions.issued.contains(&id) {
                    return Err(RelayError::DuplicateId(id));
                }
                id
            }
            _ => loop {
                let id = format!("g{}", self.next_id.fetch_add(1, Ordering::Relaxed));
                if !sessions.issued.contains(&id) {
                    break id;
                }
            },
        };

        let handle = Arc::new(SessionHandle {
            id: id.clone(),
            session: Mutex::new(GameSession::new(id.clone(), title, players)),
        });
        on_create(&id);
        sessions.issued.insert(id.clone());
        sessions.live.insert(id, Arc::clone(&handle));
        Ok(handle)
    }

    pub fn get(&self, id: &str) -> Result<Arc<SessionHandle>, RelayError> {
        self.read()
            .live
            .get(id)
            .cloned()
            .ok_or_else(|| RelayError::NotFound(id.to_string()))
    }

    /// Active sessions, most recently updated first.
    pub async fn list_active(&self) -> Vec<SessionSummary> {
        let handles: Vec<Arc<SessionHandle>> = self.read().live.values().cloned().collect();

        let mut games = Vec::with_capacity(handles.len());
        for handle in handles {
            let session = handle.lock().await;
            if session.is_active() {
                games.push(session.summary());
            }
        }
        games.sort_by(|a, b| b.last_update.cmp(&a.last_update).then_with(|| a.id.cmp(&b.id)));
        games
    }

    /// Append a record to an active session.
    pub async fn append(
        &self,
        id: &str,
        next: BoardState,
        record: MoveRecord,
    ) -> Result<BoardStatus, RelayError> {
        let handle = self.get(id)?;
        let mut session = handle.lock().await;
        if !session.is_active() {
            return Err(RelayError::Invalid(format!("Game {id} has ended")));
        }
        Ok(session.append(next, record))
    }

    /// End a session. Ending an ended session is a no-op; returns whether
    /// this call did the transition.
    pub async fn end(&self, id: &str, reason: EndReason) -> Result<bool, RelayError> {
        let handle = self.get(id)?;
        let mut session = handle.lock().await;
        Ok(self.end_locked(&mut session, reason))
    }

    /// `end` for callers that already hold the session lock.
    pub fn end_locked(&self, session: &mut GameSession, reason: EndReason) -> bool {
        if !session.end(reason) {
            return false;
        }
        self.archive.store(session.finished_game());
        true
    }

    pub async fn set_viewer_count(&self, id: &str, delta: i64) -> Result<u32, RelayError> {
        let handle = self.get(id)?;
        let mut session = handle.lock().await;
        Ok(session.adjust_viewers(delta))
    }

    /// Drop sessions that ended at least `retention` ago.
    pub async fn purge_ended(&self, retention: Duration) -> usize {
        let handles: Vec<Arc<SessionHandle>> = self.read().live.values().cloned().collect();

        let mut expired = Vec::new();
        for handle in handles {
            if handle.lock().await.expired(retention) {
                expired.push(handle);
            }
        }

        let mut sessions = self.write();
        let mut removed = 0;
        for handle in expired {
            if sessions.live.remove(handle.id()).is_some() {
                removed += 1;
            }
        }
        if removed > 0 {
            tracing::debug!("Purged {removed} ended sessions");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.read().live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().live.is_empty()
    }
}
