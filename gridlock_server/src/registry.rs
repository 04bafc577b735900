// Connection registry: the single process-wide directory of who is online
// and which matches are active.
//
// `Registry` is a cloneable handle over lock-guarded interior state, passed
// into every connection thread — never a process-wide static, so tests can
// instantiate isolated registries per case. Every mutation and every read
// that needs a consistent snapshot (the directory broadcast) is serialized
// under the one registry lock. Per-match state lives behind each room's own
// mutex, so two unrelated matches never contend here beyond the map lookup.
//
// Outbound delivery is decoupled from the recipient's socket: an
// `OutboundHandle` is a bounded channel drained by that connection's writer
// thread. Sends use `try_send`, so a slow or stalled peer drops its own
// messages instead of stalling whoever is broadcasting, and a vanished peer
// (closed channel) is silently skipped. Delivery is best-effort: one bad
// recipient never aborts fan-out to the rest.

use std::collections::HashMap;
use std::sync::mpsc::{SyncSender, TrySendError};
use std::sync::{Arc, Mutex};

use gridlock_protocol::message::ServerMessage;
use gridlock_protocol::types::MatchId;
use thiserror::Error;
use tracing::{debug, info};

use crate::room::{GameMode, GameRoom};

/// Outbound queue depth per connection. When a peer falls this far behind,
/// further messages to it are dropped rather than queued.
pub const OUTBOUND_QUEUE_DEPTH: usize = 256;

/// Event consumed by a connection's writer thread.
pub enum Outbound {
    /// One encoded wire line to deliver.
    Line(String),
    /// Stop draining and release the socket.
    Shutdown,
}

/// Sending half of a connection's outbound queue. Cloned into the registry
/// and into any room the connection's user is playing in.
#[derive(Clone)]
pub struct OutboundHandle {
    tx: SyncSender<Outbound>,
}

impl OutboundHandle {
    pub fn new(tx: SyncSender<Outbound>) -> Self {
        Self { tx }
    }

    /// Queue a message for delivery. Never blocks: a full queue drops the
    /// message, a closed queue (peer already gone) is ignored.
    pub fn send(&self, msg: &ServerMessage) {
        match self.tx.try_send(Outbound::Line(msg.to_string())) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                debug!("outbound queue full, dropping message");
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    }

    /// Ask the writer thread to stop. Best-effort; the owning connection
    /// also shuts the socket down, which unblocks a mid-write drain.
    pub fn close(&self) {
        let _ = self.tx.try_send(Outbound::Shutdown);
    }
}

/// Login rejection: the only registry failure the protocol surfaces.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("username already taken")]
    NameTaken,
}

/// Where a logged-in user currently is, from the registry's point of view.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum UserState {
    Lobby,
    InMatch(MatchId),
}

struct UserSession {
    handle: OutboundHandle,
    state: UserState,
}

struct RegistryInner {
    users: HashMap<String, UserSession>,
    matches: HashMap<MatchId, Arc<Mutex<GameRoom>>>,
    next_match_id: u64,
}

/// Shared directory of `username → connection` and `match id → room`.
#[derive(Clone)]
pub struct Registry {
    inner: Arc<Mutex<RegistryInner>>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(RegistryInner {
                users: HashMap::new(),
                matches: HashMap::new(),
                next_match_id: 1,
            })),
        }
    }

    /// Atomic check-then-insert: claims `username` for `handle` or reports
    /// it taken. A name is free again the instant its owner unregisters.
    pub fn register(&self, username: &str, handle: OutboundHandle) -> Result<(), RegistryError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.users.contains_key(username) {
            return Err(RegistryError::NameTaken);
        }
        inner.users.insert(
            username.to_string(),
            UserSession {
                handle,
                state: UserState::Lobby,
            },
        );
        Ok(())
    }

    /// Idempotent removal.
    pub fn unregister(&self, username: &str) {
        self.inner.lock().unwrap().users.remove(username);
    }

    /// Connection handle for a user, if online.
    pub fn lookup(&self, username: &str) -> Option<OutboundHandle> {
        let inner = self.inner.lock().unwrap();
        inner.users.get(username).map(|s| s.handle.clone())
    }

    /// Directory snapshot. Unordered.
    pub fn usernames(&self) -> Vec<String> {
        self.inner.lock().unwrap().users.keys().cloned().collect()
    }

    pub fn user_count(&self) -> usize {
        self.inner.lock().unwrap().users.len()
    }

    /// Best-effort fan-out to every registered connection.
    pub fn broadcast(&self, msg: &ServerMessage) {
        let inner = self.inner.lock().unwrap();
        for session in inner.users.values() {
            session.handle.send(msg);
        }
    }

    /// Send the current directory to everyone. Snapshot and fan-out happen
    /// under one lock acquisition, so the list always reflects a registry
    /// state that actually existed.
    pub fn broadcast_user_list(&self) {
        let inner = self.inner.lock().unwrap();
        let msg = ServerMessage::UserList {
            users: inner.users.keys().cloned().collect(),
        };
        for session in inner.users.values() {
            session.handle.send(&msg);
        }
    }

    /// Create a match between two online users. The room is bound to both
    /// players' current handles; both users are marked in-match. Returns
    /// `None` if either participant is not (or no longer) online.
    pub fn create_match(
        &self,
        player_a: &str,
        player_b: &str,
        mode: GameMode,
    ) -> Option<(MatchId, Arc<Mutex<GameRoom>>)> {
        let mut inner = self.inner.lock().unwrap();
        let handle_a = inner.users.get(player_a)?.handle.clone();
        let handle_b = inner.users.get(player_b)?.handle.clone();

        let id = MatchId(inner.next_match_id);
        inner.next_match_id += 1;

        let room = Arc::new(Mutex::new(GameRoom::new(
            id, player_a, player_b, handle_a, handle_b, mode,
        )));
        inner.matches.insert(id, room.clone());
        inner.users.get_mut(player_a).unwrap().state = UserState::InMatch(id);
        inner.users.get_mut(player_b).unwrap().state = UserState::InMatch(id);

        info!(%id, player_a, player_b, ?mode, "match created");
        Some((id, room))
    }

    pub fn find_match(&self, id: MatchId) -> Option<Arc<Mutex<GameRoom>>> {
        self.inner.lock().unwrap().matches.get(&id).cloned()
    }

    /// The match a user is currently playing in, if any. Driven by the user
    /// session's state, so a concluded match is already "absent" here even
    /// while the finished room is still retained.
    pub fn find_match_by_participant(
        &self,
        username: &str,
    ) -> Option<(MatchId, Arc<Mutex<GameRoom>>)> {
        let inner = self.inner.lock().unwrap();
        match inner.users.get(username)?.state {
            UserState::InMatch(id) => inner.matches.get(&id).map(|room| (id, room.clone())),
            UserState::Lobby => None,
        }
    }

    /// Drop a match and return its participants to the lobby.
    pub fn remove_match(&self, id: MatchId) {
        let mut inner = self.inner.lock().unwrap();
        inner.matches.remove(&id);
        release_participants(&mut inner, id);
    }

    /// Return a finished match's participants to the lobby while keeping
    /// the room itself (finished matches are only removed by surrender).
    pub fn match_concluded(&self, id: MatchId) {
        let mut inner = self.inner.lock().unwrap();
        release_participants(&mut inner, id);
    }
}

fn release_participants(inner: &mut RegistryInner, id: MatchId) {
    for session in inner.users.values_mut() {
        if session.state == UserState::InMatch(id) {
            session.state = UserState::Lobby;
        }
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
