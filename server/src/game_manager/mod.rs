//! Shared server state: connected players, the session directory, and the
//! matchmaking queue.
//!
//! Locking rules: the directory and queue are global structures with
//! short-lived exclusion, held only for an insert/remove/pair; callers
//! clone the session handle out and release the map before locking the
//! session itself. All mutations of one session go through its own
//! `Mutex`, which is the unit of serialization and may be held across an
//! engine round trip — that suspends only the one session.

use crate::auth::Authenticator;
use crate::config::ServerConfig;
use crate::rating::RatingService;
use dashmap::DashMap;
use shared::{PlayerIdentity, ServerMessage, Side};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;

pub mod lifecycle;
pub mod matchmaking;
pub mod move_handler;
pub mod session;

pub use matchmaking::QueueEntry;
pub use session::{GameSession, PlayerSlot, SessionStatus, Tx};

pub type SharedSession = Arc<Mutex<GameSession>>;

/// A live websocket connection and the identity behind it.
pub struct ConnectedPlayer {
    pub identity: PlayerIdentity,
    pub tx: Tx,
    pub last_msg_at: Instant,
}

/// Registry mapping session id -> session and player id -> session id.
/// Entries are created at pairing and removed once a finished session's
/// retention window expires.
#[derive(Default)]
pub struct SessionDirectory {
    sessions: DashMap<String, SharedSession>,
    player_to_session: DashMap<String, String>,
}

impl SessionDirectory {
    pub fn insert(&self, session_id: String, session: SharedSession, players: [&str; 2]) {
        for player_id in players {
            self.player_to_session
                .insert(player_id.to_string(), session_id.clone());
        }
        self.sessions.insert(session_id, session);
    }

    pub fn by_id(&self, session_id: &str) -> Option<SharedSession> {
        self.sessions.get(session_id).map(|s| Arc::clone(&s))
    }

    pub fn session_of(&self, player_id: &str) -> Option<SharedSession> {
        let session_id = self.player_to_session.get(player_id)?.value().clone();
        self.by_id(&session_id)
    }

    /// Remove the session and any player mappings still pointing at it.
    /// A player who has since been paired into a newer session keeps the
    /// newer mapping.
    pub fn remove(&self, session_id: &str, players: [&str; 2]) {
        for player_id in players {
            self.player_to_session
                .remove_if(player_id, |_, mapped| mapped.as_str() == session_id);
        }
        self.sessions.remove(session_id);
    }

    pub fn session_ids(&self) -> Vec<String> {
        self.sessions.iter().map(|e| e.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

pub struct AppState {
    pub config: ServerConfig,
    pub players: DashMap<String, ConnectedPlayer>,
    pub directory: SessionDirectory,
    pub queue: Mutex<VecDeque<QueueEntry>>,
    /// Side each player held in their most recent game; feeds the
    /// side-assignment heuristic at pairing.
    pub last_sides: DashMap<String, Side>,
    pub auth: Arc<dyn Authenticator>,
    pub rating: Arc<dyn RatingService>,
}

impl AppState {
    pub fn new(
        config: ServerConfig,
        auth: Arc<dyn Authenticator>,
        rating: Arc<dyn RatingService>,
    ) -> Self {
        Self {
            config,
            players: DashMap::new(),
            directory: SessionDirectory::default(),
            queue: Mutex::new(VecDeque::new()),
            last_sides: DashMap::new(),
            auth,
            rating,
        }
    }

    /// Per-connection message pacing. Returns false when the sender is over
    /// the limit and the message should be dropped.
    pub fn check_rate_limit(&self, player_id: &str) -> bool {
        if let Some(mut player) = self.players.get_mut(player_id) {
            let now = Instant::now();
            if now.duration_since(player.last_msg_at) < self.config.min_message_interval {
                return false;
            }
            player.last_msg_at = now;
            true
        } else {
            false
        }
    }

    /// Best-effort send to a connected player outside any session context.
    pub fn send_to_player(&self, player_id: &str, msg: ServerMessage) {
        if let Some(player) = self.players.get(player_id) {
            let _ = player.tx.send(msg);
        }
    }
}
