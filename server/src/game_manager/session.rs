//! One session = one game between two players, with its engine process.

use crate::engine::EngineInstance;
use shared::{GameOverReason, PlayerIdentity, RatingDeltas, ServerMessage, Side};
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub type Tx = mpsc::UnboundedSender<ServerMessage>;

/// One of the two seats in a session. The connection reference is absent
/// while the player is disconnected; the grace timer runs only then.
pub struct PlayerSlot {
    pub identity: PlayerIdentity,
    pub side: Side,
    pub tx: Option<Tx>,
    pub grace_timer: Option<JoinHandle<()>>,
}

impl PlayerSlot {
    fn new(identity: PlayerIdentity, side: Side, tx: Tx) -> Self {
        Self {
            identity,
            side,
            tx: Some(tx),
            grace_timer: None,
        }
    }

    /// Idempotent; aborting an already-finished timer is a no-op.
    pub fn cancel_grace_timer(&mut self) {
        if let Some(timer) = self.grace_timer.take() {
            timer.abort();
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// Created, engine starting. No moves accepted yet.
    Spawning,
    /// Engine is up; the game is being played. An outstanding draw offer is
    /// tracked separately and returns here when declined or cancelled.
    Ongoing,
    /// Result settled, engine terminated. Kept for late reconnects until the
    /// retention window expires.
    Finished,
    /// Removed from the directory.
    Closed,
}

#[derive(Debug, Clone)]
pub struct GameResult {
    pub winner: Option<Side>,
    pub reason: GameOverReason,
    pub rating_deltas: Option<RatingDeltas>,
}

pub struct GameSession {
    pub id: String,
    pub white: PlayerSlot,
    pub black: PlayerSlot,
    /// Present from successful spawn until termination; taken exactly once.
    pub engine: Option<EngineInstance>,
    /// Opaque snapshot of the current position, as last reported by the
    /// engine.
    pub board: String,
    /// Cached legal moves for the side to move; used to reject bad moves
    /// without a process round trip.
    pub legal_moves: Vec<String>,
    pub side_to_move: Side,
    /// Append-only move history.
    pub moves: Vec<String>,
    pub status: SessionStatus,
    /// Side with an outstanding draw offer, if any.
    pub draw_offer: Option<Side>,
    pub created_at: Instant,
    pub last_activity: Instant,
    pub finished_at: Option<Instant>,
    pub result: Option<GameResult>,
}

impl GameSession {
    pub fn new(
        id: String,
        white: (PlayerIdentity, Tx),
        black: (PlayerIdentity, Tx),
    ) -> Self {
        let now = Instant::now();
        Self {
            id,
            white: PlayerSlot::new(white.0, Side::White, white.1),
            black: PlayerSlot::new(black.0, Side::Black, black.1),
            engine: None,
            board: String::new(),
            legal_moves: Vec::new(),
            side_to_move: Side::White,
            moves: Vec::new(),
            status: SessionStatus::Spawning,
            draw_offer: None,
            created_at: now,
            last_activity: now,
            finished_at: None,
            result: None,
        }
    }

    pub fn slot(&self, side: Side) -> &PlayerSlot {
        match side {
            Side::White => &self.white,
            Side::Black => &self.black,
        }
    }

    pub fn slot_mut(&mut self, side: Side) -> &mut PlayerSlot {
        match side {
            Side::White => &mut self.white,
            Side::Black => &mut self.black,
        }
    }

    pub fn side_of(&self, player_id: &str) -> Option<Side> {
        if self.white.identity.id == player_id {
            Some(Side::White)
        } else if self.black.identity.id == player_id {
            Some(Side::Black)
        } else {
            None
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.status, SessionStatus::Finished | SessionStatus::Closed)
    }

    /// Best-effort send to one seat; a missing connection is skipped. The
    /// reconnect replay covers anything lost here.
    pub fn send_to(&self, side: Side, msg: ServerMessage) {
        if let Some(tx) = &self.slot(side).tx {
            let _ = tx.send(msg);
        }
    }

    /// Best-effort broadcast to both seats, issued only after the
    /// authoritative state has been updated.
    pub fn broadcast(&self, msg: ServerMessage) {
        self.send_to(Side::White, msg.clone());
        self.send_to(Side::Black, msg);
    }

    /// Full current-state message for one seat: sent when the game starts
    /// and replayed on reconnect.
    pub fn snapshot_for(&self, side: Side) -> ServerMessage {
        ServerMessage::GameStart {
            session_id: self.id.clone(),
            side,
            opponent: self.slot(side.opposite()).identity.clone(),
            board: self.board.clone(),
            side_to_move: self.side_to_move,
            legal_moves: self.legal_moves.clone(),
            move_history: self.moves.clone(),
        }
    }

    pub fn game_over_message(&self) -> Option<ServerMessage> {
        self.result.as_ref().map(|result| ServerMessage::GameOver {
            winner: result.winner,
            reason: result.reason,
            rating_deltas: result.rating_deltas,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(id: &str) -> PlayerIdentity {
        PlayerIdentity {
            id: id.to_string(),
            display_name: id.to_string(),
            rating: 1200,
        }
    }

    fn session() -> (GameSession, mpsc::UnboundedReceiver<ServerMessage>) {
        let (wtx, wrx) = mpsc::unbounded_channel();
        let (btx, _brx) = mpsc::unbounded_channel();
        let mut game = GameSession::new(
            "s1".to_string(),
            (identity("alice"), wtx),
            (identity("bob"), btx),
        );
        game.black.tx = None; // bob is disconnected
        (game, wrx)
    }

    #[test]
    fn side_lookup_by_player_id() {
        let (game, _rx) = session();
        assert_eq!(game.side_of("alice"), Some(Side::White));
        assert_eq!(game.side_of("bob"), Some(Side::Black));
        assert_eq!(game.side_of("mallory"), None);
    }

    #[test]
    fn broadcast_skips_missing_connections() {
        let (game, mut wrx) = session();
        game.broadcast(ServerMessage::Pong);
        assert!(matches!(wrx.try_recv(), Ok(ServerMessage::Pong)));
    }

    #[test]
    fn snapshot_carries_current_state() {
        let (mut game, _rx) = session();
        game.board = "POS".to_string();
        game.legal_moves = vec!["e7-e5".to_string()];
        game.side_to_move = Side::Black;
        game.moves = vec!["e2-e4".to_string()];

        match game.snapshot_for(Side::Black) {
            ServerMessage::GameStart {
                side,
                opponent,
                board,
                side_to_move,
                legal_moves,
                move_history,
                ..
            } => {
                assert_eq!(side, Side::Black);
                assert_eq!(opponent.id, "alice");
                assert_eq!(board, "POS");
                assert_eq!(side_to_move, Side::Black);
                assert_eq!(legal_moves, vec!["e7-e5".to_string()]);
                assert_eq!(move_history, vec!["e2-e4".to_string()]);
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }
}
