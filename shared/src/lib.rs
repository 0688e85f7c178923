//! Wire message types exchanged between the game server and its clients.
//!
//! Everything here serializes as `{"type": "<kind>", ...}` JSON objects over
//! the websocket connection. Board positions and moves are opaque strings
//! produced by the engine process; neither side of this contract interprets
//! them beyond equality checks.

use serde::{Deserialize, Serialize};

/// Board side a player was assigned at pairing time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    White,
    Black,
}

impl Side {
    pub fn opposite(self) -> Self {
        match self {
            Side::White => Side::Black,
            Side::Black => Side::White,
        }
    }
}

/// Immutable snapshot of a player taken from the account store at
/// connection time. Ratings shown here are the values at pairing, not live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerIdentity {
    pub id: String,
    pub display_name: String,
    pub rating: i32,
}

/// Why a game ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameOverReason {
    Checkmate,
    Stalemate,
    Resignation,
    DrawAgreed,
    Abandonment,
    Aborted,
}

/// Signed rating changes applied when a game settles. Absent for aborted
/// games.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatingDeltas {
    pub white: i32,
    pub black: i32,
}

/// Messages a client may send to the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Must be the first message on a fresh connection.
    Handshake {
        token: String,
        #[serde(default)]
        display_name: Option<String>,
    },
    FindGame,
    CancelSearch,
    Move {
        #[serde(rename = "move")]
        mv: String,
    },
    Resign,
    OfferDraw,
    AcceptDraw,
    DeclineDraw,
    CancelDrawOffer,
    Ping,
}

/// Messages the server may send to a client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    HandshakeAck {
        player: PlayerIdentity,
    },
    /// Enqueued; waiting for an opponent.
    Searching,
    SearchCancelled,
    MatchFound {
        session_id: String,
        opponent: PlayerIdentity,
        side: Side,
    },
    /// Initial state once the engine is up, and the replay sent to a
    /// reconnecting player.
    GameStart {
        session_id: String,
        side: Side,
        opponent: PlayerIdentity,
        board: String,
        side_to_move: Side,
        legal_moves: Vec<String>,
        move_history: Vec<String>,
    },
    MoveUpdate {
        board: String,
        side_to_move: Side,
        legal_moves: Vec<String>,
        last_move: String,
        move_history: Vec<String>,
    },
    DrawOffer {
        from: Side,
    },
    DrawAccepted,
    DrawDeclined,
    CancelDrawOffer,
    GameOver {
        winner: Option<Side>,
        reason: GameOverReason,
        rating_deltas: Option<RatingDeltas>,
    },
    OpponentDisconnected,
    Pong,
    Error {
        message: String,
    },
}
