//! Codec for the line-delimited JSON protocol spoken to engine processes.
//!
//! One request object per line on the process's stdin, one reply object per
//! line on its stdout. The codec is stateless; the request/reply cadence is
//! enforced by [`EngineInstance`](super::EngineInstance).
//!
//! The engine identifies sides as `player1`/`player2`; the session layer
//! works in colors. The mapping is fixed here, in one place: `player1` is
//! white, `player2` is black.

use crate::error::EngineError;
use serde::{Deserialize, Serialize};
use shared::Side;

/// Sent on an engine's stdin to ask it to exit before the process is killed.
pub const TERMINATE_SENTINEL: &str = r#"{"error":"terminate"}"#;

pub fn side_to_token(side: Side) -> &'static str {
    match side {
        Side::White => "player1",
        Side::Black => "player2",
    }
}

pub fn token_to_side(token: &str) -> Option<Side> {
    match token {
        "player1" => Some(Side::White),
        "player2" => Some(Side::Black),
        _ => None,
    }
}

#[derive(Debug, Serialize)]
pub struct EngineRequest<'a> {
    pub command: &'a str,
    pub board: &'a str,
    #[serde(rename = "move")]
    pub mv: &'a str,
}

impl<'a> EngineRequest<'a> {
    pub fn init(board: &'a str) -> Self {
        Self {
            command: "init",
            board,
            mv: "",
        }
    }

    pub fn make_move(board: &'a str, mv: &'a str) -> Self {
        Self {
            command: "move",
            board,
            mv,
        }
    }

    /// Single-line encoding, without the trailing newline.
    pub fn encode(&self) -> Result<String, EngineError> {
        serde_json::to_string(self).map_err(|e| EngineError::Protocol(e.to_string()))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngineReply {
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub winner: String,
    #[serde(default)]
    pub board: String,
    #[serde(default)]
    pub next_player: String,
    #[serde(default)]
    pub legal_next_moves: Vec<String>,
}

impl EngineReply {
    pub fn decode(line: &str) -> Result<Self, EngineError> {
        serde_json::from_str(line.trim())
            .map_err(|e| EngineError::Protocol(format!("{e}: {:?}", line.trim())))
    }

    /// Non-empty `error` marks the move invalid or the process faulted.
    pub fn is_error(&self) -> bool {
        !self.error.is_empty()
    }

    /// A reply ends the game when it names a winner, or leaves the side to
    /// move without a legal move (stalemate).
    pub fn is_terminal(&self) -> bool {
        !self.winner.is_empty() || self.legal_next_moves.is_empty()
    }

    pub fn winner_side(&self) -> Option<Side> {
        token_to_side(&self.winner)
    }

    /// Side to move after this reply. Required on every non-terminal reply.
    pub fn next_side(&self) -> Result<Side, EngineError> {
        token_to_side(&self.next_player).ok_or_else(|| {
            EngineError::Protocol(format!("bad next_player token: {:?}", self.next_player))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_encodes_on_one_line() {
        let line = EngineRequest::make_move("BOARD", "e2-e4").encode().unwrap();
        assert_eq!(
            line,
            r#"{"command":"move","board":"BOARD","move":"e2-e4"}"#
        );
        assert!(!line.contains('\n'));
    }

    #[test]
    fn reply_decodes_with_defaults() {
        let reply = EngineReply::decode(
            r#"{"error":"","winner":"","board":"B","next_player":"player2","legal_next_moves":["a7-a6"]}"#,
        )
        .unwrap();
        assert!(!reply.is_error());
        assert!(!reply.is_terminal());
        assert_eq!(reply.next_side().unwrap(), Side::Black);

        // Missing fields default rather than failing the parse.
        let sparse = EngineReply::decode(r#"{"error":"illegal move"}"#).unwrap();
        assert!(sparse.is_error());
    }

    #[test]
    fn garbage_line_is_a_protocol_error() {
        let err = EngineReply::decode("pong").unwrap_err();
        assert!(matches!(err, EngineError::Protocol(_)));
    }

    #[test]
    fn winner_or_empty_moves_is_terminal() {
        let won = EngineReply::decode(
            r#"{"error":"","winner":"player1","board":"B","next_player":"player2","legal_next_moves":["x"]}"#,
        )
        .unwrap();
        assert!(won.is_terminal());
        assert_eq!(won.winner_side(), Some(Side::White));

        let stalemate = EngineReply::decode(
            r#"{"error":"","winner":"","board":"B","next_player":"player1","legal_next_moves":[]}"#,
        )
        .unwrap();
        assert!(stalemate.is_terminal());
        assert_eq!(stalemate.winner_side(), None);
    }

    #[test]
    fn side_token_mapping_is_fixed() {
        assert_eq!(side_to_token(Side::White), "player1");
        assert_eq!(side_to_token(Side::Black), "player2");
        assert_eq!(token_to_side("player1"), Some(Side::White));
        assert_eq!(token_to_side("white"), None);
    }
}
