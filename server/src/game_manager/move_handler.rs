//! In-game commands: moves, resignation, and the draw-offer protocol.

use crate::game_manager::{AppState, SessionStatus};
use shared::{GameOverReason, ServerMessage};
use std::time::Instant;
use tracing;

impl AppState {
    /// Forward a move from the side to move to the engine and publish the
    /// outcome. Moves that are detectably illegal from the cached
    /// legal-move list are rejected without a process round trip; otherwise
    /// the engine is the arbiter.
    pub async fn handle_move(&self, player_id: &str, mv: String) {
        if mv.is_empty() || mv.len() > self.config.max_move_len {
            self.send_to_player(
                player_id,
                ServerMessage::Error {
                    message: "invalid move format".to_string(),
                },
            );
            return;
        }

        let Some(session) = self.directory.session_of(player_id) else {
            self.send_to_player(
                player_id,
                ServerMessage::Error {
                    message: "no active game".to_string(),
                },
            );
            return;
        };
        let mut game = session.lock().await;
        let Some(side) = game.side_of(player_id) else {
            return;
        };

        match game.status {
            SessionStatus::Spawning => {
                game.send_to(
                    side,
                    ServerMessage::Error {
                        message: "game has not started yet".to_string(),
                    },
                );
                return;
            }
            SessionStatus::Finished | SessionStatus::Closed => {
                game.send_to(
                    side,
                    ServerMessage::Error {
                        message: "game is over".to_string(),
                    },
                );
                return;
            }
            SessionStatus::Ongoing => {}
        }

        if game.side_to_move != side {
            game.send_to(
                side,
                ServerMessage::Error {
                    message: "not your turn".to_string(),
                },
            );
            return;
        }
        if !game.legal_moves.is_empty() && !game.legal_moves.iter().any(|legal| legal == &mv) {
            game.send_to(
                side,
                ServerMessage::Error {
                    message: "illegal move".to_string(),
                },
            );
            return;
        }

        let board = game.board.clone();
        let Some(engine) = game.engine.as_mut() else {
            tracing::error!(session_id = %game.id, "ongoing session without an engine");
            self.finish_session(&mut game, None, GameOverReason::Aborted);
            return;
        };

        match engine.submit_move(&board, &mv).await {
            Ok(reply) if reply.is_error() => {
                tracing::debug!(session_id = %game.id, error = %reply.error, "move rejected by engine");
                game.send_to(
                    side,
                    ServerMessage::Error {
                        message: reply.error,
                    },
                );
            }
            Ok(reply) => {
                let side_to_move = match reply.next_side() {
                    Ok(next) => next,
                    Err(_) if reply.is_terminal() => side.opposite(),
                    Err(e) => {
                        tracing::error!(session_id = %game.id, error = %e, "aborting session");
                        self.finish_session(&mut game, None, GameOverReason::Aborted);
                        return;
                    }
                };

                let winner = reply.winner_side();
                let terminal = reply.is_terminal();

                game.board = reply.board.clone();
                game.moves.push(mv.clone());
                game.legal_moves = reply.legal_next_moves.clone();
                game.side_to_move = side_to_move;
                game.last_activity = Instant::now();

                // Completing a move withdraws the mover's own outstanding
                // draw offer.
                if game.draw_offer == Some(side) {
                    game.draw_offer = None;
                    game.send_to(side.opposite(), ServerMessage::CancelDrawOffer);
                }

                let move_history = game.moves.clone();
                game.broadcast(ServerMessage::MoveUpdate {
                    board: reply.board,
                    side_to_move,
                    legal_moves: reply.legal_next_moves,
                    last_move: mv,
                    move_history,
                });

                if !terminal {
                    return;
                }
                let reason = if winner.is_some() {
                    GameOverReason::Checkmate
                } else {
                    GameOverReason::Stalemate
                };
                self.finish_session(&mut game, winner, reason);
            }
            Err(e) => {
                tracing::error!(session_id = %game.id, error = %e, "engine failure, aborting session");
                self.finish_session(&mut game, None, GameOverReason::Aborted);
            }
        }
    }

    pub async fn handle_resign(&self, player_id: &str) {
        let Some(session) = self.directory.session_of(player_id) else {
            return;
        };
        let mut game = session.lock().await;
        let Some(side) = game.side_of(player_id) else {
            return;
        };
        if game.is_terminal() {
            return;
        }
        tracing::info!(session_id = %game.id, ?side, "player resigned");
        self.finish_session(&mut game, Some(side.opposite()), GameOverReason::Resignation);
    }

    /// Offer a draw. Only the side to move may offer, and only one offer
    /// can be outstanding at a time; a duplicate offer is ignored.
    pub async fn handle_offer_draw(&self, player_id: &str) {
        let Some(session) = self.directory.session_of(player_id) else {
            return;
        };
        let mut game = session.lock().await;
        let Some(side) = game.side_of(player_id) else {
            return;
        };
        if game.status != SessionStatus::Ongoing {
            return;
        }
        if game.side_to_move != side {
            game.send_to(
                side,
                ServerMessage::Error {
                    message: "draw can only be offered on your turn".to_string(),
                },
            );
            return;
        }
        if game.draw_offer.is_some() {
            tracing::debug!(session_id = %game.id, "draw offer already pending");
            return;
        }
        game.draw_offer = Some(side);
        tracing::info!(session_id = %game.id, ?side, "draw offered");
        game.send_to(side.opposite(), ServerMessage::DrawOffer { from: side });
    }

    pub async fn handle_accept_draw(&self, player_id: &str) {
        let Some(session) = self.directory.session_of(player_id) else {
            return;
        };
        let mut game = session.lock().await;
        let Some(side) = game.side_of(player_id) else {
            return;
        };
        if game.status != SessionStatus::Ongoing {
            return;
        }
        // Accepting requires an offer from the other side.
        if game.draw_offer != Some(side.opposite()) {
            return;
        }
        game.draw_offer = None;
        tracing::info!(session_id = %game.id, "draw accepted");
        game.broadcast(ServerMessage::DrawAccepted);
        self.finish_session(&mut game, None, GameOverReason::DrawAgreed);
    }

    /// Decline the opponent's offer. Declining when nothing is pending is a
    /// no-op, not an error.
    pub async fn handle_decline_draw(&self, player_id: &str) {
        let Some(session) = self.directory.session_of(player_id) else {
            return;
        };
        let mut game = session.lock().await;
        let Some(side) = game.side_of(player_id) else {
            return;
        };
        if game.draw_offer != Some(side.opposite()) {
            return;
        }
        game.draw_offer = None;
        tracing::info!(session_id = %game.id, "draw declined");
        game.send_to(side.opposite(), ServerMessage::DrawDeclined);
    }

    /// Withdraw one's own pending offer.
    pub async fn handle_cancel_draw_offer(&self, player_id: &str) {
        let Some(session) = self.directory.session_of(player_id) else {
            return;
        };
        let mut game = session.lock().await;
        let Some(side) = game.side_of(player_id) else {
            return;
        };
        if game.draw_offer != Some(side) {
            return;
        }
        game.draw_offer = None;
        tracing::info!(session_id = %game.id, "draw offer withdrawn");
        game.send_to(side.opposite(), ServerMessage::CancelDrawOffer);
    }
}
