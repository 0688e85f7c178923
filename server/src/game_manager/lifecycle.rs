//! Connection lifecycle, game settlement, and background cleanup.

use crate::game_manager::{AppState, ConnectedPlayer, GameSession, SessionStatus};
use crate::game_manager::session::GameResult;
use shared::{GameOverReason, PlayerIdentity, ServerMessage, Side};
use std::sync::Arc;
use std::time::Instant;
use tracing;

impl AppState {
    /// Register an authenticated connection. If the player belongs to a
    /// live session this is a reconnection: the grace timer is cancelled
    /// and the current snapshot replayed so the client resumes without the
    /// full history exchange.
    pub async fn connect(&self, identity: PlayerIdentity, tx: super::Tx) {
        let player_id = identity.id.clone();
        tracing::info!(player_id = %player_id, name = %identity.display_name, "player connected");

        // Backdate the rate-limit clock so the first command is never
        // dropped.
        let last_msg_at = Instant::now()
            .checked_sub(self.config.min_message_interval)
            .unwrap_or_else(Instant::now);
        self.players.insert(
            player_id.clone(),
            ConnectedPlayer {
                identity,
                tx: tx.clone(),
                last_msg_at,
            },
        );

        let Some(session) = self.directory.session_of(&player_id) else {
            return;
        };
        let mut game = session.lock().await;
        let Some(side) = game.side_of(&player_id) else {
            return;
        };

        match game.status {
            SessionStatus::Spawning | SessionStatus::Ongoing => {
                let slot = game.slot_mut(side);
                slot.tx = Some(tx);
                slot.cancel_grace_timer();
                tracing::info!(session_id = %game.id, player_id = %player_id, "player reconnected");
                if game.status == SessionStatus::Ongoing {
                    game.send_to(side, game.snapshot_for(side));
                }
                // While spawning, the initial snapshot arrives once the
                // engine is up.
            }
            SessionStatus::Finished => {
                // Late reconnect inside the retention window: show the
                // result.
                game.slot_mut(side).tx = Some(tx);
                if let Some(msg) = game.game_over_message() {
                    game.send_to(side, msg);
                }
            }
            SessionStatus::Closed => {}
        }
    }

    /// Handle a dropped connection. Queued players simply leave the queue;
    /// players in a live game get a reconnect grace timer, and the opponent
    /// is told. The engine keeps running.
    pub async fn disconnect(self: Arc<Self>, player_id: String) {
        tracing::info!(player_id = %player_id, "player disconnected");
        self.players.remove(&player_id);
        {
            let mut queue = self.queue.lock().await;
            queue.retain(|entry| entry.player_id != player_id);
        }

        let Some(session) = self.directory.session_of(&player_id) else {
            return;
        };
        let mut game = session.lock().await;
        let Some(side) = game.side_of(&player_id) else {
            return;
        };

        game.slot_mut(side).tx = None;
        if game.is_terminal() {
            return;
        }

        game.send_to(side.opposite(), ServerMessage::OpponentDisconnected);

        let state = Arc::clone(&self);
        let session_id = game.id.clone();
        let grace = self.config.reconnect_grace;
        tracing::info!(session_id = %session_id, ?side, grace = ?grace, "starting reconnect grace timer");
        let slot = game.slot_mut(side);
        slot.cancel_grace_timer();
        slot.grace_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            state.grace_expired(session_id, side).await;
        }));
    }

    /// Grace-period expiry counts as resignation by the absent player.
    async fn grace_expired(&self, session_id: String, side: Side) {
        let Some(session) = self.directory.by_id(&session_id) else {
            return;
        };
        let mut game = session.lock().await;
        if game.is_terminal() {
            return;
        }
        if game.slot(side).tx.is_some() {
            // Reconnected; the timer cancellation raced the firing.
            return;
        }
        tracing::info!(session_id = %game.id, ?side, "reconnect grace expired, forfeiting");
        self.finish_session(&mut game, Some(side.opposite()), GameOverReason::Abandonment);
    }

    /// Settle a session exactly once: record the result, apply rating
    /// deltas for decisive and drawn games, tell both players, and
    /// terminate the engine. Aborted games never touch ratings.
    pub(crate) fn finish_session(
        &self,
        game: &mut GameSession,
        winner: Option<Side>,
        reason: GameOverReason,
    ) {
        if game.is_terminal() {
            return;
        }
        game.status = SessionStatus::Finished;
        game.finished_at = Some(Instant::now());
        game.draw_offer = None;
        game.white.cancel_grace_timer();
        game.black.cancel_grace_timer();

        let rating_deltas = (reason != GameOverReason::Aborted)
            .then(|| self.rating.settle(&game.white.identity, &game.black.identity, winner));
        game.result = Some(GameResult {
            winner,
            reason,
            rating_deltas,
        });

        tracing::info!(session_id = %game.id, ?winner, ?reason, "game over");
        if let Some(msg) = game.game_over_message() {
            game.broadcast(msg);
        }

        // The engine leaves the session here and never comes back, so it is
        // terminated exactly once and nothing can write to it afterwards.
        if let Some(engine) = game.engine.take() {
            tokio::spawn(engine.terminate());
        }
    }

    pub fn spawn_sweep_task(self: Arc<Self>) {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.config.sweep_interval);
            loop {
                interval.tick().await;
                self.sweep_once().await;
            }
        });
    }

    /// One cleanup pass: drop stale matchmaking entries, close finished
    /// sessions past their retention window, abandon sessions idle past the
    /// inactivity limit. Factored out of the sweep loop so tests can drive
    /// it deterministically.
    pub async fn sweep_once(&self) {
        let stale_players: Vec<String> = {
            let mut queue = self.queue.lock().await;
            let mut stale = Vec::new();
            queue.retain(|entry| {
                if entry.enqueued_at.elapsed() >= self.config.queue_stale_after {
                    stale.push(entry.player_id.clone());
                    false
                } else {
                    true
                }
            });
            stale
        };
        for player_id in stale_players {
            tracing::info!(player_id = %player_id, "dropping stale matchmaking entry");
            self.send_to_player(&player_id, ServerMessage::SearchCancelled);
        }

        for session_id in self.directory.session_ids() {
            let Some(session) = self.directory.by_id(&session_id) else {
                continue;
            };
            let mut game = session.lock().await;
            match game.status {
                SessionStatus::Finished => {
                    let expired = game
                        .finished_at
                        .is_some_and(|at| at.elapsed() >= self.config.session_retention);
                    if expired {
                        game.status = SessionStatus::Closed;
                        let white_id = game.white.identity.id.clone();
                        let black_id = game.black.identity.id.clone();
                        drop(game);
                        self.directory
                            .remove(&session_id, [&white_id, &black_id]);
                        tracing::debug!(session_id = %session_id, "session closed");
                    }
                }
                SessionStatus::Ongoing | SessionStatus::Spawning => {
                    if game.last_activity.elapsed() >= self.config.session_idle_timeout {
                        tracing::warn!(session_id = %game.id, "session idle too long, aborting");
                        self.finish_session(&mut game, None, GameOverReason::Aborted);
                    }
                }
                SessionStatus::Closed => {}
            }
        }

        tracing::debug!(active_sessions = self.directory.len(), "sweep pass complete");
    }
}
