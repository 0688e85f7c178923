//! Matchmaking: FIFO pairing of waiting players into new sessions.

use crate::engine::EngineInstance;
use crate::game_manager::{AppState, GameSession, SessionStatus};
use shared::{GameOverReason, PlayerIdentity, ServerMessage, Side};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing;
use uuid::Uuid;

pub struct QueueEntry {
    pub player_id: String,
    pub enqueued_at: Instant,
}

impl AppState {
    /// Enqueue a player, pairing immediately when an opponent is waiting.
    /// Re-enqueueing while already queued just re-confirms the search.
    pub async fn find_game(self: Arc<Self>, player_id: String) {
        if let Some(session) = self.directory.session_of(&player_id) {
            let game = session.lock().await;
            if !game.is_terminal() {
                tracing::warn!(player_id = %player_id, "find_game while already in a game");
                drop(game);
                self.send_to_player(
                    &player_id,
                    ServerMessage::Error {
                        message: "already in an active game".to_string(),
                    },
                );
                return;
            }
        }

        let pair = {
            let mut queue = self.queue.lock().await;
            if queue.iter().any(|entry| entry.player_id == player_id) {
                tracing::debug!(player_id = %player_id, "already queued");
                None
            } else {
                queue.push_back(QueueEntry {
                    player_id: player_id.clone(),
                    enqueued_at: Instant::now(),
                });
                if queue.len() >= 2 {
                    // Both entries leave the queue in the same critical
                    // section, so no concurrent pairing or cancel can claim
                    // either of them.
                    let first = queue.pop_front();
                    let second = queue.pop_front();
                    first.zip(second)
                } else {
                    None
                }
            }
        };

        match pair {
            Some((first, second)) => self.create_session(first, second).await,
            None => self.send_to_player(&player_id, ServerMessage::Searching),
        }
    }

    /// Remove the player's entry if still queued. A cancel that lost the
    /// race against pairing (or a duplicate cancel) is a no-op; the player
    /// was already told about the match instead.
    pub async fn cancel_search(&self, player_id: &str) {
        let removed = {
            let mut queue = self.queue.lock().await;
            let before = queue.len();
            queue.retain(|entry| entry.player_id != player_id);
            queue.len() != before
        };
        if removed {
            tracing::info!(player_id = %player_id, "search cancelled");
            self.send_to_player(player_id, ServerMessage::SearchCancelled);
        } else {
            tracing::debug!(player_id = %player_id, "cancel_search with no queue entry");
        }
    }

    async fn create_session(self: Arc<Self>, first: QueueEntry, second: QueueEntry) {
        let first_conn = self.connection_of(&first.player_id);
        let second_conn = self.connection_of(&second.player_id);
        let (Some(first_conn), Some(second_conn)) = (first_conn, second_conn) else {
            // One of the pair vanished between enqueue and claim; put any
            // survivor back at the front of the line.
            let mut queue = self.queue.lock().await;
            for entry in [second, first] {
                if self.players.contains_key(&entry.player_id) {
                    queue.push_front(entry);
                }
            }
            return;
        };

        // Fairness heuristic: the longest-waiting player gets the side they
        // did not play last, when known.
        let first_is_white = match self.last_sides.get(&first.player_id).map(|side| *side) {
            Some(Side::White) => false,
            Some(Side::Black) => true,
            None => rand::random(),
        };
        let (white, black) = if first_is_white {
            (first_conn, second_conn)
        } else {
            (second_conn, first_conn)
        };

        let session_id = Uuid::new_v4().to_string();
        let white_id = white.0.id.clone();
        let black_id = black.0.id.clone();
        tracing::info!(
            session_id = %session_id,
            white = %white_id,
            black = %black_id,
            "players paired, creating session"
        );

        let white_identity = white.0.clone();
        let black_identity = black.0.clone();
        let game = GameSession::new(session_id.clone(), white, black);
        let session = Arc::new(Mutex::new(game));
        self.directory
            .insert(session_id.clone(), session, [&white_id, &black_id]);
        self.last_sides.insert(white_id.clone(), Side::White);
        self.last_sides.insert(black_id.clone(), Side::Black);

        self.send_to_player(
            &white_id,
            ServerMessage::MatchFound {
                session_id: session_id.clone(),
                opponent: black_identity,
                side: Side::White,
            },
        );
        self.send_to_player(
            &black_id,
            ServerMessage::MatchFound {
                session_id: session_id.clone(),
                opponent: white_identity,
                side: Side::Black,
            },
        );

        // The engine spawn is supervised off this task so pairing never
        // stalls the gateway loop that triggered it.
        tokio::spawn(self.start_engine(session_id));
    }

    fn connection_of(&self, player_id: &str) -> Option<(PlayerIdentity, super::Tx)> {
        self.players
            .get(player_id)
            .map(|player| (player.identity.clone(), player.tx.clone()))
    }

    /// Spawn the engine for a freshly created session and publish the
    /// initial state, or settle the session as aborted if the process never
    /// comes up.
    pub(crate) async fn start_engine(self: Arc<Self>, session_id: String) {
        let spawn_result = EngineInstance::start(&self.config).await;

        let Some(session) = self.directory.by_id(&session_id) else {
            // Session disappeared while the process was starting.
            if let Ok((engine, _)) = spawn_result {
                engine.terminate().await;
            }
            return;
        };
        let mut game = session.lock().await;

        let (engine, init) = match spawn_result {
            Ok(started) => started,
            Err(e) => {
                tracing::error!(session_id = %game.id, error = %e, "engine failed to start");
                game.broadcast(ServerMessage::Error {
                    message: "engine failed to start".to_string(),
                });
                self.finish_session(&mut game, None, GameOverReason::Aborted);
                return;
            }
        };

        if game.status != SessionStatus::Spawning {
            // Settled while the engine was starting (e.g. early abandonment).
            drop(game);
            engine.terminate().await;
            return;
        }

        let side_to_move = match init.next_side() {
            Ok(side) => side,
            Err(e) => {
                tracing::error!(session_id = %game.id, error = %e, "bad init reply");
                engine.terminate().await;
                game.broadcast(ServerMessage::Error {
                    message: "engine failed to start".to_string(),
                });
                self.finish_session(&mut game, None, GameOverReason::Aborted);
                return;
            }
        };

        game.board = init.board;
        game.legal_moves = init.legal_next_moves;
        game.side_to_move = side_to_move;
        game.engine = Some(engine);
        game.status = SessionStatus::Ongoing;
        game.last_activity = Instant::now();
        tracing::info!(session_id = %game.id, "engine up, game started");

        game.send_to(Side::White, game.snapshot_for(Side::White));
        game.send_to(Side::Black, game.snapshot_for(Side::Black));
    }
}
