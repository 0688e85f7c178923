//! Connection gateway: terminates client websockets, authenticates them,
//! and routes messages to the game manager.

use crate::auth::Credentials;
use crate::game_manager::AppState;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::{sink::SinkExt, stream::SplitStream, StreamExt};
use shared::{ClientMessage, PlayerIdentity, ServerMessage};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();

    // Forward outbound messages from the channel to the websocket. Ends
    // when every sender is dropped or the peer goes away.
    tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let Ok(json) = serde_json::to_string(&msg) else {
                continue;
            };
            if sender.send(Message::Text(json)).await.is_err() {
                break;
            }
        }
    });

    let Some(identity) = handshake(&mut receiver, &state, &tx).await else {
        return;
    };
    let player_id = identity.id.clone();
    state.connect(identity, tx.clone()).await;

    while let Some(Ok(msg)) = receiver.next().await {
        let Message::Text(text) = msg else {
            continue;
        };
        if text.len() > state.config.max_message_bytes {
            warn!(player_id = %player_id, len = text.len(), "oversized message");
            let _ = tx.send(ServerMessage::Error {
                message: "message too large".to_string(),
            });
            continue;
        }
        if !state.check_rate_limit(&player_id) {
            debug!(player_id = %player_id, "rate limited, dropping message");
            continue;
        }

        match serde_json::from_str::<ClientMessage>(&text) {
            Ok(ClientMessage::Handshake { .. }) => {
                let _ = tx.send(ServerMessage::Error {
                    message: "already authenticated".to_string(),
                });
            }
            Ok(ClientMessage::FindGame) => state.clone().find_game(player_id.clone()).await,
            Ok(ClientMessage::CancelSearch) => state.cancel_search(&player_id).await,
            Ok(ClientMessage::Move { mv }) => state.handle_move(&player_id, mv).await,
            Ok(ClientMessage::Resign) => state.handle_resign(&player_id).await,
            Ok(ClientMessage::OfferDraw) => state.handle_offer_draw(&player_id).await,
            Ok(ClientMessage::AcceptDraw) => state.handle_accept_draw(&player_id).await,
            Ok(ClientMessage::DeclineDraw) => state.handle_decline_draw(&player_id).await,
            Ok(ClientMessage::CancelDrawOffer) => {
                state.handle_cancel_draw_offer(&player_id).await;
            }
            Ok(ClientMessage::Ping) => {
                let _ = tx.send(ServerMessage::Pong);
            }
            // Unknown kinds get an error reply, never a closed connection.
            Err(e) => {
                debug!(player_id = %player_id, error = %e, "unparseable client message");
                let _ = tx.send(ServerMessage::Error {
                    message: "unknown or malformed message".to_string(),
                });
            }
        }
    }

    state.clone().disconnect(player_id).await;
}

/// The first frame on a connection must be a handshake carrying
/// credentials. Anything else, or silence past the deadline, ends the
/// connection after an error reply.
async fn handshake(
    receiver: &mut SplitStream<WebSocket>,
    state: &Arc<AppState>,
    tx: &mpsc::UnboundedSender<ServerMessage>,
) -> Option<PlayerIdentity> {
    let first = tokio::time::timeout(state.config.handshake_timeout, receiver.next()).await;
    let Ok(Some(Ok(Message::Text(text)))) = first else {
        debug!("connection closed or silent before handshake");
        return None;
    };

    match serde_json::from_str::<ClientMessage>(&text) {
        Ok(ClientMessage::Handshake {
            token,
            display_name,
        }) => match state.auth.authenticate(&Credentials {
            token,
            display_name,
        }) {
            Ok(identity) => {
                let _ = tx.send(ServerMessage::HandshakeAck {
                    player: identity.clone(),
                });
                Some(identity)
            }
            Err(e) => {
                warn!(error = %e, "handshake rejected");
                let _ = tx.send(ServerMessage::Error {
                    message: e.to_string(),
                });
                None
            }
        },
        _ => {
            let _ = tx.send(ServerMessage::Error {
                message: "expected handshake".to_string(),
            });
            None
        }
    }
}
