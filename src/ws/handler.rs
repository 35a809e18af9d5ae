//! WebSocket upgrade handler

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    response::{IntoResponse, Response},
};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::game::{GameHandle, PlayerIntent, PlayerSessions, RaceCommand};
use crate::http::auth::AuthError;
use crate::http::routes::AppError;
use crate::lobby::LobbyError;
use crate::util::rate_limit::SocketRateLimiter;
use crate::util::time::unix_millis;
use crate::ws::protocol::{ClientMsg, ServerMsg};

/// Query parameters for WebSocket connection. Both absent means spectator.
#[derive(Debug, Default, Deserialize)]
pub struct WsQuery {
    pub player_id: Option<Uuid>,
    pub secret: Option<String>,
}

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(game_id): Path<Uuid>,
    Query(query): Query<WsQuery>,
    State(state): State<AppState>,
) -> Response {
    match authorize(&state, game_id, query) {
        Ok((handle, player_id)) => {
            info!(game_id = %game_id, player_id = ?player_id, "WebSocket upgrade");
            ws.on_upgrade(move |socket| handle_socket(socket, handle, player_id))
        }
        Err(e) => {
            warn!(game_id = %game_id, error = %e, "WebSocket upgrade refused");
            e.into_response()
        }
    }
}

/// Resolve the game and check the player's secret
fn authorize(
    state: &AppState,
    game_id: Uuid,
    query: WsQuery,
) -> Result<(GameHandle, Option<Uuid>), AppError> {
    let handle = state.lobby.game(game_id)?;

    match (query.player_id, query.secret) {
        (None, None) => Ok((handle, None)),
        (Some(player_id), Some(secret)) => {
            state.signer.verify(game_id, player_id, &secret)?;
            if !handle.sessions.is_registered(player_id) {
                return Err(LobbyError::UnknownPlayer(player_id).into());
            }
            Ok((handle, Some(player_id)))
        }
        _ => Err(AuthError::MissingSecret.into()),
    }
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, handle: GameHandle, player_id: Option<Uuid>) {
    let game_id = handle.id;
    let (mut ws_sink, ws_stream) = socket.split();

    let welcome = ServerMsg::Welcome {
        game_id,
        player_id,
        server_time: unix_millis(),
    };
    if let Err(e) = send_msg(&mut ws_sink, &welcome).await {
        error!(game_id = %game_id, error = %e, "Failed to send welcome");
        return;
    }

    let (socket_id, outbound) = handle.sessions.attach(player_id);
    info!(game_id = %game_id, socket_id = %socket_id, player_id = ?player_id, "New WebSocket connection");

    if handle
        .send(RaceCommand::Connect {
            socket_id,
            player_id,
        })
        .await
        .is_ok()
    {
        run_session(&handle, socket_id, player_id, ws_sink, ws_stream, outbound).await;
    }

    handle.sessions.detach(socket_id);
    if let Some(player_id) = player_id {
        // the race re-checks readiness without this socket
        let _ = handle.send(RaceCommand::Disconnect { player_id }).await;
    }
    info!(game_id = %game_id, socket_id = %socket_id, "WebSocket connection closed");
}

/// Run the WebSocket session with read/write split
async fn run_session(
    handle: &GameHandle,
    socket_id: Uuid,
    player_id: Option<Uuid>,
    mut ws_sink: SplitSink<WebSocket, Message>,
    mut ws_stream: SplitStream<WebSocket>,
    mut outbound: mpsc::Receiver<ServerMsg>,
) {
    let rate_limiter = SocketRateLimiter::new();

    // Writer task: session registry -> WebSocket. Ends when the socket is
    // unregistered, which closes the connection.
    let mut writer = tokio::spawn(async move {
        while let Some(msg) = outbound.recv().await {
            if let Err(e) = send_msg(&mut ws_sink, &msg).await {
                debug!(socket_id = %socket_id, error = %e, "WebSocket send failed");
                return;
            }
        }
        let _ = ws_sink.close().await;
    });

    // Reader loop: WebSocket -> race queue
    loop {
        let result = tokio::select! {
            next = ws_stream.next() => match next {
                Some(result) => result,
                None => break,
            },
            _ = &mut writer => {
                debug!(socket_id = %socket_id, "Writer finished");
                break;
            }
        };

        match result {
            Ok(Message::Text(text)) => {
                if !rate_limiter.check() {
                    warn!(socket_id = %socket_id, "Rate limited client message");
                    continue;
                }
                handle.sessions.seen(player_id);

                let intent = match decode_client(&text) {
                    Ok(ClientMsg::Ping { t }) => {
                        handle.sessions.send_to_socket(socket_id, &ServerMsg::Pong { t });
                        continue;
                    }
                    Ok(ClientMsg::Ready) => PlayerIntent::Ready,
                    Ok(ClientMsg::Control { thrust, angle }) => PlayerIntent::Control { thrust, angle },
                    Ok(ClientMsg::RequestSummary) => PlayerIntent::RequestSummary,
                    Err(reply) => {
                        warn!(socket_id = %socket_id, "Failed to parse client message");
                        handle.sessions.send_to_socket(socket_id, &reply);
                        continue;
                    }
                };

                let command = RaceCommand::Client {
                    socket_id,
                    player_id,
                    msg: intent,
                    received_at: unix_millis(),
                };
                if handle.send(command).await.is_err() {
                    debug!(socket_id = %socket_id, "Race queue closed");
                    break;
                }
            }
            Ok(Message::Binary(_)) => {
                handle.sessions.send_to_socket(
                    socket_id,
                    &ServerMsg::Error {
                        code: "invalid_message".to_string(),
                        message: "Binary messages are not supported".to_string(),
                    },
                );
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                info!(socket_id = %socket_id, "Client initiated close");
                break;
            }
            Err(e) => {
                debug!(socket_id = %socket_id, error = %e, "WebSocket error");
                break;
            }
        }
    }

    writer.abort();
}

/// Decode one text frame; failures become the error reply for the sender
fn decode_client(text: &str) -> Result<ClientMsg, ServerMsg> {
    serde_json::from_str::<ClientMsg>(text).map_err(|e| ServerMsg::Error {
        code: "invalid_message".to_string(),
        message: e.to_string(),
    })
}

/// Send a message over WebSocket
async fn send_msg(
    sink: &mut SplitSink<WebSocket, Message>,
    msg: &ServerMsg,
) -> Result<(), String> {
    let json = serde_json::to_string(msg).map_err(|e| e.to_string())?;
    sink.send(Message::Text(json))
        .await
        .map_err(|e| e.to_string())
}
