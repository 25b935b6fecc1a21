//! WebSocket upgrade handler

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{stream::SplitSink, SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::game::RoomError;
use crate::rooms::{Joined, RoomManager};
use crate::util::rate_limit::PlayerRateLimiter;
use crate::util::time::unix_millis;
use crate::ws::protocol::{ClientMsg, ServerMsg};

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, state: AppState) {
    let session = Uuid::new_v4();
    info!(session = %session, "New WebSocket connection");

    let (mut ws_sink, mut ws_stream) = socket.split();
    state.rooms.lock().connect(session);

    // Writer task: direct replies and forwarded room broadcasts -> WebSocket
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<ServerMsg>();
    let writer_handle = tokio::spawn(async move {
        while let Some(msg) = out_rx.recv().await {
            if let Err(e) = send_msg(&mut ws_sink, &msg).await {
                debug!(session = %session, error = %e, "WebSocket send failed");
                break;
            }
        }
    });

    let rate_limiter = PlayerRateLimiter::new(state.config.input_rate_limit);
    let mut forwarder: Option<JoinHandle<()>> = None;

    // Reader loop: WebSocket -> room registry
    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => {
                if !rate_limiter.check_input() {
                    warn!(session = %session, "Rate limited client message");
                    continue;
                }

                let client_msg = match serde_json::from_str::<ClientMsg>(&text) {
                    Ok(msg) => msg,
                    Err(e) => {
                        warn!(session = %session, error = %e, "Failed to parse client message");
                        continue;
                    }
                };

                let reply = {
                    let mut rooms = state.rooms.lock();
                    dispatch(&mut rooms, session, client_msg, unix_millis())
                };

                for msg in reply.direct {
                    let _ = out_tx.send(msg);
                }
                if reply.left {
                    if let Some(handle) = forwarder.take() {
                        handle.abort();
                    }
                }
                if let Some(rx) = reply.subscribe {
                    if let Some(handle) = forwarder.take() {
                        handle.abort();
                    }
                    forwarder = Some(spawn_forwarder(session, rx, out_tx.clone()));
                }
            }
            Ok(Message::Binary(_)) => {
                warn!(session = %session, "Received binary message, ignoring");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                info!(session = %session, "Client initiated close");
                break;
            }
            Err(e) => {
                error!(session = %session, error = %e, "WebSocket error");
                break;
            }
        }
    }

    // Cleanup on disconnect
    if let Some(handle) = forwarder.take() {
        handle.abort();
    }
    state.rooms.lock().disconnect(session);
    writer_handle.abort();

    info!(session = %session, "WebSocket connection closed");
}

/// Forward a room's broadcast into this connection's writer
fn spawn_forwarder(
    session: Uuid,
    mut rx: broadcast::Receiver<ServerMsg>,
    out: mpsc::UnboundedSender<ServerMsg>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(msg) => {
                    if out.send(msg).is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(session = %session, lagged = n, "Room broadcast lagged");
                    // Continue - don't disconnect for lag
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!(session = %session, "Room channel closed");
                    break;
                }
            }
        }
    })
}

/// What the connection should do after one client message
#[derive(Default)]
pub struct Reply {
    /// Sent only to this connection
    pub direct: Vec<ServerMsg>,
    /// Room broadcast to start forwarding
    pub subscribe: Option<broadcast::Receiver<ServerMsg>>,
    /// Stop forwarding the current room
    pub left: bool,
}

impl Reply {
    fn joined(&mut self, joined: Joined, created: bool) {
        let Joined {
            player_id,
            lobby,
            rx,
        } = joined;
        self.direct.push(if created {
            ServerMsg::RoomCreated {
                player_id,
                room: lobby,
            }
        } else {
            ServerMsg::JoinSuccess {
                player_id,
                room: lobby,
            }
        });
        self.subscribe = Some(rx);
    }
}

/// Route one client message to the registry
pub fn dispatch(rooms: &mut RoomManager, session: Uuid, msg: ClientMsg, now: u64) -> Reply {
    let mut reply = Reply::default();

    let result = match msg {
        ClientMsg::CreateRoom {
            player_name,
            room_name,
            mode,
        } => {
            match rooms.create_room(session, &player_name, room_name, mode, now) {
                Ok(joined) => reply.joined(joined, true),
                Err(e) => reply.direct.push(join_error(session, &e)),
            }
            Ok(())
        }
        ClientMsg::JoinRoom { code, player_name } => {
            match rooms.join_room(session, &code, &player_name) {
                Ok(joined) => reply.joined(joined, false),
                Err(e) => reply.direct.push(join_error(session, &e)),
            }
            Ok(())
        }
        ClientMsg::RegisterLocalPlayers { names } => rooms
            .register_local_players(session, &names)
            .map(|player_ids| reply.direct.push(ServerMsg::LocalPlayersRegistered { player_ids })),
        ClientMsg::AddBot {
            difficulty,
            team_id,
        } => rooms.add_bot(session, difficulty, team_id, now).map(|_| ()),
        ClientMsg::RemoveBot { player_id } => rooms.remove_bot(session, player_id),
        ClientMsg::StartGame => rooms.start_game(session, now),
        ClientMsg::PlayerInput { player_id, input } => rooms.player_input(session, player_id, &input),
        ClientMsg::PlayerInputBatch { inputs } => rooms.player_input_batch(session, &inputs),
        ClientMsg::AssignTeam { player_id, team_id } => rooms.assign_team(session, player_id, team_id),
        ClientMsg::UpdateMatchSettings { settings } => rooms.update_settings(session, settings),
        ClientMsg::PauseGame => rooms.pause(session, now),
        ClientMsg::ResumeGame => rooms.resume(session, now),
        ClientMsg::PlayAgain => rooms.play_again(session, now),
        ClientMsg::EndGame => rooms.end_game(session, now),
        ClientMsg::LeaveGame => {
            rooms.leave(session);
            reply.left = true;
            Ok(())
        }
        ClientMsg::GetMaps => {
            reply.direct.push(ServerMsg::Maps {
                maps: rooms.maps().list(),
            });
            Ok(())
        }
        ClientMsg::GetMap { id } => rooms
            .maps()
            .get(&id)
            .map(|map| reply.direct.push(ServerMsg::Map { map }))
            .ok_or(RoomError::UnknownMap(id)),
        ClientMsg::Ping { t } => {
            reply.direct.push(ServerMsg::Pong {
                t,
                server_time: now,
            });
            Ok(())
        }
    };

    if let Err(e) = result {
        debug!(session = %session, code = e.code(), error = %e, "Request rejected");
        reply.direct.push(ServerMsg::Error {
            code: e.code().to_string(),
            message: e.to_string(),
        });
    }
    reply
}

fn join_error(session: Uuid, e: &RoomError) -> ServerMsg {
    debug!(session = %session, code = e.code(), error = %e, "Join rejected");
    ServerMsg::JoinError {
        code: e.code().to_string(),
        reason: e.to_string(),
    }
}

/// Send a message over WebSocket
async fn send_msg(sink: &mut SplitSink<WebSocket, Message>, msg: &ServerMsg) -> Result<(), String> {
    let json = serde_json::to_string(msg).map_err(|e| e.to_string())?;
    sink.send(Message::Text(json)).await.map_err(|e| e.to_string())
}
