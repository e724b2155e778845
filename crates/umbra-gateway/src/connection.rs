use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, trace, warn};

use umbra_types::events::{GatewayCommand, GatewayEvent};

use crate::dispatcher::Dispatcher;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Work handed from the reader task to the writer task, which owns the
/// room subscriptions.
enum Control {
    Reply(GatewayEvent),
    Join(i64),
    Leave(i64),
}

/// Handle a WebSocket whose token was already validated at the HTTP upgrade.
/// Admins may join any room; everyone else only rooms they have entered.
pub async fn handle_connection(
    socket: WebSocket,
    dispatcher: Dispatcher,
    user_id: i64,
    username: String,
    is_admin: bool,
) {
    let (mut sender, mut receiver) = socket.split();

    let conn_id = dispatcher.register(user_id).await;
    info!("{} ({}) connected to gateway", username, user_id);

    let mut broadcast_rx = dispatcher.subscribe();
    let (control_tx, mut control_rx) = mpsc::unbounded_channel::<Control>();

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received;

    // Forward subscribed room events and command replies -> client, with heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut rooms: HashSet<i64> = HashSet::new();
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                result = broadcast_rx.recv() => {
                    let event = match result {
                        Ok(event) => event,
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!("Broadcast receiver lagged by {} messages", n);
                            continue;
                        }
                        Err(_) => break,
                    };

                    match event.room_id() {
                        Some(room_id) if rooms.contains(&room_id) => {}
                        _ => continue,
                    }

                    if !send_event(&mut sender, &event).await {
                        break;
                    }
                }
                control = control_rx.recv() => {
                    let Some(control) = control else { break };

                    let reply = match control {
                        Control::Reply(event) => event,
                        Control::Join(room_id) => {
                            rooms.insert(room_id);
                            GatewayEvent::RoomJoined { room_id }
                        }
                        Control::Leave(room_id) => {
                            rooms.remove(&room_id);
                            GatewayEvent::RoomLeft { room_id }
                        }
                    };

                    if !send_event(&mut sender, &reply).await {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Read commands from client
    let username_recv = username.clone();
    let dispatcher_recv = dispatcher.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => {
                    let control = match serde_json::from_str::<GatewayCommand>(text.as_str()) {
                        Ok(cmd) => {
                            let may_join = match cmd {
                                GatewayCommand::JoinRoom { room_id } => {
                                    is_admin || dispatcher_recv.may_join(user_id, room_id).await
                                }
                                _ => true,
                            };
                            handle_command(&username_recv, user_id, cmd, may_join)
                        }
                        Err(e) => {
                            warn!(
                                "{} ({}) bad command: {} -- raw: {}",
                                username_recv,
                                user_id,
                                e,
                                truncate(text.as_str(), 200)
                            );
                            continue;
                        }
                    };
                    if control_tx.send(control).is_err() {
                        break;
                    }
                }
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    dispatcher.unregister(conn_id).await;
    info!("{} ({}) disconnected from gateway", username, user_id);
}

fn handle_command(username: &str, user_id: i64, cmd: GatewayCommand, may_join: bool) -> Control {
    match cmd {
        GatewayCommand::Authenticate => {
            trace!("{} ({}) authenticate acknowledged", username, user_id);
            Control::Reply(GatewayEvent::Authenticated { success: true })
        }
        GatewayCommand::JoinRoom { room_id } if !may_join => {
            warn!("{} ({}) tried to join room {} without entering it", username, user_id, room_id);
            Control::Reply(GatewayEvent::JoinDenied { room_id })
        }
        GatewayCommand::JoinRoom { room_id } => {
            debug!("{} ({}) joined room {}", username, user_id, room_id);
            Control::Join(room_id)
        }
        GatewayCommand::LeaveRoom { room_id } => {
            debug!("{} ({}) left room {}", username, user_id, room_id);
            Control::Leave(room_id)
        }
    }
}

/// Returns false once the socket is gone.
async fn send_event(sender: &mut SplitSink<WebSocket, Message>, event: &GatewayEvent) -> bool {
    match serde_json::to_string(event) {
        Ok(text) => sender.send(Message::Text(text.into())).await.is_ok(),
        Err(e) => {
            warn!("Failed to serialize gateway event: {}", e);
            true
        }
    }
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_map_to_subscription_changes() {
        assert!(matches!(
            handle_command("newt", 1, GatewayCommand::JoinRoom { room_id: 5 }, true),
            Control::Join(5)
        ));
        assert!(matches!(
            handle_command("newt", 1, GatewayCommand::JoinRoom { room_id: 5 }, false),
            Control::Reply(GatewayEvent::JoinDenied { room_id: 5 })
        ));
        assert!(matches!(
            handle_command("newt", 1, GatewayCommand::LeaveRoom { room_id: 5 }, false),
            Control::Leave(5)
        ));
        assert!(matches!(
            handle_command("newt", 1, GatewayCommand::Authenticate, true),
            Control::Reply(GatewayEvent::Authenticated { success: true })
        ));
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("žluťoučký", 3), "žlu");
        assert_eq!(truncate("ok", 10), "ok");
    }
}
