mod common;

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use axum::http::StatusCode;
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use common::{admin_token, create_room, register, send, test_state};
use umbra_api::auth::AppState;
use umbra_api::routes::router;
use umbra_types::events::GatewayEvent;

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn serve(state: AppState) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router(state)).await.unwrap();
    });
    addr
}

/// Next JSON text frame, skipping heartbeat pings.
async fn next_json(client: &mut Client) -> Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), client.next())
            .await
            .expect("timed out waiting for gateway event")
            .expect("gateway closed")
            .expect("gateway error");
        if let Message::Text(text) = msg {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

#[tokio::test]
async fn upgrade_without_token_is_unauthorized() {
    let addr = serve(test_state()).await;

    for url in [format!("ws://{addr}/ws"), format!("ws://{addr}/ws?token=garbage")] {
        match connect_async(url).await {
            Err(tungstenite::Error::Http(resp)) => assert_eq!(resp.status(), 401),
            other => panic!("expected 401, got {:?}", other.map(|(_, resp)| resp.status())),
        }
    }
}

#[tokio::test]
async fn acknowledges_commands_and_delivers_room_events() {
    let state = test_state();
    let app = router(state.clone());
    let player = register(&app, &state, "ginny").await;
    let admin = admin_token(&state, "headmaster");
    let room_id = create_room(&app, &admin, "Doupě", "Zahrada", None).await;
    let locked_id = create_room(&app, &admin, "Bradavice", "Ředitelna", Some("citronova")).await;
    let addr = serve(state.clone()).await;

    let (mut client, _) = connect_async(format!("ws://{addr}/ws?token={}", player.token))
        .await
        .unwrap();

    client
        .send(Message::text(r#"{"type":"authenticate"}"#))
        .await
        .unwrap();
    let ack = next_json(&mut client).await;
    assert_eq!(ack["type"], "authenticated");
    assert_eq!(ack["success"], true);
    let (status, stats) = send(&app, "GET", "/api/admin/stats", Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["gatewayConnections"], 1);

    // Joining needs a prior REST enter
    client.send(Message::text("not json")).await.unwrap();
    client
        .send(Message::text(format!(r#"{{"type":"join_room","roomId":{locked_id}}}"#)))
        .await
        .unwrap();
    let denied = next_json(&mut client).await;
    assert_eq!(denied["type"], "join_denied");
    assert_eq!(denied["roomId"], locked_id);

    let (status, _) = send(&app, "POST", &format!("/api/chat/rooms/{room_id}/enter"), Some(&player.token), None).await;
    assert_eq!(status, StatusCode::OK);
    client
        .send(Message::text(format!(r#"{{"type":"join_room","roomId":{room_id}}}"#)))
        .await
        .unwrap();
    let joined = next_json(&mut client).await;
    assert_eq!(joined["type"], "room_joined");
    assert_eq!(joined["roomId"], room_id);

    // Only the subscribed room is forwarded
    state.dispatcher.broadcast(GatewayEvent::RoomCleared { room_id: locked_id });
    let req = json!({ "characterId": player.character_id, "content": "Bat-Bogey Hex incoming" });
    let (status, _) = send(&app, "POST", &format!("/api/chat/{room_id}/messages"), Some(&player.token), Some(req)).await;
    assert_eq!(status, StatusCode::CREATED);
    let created = next_json(&mut client).await;
    assert_eq!(created["type"], "message_created");
    assert_eq!(created["roomId"], room_id);
    assert_eq!(created["message"]["content"], "Bat-Bogey Hex incoming");

    client
        .send(Message::text(format!(r#"{{"type":"leave_room","roomId":{room_id}}}"#)))
        .await
        .unwrap();
    let left = next_json(&mut client).await;
    assert_eq!(left["type"], "room_left");

    client.close(None).await.unwrap();
    for _ in 0..50 {
        if state.dispatcher.connection_count().await == 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("connection was not unregistered after close");
}
