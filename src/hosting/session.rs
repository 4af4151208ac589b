use crate::gameroom::Room;
use crate::gameroom::RoomManager;
use crate::protocol::Envelope;
use crate::protocol::MoveInput;
use crate::protocol::PlaceInput;
use crate::protocol::envelope;
use crate::protocol::sanitize_name;
use crate::protocol::sanitize_room_id;
use crate::settings::Settings;
use actix_ws::Message;
use actix_ws::MessageStream;
use actix_ws::Session;
use futures::StreamExt;
use serde_json::Value;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::mpsc::unbounded_channel;

/// Per-client state machine: hello handshake, join, welcome, then a
/// biased pump that drains room broadcasts into the socket and dispatches
/// inbound messages by type. The room never sees the socket; it sees the
/// channel, and this task is the bridge. Teardown always removes the
/// player.
pub async fn run(
    mut session: Session,
    mut stream: MessageStream,
    rooms: Arc<RoomManager>,
    settings: Arc<Settings>,
    ip: String,
) {
    let Some(hello) = await_hello(&mut session, &mut stream).await else {
        return;
    };
    let name = sanitize_name(hello.get("name").and_then(Value::as_str));
    let room_id = sanitize_room_id(hello.get("room_id").and_then(Value::as_str));
    let room = rooms.get_or_create(&room_id).await;
    let (tx, mut rx) = unbounded_channel::<String>();
    let player_id = match room.add_player(tx, &name, &ip).await {
        Ok(player_id) => player_id,
        Err(e) => {
            let _ = session
                .text(envelope("event.error", &json!({ "code": e.to_string() })))
                .await;
            let _ = session.close(None).await;
            return;
        }
    };
    log::info!("{} joined room {} as {}", name, room_id, player_id);
    let welcome = envelope(
        "welcome",
        &json!({ "player_id": player_id, "room_id": room_id, "phase": room.phase() }),
    );
    if session.text(welcome).await.is_err() {
        room.remove_player(&player_id).await;
        return;
    }
    let history = room.get_chat_history().await;
    if !history.is_empty() {
        let message = envelope("chat.history", &json!({ "messages": history }));
        if session.text(message).await.is_err() {
            room.remove_player(&player_id).await;
            return;
        }
    }
    'sesh: loop {
        tokio::select! {
            biased;
            outbound = rx.recv() => match outbound {
                Some(json) => if session.text(json).await.is_err() { break 'sesh },
                None => break 'sesh,
            },
            inbound = stream.next() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    dispatch(&room, &player_id, &settings, &text, &mut session).await;
                }
                Some(Ok(Message::Ping(bytes))) => {
                    let _ = session.pong(&bytes).await;
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break 'sesh,
                Some(Ok(_)) => continue 'sesh,
            },
        }
    }
    room.remove_player(&player_id).await;
    let _ = session.close(None).await;
    log::info!("{} left room {}", player_id, room_id);
}

/// The first message must be a `hello`; anything else is answered with
/// `event.error{bad_hello}` and the socket is closed. Returns the hello
/// payload.
async fn await_hello(session: &mut Session, stream: &mut MessageStream) -> Option<Value> {
    loop {
        match stream.next().await {
            Some(Ok(Message::Text(text))) => {
                return match serde_json::from_str::<Envelope>(&text) {
                    Ok(env) if env.kind == "hello" => Some(env.payload),
                    _ => {
                        reject(session.clone(), "bad_hello").await;
                        None
                    }
                };
            }
            Some(Ok(Message::Ping(bytes))) => {
                let _ = session.pong(&bytes).await;
            }
            Some(Ok(Message::Pong(_) | Message::Nop)) => {}
            Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return None,
            Some(Ok(_)) => {
                reject(session.clone(), "bad_hello").await;
                return None;
            }
        }
    }
}

async fn dispatch(
    room: &Arc<Room>,
    player_id: &str,
    settings: &Settings,
    raw: &str,
    session: &mut Session,
) {
    let Ok(env) = serde_json::from_str::<Envelope>(raw) else {
        notice(session, &json!({ "code": "bad_payload" })).await;
        return;
    };
    match env.kind.as_str() {
        "set_name" => {
            let name = sanitize_name(env.payload.get("name").and_then(Value::as_str));
            room.set_name(player_id, &name).await;
        }
        "input.move" => match serde_json::from_value::<MoveInput>(env.payload) {
            Ok(input) => room.submit_move_input(player_id, &input).await,
            Err(_) => notice(session, &json!({ "code": "bad_payload", "type": "input.move" })).await,
        },
        "player.cosmetic" => {
            let hat = env.payload.get("hat").and_then(Value::as_bool);
            room.set_cosmetic(player_id, hat).await;
        }
        "tree.place" => match serde_json::from_value::<PlaceInput>(env.payload) {
            Ok(input) => room.place_decoration(player_id, &input).await,
            Err(_) => notice(session, &json!({ "code": "bad_payload", "type": "tree.place" })).await,
        },
        "chat.send" => {
            if let Some(text) = env.payload.get("text").and_then(Value::as_str) {
                room.send_chat(player_id, text).await;
            }
        }
        "chat.clear" => {
            if authorize_clear(&env.payload, &settings.admin_password) {
                room.clear_chat().await;
            } else {
                notice(session, &json!({ "code": "wrong_password" })).await;
            }
        }
        other => notice(session, &json!({ "code": "unknown_type", "type": other })).await,
    }
}

/// The one privileged client operation. The room trusts its caller, so
/// this boundary is where the password is checked; anything that is not
/// the exact admin password string denies.
fn authorize_clear(payload: &Value, admin_password: &str) -> bool {
    payload
        .get("password")
        .and_then(Value::as_str)
        .unwrap_or_default()
        == admin_password
}

async fn reject(mut session: Session, code: &str) {
    let _ = session
        .text(envelope("event.error", &json!({ "code": code })))
        .await;
    let _ = session.close(None).await;
}

async fn notice(session: &mut Session, payload: &Value) {
    let _ = session.text(envelope("event.notice", payload)).await;
}
