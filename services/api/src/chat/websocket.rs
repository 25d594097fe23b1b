use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::Response,
};
use futures::{
    sink::SinkExt,
    stream::{SplitSink, StreamExt},
};
use kivendi_auth::CurrentUser;
use kivendi_common::AppError;
use kivendi_database::Conversation;
use serde_json::json;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, sleep, Instant, MissedTickBehavior};

use super::hub::ClientHandle;
use super::models::InboundFrame;
use super::service::SendOutcome;
use crate::AppState;

const WRITER_GRACE: Duration = Duration::from_secs(5);

enum SocketRole {
    Conversation(Conversation),
    Notifications,
}

pub async fn conversation_socket(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    user: CurrentUser,
    Path(conversation_id): Path<i64>,
) -> Result<Response, AppError> {
    let conversation = state
        .conversations
        .participant_conversation(conversation_id, user.user_id)
        .await?;

    let max_frame = state.config.websocket.max_frame_bytes;
    Ok(ws
        .max_message_size(max_frame)
        .on_upgrade(move |socket| async move {
            let (handle, outbound) = state.hub.client(user.user_id);
            state.hub.register(conversation.id, handle.clone()).await;
            tracing::info!(conversation_id = conversation.id, user_id = user.user_id, "chat socket opened");

            let conversation_id = conversation.id;
            run_socket(socket, &state, handle, outbound, SocketRole::Conversation(conversation)).await;
            tracing::info!(conversation_id, user_id = user.user_id, "chat socket closed");
        }))
}

pub async fn notifications_socket(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    user: CurrentUser,
) -> Response {
    ws.on_upgrade(move |socket| async move {
        let (handle, outbound) = state.hub.client(user.user_id);
        state.hub.register_notifications(handle.clone()).await;
        tracing::info!(user_id = user.user_id, "notification socket opened");

        run_socket(socket, &state, handle, outbound, SocketRole::Notifications).await;
        tracing::info!(user_id = user.user_id, "notification socket closed");
    })
}

/// Drives one socket until the peer leaves, the read deadline passes or the
/// hub drops the client, then removes it from the hub.
async fn run_socket(
    socket: WebSocket,
    state: &AppState,
    handle: ClientHandle,
    outbound: mpsc::Receiver<Message>,
    role: SocketRole,
) {
    let (sink, mut inbound) = socket.split();
    let writer = tokio::spawn(write_frames(sink, outbound));

    let read_deadline = state.config.websocket.read_deadline();
    let deadline = sleep(read_deadline);
    tokio::pin!(deadline);

    let mut heartbeat = interval(state.config.websocket.heartbeat());
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
    heartbeat.tick().await;

    loop {
        tokio::select! {
            frame = inbound.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        deadline.as_mut().reset(Instant::now() + read_deadline);
                        match &role {
                            SocketRole::Conversation(conversation) => {
                                handle_chat_frame(state, conversation, &handle, &text).await;
                            }
                            SocketRole::Notifications => {
                                tracing::debug!(user_id = handle.user_id, "ignoring frame on notification socket");
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {
                        deadline.as_mut().reset(Instant::now() + read_deadline);
                    }
                    Some(Err(e)) => {
                        tracing::debug!(user_id = handle.user_id, error = %e, "socket read failed");
                        break;
                    }
                }
            }
            _ = heartbeat.tick() => {
                // A full queue means the client is already lagging; the hub handles that.
                let _ = handle.try_send(Message::Ping(Vec::new()));
            }
            _ = handle.closed() => {
                tracing::debug!(user_id = handle.user_id, "socket closed by hub");
                break;
            }
            _ = &mut deadline => {
                tracing::info!(user_id = handle.user_id, "closing idle socket");
                break;
            }
        }
    }

    match &role {
        SocketRole::Conversation(conversation) => state.hub.unregister(conversation.id, handle.id).await,
        SocketRole::Notifications => state.hub.unregister_notifications(handle.user_id, handle.id).await,
    }

    // With the hub copy gone this is the last sender; dropping it lets the
    // writer flush what is queued and close the socket.
    drop(handle);
    if tokio::time::timeout(WRITER_GRACE, writer).await.is_err() {
        tracing::debug!("socket writer did not finish in time");
    }
}

async fn write_frames(mut sink: SplitSink<WebSocket, Message>, mut outbound: mpsc::Receiver<Message>) {
    while let Some(frame) = outbound.recv().await {
        if sink.send(frame).await.is_err() {
            break;
        }
    }
    let _ = sink.close().await;
}

async fn handle_chat_frame(state: &AppState, conversation: &Conversation, handle: &ClientHandle, text: &str) {
    let frame: InboundFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            send_error(handle, "VALIDATION_ERROR", &format!("Invalid frame: {}", e));
            return;
        }
    };

    match state.conversations.send_message(conversation, handle.user_id, frame).await {
        Ok(SendOutcome::Delivered(_)) | Ok(SendOutcome::Dropped) => {}
        Err(e) => {
            if e.status_code() >= 500 {
                tracing::error!(conversation_id = conversation.id, user_id = handle.user_id, error = %e, "failed to store message");
            }
            let body = e.to_api_error();
            send_error(handle, &body.error_code, &body.message);
        }
    }
}

fn send_error(handle: &ClientHandle, tag: &str, message: &str) {
    let frame = json!({ "type": "error", "error": tag, "message": message });
    if !handle.try_send(Message::Text(frame.to_string())) {
        tracing::debug!(user_id = handle.user_id, "could not deliver error frame");
    }
}
