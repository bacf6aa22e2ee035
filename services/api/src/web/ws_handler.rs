//! services/api/src/web/ws_handler.rs
//!
//! This is the main entry point and control loop for a capture WebSocket connection.
//! It owns the connection's recognition pipeline and tutoring chat and delegates work
//! to the recognition relay task and the chat functions.

use crate::web::{
    chat_task::{finish_chat, retry_reply, start_chat, user_message},
    protocol::{ClientMessage, ServerMessage},
    recognition_task::{recognition_process, send_message},
    state::{AppState, CaptureSession, WsSender},
};
use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    response::Response,
};
use bytes::Bytes;
use futures::stream::StreamExt;
use serde::Deserialize;
use socrates_core::{CoreError, ImagePayload};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Identifies the student the connection captures errors for.
#[derive(Deserialize, Debug)]
pub struct CaptureParams {
    pub student_id: Uuid,
}

/// The handler for upgrading HTTP requests to WebSocket connections.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(app_state): State<Arc<AppState>>,
    Query(params): Query<CaptureParams>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, app_state, params.student_id))
}

async fn handle_socket(socket: WebSocket, app_state: Arc<AppState>, student_id: Uuid) {
    info!(student_id = %student_id, "New capture connection established.");

    // The sender is shared with the recognition relay task.
    let (sender, mut receiver) = socket.split();
    let ws_sender: WsSender = Arc::new(Mutex::new(sender));

    let mut capture = CaptureSession::new(&app_state, student_id);

    // --- Main Message Loop ---
    loop {
        let Some(Ok(msg)) = receiver.next().await else {
            info!("Client disconnected.");
            break;
        };

        let reply = match msg {
            Message::Text(text) => {
                handle_text_message(text.as_str(), &app_state, &mut capture, &ws_sender).await
            }
            Message::Binary(data) => handle_image(data, &mut capture, &ws_sender).await,
            Message::Close(_) => {
                info!("Client sent close message.");
                break;
            }
            _ => None,
        };

        if let Some(reply) = reply {
            if !send_message(&ws_sender, &reply).await {
                error!("Failed to send reply to client.");
                break;
            }
        }
    }

    // --- Cleanup ---
    capture.pipeline.cancel_active().await;
    if let Some(handle) = capture.forward_task.take() {
        handle.abort();
    }
    info!(student_id = %student_id, "Capture connection closed.");
}

/// Helper function to handle the logic for different `ClientMessage` variants.
///
/// Returns the message to answer with, if any. Recognition updates are sent by
/// the relay task instead.
async fn handle_text_message(
    text: &str,
    app_state: &Arc<AppState>,
    capture: &mut CaptureSession,
    ws_sender: &WsSender,
) -> Option<ServerMessage> {
    let client_msg = match serde_json::from_str::<ClientMessage>(text) {
        Ok(client_msg) => client_msg,
        Err(e) => {
            warn!("Failed to deserialize client message: {}", e);
            return Some(ServerMessage::error(&CoreError::Validation(format!(
                "unreadable message: {}",
                e
            ))));
        }
    };

    match client_msg {
        ClientMessage::Capture { mime_type } => {
            if capture.pending_mime.replace(mime_type).is_some() {
                warn!("Capture announced twice without an image; keeping the latest.");
            }
            None
        }
        ClientMessage::Cancel => {
            info!("Cancel message received. Cancelling active recognition job.");
            capture.pipeline.cancel_active().await;
            None
        }
        ClientMessage::Probe => {
            let pipeline = capture.pipeline.clone();
            let ws_sender = ws_sender.clone();
            // A probe may take as long as a recognition; keep the loop responsive.
            tokio::spawn(async move {
                let available = pipeline.is_available().await;
                send_message(&ws_sender, &ServerMessage::Availability { available }).await;
            });
            None
        }
        ClientMessage::ConfirmText { subject, text } => {
            Some(start_chat(app_state, capture, &subject, text))
        }
        ClientMessage::UserMessage { text } => Some(user_message(app_state, capture, text).await),
        ClientMessage::RetryReply => Some(retry_reply(app_state, capture).await),
        ClientMessage::Finish => Some(finish_chat(app_state, capture).await),
    }
}

/// Submits the binary frame that follows a `capture` message.
async fn handle_image(
    data: Bytes,
    capture: &mut CaptureSession,
    ws_sender: &WsSender,
) -> Option<ServerMessage> {
    let Some(mime_type) = capture.pending_mime.take() else {
        warn!("Received an image without a capture message.");
        return Some(ServerMessage::error(&CoreError::ProtocolViolation(
            "send a capture message before the image".to_string(),
        )));
    };

    match capture.pipeline.submit(ImagePayload::new(mime_type, data)).await {
        Ok(handle) => {
            // The pipeline already cancelled the previous job; its relay ends on its own.
            let task = tokio::spawn(recognition_process(handle, ws_sender.clone()));
            capture.forward_task = Some(task);
            None
        }
        Err(e) => {
            warn!("Rejected captured image: {}", e);
            Some(ServerMessage::error(&e))
        }
    }
}
