//! services/api/src/web/chat_task.rs
//!
//! The tutoring side of a capture connection: opening a chat on the confirmed
//! problem, fetching Socratic replies, and filing the finished chat as an error.
//!
//! Each function returns the message to send instead of sending it, so the
//! connection loop stays the only writer for chat traffic.

use crate::web::{
    protocol::ServerMessage,
    state::{AppState, CaptureSession, ChatState},
};
use socrates_core::{CoreError, Role, Subject, TurnState, TutoringSession};
use tracing::{info, warn};

fn no_chat() -> CoreError {
    CoreError::ProtocolViolation("no tutoring session is open".to_string())
}

/// Opens a chat on the confirmed text. Replaces any chat still open.
pub fn start_chat(
    app_state: &AppState,
    capture: &mut CaptureSession,
    subject: &str,
    text: String,
) -> ServerMessage {
    let started = subject.parse::<Subject>().and_then(|subject| {
        TutoringSession::start(text, app_state.book.now()).map(|session| ChatState { subject, session })
    });

    match started {
        Ok(chat) => {
            if capture.chat.is_some() {
                info!(student_id = %capture.student_id, "Discarding the unfinished tutoring session.");
            }
            capture.chat = Some(chat);
            ServerMessage::SessionStarted
        }
        Err(e) => ServerMessage::error(&e),
    }
}

/// Records the student's turn and asks the tutor to answer it.
pub async fn user_message(
    app_state: &AppState,
    capture: &mut CaptureSession,
    text: String,
) -> ServerMessage {
    let Some(chat) = capture.chat.as_mut() else {
        return ServerMessage::error(&no_chat());
    };
    if let Err(e) = chat.session.append_user_message(text, app_state.book.now()) {
        return ServerMessage::error(&e);
    }
    request_reply(app_state, chat).await
}

/// Asks again after a failed reply; the student's turn is already recorded.
pub async fn retry_reply(app_state: &AppState, capture: &mut CaptureSession) -> ServerMessage {
    match capture.chat.as_mut() {
        Some(chat) => request_reply(app_state, chat).await,
        None => ServerMessage::error(&no_chat()),
    }
}

/// One tutor call, bounded by the configured timeout.
///
/// On failure the session stays awaiting the assistant, so `retry_reply` can try again.
/// Asking for a reply out of turn aborts the session.
async fn request_reply(app_state: &AppState, chat: &mut ChatState) -> ServerMessage {
    if let Err(e) = chat
        .session
        .expect_turn(TurnState::AwaitingAssistant, Role::Assistant)
    {
        return ServerMessage::error(&e);
    }

    let limit = app_state.config.recognition.timeout;
    let conversation = chat.session.visible_messages();
    let reply = tokio::time::timeout(
        limit,
        app_state.tutor.reply(
            app_state.config.tutor_theme,
            chat.session.problem_text(),
            &conversation,
        ),
    )
    .await;

    let text = match reply {
        Ok(Ok(text)) => text,
        Ok(Err(e)) => {
            warn!("Tutor reply failed: {}", e);
            return ServerMessage::error(&CoreError::from_service(e));
        }
        Err(_) => {
            warn!("Tutor reply timed out after {:?}.", limit);
            return ServerMessage::error(&CoreError::Timeout(limit));
        }
    };

    match chat
        .session
        .append_assistant_reply(text.as_str(), app_state.book.now())
    {
        Ok(()) => ServerMessage::AssistantReply { text },
        Err(e) => ServerMessage::error(&e),
    }
}

/// Finalizes the chat and stores the error with its first review.
///
/// Classification is bounded by the book's classify timeout. The chat is kept
/// when classifying or storing fails; finalizing again reuses a stored
/// classification, so a retried `finish` never classifies twice.
pub async fn finish_chat(app_state: &AppState, capture: &mut CaptureSession) -> ServerMessage {
    let Some(chat) = capture.chat.as_mut() else {
        return ServerMessage::error(&no_chat());
    };

    let recorded = app_state
        .book
        .record_error(
            capture.student_id,
            chat.subject,
            &mut chat.session,
            app_state.classifier.as_ref(),
        )
        .await;

    match recorded {
        Ok((record, schedule)) => {
            capture.chat = None;
            ServerMessage::ErrorRecorded {
                error_id: record.id,
                schedule_id: schedule.id,
                concept_tags: record.concept_tags().to_vec(),
                difficulty: record.difficulty().map(|d| d.value()),
                next_due_at: schedule.next_due_at,
            }
        }
        Err(e) => {
            warn!(student_id = %capture.student_id, "Could not file the tutoring session: {}", e);
            ServerMessage::error(&e)
        }
    }
}
