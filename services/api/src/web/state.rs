//! services/api/src/web/state.rs
//!
//! Defines the application's shared and connection-specific states.

use crate::config::Config;
use axum::extract::ws::{Message, WebSocket};
use futures::stream::SplitSink;
use socrates_core::{
    ClassificationService, ErrorBook, RecognitionPipeline, RecognitionService, Subject,
    TutorService, TutoringSession,
};
use std::sync::Arc;
use tokio::{sync::Mutex, task::JoinHandle};
use uuid::Uuid;

/// The write half of a WebSocket, shared between the connection loop and its tasks.
pub type WsSender = Arc<Mutex<SplitSink<WebSocket, Message>>>;

//=========================================================================================
// AppState (Shared Across All Connections)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub book: Arc<ErrorBook>,
    pub config: Arc<Config>,
    pub recognizer: Arc<dyn RecognitionService>,
    pub classifier: Arc<dyn ClassificationService>,
    pub tutor: Arc<dyn TutorService>,
}

//=========================================================================================
// CaptureSession (Specific to One WebSocket Connection)
//=========================================================================================

/// The tutoring chat opened by a confirmed capture.
pub struct ChatState {
    pub subject: Subject,
    pub session: TutoringSession,
}

/// The state for a single capture connection.
pub struct CaptureSession {
    pub student_id: Uuid,
    /// One pipeline per connection, so a new capture replaces only this student's job.
    pub pipeline: Arc<RecognitionPipeline>,
    /// Set by a `capture` message; the next binary frame is the image.
    pub pending_mime: Option<String>,
    pub chat: Option<ChatState>,
    /// The task forwarding updates of the latest recognition job.
    pub forward_task: Option<JoinHandle<()>>,
}

impl CaptureSession {
    pub fn new(app_state: &AppState, student_id: Uuid) -> Self {
        Self {
            student_id,
            pipeline: Arc::new(RecognitionPipeline::new(
                app_state.recognizer.clone(),
                app_state.config.recognition.clone(),
            )),
            pending_mime: None,
            chat: None,
            forward_task: None,
        }
    }
}
