//! services/api/src/web/protocol.rs
//!
//! Defines the WebSocket message protocol between the capture client and the API server:
//! photographing a problem, confirming its text, and the Socratic chat about it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use socrates_core::{CoreError, Milestone};
use uuid::Uuid;

//=========================================================================================
// Messages Sent FROM the Client TO the Server
//=========================================================================================
// NOTE: The photographed image is sent as one raw Binary frame right after `Capture`.
//=========================================================================================

/// Represents the structured text messages a client can send to the server.
#[derive(Deserialize, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Announces the next binary frame as an image of the given type.
    Capture { mime_type: String },

    /// Cancels the recognition job currently in flight.
    Cancel,

    /// Asks whether the recognition backend is reachable.
    Probe,

    /// The student accepted (possibly edited) text; starts the tutoring chat.
    ConfirmText { subject: String, text: String },

    /// One student turn in the tutoring chat.
    UserMessage { text: String },

    /// Asks the tutor again after a failed or timed-out reply.
    RetryReply,

    /// Ends the chat and files the error for review.
    Finish,
}

//=========================================================================================
// Messages Sent FROM the Server TO the Client
//=========================================================================================

/// Represents the structured text messages the server can send to the client.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    RecognitionProgress {
        job_id: Uuid,
        milestone: String,
        percent: u8,
    },

    RecognitionSucceeded { job_id: Uuid, text: String },

    /// `kind` is one of the stable error kinds, so the client can offer a retry.
    RecognitionFailed {
        job_id: Uuid,
        kind: String,
        message: String,
    },

    RecognitionCancelled { job_id: Uuid },

    Availability { available: bool },

    /// The tutoring chat is ready for the first student turn.
    SessionStarted,

    AssistantReply { text: String },

    /// The finished session was filed with its first review scheduled.
    ErrorRecorded {
        error_id: Uuid,
        schedule_id: Uuid,
        concept_tags: Vec<String>,
        difficulty: Option<u8>,
        next_due_at: Option<DateTime<Utc>>,
    },

    /// Reports a recoverable problem with the last client message.
    Error { kind: String, message: String },
}

impl ServerMessage {
    pub fn progress(job_id: Uuid, milestone: Milestone) -> Self {
        ServerMessage::RecognitionProgress {
            job_id,
            milestone: milestone.as_str().to_string(),
            percent: milestone.percent(),
        }
    }

    pub fn error(err: &CoreError) -> Self {
        ServerMessage::Error {
            kind: err.kind().as_str().to_string(),
            message: err.to_string(),
        }
    }
}
