//! services/api/src/web/recognition_task.rs
//!
//! This module contains the asynchronous "worker" function that relays one
//! recognition job's updates to the client.

use crate::web::{protocol::ServerMessage, state::WsSender};
use axum::extract::ws::Message;
use futures::SinkExt;
use socrates_core::{JobUpdate, RecognitionHandle};
use tracing::{debug, error, info};
use uuid::Uuid;

/// Translates a job update into the message the client sees.
pub fn update_message(job_id: Uuid, update: &JobUpdate) -> ServerMessage {
    match update {
        JobUpdate::Progress(milestone) => ServerMessage::progress(job_id, *milestone),
        JobUpdate::Succeeded(text) => ServerMessage::RecognitionSucceeded {
            job_id,
            text: text.clone(),
        },
        JobUpdate::Failed(err) => ServerMessage::RecognitionFailed {
            job_id,
            kind: err.kind().as_str().to_string(),
            message: err.to_string(),
        },
        JobUpdate::Cancelled => ServerMessage::RecognitionCancelled { job_id },
    }
}

/// Serializes and sends one message. Returns `false` once the client is gone.
pub async fn send_message(ws_sender: &WsSender, msg: &ServerMessage) -> bool {
    let json = match serde_json::to_string(msg) {
        Ok(json) => json,
        Err(e) => {
            error!("Failed to serialize server message: {}", e);
            return true;
        }
    };
    ws_sender
        .lock()
        .await
        .send(Message::Text(json.into()))
        .await
        .is_ok()
}

/// Streams every update of the job until it reaches a terminal state.
///
/// A newer capture cancels this job through the pipeline, so the last
/// message relayed here is then `recognition_cancelled`.
pub async fn recognition_process(mut handle: RecognitionHandle, ws_sender: WsSender) {
    let job_id = handle.id();
    info!(job_id = %job_id, "Relaying recognition job.");

    while let Some(update) = handle.next_update().await {
        debug!(job_id = %job_id, ?update, "Recognition update.");
        if !send_message(&ws_sender, &update_message(job_id, &update)).await {
            error!("Failed to send recognition update to client. Cancelling job.");
            handle.cancel();
            break;
        }
    }

    info!(job_id = %job_id, status = ?handle.job().status, "Recognition job finished.");
}

#[cfg(test)]
mod tests {
    use super::*;
    use socrates_core::{CoreError, Milestone};
    use std::time::Duration;

    #[test]
    fn terminal_updates_map_to_their_messages() {
        let job_id = Uuid::new_v4();
        assert_eq!(
            update_message(job_id, &JobUpdate::Succeeded("x + 1 = 2".into())),
            ServerMessage::RecognitionSucceeded { job_id, text: "x + 1 = 2".into() }
        );
        assert_eq!(
            update_message(job_id, &JobUpdate::Cancelled),
            ServerMessage::RecognitionCancelled { job_id }
        );
        match update_message(job_id, &JobUpdate::Failed(CoreError::Timeout(Duration::from_secs(60))))
        {
            ServerMessage::RecognitionFailed { kind, .. } => assert_eq!(kind, "timeout"),
            other => panic!("unexpected message {:?}", other),
        }
    }

    #[test]
    fn progress_keeps_the_milestone_percent() {
        let job_id = Uuid::new_v4();
        assert_eq!(
            update_message(job_id, &JobUpdate::Progress(Milestone::Uploading)),
            ServerMessage::RecognitionProgress {
                job_id,
                milestone: "uploading".into(),
                percent: 30,
            }
        );
    }
}
