//! crates/socrates_core/src/recognition.rs
//!
//! The Recognition Pipeline: turns a captured image into recognized text.
//!
//! One pipeline instance backs one capture surface. Each submission spawns a
//! worker task that reports coarse milestones over a channel and is bounded by
//! a fixed timeout. Submitting again cancels the previous job, and a cancelled
//! job's handle never reports anything but `Cancelled` afterwards, whatever the
//! superseded network call eventually returns.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::{ImageEncoding, ImagePayload};
use crate::error::CoreError;
use crate::ports::RecognitionService;

//=========================================================================================
// Settings
//=========================================================================================

#[derive(Debug, Clone)]
pub struct RecognitionSettings {
    pub max_image_bytes: usize,
    pub accepted_encodings: Vec<ImageEncoding>,
    pub timeout: Duration,
}

impl Default for RecognitionSettings {
    fn default() -> Self {
        Self {
            max_image_bytes: 10 * 1024 * 1024,
            accepted_encodings: vec![ImageEncoding::Jpeg, ImageEncoding::Png, ImageEncoding::Webp],
            timeout: Duration::from_secs(60),
        }
    }
}

//=========================================================================================
// Job State
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Idle,
    Processing,
    Success,
    Error,
    Cancelled,
}

/// Coarse progress points; the backend offers nothing finer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Milestone {
    Queued,
    Uploading,
    Recognizing,
    Finalizing,
}

impl Milestone {
    pub fn percent(&self) -> u8 {
        match self {
            Milestone::Queued => 10,
            Milestone::Uploading => 30,
            Milestone::Recognizing => 60,
            Milestone::Finalizing => 90,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Milestone::Queued => "queued",
            Milestone::Uploading => "uploading",
            Milestone::Recognizing => "recognizing",
            Milestone::Finalizing => "finalizing",
        }
    }
}

/// One observable step of a job.
#[derive(Debug, Clone, PartialEq)]
pub enum JobUpdate {
    Progress(Milestone),
    Succeeded(String),
    Failed(CoreError),
    Cancelled,
}

impl JobUpdate {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobUpdate::Progress(_))
    }
}

/// Snapshot of one in-flight recognition attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct RecognitionJob {
    pub id: Uuid,
    pub status: JobStatus,
    pub progress: u8,
    pub text: Option<String>,
    pub error: Option<CoreError>,
}

impl RecognitionJob {
    fn new(id: Uuid) -> Self {
        Self {
            id,
            status: JobStatus::Idle,
            progress: 0,
            text: None,
            error: None,
        }
    }

    fn apply(&mut self, update: &JobUpdate) {
        match update {
            JobUpdate::Progress(milestone) => {
                self.status = JobStatus::Processing;
                self.progress = self.progress.max(milestone.percent());
            }
            JobUpdate::Succeeded(text) => {
                self.status = JobStatus::Success;
                self.progress = 100;
                self.text = Some(text.clone());
            }
            JobUpdate::Failed(err) => {
                self.status = JobStatus::Error;
                self.error = Some(err.clone());
            }
            JobUpdate::Cancelled => {
                self.status = JobStatus::Cancelled;
            }
        }
    }
}

//=========================================================================================
// Job Handle
//=========================================================================================

/// The consumer's side of a submitted job.
pub struct RecognitionHandle {
    job: RecognitionJob,
    token: CancellationToken,
    updates: mpsc::Receiver<JobUpdate>,
    finished: bool,
}

impl RecognitionHandle {
    pub fn id(&self) -> Uuid {
        self.job.id
    }

    pub fn job(&self) -> &RecognitionJob {
        &self.job
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Waits for the next update. Returns `None` after the terminal update.
    ///
    /// The cancellation token is authoritative: once it fires, the next call
    /// yields `Cancelled` and anything still queued from the worker is dropped.
    pub async fn next_update(&mut self) -> Option<JobUpdate> {
        if self.finished {
            return None;
        }

        let update = tokio::select! {
            biased;
            _ = self.token.cancelled() => JobUpdate::Cancelled,
            received = self.updates.recv() => match received {
                Some(update) => update,
                // The worker only exits silently after cancellation.
                None => JobUpdate::Cancelled,
            },
        };

        if update.is_terminal() {
            self.finished = true;
            self.updates.close();
        }
        self.job.apply(&update);
        Some(update)
    }

    /// Drains updates until the job reaches a terminal state.
    pub async fn wait(mut self) -> RecognitionJob {
        while self.next_update().await.is_some() {}
        self.job
    }
}

//=========================================================================================
// The Pipeline
//=========================================================================================

pub struct RecognitionPipeline {
    service: Arc<dyn RecognitionService>,
    settings: RecognitionSettings,
    active: Mutex<Option<CancellationToken>>,
}

impl RecognitionPipeline {
    pub fn new(service: Arc<dyn RecognitionService>, settings: RecognitionSettings) -> Self {
        Self {
            service,
            settings,
            active: Mutex::new(None),
        }
    }

    pub fn settings(&self) -> &RecognitionSettings {
        &self.settings
    }

    /// Rejects unsupported or oversized images before anything else happens.
    pub fn validate(&self, image: &ImagePayload) -> Result<ImageEncoding, CoreError> {
        let encoding = ImageEncoding::from_mime(&image.mime_type)
            .filter(|e| self.settings.accepted_encodings.contains(e))
            .ok_or_else(|| {
                CoreError::Validation(format!("unsupported image type '{}'", image.mime_type))
            })?;

        if image.bytes.is_empty() {
            return Err(CoreError::Validation("image is empty".to_string()));
        }
        if image.bytes.len() > self.settings.max_image_bytes {
            return Err(CoreError::Validation(format!(
                "image is {} bytes, the limit is {} bytes",
                image.bytes.len(),
                self.settings.max_image_bytes
            )));
        }
        Ok(encoding)
    }

    /// Starts a recognition job, cancelling whichever job was active before.
    pub async fn submit(&self, image: ImagePayload) -> Result<RecognitionHandle, CoreError> {
        self.validate(&image)?;

        let token = CancellationToken::new();
        {
            let mut active = self.active.lock().await;
            if let Some(previous) = active.replace(token.clone()) {
                previous.cancel();
            }
        }

        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(8);
        info!(job_id = %id, bytes = image.bytes.len(), "Recognition job submitted.");

        tokio::spawn(run_job(
            id,
            self.service.clone(),
            image,
            self.settings.timeout,
            token.clone(),
            tx,
        ));

        Ok(RecognitionHandle {
            job: RecognitionJob::new(id),
            token,
            updates: rx,
            finished: false,
        })
    }

    pub fn cancel(&self, handle: &RecognitionHandle) {
        handle.cancel();
    }

    /// Cancels the active job, if any.
    pub async fn cancel_active(&self) {
        if let Some(token) = self.active.lock().await.take() {
            token.cancel();
        }
    }

    /// Whether the recognition backend looks reachable. Never fails.
    pub async fn is_available(&self) -> bool {
        match tokio::time::timeout(self.settings.timeout, self.service.probe()).await {
            Ok(Ok(available)) => available,
            Ok(Err(e)) => {
                warn!("Recognition availability probe failed: {}", e);
                false
            }
            Err(_) => {
                warn!("Recognition availability probe timed out.");
                false
            }
        }
    }
}

//=========================================================================================
// The Worker Task
//=========================================================================================

/// Sends one update unless the job was cancelled. Returns `false` when the job should stop.
async fn checkpoint(
    token: &CancellationToken,
    tx: &mpsc::Sender<JobUpdate>,
    update: JobUpdate,
) -> bool {
    if token.is_cancelled() {
        return false;
    }
    tx.send(update).await.is_ok()
}

async fn run_job(
    id: Uuid,
    service: Arc<dyn RecognitionService>,
    image: ImagePayload,
    timeout: Duration,
    token: CancellationToken,
    tx: mpsc::Sender<JobUpdate>,
) {
    for milestone in [Milestone::Queued, Milestone::Uploading, Milestone::Recognizing] {
        if !checkpoint(&token, &tx, JobUpdate::Progress(milestone)).await {
            debug!(job_id = %id, "Recognition job stopped before {}.", milestone.as_str());
            return;
        }
    }

    let result = tokio::select! {
        biased;
        _ = token.cancelled() => {
            info!(job_id = %id, "Recognition job cancelled while waiting on the service.");
            return;
        }
        result = tokio::time::timeout(timeout, service.recognize(&image)) => result,
    };

    if !checkpoint(&token, &tx, JobUpdate::Progress(Milestone::Finalizing)).await {
        debug!(job_id = %id, "Discarding result of a cancelled recognition job.");
        return;
    }

    let terminal = match result {
        Err(_) => {
            warn!(job_id = %id, "Recognition timed out after {:?}.", timeout);
            JobUpdate::Failed(CoreError::Timeout(timeout))
        }
        Ok(Err(e)) => {
            warn!(job_id = %id, "Recognition service failed: {}", e);
            JobUpdate::Failed(CoreError::from_service(e))
        }
        Ok(Ok(text)) => {
            let text = text.trim();
            if text.is_empty() {
                JobUpdate::Failed(CoreError::Service("no text recognized".to_string()))
            } else {
                info!(job_id = %id, chars = text.len(), "Recognition succeeded.");
                JobUpdate::Succeeded(text.to_string())
            }
        }
    };

    checkpoint(&token, &tx, terminal).await;
}
