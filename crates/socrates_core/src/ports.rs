//! crates/socrates_core/src/ports.rs
//!
//! Defines the service contracts (traits) the lifecycle engine consumes.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of specific external implementations like databases or AI APIs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Mutex;
use uuid::Uuid;

use crate::domain::{
    ChatMessage, Classification, ErrorRecord, ImagePayload, ReviewSchedule, TutorTheme,
};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
    #[error("Service unavailable: {0}")]
    Unavailable(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait RecognitionService: Send + Sync {
    /// Extracts the text of a photographed problem. Invoked once per job.
    async fn recognize(&self, image: &ImagePayload) -> PortResult<String>;

    /// Best-effort reachability check of the recognition backend.
    async fn probe(&self) -> PortResult<bool>;
}

#[async_trait]
pub trait ClassificationService: Send + Sync {
    /// Extracts concept tags and a difficulty rating from a session transcript.
    async fn classify(&self, transcript: &[ChatMessage]) -> PortResult<Classification>;
}

#[async_trait]
pub trait TutorService: Send + Sync {
    /// Produces the next Socratic assistant turn for the visible conversation.
    async fn reply(
        &self,
        theme: TutorTheme,
        problem_text: &str,
        conversation: &[ChatMessage],
    ) -> PortResult<String>;
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    // --- Error Records ---
    async fn get_error(&self, error_id: Uuid) -> PortResult<ErrorRecord>;

    async fn errors_by_student(&self, student_id: Uuid) -> PortResult<Vec<ErrorRecord>>;

    async fn update_error(&self, record: &ErrorRecord) -> PortResult<()>;

    // --- Review Schedules ---

    /// Persists a new record together with its first schedule, all or nothing.
    async fn create_error_with_schedule(
        &self,
        record: &ErrorRecord,
        schedule: &ReviewSchedule,
    ) -> PortResult<()>;

    async fn get_schedule(&self, schedule_id: Uuid) -> PortResult<ReviewSchedule>;

    async fn update_schedule(&self, schedule: &ReviewSchedule) -> PortResult<()>;

    async fn schedules_by_student(&self, student_id: Uuid) -> PortResult<Vec<ReviewSchedule>>;

    /// Non-completed schedules of a student whose due date is at or before `as_of`.
    async fn schedules_due(
        &self,
        student_id: Uuid,
        as_of: DateTime<Utc>,
    ) -> PortResult<Vec<ReviewSchedule>>;
}

//=========================================================================================
// Clock
//=========================================================================================

/// The supplied "now" source.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut guard = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *guard += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}
