//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the REST API endpoints (review queue, review
//! outcomes and mastery statistics) and the master definition for the OpenAPI specification.

use crate::web::state::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use socrates_core::{
    CoreError, DueReview, ErrorKind, ErrorRecord, RecognitionPipeline, ReviewOutcome,
    ReviewSchedule, WeakTopic,
};
use std::sync::Arc;
use tracing::{error, info};
use utoipa::{IntoParams, OpenApi, ToSchema};
use uuid::Uuid;

const DEFAULT_ACTIVITY_DAYS: u32 = 30;
const MAX_ACTIVITY_DAYS: u32 = 365;
const DEFAULT_WEAK_TOPICS: usize = 5;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        due_reviews_handler,
        submit_outcome_handler,
        stats_handler,
        weak_topics_handler,
        errors_handler,
        availability_handler,
    ),
    components(
        schemas(
            DueReviewResponse,
            OutcomeRequest,
            ScheduleResponse,
            StatsResponse,
            DailyCountResponse,
            SubjectCountResponse,
            WeakTopicResponse,
            ErrorRecordResponse,
            AvailabilityResponse,
            ErrorBody,
        )
    ),
    tags(
        (name = "Error Review API", description = "Review queue, review outcomes and mastery statistics for captured errors.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

/// The body of every failed request.
#[derive(Serialize, Deserialize, Debug, ToSchema)]
pub struct ErrorBody {
    /// One of: validation_error, timeout, service_error, protocol_violation,
    /// insufficient_content, not_found, storage_error.
    pub kind: String,
    pub message: String,
}

/// A review that is due now, with what the student needs to see for it.
#[derive(Serialize, Debug, ToSchema)]
pub struct DueReviewResponse {
    schedule_id: Uuid,
    error_id: Uuid,
    subject: String,
    problem_text: String,
    concept_tags: Vec<String>,
    stage: u8,
    stage_name: String,
    next_due_at: Option<DateTime<Utc>>,
    /// overdue, tomorrow, "n days", this week or planned.
    urgency: String,
    /// The due date relative to today, e.g. "yesterday" or "3 days ago".
    due: String,
}

impl From<DueReview> for DueReviewResponse {
    fn from(review: DueReview) -> Self {
        Self {
            schedule_id: review.schedule.id,
            error_id: review.error.id,
            subject: review.error.subject().as_str().to_string(),
            concept_tags: review.error.concept_tags().to_vec(),
            problem_text: review.error.problem_text,
            stage: review.schedule.stage.value(),
            stage_name: review.schedule.stage.info().name.to_string(),
            next_due_at: review.schedule.next_due_at,
            urgency: review.urgency.to_string(),
            due: review.due.to_string(),
        }
    }
}

/// The outcome of one review attempt.
#[derive(Deserialize, Debug, ToSchema)]
pub struct OutcomeRequest {
    /// Either `correct` or `incorrect`.
    outcome: String,
}

/// A review schedule after a transition.
#[derive(Serialize, Debug, ToSchema)]
pub struct ScheduleResponse {
    schedule_id: Uuid,
    error_id: Uuid,
    stage: u8,
    stage_name: String,
    next_due_at: Option<DateTime<Utc>>,
    completed: bool,
}

impl From<ReviewSchedule> for ScheduleResponse {
    fn from(schedule: ReviewSchedule) -> Self {
        Self {
            schedule_id: schedule.id,
            error_id: schedule.error_id,
            stage: schedule.stage.value(),
            stage_name: schedule.stage.info().name.to_string(),
            next_due_at: schedule.next_due_at,
            completed: schedule.completed,
        }
    }
}

#[derive(Serialize, Debug, ToSchema)]
pub struct DailyCountResponse {
    date: NaiveDate,
    count: usize,
}

#[derive(Serialize, Debug, ToSchema)]
pub struct SubjectCountResponse {
    subject: String,
    count: usize,
}

/// Mastery statistics for one student.
#[derive(Serialize, Debug, ToSchema)]
pub struct StatsResponse {
    student_id: Uuid,
    total: usize,
    mastered: usize,
    /// mastered / total, or 0 when there are no errors.
    mastery_rate: f64,
    /// Errors captured per UTC day, oldest first, ending today.
    daily_activity: Vec<DailyCountResponse>,
    subjects: Vec<SubjectCountResponse>,
}

#[derive(Serialize, Debug, ToSchema)]
pub struct WeakTopicResponse {
    tag: String,
    count: usize,
    /// up, down or stable.
    trend: String,
    last_seen_at: DateTime<Utc>,
}

impl From<WeakTopic> for WeakTopicResponse {
    fn from(topic: WeakTopic) -> Self {
        Self {
            trend: topic.trend.as_str().to_string(),
            tag: topic.tag,
            count: topic.count,
            last_seen_at: topic.last_seen_at,
        }
    }
}

#[derive(Serialize, Debug, ToSchema)]
pub struct ErrorRecordResponse {
    error_id: Uuid,
    subject: String,
    problem_text: String,
    concept_tags: Vec<String>,
    difficulty: Option<u8>,
    created_at: DateTime<Utc>,
}

impl From<ErrorRecord> for ErrorRecordResponse {
    fn from(record: ErrorRecord) -> Self {
        Self {
            error_id: record.id,
            subject: record.subject().as_str().to_string(),
            concept_tags: record.concept_tags().to_vec(),
            difficulty: record.difficulty().map(|d| d.value()),
            problem_text: record.problem_text,
            created_at: record.created_at,
        }
    }
}

#[derive(Serialize, Debug, ToSchema)]
pub struct AvailabilityResponse {
    available: bool,
}

#[derive(Deserialize, Debug, IntoParams)]
pub struct StatsQuery {
    /// Days of activity to return, 1 to 365. Defaults to 30.
    days: Option<u32>,
}

#[derive(Deserialize, Debug, IntoParams)]
pub struct WeakTopicsQuery {
    /// Maximum number of topics. Defaults to 5.
    limit: Option<usize>,
}

//=========================================================================================
// Error Mapping
//=========================================================================================

type ApiFailure = (StatusCode, Json<ErrorBody>);

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::ProtocolViolation | ErrorKind::InsufficientContent => StatusCode::CONFLICT,
        ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
        ErrorKind::Service => StatusCode::BAD_GATEWAY,
        ErrorKind::Storage => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn failure(err: CoreError) -> ApiFailure {
    let status = status_for(err.kind());
    if status.is_server_error() {
        error!("Request failed: {}", err);
    }
    (
        status,
        Json(ErrorBody {
            kind: err.kind().as_str().to_string(),
            message: err.to_string(),
        }),
    )
}

fn parse_outcome(raw: &str) -> Result<ReviewOutcome, CoreError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "correct" => Ok(ReviewOutcome::Correct),
        "incorrect" => Ok(ReviewOutcome::Incorrect),
        other => Err(CoreError::Validation(format!(
            "outcome must be 'correct' or 'incorrect', got '{}'",
            other
        ))),
    }
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// List the reviews that are due now, earliest first.
#[utoipa::path(
    get,
    path = "/students/{id}/reviews/due",
    responses(
        (status = 200, description = "Due reviews, earliest first", body = [DueReviewResponse]),
        (status = 500, description = "Storage failure", body = ErrorBody)
    ),
    params(
        ("id" = Uuid, Path, description = "The student's id.")
    )
)]
pub async fn due_reviews_handler(
    State(app_state): State<Arc<AppState>>,
    Path(student_id): Path<Uuid>,
) -> Result<Json<Vec<DueReviewResponse>>, ApiFailure> {
    let due = app_state.book.due_reviews(student_id).await.map_err(failure)?;
    Ok(Json(due.into_iter().map(DueReviewResponse::from).collect()))
}

/// Record the outcome of a review and move the schedule along.
#[utoipa::path(
    post,
    path = "/reviews/{id}/outcome",
    request_body = OutcomeRequest,
    responses(
        (status = 200, description = "The schedule after the transition", body = ScheduleResponse),
        (status = 400, description = "Unknown outcome", body = ErrorBody),
        (status = 404, description = "No such schedule", body = ErrorBody)
    ),
    params(
        ("id" = Uuid, Path, description = "The review schedule's id.")
    )
)]
pub async fn submit_outcome_handler(
    State(app_state): State<Arc<AppState>>,
    Path(schedule_id): Path<Uuid>,
    Json(payload): Json<OutcomeRequest>,
) -> Result<Json<ScheduleResponse>, ApiFailure> {
    let outcome = parse_outcome(&payload.outcome).map_err(failure)?;
    let schedule = app_state
        .book
        .submit_review(schedule_id, outcome)
        .await
        .map_err(failure)?;
    info!(schedule_id = %schedule_id, stage = schedule.stage.value(), "Review outcome recorded.");
    Ok(Json(schedule.into()))
}

/// Mastery rate, daily activity and per-subject counts for a student.
#[utoipa::path(
    get,
    path = "/students/{id}/stats",
    responses(
        (status = 200, description = "Mastery statistics", body = StatsResponse),
        (status = 400, description = "Invalid day count", body = ErrorBody)
    ),
    params(
        ("id" = Uuid, Path, description = "The student's id."),
        StatsQuery
    )
)]
pub async fn stats_handler(
    State(app_state): State<Arc<AppState>>,
    Path(student_id): Path<Uuid>,
    Query(query): Query<StatsQuery>,
) -> Result<Json<StatsResponse>, ApiFailure> {
    let days = query.days.unwrap_or(DEFAULT_ACTIVITY_DAYS);
    if days == 0 || days > MAX_ACTIVITY_DAYS {
        return Err(failure(CoreError::Validation(format!(
            "days must be between 1 and {}",
            MAX_ACTIVITY_DAYS
        ))));
    }

    let stats = app_state.book.stats(student_id).await.map_err(failure)?;
    let (activity, subjects) = app_state
        .book
        .activity(student_id, days)
        .await
        .map_err(failure)?;

    Ok(Json(StatsResponse {
        student_id: stats.student_id,
        total: stats.total,
        mastered: stats.mastered,
        mastery_rate: stats.mastery_rate,
        daily_activity: activity
            .into_iter()
            .map(|d| DailyCountResponse {
                date: d.date,
                count: d.count,
            })
            .collect(),
        subjects: subjects
            .into_iter()
            .map(|(subject, count)| SubjectCountResponse {
                subject: subject.as_str().to_string(),
                count,
            })
            .collect(),
    }))
}

/// The concept tags a student keeps getting wrong.
#[utoipa::path(
    get,
    path = "/students/{id}/weak-topics",
    responses(
        (status = 200, description = "Weak topics, most frequent first", body = [WeakTopicResponse])
    ),
    params(
        ("id" = Uuid, Path, description = "The student's id."),
        WeakTopicsQuery
    )
)]
pub async fn weak_topics_handler(
    State(app_state): State<Arc<AppState>>,
    Path(student_id): Path<Uuid>,
    Query(query): Query<WeakTopicsQuery>,
) -> Result<Json<Vec<WeakTopicResponse>>, ApiFailure> {
    let limit = query.limit.unwrap_or(DEFAULT_WEAK_TOPICS);
    let topics = app_state
        .book
        .weak_topics(student_id, limit)
        .await
        .map_err(failure)?;
    Ok(Json(topics.into_iter().map(WeakTopicResponse::from).collect()))
}

/// Every error a student has captured, newest first.
#[utoipa::path(
    get,
    path = "/students/{id}/errors",
    responses(
        (status = 200, description = "Captured errors, newest first", body = [ErrorRecordResponse])
    ),
    params(
        ("id" = Uuid, Path, description = "The student's id.")
    )
)]
pub async fn errors_handler(
    State(app_state): State<Arc<AppState>>,
    Path(student_id): Path<Uuid>,
) -> Result<Json<Vec<ErrorRecordResponse>>, ApiFailure> {
    let errors = app_state.book.errors(student_id).await.map_err(failure)?;
    Ok(Json(errors.into_iter().map(ErrorRecordResponse::from).collect()))
}

/// Whether the recognition backend is reachable.
#[utoipa::path(
    get,
    path = "/recognition/availability",
    responses(
        (status = 200, description = "Recognition availability", body = AvailabilityResponse)
    )
)]
pub async fn availability_handler(
    State(app_state): State<Arc<AppState>>,
) -> Json<AvailabilityResponse> {
    let pipeline = RecognitionPipeline::new(
        app_state.recognizer.clone(),
        app_state.config.recognition.clone(),
    );
    Json(AvailabilityResponse {
        available: pipeline.is_available().await,
    })
}
