//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `RecordStore` port from the `core` crate. It handles all interactions
//! with the PostgreSQL database using `sqlx`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use socrates_core::domain::{DifficultyRating, ErrorRecord, ReviewSchedule, Subject};
use socrates_core::ports::{PortError, PortResult, RecordStore};
use socrates_core::scheduler::Stage;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `RecordStore` port.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::Error> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

fn not_found_or_unexpected(e: sqlx::Error, what: String) -> PortError {
    match e {
        sqlx::Error::RowNotFound => PortError::NotFound(what),
        _ => PortError::Unexpected(e.to_string()),
    }
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

const ERROR_COLUMNS: &str =
    "id, student_id, subject, problem_text, concept_tags, difficulty, created_at";

const SCHEDULE_COLUMNS: &str =
    "id, error_id, student_id, stage, next_due_at, completed, updated_at";

#[derive(FromRow)]
struct ErrorRecordRow {
    id: Uuid,
    student_id: Uuid,
    subject: String,
    problem_text: String,
    concept_tags: Vec<String>,
    difficulty: Option<i16>,
    created_at: DateTime<Utc>,
}
impl ErrorRecordRow {
    fn to_domain(self) -> PortResult<ErrorRecord> {
        let subject = self
            .subject
            .parse::<Subject>()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        let difficulty = self
            .difficulty
            .map(|d| {
                u8::try_from(d)
                    .map_err(|_| PortError::Unexpected(format!("difficulty {} out of range", d)))
                    .and_then(|d| {
                        DifficultyRating::new(d).map_err(|e| PortError::Unexpected(e.to_string()))
                    })
            })
            .transpose()?;

        Ok(ErrorRecord::from_parts(
            self.id,
            self.student_id,
            subject,
            self.problem_text,
            self.concept_tags,
            difficulty,
            self.created_at,
        ))
    }
}

#[derive(FromRow)]
struct ReviewScheduleRow {
    id: Uuid,
    error_id: Uuid,
    student_id: Uuid,
    stage: i16,
    next_due_at: Option<DateTime<Utc>>,
    completed: bool,
    updated_at: DateTime<Utc>,
}
impl ReviewScheduleRow {
    fn to_domain(self) -> PortResult<ReviewSchedule> {
        let stage = u8::try_from(self.stage)
            .ok()
            .and_then(Stage::new)
            .ok_or_else(|| {
                PortError::Unexpected(format!("schedule {} has invalid stage {}", self.id, self.stage))
            })?;
        Ok(ReviewSchedule {
            id: self.id,
            error_id: self.error_id,
            student_id: self.student_id,
            stage,
            next_due_at: self.next_due_at,
            completed: self.completed,
            updated_at: self.updated_at,
        })
    }
}

fn schedules_to_domain(rows: Vec<ReviewScheduleRow>) -> PortResult<Vec<ReviewSchedule>> {
    rows.into_iter().map(|r| r.to_domain()).collect()
}

//=========================================================================================
// `RecordStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl RecordStore for DbAdapter {
    async fn get_error(&self, error_id: Uuid) -> PortResult<ErrorRecord> {
        let row = sqlx::query_as::<_, ErrorRecordRow>(&format!(
            "SELECT {} FROM error_records WHERE id = $1",
            ERROR_COLUMNS
        ))
        .bind(error_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| not_found_or_unexpected(e, format!("Error record {} not found", error_id)))?;
        row.to_domain()
    }

    async fn errors_by_student(&self, student_id: Uuid) -> PortResult<Vec<ErrorRecord>> {
        let rows = sqlx::query_as::<_, ErrorRecordRow>(&format!(
            "SELECT {} FROM error_records WHERE student_id = $1 ORDER BY created_at ASC",
            ERROR_COLUMNS
        ))
        .bind(student_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        rows.into_iter().map(|r| r.to_domain()).collect()
    }

    async fn update_error(&self, record: &ErrorRecord) -> PortResult<()> {
        let result = sqlx::query(
            "UPDATE error_records SET concept_tags = $1, difficulty = $2 WHERE id = $3",
        )
        .bind(record.concept_tags())
        .bind(record.difficulty().map(|d| i16::from(d.value())))
        .bind(record.id)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;

        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Error record {} not found", record.id)));
        }
        Ok(())
    }

    async fn create_error_with_schedule(
        &self,
        record: &ErrorRecord,
        schedule: &ReviewSchedule,
    ) -> PortResult<()> {
        let mut tx = self.pool.begin().await.map_err(unexpected)?;

        sqlx::query(
            "INSERT INTO error_records (id, student_id, subject, problem_text, concept_tags, difficulty, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(record.id)
        .bind(record.student_id)
        .bind(record.subject().as_str())
        .bind(&record.problem_text)
        .bind(record.concept_tags())
        .bind(record.difficulty().map(|d| i16::from(d.value())))
        .bind(record.created_at)
        .execute(&mut *tx)
        .await
        .map_err(unexpected)?;

        sqlx::query(
            "INSERT INTO review_schedules (id, error_id, student_id, stage, next_due_at, completed, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(schedule.id)
        .bind(schedule.error_id)
        .bind(schedule.student_id)
        .bind(i16::from(schedule.stage.value()))
        .bind(schedule.next_due_at)
        .bind(schedule.completed)
        .bind(schedule.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(unexpected)?;

        tx.commit().await.map_err(unexpected)?;
        Ok(())
    }

    async fn get_schedule(&self, schedule_id: Uuid) -> PortResult<ReviewSchedule> {
        let row = sqlx::query_as::<_, ReviewScheduleRow>(&format!(
            "SELECT {} FROM review_schedules WHERE id = $1",
            SCHEDULE_COLUMNS
        ))
        .bind(schedule_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            not_found_or_unexpected(e, format!("Review schedule {} not found", schedule_id))
        })?;
        row.to_domain()
    }

    async fn update_schedule(&self, schedule: &ReviewSchedule) -> PortResult<()> {
        let result = sqlx::query(
            "UPDATE review_schedules SET stage = $1, next_due_at = $2, completed = $3, updated_at = $4 \
             WHERE id = $5",
        )
        .bind(i16::from(schedule.stage.value()))
        .bind(schedule.next_due_at)
        .bind(schedule.completed)
        .bind(schedule.updated_at)
        .bind(schedule.id)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;

        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!(
                "Review schedule {} not found",
                schedule.id
            )));
        }
        Ok(())
    }

    async fn schedules_by_student(&self, student_id: Uuid) -> PortResult<Vec<ReviewSchedule>> {
        let rows = sqlx::query_as::<_, ReviewScheduleRow>(&format!(
            "SELECT {} FROM review_schedules WHERE student_id = $1",
            SCHEDULE_COLUMNS
        ))
        .bind(student_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        schedules_to_domain(rows)
    }

    async fn schedules_due(
        &self,
        student_id: Uuid,
        as_of: DateTime<Utc>,
    ) -> PortResult<Vec<ReviewSchedule>> {
        let rows = sqlx::query_as::<_, ReviewScheduleRow>(&format!(
            "SELECT {} FROM review_schedules \
             WHERE student_id = $1 AND completed = FALSE AND next_due_at <= $2 \
             ORDER BY next_due_at ASC, stage ASC",
            SCHEDULE_COLUMNS
        ))
        .bind(student_id)
        .bind(as_of)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        schedules_to_domain(rows)
    }
}
