//! crates/socrates_core/src/lifecycle.rs
//!
//! `ErrorBook` drives an error record from a finished tutoring session through
//! its review stages, on top of a `RecordStore` and a `Clock`.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::{
    Classification, DailyCount, ErrorRecord, ReviewOutcome, ReviewSchedule, StudentStats, Subject,
    WeakTopic,
};
use crate::error::{CoreError, CoreResult};
use crate::mastery;
use crate::ports::{ClassificationService, Clock, PortError, RecordStore};
use crate::scheduler::{self, RelativeDate, Urgency};
use crate::tutoring::TutoringSession;

/// A due review joined with the error it reviews.
#[derive(Debug, Clone)]
pub struct DueReview {
    pub schedule: ReviewSchedule,
    pub error: ErrorRecord,
    pub urgency: Urgency,
    pub due: RelativeDate,
}

/// How long the classifier may take unless configured otherwise.
pub const DEFAULT_CLASSIFY_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Clone)]
pub struct ErrorBook {
    store: Arc<dyn RecordStore>,
    clock: Arc<dyn Clock>,
    classify_timeout: Duration,
}

impl ErrorBook {
    pub fn new(store: Arc<dyn RecordStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            classify_timeout: DEFAULT_CLASSIFY_TIMEOUT,
        }
    }

    pub fn with_classify_timeout(mut self, limit: Duration) -> Self {
        self.classify_timeout = limit;
        self
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Finalizes the session and stores the resulting error with a stage-1 schedule.
    ///
    /// Classification is bounded by the book's classify timeout.
    pub async fn record_error(
        &self,
        student_id: Uuid,
        subject: Subject,
        session: &mut TutoringSession,
        classifier: &dyn ClassificationService,
    ) -> CoreResult<(ErrorRecord, ReviewSchedule)> {
        let now = self.clock.now();
        let classification = session
            .finalize(classifier, now, self.classify_timeout)
            .await?;

        let mut record = ErrorRecord::new(student_id, subject, session.problem_text(), now);
        record.append_tags(classification.concept_tags.iter().cloned());
        record.set_difficulty(classification.difficulty)?;
        let schedule = scheduler::create_schedule(&record, now);

        self.store
            .create_error_with_schedule(&record, &schedule)
            .await?;
        info!(
            student_id = %student_id,
            error_id = %record.id,
            schedule_id = %schedule.id,
            "Error recorded and first review scheduled."
        );
        Ok((record, schedule))
    }

    /// Replaces an error's tags and difficulty after an explicit re-evaluation.
    pub async fn reevaluate_error(
        &self,
        error_id: Uuid,
        classification: &Classification,
    ) -> CoreResult<ErrorRecord> {
        let mut record = self.store.get_error(error_id).await?;
        record.reevaluate(classification);
        self.store.update_error(&record).await?;
        info!(error_id = %error_id, "Error re-evaluated.");
        Ok(record)
    }

    pub async fn submit_review(
        &self,
        schedule_id: Uuid,
        outcome: ReviewOutcome,
    ) -> CoreResult<ReviewSchedule> {
        let current = self.store.get_schedule(schedule_id).await?;
        let next = scheduler::record_outcome(&current, outcome, self.clock.now());
        if next == current {
            return Ok(current);
        }

        self.store.update_schedule(&next).await?;
        if next.completed {
            info!(schedule_id = %schedule_id, error_id = %next.error_id, "Error mastered.");
        }
        Ok(next)
    }

    /// Reviews due now, earliest first.
    ///
    /// A schedule whose error no longer exists is skipped. Any other store
    /// failure is returned.
    pub async fn due_reviews(&self, student_id: Uuid) -> CoreResult<Vec<DueReview>> {
        let now = self.clock.now();
        let schedules = self.store.schedules_due(student_id, now).await?;
        let schedules = scheduler::due_query(&schedules, now);

        let mut due = Vec::with_capacity(schedules.len());
        for schedule in schedules {
            let Some(next_due_at) = schedule.next_due_at else {
                continue;
            };
            let error = match self.store.get_error(schedule.error_id).await {
                Ok(error) => error,
                Err(PortError::NotFound(e)) => {
                    warn!(schedule_id = %schedule.id, "Skipping due review without its error: {}", e);
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            due.push(DueReview {
                urgency: Urgency::of(next_due_at, now),
                due: RelativeDate::of(next_due_at, now),
                schedule,
                error,
            });
        }
        Ok(due)
    }

    pub async fn errors(&self, student_id: Uuid) -> CoreResult<Vec<ErrorRecord>> {
        let mut errors = self.store.errors_by_student(student_id).await?;
        errors.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(errors)
    }

    pub async fn stats(&self, student_id: Uuid) -> CoreResult<StudentStats> {
        let (errors, schedules) = self.load(student_id).await?;
        Ok(mastery::compute_stats(student_id, &errors, &schedules))
    }

    pub async fn weak_topics(&self, student_id: Uuid, limit: usize) -> CoreResult<Vec<WeakTopic>> {
        let (errors, schedules) = self.load(student_id).await?;
        Ok(mastery::weak_topics(
            student_id,
            &errors,
            &schedules,
            limit,
            self.clock.now(),
        ))
    }

    pub async fn activity(
        &self,
        student_id: Uuid,
        days: u32,
    ) -> CoreResult<(Vec<DailyCount>, Vec<(Subject, usize)>)> {
        let errors = self.store.errors_by_student(student_id).await?;
        Ok((
            mastery::daily_activity(student_id, &errors, self.clock.now(), days),
            mastery::subject_breakdown(student_id, &errors),
        ))
    }

    async fn load(&self, student_id: Uuid) -> Result<(Vec<ErrorRecord>, Vec<ReviewSchedule>), CoreError> {
        let errors = self.store.errors_by_student(student_id).await?;
        let schedules = self.store.schedules_by_student(student_id).await?;
        Ok((errors, schedules))
    }
}
