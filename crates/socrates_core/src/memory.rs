//! crates/socrates_core/src/memory.rs
//!
//! An in-process `RecordStore`, used by tests and when no database is configured.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::{ErrorRecord, ReviewSchedule};
use crate::ports::{PortError, PortResult, RecordStore};

#[derive(Default)]
struct Tables {
    errors: HashMap<Uuid, ErrorRecord>,
    schedules: HashMap<Uuid, ReviewSchedule>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn get_error(&self, error_id: Uuid) -> PortResult<ErrorRecord> {
        self.tables
            .read()
            .await
            .errors
            .get(&error_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("Error record {} not found", error_id)))
    }

    async fn errors_by_student(&self, student_id: Uuid) -> PortResult<Vec<ErrorRecord>> {
        let tables = self.tables.read().await;
        let mut errors: Vec<ErrorRecord> = tables
            .errors
            .values()
            .filter(|e| e.student_id == student_id)
            .cloned()
            .collect();
        errors.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(errors)
    }

    async fn update_error(&self, record: &ErrorRecord) -> PortResult<()> {
        let mut tables = self.tables.write().await;
        match tables.errors.get_mut(&record.id) {
            Some(existing) => {
                *existing = record.clone();
                Ok(())
            }
            None => Err(PortError::NotFound(format!("Error record {} not found", record.id))),
        }
    }

    async fn create_error_with_schedule(
        &self,
        record: &ErrorRecord,
        schedule: &ReviewSchedule,
    ) -> PortResult<()> {
        let mut tables = self.tables.write().await;
        if tables.errors.contains_key(&record.id) || tables.schedules.contains_key(&schedule.id) {
            return Err(PortError::Unexpected(format!(
                "Error record {} already exists",
                record.id
            )));
        }
        tables.errors.insert(record.id, record.clone());
        tables.schedules.insert(schedule.id, schedule.clone());
        Ok(())
    }

    async fn get_schedule(&self, schedule_id: Uuid) -> PortResult<ReviewSchedule> {
        self.tables
            .read()
            .await
            .schedules
            .get(&schedule_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("Review schedule {} not found", schedule_id)))
    }

    async fn update_schedule(&self, schedule: &ReviewSchedule) -> PortResult<()> {
        let mut tables = self.tables.write().await;
        match tables.schedules.get_mut(&schedule.id) {
            Some(existing) => {
                *existing = schedule.clone();
                Ok(())
            }
            None => Err(PortError::NotFound(format!(
                "Review schedule {} not found",
                schedule.id
            ))),
        }
    }

    async fn schedules_by_student(&self, student_id: Uuid) -> PortResult<Vec<ReviewSchedule>> {
        Ok(self
            .tables
            .read()
            .await
            .schedules
            .values()
            .filter(|s| s.student_id == student_id)
            .cloned()
            .collect())
    }

    async fn schedules_due(
        &self,
        student_id: Uuid,
        as_of: DateTime<Utc>,
    ) -> PortResult<Vec<ReviewSchedule>> {
        Ok(self
            .tables
            .read()
            .await
            .schedules
            .values()
            .filter(|s| {
                s.student_id == student_id
                    && !s.completed
                    && s.next_due_at.is_some_and(|due| due <= as_of)
            })
            .cloned()
            .collect())
    }
}
