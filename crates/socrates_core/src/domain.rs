//! crates/socrates_core/src/domain.rs
//!
//! Defines the pure, core data structures for the error-review lifecycle.
//! These structs are independent of any database or serialization format.

use bytes::Bytes;
use chrono::{DateTime, NaiveDate, Utc};
use std::fmt;
use uuid::Uuid;

use crate::error::CoreError;
use crate::scheduler::Stage;

//=========================================================================================
// Subjects and Ratings
//=========================================================================================

/// The closed set of subjects an error can be captured for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Subject {
    Math,
    Physics,
    Chemistry,
}

impl Subject {
    pub const ALL: [Subject; 3] = [Subject::Math, Subject::Physics, Subject::Chemistry];

    pub fn as_str(&self) -> &'static str {
        match self {
            Subject::Math => "math",
            Subject::Physics => "physics",
            Subject::Chemistry => "chemistry",
        }
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Subject {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "math" => Ok(Subject::Math),
            "physics" => Ok(Subject::Physics),
            "chemistry" => Ok(Subject::Chemistry),
            other => Err(CoreError::Validation(format!("unknown subject '{}'", other))),
        }
    }
}

/// Bounded difficulty ordinal, 1 (easiest) to 5 (hardest).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DifficultyRating(u8);

impl DifficultyRating {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 5;

    pub fn new(value: u8) -> Result<Self, CoreError> {
        if (Self::MIN..=Self::MAX).contains(&value) {
            Ok(Self(value))
        } else {
            Err(CoreError::Validation(format!(
                "difficulty {} is outside {}..={}",
                value,
                Self::MIN,
                Self::MAX
            )))
        }
    }

    pub fn value(&self) -> u8 {
        self.0
    }
}

//=========================================================================================
// ErrorRecord
//=========================================================================================

/// One captured student mistake.
///
/// The subject is fixed at construction. Concept tags only grow and the
/// difficulty is set once, unless `reevaluate` replaces both explicitly.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorRecord {
    pub id: Uuid,
    pub student_id: Uuid,
    pub problem_text: String,
    pub created_at: DateTime<Utc>,
    subject: Subject,
    concept_tags: Vec<String>,
    difficulty: Option<DifficultyRating>,
}

impl ErrorRecord {
    pub fn new(
        student_id: Uuid,
        subject: Subject,
        problem_text: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            student_id,
            problem_text: problem_text.into(),
            created_at,
            subject,
            concept_tags: Vec::new(),
            difficulty: None,
        }
    }

    /// Rebuilds a record from already-persisted parts.
    pub fn from_parts(
        id: Uuid,
        student_id: Uuid,
        subject: Subject,
        problem_text: String,
        concept_tags: Vec<String>,
        difficulty: Option<DifficultyRating>,
        created_at: DateTime<Utc>,
    ) -> Self {
        let mut record = Self {
            id,
            student_id,
            problem_text,
            created_at,
            subject,
            concept_tags: Vec::new(),
            difficulty,
        };
        record.append_tags(concept_tags);
        record
    }

    pub fn subject(&self) -> Subject {
        self.subject
    }

    pub fn concept_tags(&self) -> &[String] {
        &self.concept_tags
    }

    pub fn difficulty(&self) -> Option<DifficultyRating> {
        self.difficulty
    }

    /// Adds tags that are not present yet, keeping first-seen order.
    pub fn append_tags<I, S>(&mut self, tags: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for tag in tags {
            let tag = tag.into().trim().to_string();
            if !tag.is_empty() && !self.concept_tags.contains(&tag) {
                self.concept_tags.push(tag);
            }
        }
    }

    pub fn set_difficulty(&mut self, rating: DifficultyRating) -> Result<(), CoreError> {
        if self.difficulty.is_some() {
            return Err(CoreError::Validation(format!(
                "difficulty for error {} is already set",
                self.id
            )));
        }
        self.difficulty = Some(rating);
        Ok(())
    }

    /// Explicit re-evaluation: replaces tags and difficulty wholesale.
    pub fn reevaluate(&mut self, classification: &Classification) {
        self.concept_tags.clear();
        self.append_tags(classification.concept_tags.iter().cloned());
        self.difficulty = Some(classification.difficulty);
    }
}

//=========================================================================================
// ReviewSchedule
//=========================================================================================

/// The spaced-repetition state attached 1:1 to an `ErrorRecord`.
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewSchedule {
    pub id: Uuid,
    pub error_id: Uuid,
    pub student_id: Uuid,
    pub stage: Stage,
    /// `None` once the schedule is completed.
    pub next_due_at: Option<DateTime<Utc>>,
    pub completed: bool,
    pub updated_at: DateTime<Utc>,
}

/// Outcome of a single review attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewOutcome {
    Correct,
    Incorrect,
}

//=========================================================================================
// Recognition
//=========================================================================================

/// The accepted image encodings for captured problems.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageEncoding {
    Jpeg,
    Png,
    Webp,
}

impl ImageEncoding {
    pub fn from_mime(mime: &str) -> Option<Self> {
        match mime.trim().to_ascii_lowercase().as_str() {
            "image/jpeg" | "image/jpg" => Some(Self::Jpeg),
            "image/png" => Some(Self::Png),
            "image/webp" => Some(Self::Webp),
            _ => None,
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Webp => "image/webp",
        }
    }
}

/// A captured image as received from the capture surface.
#[derive(Debug, Clone)]
pub struct ImagePayload {
    pub mime_type: String,
    pub bytes: Bytes,
}

impl ImagePayload {
    pub fn new(mime_type: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            mime_type: mime_type.into(),
            bytes: bytes.into(),
        }
    }
}

//=========================================================================================
// Tutoring
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

/// A single message in a tutoring exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    pub sent_at: DateTime<Utc>,
}

/// Tone of the Socratic tutor, chosen per student age group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TutorTheme {
    #[default]
    Junior,
    Senior,
}

impl std::str::FromStr for TutorTheme {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "junior" => Ok(TutorTheme::Junior),
            "senior" => Ok(TutorTheme::Senior),
            other => Err(CoreError::Validation(format!("unknown tutor theme '{}'", other))),
        }
    }
}

/// What the classification collaborator extracts from a finished session.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub concept_tags: Vec<String>,
    pub difficulty: DifficultyRating,
}

//=========================================================================================
// Statistics
//=========================================================================================

/// Aggregate view for one student, always derived on read.
#[derive(Debug, Clone, PartialEq)]
pub struct StudentStats {
    pub student_id: Uuid,
    pub total: usize,
    pub mastered: usize,
    pub mastery_rate: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trend {
    Up,
    Down,
    Stable,
}

impl Trend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Trend::Up => "up",
            Trend::Down => "down",
            Trend::Stable => "stable",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WeakTopic {
    pub tag: String,
    pub count: usize,
    pub trend: Trend,
    pub last_seen_at: DateTime<Utc>,
}

/// Errors captured on one UTC day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailyCount {
    pub date: NaiveDate,
    pub count: usize,
}
