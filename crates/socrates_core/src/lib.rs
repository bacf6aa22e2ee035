pub mod domain;
pub mod error;
pub mod lifecycle;
pub mod mastery;
pub mod memory;
pub mod ports;
pub mod recognition;
pub mod scheduler;
pub mod tutoring;

pub use domain::{
    ChatMessage, Classification, DailyCount, DifficultyRating, ErrorRecord, ImageEncoding,
    ImagePayload, ReviewOutcome, ReviewSchedule, Role, StudentStats, Subject, Trend, TutorTheme,
    WeakTopic,
};
pub use error::{CoreError, CoreResult, ErrorKind};
pub use lifecycle::{DueReview, ErrorBook};
pub use memory::MemoryStore;
pub use ports::{
    ClassificationService, Clock, FixedClock, PortError, PortResult, RecognitionService,
    RecordStore, SystemClock, TutorService,
};
pub use recognition::{
    JobStatus, JobUpdate, Milestone, RecognitionHandle, RecognitionJob, RecognitionPipeline,
    RecognitionSettings,
};
pub use scheduler::{RelativeDate, Stage, Urgency, REVIEW_STAGES};
pub use tutoring::{TurnState, TutoringSession};
