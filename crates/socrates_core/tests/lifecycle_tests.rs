//! End-to-end runs of the error-review lifecycle over the in-memory store.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use socrates_core::{
    ChatMessage, Classification, ClassificationService, Clock, CoreError, CoreResult,
    DifficultyRating, ErrorBook, ErrorRecord, FixedClock, MemoryStore, PortError, PortResult,
    RecordStore, ReviewOutcome, ReviewSchedule, Stage, Subject, TurnState, TutoringSession, Urgency,
};
use uuid::Uuid;

struct StaticClassifier {
    tags: Vec<&'static str>,
    calls: AtomicUsize,
}

impl StaticClassifier {
    fn new(tags: Vec<&'static str>) -> Self {
        Self {
            tags,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ClassificationService for StaticClassifier {
    async fn classify(&self, _transcript: &[ChatMessage]) -> PortResult<Classification> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Classification {
            concept_tags: self.tags.iter().map(|t| t.to_string()).collect(),
            difficulty: DifficultyRating::new(2).unwrap(),
        })
    }
}

/// Never answers.
struct HungClassifier;

#[async_trait]
impl ClassificationService for HungClassifier {
    async fn classify(&self, _transcript: &[ChatMessage]) -> PortResult<Classification> {
        std::future::pending::<PortResult<Classification>>().await
    }
}

/// A `MemoryStore` whose error lookups fail, either as missing or as an outage.
struct LossyStore {
    inner: MemoryStore,
    lost: bool,
}

#[async_trait]
impl RecordStore for LossyStore {
    async fn get_error(&self, error_id: Uuid) -> PortResult<ErrorRecord> {
        if self.lost {
            Err(PortError::NotFound(format!("error {}", error_id)))
        } else {
            Err(PortError::Unavailable("connection reset".to_string()))
        }
    }

    async fn errors_by_student(&self, student_id: Uuid) -> PortResult<Vec<ErrorRecord>> {
        self.inner.errors_by_student(student_id).await
    }

    async fn update_error(&self, record: &ErrorRecord) -> PortResult<()> {
        self.inner.update_error(record).await
    }

    async fn create_error_with_schedule(
        &self,
        record: &ErrorRecord,
        schedule: &ReviewSchedule,
    ) -> PortResult<()> {
        self.inner.create_error_with_schedule(record, schedule).await
    }

    async fn get_schedule(&self, schedule_id: Uuid) -> PortResult<ReviewSchedule> {
        self.inner.get_schedule(schedule_id).await
    }

    async fn update_schedule(&self, schedule: &ReviewSchedule) -> PortResult<()> {
        self.inner.update_schedule(schedule).await
    }

    async fn schedules_by_student(&self, student_id: Uuid) -> PortResult<Vec<ReviewSchedule>> {
        self.inner.schedules_by_student(student_id).await
    }

    async fn schedules_due(
        &self,
        student_id: Uuid,
        as_of: DateTime<Utc>,
    ) -> PortResult<Vec<ReviewSchedule>> {
        self.inner.schedules_due(student_id, as_of).await
    }
}

fn setup() -> (ErrorBook, Arc<FixedClock>) {
    let clock = Arc::new(FixedClock::new(
        Utc.with_ymd_and_hms(2024, 9, 1, 8, 0, 0).unwrap(),
    ));
    let book = ErrorBook::new(Arc::new(MemoryStore::new()), clock.clone());
    (book, clock)
}

fn tutored_session(problem: &str) -> TutoringSession {
    let now = Utc::now();
    let mut session = TutoringSession::start(problem, now).unwrap();
    session.append_user_message("I got 2/5", now).unwrap();
    session
        .append_assistant_reply("What does the bottom number count?", now)
        .unwrap();
    session
}

#[tokio::test]
async fn recorded_error_starts_at_stage_one_and_becomes_due_tomorrow() {
    let (book, clock) = setup();
    let student = Uuid::new_v4();
    let classifier = StaticClassifier::new(vec!["fractions"]);
    let mut session = tutored_session("1/2 + 1/3");

    let (record, schedule) = book
        .record_error(student, Subject::Math, &mut session, &classifier)
        .await
        .unwrap();

    assert_eq!(record.concept_tags(), ["fractions"]);
    assert_eq!(record.difficulty().map(|d| d.value()), Some(2));
    assert_eq!(schedule.stage, Stage::FIRST);
    assert_eq!(schedule.next_due_at, Some(clock.now() + Duration::days(1)));

    assert!(book.due_reviews(student).await.unwrap().is_empty());

    clock.advance(Duration::days(1));
    let due = book.due_reviews(student).await.unwrap();
    assert_eq!(due.len(), 1);
    assert_eq!(due[0].error.id, record.id);
    assert_eq!(due[0].urgency, Urgency::Overdue);
}

#[tokio::test]
async fn finalize_twice_classifies_once() {
    let (book, _clock) = setup();
    let classifier = StaticClassifier::new(vec!["vectors"]);
    let mut session = tutored_session("Add the vectors (1,2) and (3,4)");

    let first = session
        .finalize(&classifier, Utc::now(), std::time::Duration::from_secs(60))
        .await.unwrap();
    let (record, _) = book
        .record_error(Uuid::new_v4(), Subject::Physics, &mut session, &classifier)
        .await
        .unwrap();

    assert_eq!(classifier.calls.load(Ordering::SeqCst), 1);
    assert_eq!(record.concept_tags(), first.concept_tags.as_slice());
}

#[tokio::test]
async fn session_without_student_turns_cannot_become_a_record() {
    let (book, _clock) = setup();
    let student = Uuid::new_v4();
    let classifier = StaticClassifier::new(vec![]);
    let mut session = TutoringSession::start("H2 + O2 -> H2O", Utc::now()).unwrap();

    let err = book
        .record_error(student, Subject::Chemistry, &mut session, &classifier)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::InsufficientContent(_)));
    assert_eq!(book.stats(student).await.unwrap().total, 0);
}

#[tokio::test]
async fn four_correct_reviews_master_an_error() {
    let (book, clock) = setup();
    let student = Uuid::new_v4();
    let classifier = StaticClassifier::new(vec!["fractions"]);
    let mut session = tutored_session("3/4 - 1/2");
    let (_, schedule) = book
        .record_error(student, Subject::Math, &mut session, &classifier)
        .await
        .unwrap();

    let mut current = schedule;
    for expected in [2u8, 3, 4] {
        clock.advance(Duration::days(30));
        current = book.submit_review(current.id, ReviewOutcome::Correct).await.unwrap();
        assert_eq!(current.stage.value(), expected);
        assert!(!current.completed);
    }

    current = book.submit_review(current.id, ReviewOutcome::Correct).await.unwrap();
    assert!(current.completed);
    assert_eq!(current.stage, Stage::MASTERED);
    assert_eq!(current.next_due_at, None);

    // Terminal: an incorrect answer does not reopen it.
    let after = book.submit_review(current.id, ReviewOutcome::Incorrect).await.unwrap();
    assert_eq!(after, current);

    clock.advance(Duration::days(365));
    assert!(book.due_reviews(student).await.unwrap().is_empty());

    let stats = book.stats(student).await.unwrap();
    assert_eq!((stats.total, stats.mastered), (1, 1));
    assert_eq!(stats.mastery_rate, 1.0);
    assert!(book.weak_topics(student, 5).await.unwrap().is_empty());
}

#[tokio::test]
async fn incorrect_review_restarts_the_clock() {
    let (book, clock) = setup();
    let student = Uuid::new_v4();
    let classifier = StaticClassifier::new(vec!["kinematics"]);
    let mut session = tutored_session("v = u + at");
    let (_, schedule) = book
        .record_error(student, Subject::Physics, &mut session, &classifier)
        .await
        .unwrap();

    clock.advance(Duration::days(1));
    let advanced = book.submit_review(schedule.id, ReviewOutcome::Correct).await.unwrap();
    assert_eq!(advanced.stage.value(), 2);

    clock.advance(Duration::days(3));
    let reset = book.submit_review(schedule.id, ReviewOutcome::Incorrect).await.unwrap();
    assert_eq!(reset.stage, Stage::FIRST);
    assert_eq!(reset.next_due_at, Some(clock.now() + Duration::days(1)));
}

#[tokio::test]
async fn stats_and_weak_topics_follow_the_records() {
    let (book, clock) = setup();
    let student = Uuid::new_v4();
    let mut schedules = Vec::new();
    for tags in [vec!["fractions"], vec!["fractions", "decimals"], vec!["ratios"]] {
        let classifier = StaticClassifier::new(tags);
        let mut session = tutored_session("problem");
        let (_, schedule) = book
            .record_error(student, Subject::Math, &mut session, &classifier)
            .await
            .unwrap();
        schedules.push(schedule);
        clock.advance(Duration::hours(1));
    }

    // Master the "ratios" error.
    let mut id = schedules[2].id;
    for _ in 0..4 {
        id = book.submit_review(id, ReviewOutcome::Correct).await.unwrap().id;
    }

    let stats = book.stats(student).await.unwrap();
    assert_eq!(stats.total, 3);
    assert_eq!(stats.mastered, 1);
    assert_eq!(stats.mastery_rate, 1.0 / 3.0);

    let topics = book.weak_topics(student, 10).await.unwrap();
    let tags: Vec<&str> = topics.iter().map(|t| t.tag.as_str()).collect();
    assert_eq!(tags, vec!["fractions", "decimals"]);

    let (days, subjects) = book.activity(student, 7).await.unwrap();
    assert_eq!(days.len(), 7);
    assert_eq!(days.iter().map(|d| d.count).sum::<usize>(), 3);
    assert_eq!(subjects[0], (Subject::Math, 3));
}

#[tokio::test]
async fn unknown_schedule_is_not_found() {
    let (book, _clock) = setup();
    let err = book
        .submit_review(Uuid::new_v4(), ReviewOutcome::Correct)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::NotFound(_)));
}

#[tokio::test]
async fn reevaluation_replaces_tags_and_difficulty() {
    let (book, _clock) = setup();
    let student = Uuid::new_v4();
    let classifier = StaticClassifier::new(vec!["fractions"]);
    let mut session = tutored_session("5/6 - 1/3");
    let (record, _) = book
        .record_error(student, Subject::Math, &mut session, &classifier)
        .await
        .unwrap();

    let updated = book
        .reevaluate_error(
            record.id,
            &Classification {
                concept_tags: vec!["common denominators".to_string()],
                difficulty: DifficultyRating::new(4).unwrap(),
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.concept_tags(), ["common denominators"]);

    let stored = book.errors(student).await.unwrap();
    assert_eq!(stored[0].concept_tags(), ["common denominators"]);
    assert_eq!(stored[0].difficulty().map(|d| d.value()), Some(4));

    let missing = book
        .reevaluate_error(
            Uuid::new_v4(),
            &Classification {
                concept_tags: vec![],
                difficulty: DifficultyRating::new(1).unwrap(),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(missing, CoreError::NotFound(_)));
}

#[tokio::test(start_paused = true)]
async fn hung_classifier_times_out_and_finish_can_be_retried() {
    let (book, _clock) = setup();
    let book = book.with_classify_timeout(std::time::Duration::from_secs(5));
    let student = Uuid::new_v4();
    let mut session = tutored_session("2^3 * 2^2");

    let err = book
        .record_error(student, Subject::Math, &mut session, &HungClassifier)
        .await
        .unwrap_err();
    assert_eq!(err, CoreError::Timeout(std::time::Duration::from_secs(5)));
    assert!(!session.is_finalized());
    assert!(book.errors(student).await.unwrap().is_empty());

    let classifier = StaticClassifier::new(vec!["exponents"]);
    let (record, _) = book
        .record_error(student, Subject::Math, &mut session, &classifier)
        .await
        .unwrap();
    assert_eq!(record.concept_tags(), ["exponents"]);
}

#[tokio::test]
async fn aborted_session_cannot_become_a_record() {
    let (book, _clock) = setup();
    let student = Uuid::new_v4();
    let classifier = StaticClassifier::new(vec!["stoichiometry"]);
    let mut session = TutoringSession::start("2H2 + O2 -> 2H2O", Utc::now()).unwrap();
    session.append_user_message("the 2s are optional", Utc::now()).unwrap();
    assert!(session.append_user_message("right?", Utc::now()).is_err());
    assert_eq!(session.turn(), TurnState::Aborted);

    let err = book
        .record_error(student, Subject::Chemistry, &mut session, &classifier)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::ProtocolViolation(_)));
    assert_eq!(classifier.calls.load(Ordering::SeqCst), 0);
}

async fn due_reviews_over(lost: bool) -> CoreResult<usize> {
    let clock = Arc::new(FixedClock::new(
        Utc.with_ymd_and_hms(2024, 9, 1, 8, 0, 0).unwrap(),
    ));
    let store = Arc::new(LossyStore {
        inner: MemoryStore::new(),
        lost,
    });
    let book = ErrorBook::new(store, clock.clone());
    let student = Uuid::new_v4();
    let classifier = StaticClassifier::new(vec!["fractions"]);
    let mut session = tutored_session("1/4 + 1/4");
    book.record_error(student, Subject::Math, &mut session, &classifier)
        .await
        .unwrap();

    clock.advance(Duration::days(1));
    book.due_reviews(student).await.map(|due| due.len())
}

#[tokio::test]
async fn due_reviews_skip_schedules_whose_error_is_gone() {
    assert_eq!(due_reviews_over(true).await.unwrap(), 0);
}

#[tokio::test]
async fn due_reviews_surface_store_outages() {
    let err = due_reviews_over(false).await.unwrap_err();
    assert!(matches!(err, CoreError::Storage(_)));
}
