//! crates/socrates_core/src/tutoring.rs
//!
//! The Tutoring Session Controller: a bounded conversation anchored to one
//! confirmed problem, with strict user/assistant turn-taking.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::{ChatMessage, Classification, Role};
use crate::error::CoreError;
use crate::ports::ClassificationService;

/// Hidden marker appended when a session is finalized.
pub const FINALIZED_MARKER: &str = "session finalized";

/// Whose turn it is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    AwaitingUser,
    AwaitingAssistant,
    Finalized,
    /// A message arrived out of turn. Nothing more is accepted.
    Aborted,
}

#[derive(Debug, Clone)]
pub struct TutoringSession {
    pub id: Uuid,
    problem_text: String,
    messages: Vec<ChatMessage>,
    turn: TurnState,
    user_turns: usize,
    result: Option<Classification>,
}

impl TutoringSession {
    /// Opens a session on a confirmed problem. The problem is kept as a hidden system message.
    pub fn start(problem_text: impl Into<String>, now: DateTime<Utc>) -> Result<Self, CoreError> {
        let problem_text = problem_text.into().trim().to_string();
        if problem_text.is_empty() {
            return Err(CoreError::Validation("problem text is empty".to_string()));
        }

        let session = Self {
            id: Uuid::new_v4(),
            messages: vec![ChatMessage {
                role: Role::System,
                content: problem_text.clone(),
                sent_at: now,
            }],
            problem_text,
            turn: TurnState::AwaitingUser,
            user_turns: 0,
            result: None,
        };
        info!(session_id = %session.id, "Tutoring session started.");
        Ok(session)
    }

    pub fn problem_text(&self) -> &str {
        &self.problem_text
    }

    pub fn turn(&self) -> TurnState {
        self.turn
    }

    pub fn user_turns(&self) -> usize {
        self.user_turns
    }

    /// Every message, including hidden system messages, in order.
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// The messages a student may see.
    pub fn visible_messages(&self) -> Vec<ChatMessage> {
        self.messages
            .iter()
            .filter(|m| m.role != Role::System)
            .cloned()
            .collect()
    }

    pub fn is_finalized(&self) -> bool {
        self.result.is_some()
    }

    pub fn append_user_message(
        &mut self,
        text: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        self.expect_turn(TurnState::AwaitingUser, Role::User)?;
        self.push(Role::User, text.into(), now);
        self.user_turns += 1;
        self.turn = TurnState::AwaitingAssistant;
        Ok(())
    }

    pub fn append_assistant_reply(
        &mut self,
        text: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        self.expect_turn(TurnState::AwaitingAssistant, Role::Assistant)?;
        self.push(Role::Assistant, text.into(), now);
        self.turn = TurnState::AwaitingUser;
        Ok(())
    }

    /// Classifies the session once. Later calls return the stored result
    /// without consulting the classifier again.
    ///
    /// The classifier gets `limit` to answer. A timeout or failure leaves the
    /// session open, so finalizing can be retried.
    pub async fn finalize(
        &mut self,
        classifier: &dyn ClassificationService,
        now: DateTime<Utc>,
        limit: Duration,
    ) -> Result<Classification, CoreError> {
        if let Some(result) = &self.result {
            debug!(session_id = %self.id, "Session already finalized, returning stored result.");
            return Ok(result.clone());
        }
        if self.turn == TurnState::Aborted {
            return Err(CoreError::ProtocolViolation(
                "the session was aborted by an out-of-turn message".to_string(),
            ));
        }
        if self.user_turns == 0 {
            return Err(CoreError::InsufficientContent(
                "the session has no student turns yet".to_string(),
            ));
        }

        let raw = match tokio::time::timeout(limit, classifier.classify(&self.messages)).await {
            Ok(classified) => classified.map_err(CoreError::from_service)?,
            Err(_) => {
                warn!(session_id = %self.id, "Classification timed out after {:?}.", limit);
                return Err(CoreError::Timeout(limit));
            }
        };

        let mut concept_tags: Vec<String> = Vec::with_capacity(raw.concept_tags.len());
        for tag in raw.concept_tags {
            let tag = tag.trim().to_string();
            if !tag.is_empty() && !concept_tags.contains(&tag) {
                concept_tags.push(tag);
            }
        }
        let result = Classification {
            concept_tags,
            difficulty: raw.difficulty,
        };

        self.push(Role::System, FINALIZED_MARKER.to_string(), now);
        self.turn = TurnState::Finalized;
        self.result = Some(result.clone());
        info!(
            session_id = %self.id,
            tags = result.concept_tags.len(),
            difficulty = result.difficulty.value(),
            "Tutoring session finalized."
        );
        Ok(result)
    }

    /// Checks that `role` may speak now.
    ///
    /// A violation is fatal: an open session moves to `Aborted`. A finalized
    /// session keeps its stored result.
    pub fn expect_turn(&mut self, expected: TurnState, role: Role) -> Result<(), CoreError> {
        let reason = match self.turn {
            current if current == expected => return Ok(()),
            TurnState::Finalized => {
                return Err(CoreError::ProtocolViolation(format!(
                    "cannot append a {} message to a finalized session",
                    role.as_str()
                )))
            }
            TurnState::Aborted => format!(
                "cannot append a {} message to an aborted session",
                role.as_str()
            ),
            _ => format!("a {} message is out of turn", role.as_str()),
        };
        if self.turn != TurnState::Aborted {
            warn!(session_id = %self.id, "Aborting tutoring session: {}", reason);
            self.turn = TurnState::Aborted;
        }
        Err(CoreError::ProtocolViolation(reason))
    }

    fn push(&mut self, role: Role, content: String, now: DateTime<Utc>) {
        // Keeps timestamps non-decreasing even if the clock steps back.
        let sent_at = self
            .messages
            .last()
            .map_or(now, |last| last.sent_at.max(now));
        self.messages.push(ChatMessage {
            role,
            content,
            sent_at,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DifficultyRating;
    use crate::ports::{PortError, PortResult};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingClassifier {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ClassificationService for CountingClassifier {
        async fn classify(&self, transcript: &[ChatMessage]) -> PortResult<Classification> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            assert_eq!(transcript[0].role, Role::System);
            Ok(Classification {
                concept_tags: vec![
                    "fractions".to_string(),
                    " common denominators ".to_string(),
                    "fractions".to_string(),
                ],
                difficulty: DifficultyRating::new(3).unwrap(),
            })
        }
    }

    struct BrokenClassifier;

    #[async_trait]
    impl ClassificationService for BrokenClassifier {
        async fn classify(&self, _transcript: &[ChatMessage]) -> PortResult<Classification> {
            Err(PortError::Unavailable("connection refused".to_string()))
        }
    }

    struct HungClassifier;

    #[async_trait]
    impl ClassificationService for HungClassifier {
        async fn classify(&self, _transcript: &[ChatMessage]) -> PortResult<Classification> {
            std::future::pending::<PortResult<Classification>>().await
        }
    }

    const LIMIT: Duration = Duration::from_secs(60);

    fn classifier() -> CountingClassifier {
        CountingClassifier {
            calls: AtomicUsize::new(0),
        }
    }

    fn session() -> TutoringSession {
        TutoringSession::start("1/2 + 1/3 = 2/5 ?", Utc::now()).unwrap()
    }

    #[test]
    fn turns_alternate() {
        let mut s = session();
        s.append_user_message("I added the tops and bottoms", Utc::now()).unwrap();
        assert_eq!(s.turn(), TurnState::AwaitingAssistant);
        s.append_assistant_reply("Can you add 1/2 and 1/2 that way?", Utc::now()).unwrap();
        assert_eq!(s.turn(), TurnState::AwaitingUser);
        s.append_user_message("that gives 2/4", Utc::now()).unwrap();
        assert_eq!(s.user_turns(), 2);
    }

    #[test]
    fn assistant_first_aborts_the_session() {
        let mut s = session();
        assert!(matches!(
            s.append_assistant_reply("What is a common denominator?", Utc::now()),
            Err(CoreError::ProtocolViolation(_))
        ));
        assert_eq!(s.turn(), TurnState::Aborted);
        assert!(matches!(
            s.append_user_message("hello", Utc::now()),
            Err(CoreError::ProtocolViolation(_))
        ));
    }

    #[tokio::test]
    async fn out_of_turn_message_is_fatal() {
        let mut s = session();
        s.append_user_message("I added the tops and bottoms", Utc::now()).unwrap();
        assert!(matches!(
            s.append_user_message("and?", Utc::now()),
            Err(CoreError::ProtocolViolation(_))
        ));
        assert_eq!(s.turn(), TurnState::Aborted);

        // The assistant may not pick the session back up.
        assert!(matches!(
            s.append_assistant_reply("Can you add 1/2 and 1/2 that way?", Utc::now()),
            Err(CoreError::ProtocolViolation(_))
        ));
        assert_eq!(s.turn(), TurnState::Aborted);
        assert_eq!(s.messages().len(), 2);

        let c = classifier();
        assert!(matches!(
            s.finalize(&c, Utc::now(), LIMIT).await,
            Err(CoreError::ProtocolViolation(_))
        ));
        assert_eq!(c.calls.load(Ordering::SeqCst), 0);
        assert!(!s.is_finalized());
    }

    #[test]
    fn system_messages_are_hidden() {
        let mut s = session();
        s.append_user_message("help", Utc::now()).unwrap();
        let visible = s.visible_messages();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].role, Role::User);
        assert_eq!(s.messages().len(), 2);
    }

    #[test]
    fn empty_problem_is_rejected() {
        assert!(matches!(
            TutoringSession::start("   ", Utc::now()),
            Err(CoreError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn finalize_needs_a_student_turn() {
        let mut s = session();
        let c = classifier();
        assert!(matches!(
            s.finalize(&c, Utc::now(), LIMIT).await,
            Err(CoreError::InsufficientContent(_))
        ));
        assert_eq!(c.calls.load(Ordering::SeqCst), 0);

        // Recoverable by continuing the session.
        s.append_user_message("I think it's 2/5", Utc::now()).unwrap();
        assert!(s.finalize(&c, Utc::now(), LIMIT).await.is_ok());
    }

    #[tokio::test]
    async fn finalize_is_idempotent() {
        let mut s = session();
        s.append_user_message("I added across", Utc::now()).unwrap();
        s.append_assistant_reply("What does the denominator count?", Utc::now()).unwrap();

        let c = classifier();
        let first = s.finalize(&c, Utc::now(), LIMIT).await.unwrap();
        let second = s.finalize(&c, Utc::now(), LIMIT).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first.concept_tags, vec!["fractions", "common denominators"]);
        assert_eq!(c.calls.load(Ordering::SeqCst), 1);
        assert_eq!(s.messages().last().map(|m| m.role), Some(Role::System));
        assert!(matches!(
            s.append_user_message("one more", Utc::now()),
            Err(CoreError::ProtocolViolation(_))
        ));
        // Late messages do not undo the stored result.
        assert_eq!(s.turn(), TurnState::Finalized);
        assert_eq!(s.finalize(&c, Utc::now(), LIMIT).await.unwrap(), first);
    }

    #[tokio::test]
    async fn classifier_failure_leaves_session_open() {
        let mut s = session();
        s.append_user_message("no idea", Utc::now()).unwrap();

        let err = s.finalize(&BrokenClassifier, Utc::now(), LIMIT).await.unwrap_err();
        assert!(matches!(err, CoreError::Service(_)));
        assert!(!s.is_finalized());
        assert_eq!(s.turn(), TurnState::AwaitingAssistant);
    }

    #[tokio::test(start_paused = true)]
    async fn hung_classifier_times_out_and_can_be_retried() {
        let mut s = session();
        s.append_user_message("I added across", Utc::now()).unwrap();

        let err = s.finalize(&HungClassifier, Utc::now(), LIMIT).await.unwrap_err();
        assert_eq!(err, CoreError::Timeout(LIMIT));
        assert!(!s.is_finalized());
        assert_eq!(s.turn(), TurnState::AwaitingAssistant);

        let c = classifier();
        assert!(s.finalize(&c, Utc::now(), LIMIT).await.is_ok());
        assert_eq!(c.calls.load(Ordering::SeqCst), 1);
    }
}
