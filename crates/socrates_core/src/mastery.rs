//! crates/socrates_core/src/mastery.rs
//!
//! The Mastery Aggregator. Every figure here is computed on read from the
//! current error records and schedules; nothing is stored.

use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use crate::domain::{DailyCount, ErrorRecord, ReviewSchedule, StudentStats, Subject, Trend, WeakTopic};

/// Width of each window compared when computing a tag's trend.
pub const TREND_WINDOW_DAYS: i64 = 7;

fn mastered_error_ids(schedules: &[ReviewSchedule]) -> HashSet<Uuid> {
    schedules
        .iter()
        .filter(|s| s.completed)
        .map(|s| s.error_id)
        .collect()
}

pub fn compute_stats(
    student_id: Uuid,
    errors: &[ErrorRecord],
    schedules: &[ReviewSchedule],
) -> StudentStats {
    let owned: HashSet<Uuid> = errors
        .iter()
        .filter(|e| e.student_id == student_id)
        .map(|e| e.id)
        .collect();
    let total = owned.len();
    let mastered = mastered_error_ids(schedules)
        .iter()
        .filter(|id| owned.contains(id))
        .count();

    let mastery_rate = if total == 0 {
        0.0
    } else {
        mastered as f64 / total as f64
    };

    StudentStats {
        student_id,
        total,
        mastered,
        mastery_rate,
    }
}

struct TagTally {
    count: usize,
    last_seen_at: DateTime<Utc>,
    recent: usize,
    prior: usize,
}

fn classify_trend(recent: usize, prior: usize) -> Trend {
    if prior == 0 {
        return Trend::Stable;
    }
    match recent.cmp(&prior) {
        std::cmp::Ordering::Greater => Trend::Up,
        std::cmp::Ordering::Less => Trend::Down,
        std::cmp::Ordering::Equal => Trend::Stable,
    }
}

/// Concept tags of not-yet-mastered errors, most frequent first.
///
/// Ties go to the tag seen most recently. Errors without a schedule count as not mastered.
pub fn weak_topics(
    student_id: Uuid,
    errors: &[ErrorRecord],
    schedules: &[ReviewSchedule],
    limit: usize,
    now: DateTime<Utc>,
) -> Vec<WeakTopic> {
    let mastered = mastered_error_ids(schedules);
    let window = Duration::days(TREND_WINDOW_DAYS);
    let recent_start = now - window;
    let prior_start = recent_start - window;

    let mut tallies: HashMap<&str, TagTally> = HashMap::new();
    for error in errors
        .iter()
        .filter(|e| e.student_id == student_id && !mastered.contains(&e.id))
    {
        for tag in error.concept_tags() {
            let tally = tallies.entry(tag.as_str()).or_insert(TagTally {
                count: 0,
                last_seen_at: error.created_at,
                recent: 0,
                prior: 0,
            });
            tally.count += 1;
            tally.last_seen_at = tally.last_seen_at.max(error.created_at);
            if error.created_at > recent_start && error.created_at <= now {
                tally.recent += 1;
            } else if error.created_at > prior_start && error.created_at <= recent_start {
                tally.prior += 1;
            }
        }
    }

    let mut topics: Vec<WeakTopic> = tallies
        .into_iter()
        .map(|(tag, tally)| WeakTopic {
            tag: tag.to_string(),
            count: tally.count,
            trend: classify_trend(tally.recent, tally.prior),
            last_seen_at: tally.last_seen_at,
        })
        .collect();

    topics.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then_with(|| b.last_seen_at.cmp(&a.last_seen_at))
            .then_with(|| a.tag.cmp(&b.tag))
    });
    topics.truncate(limit);
    topics
}

/// Errors captured per UTC day over the last `days` days, oldest first, ending today.
pub fn daily_activity(
    student_id: Uuid,
    errors: &[ErrorRecord],
    now: DateTime<Utc>,
    days: u32,
) -> Vec<DailyCount> {
    let today = now.date_naive();
    let mut counts: HashMap<chrono::NaiveDate, usize> = HashMap::new();
    for error in errors.iter().filter(|e| e.student_id == student_id) {
        *counts.entry(error.created_at.date_naive()).or_default() += 1;
    }

    (0..i64::from(days))
        .rev()
        .map(|back| {
            let date = today - Duration::days(back);
            DailyCount {
                date,
                count: counts.get(&date).copied().unwrap_or(0),
            }
        })
        .collect()
}

/// Number of errors per subject, in `Subject::ALL` order.
pub fn subject_breakdown(student_id: Uuid, errors: &[ErrorRecord]) -> Vec<(Subject, usize)> {
    Subject::ALL
        .iter()
        .map(|subject| {
            let count = errors
                .iter()
                .filter(|e| e.student_id == student_id && e.subject() == *subject)
                .count();
            (*subject, count)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ReviewOutcome;
    use crate::scheduler::{create_schedule, record_outcome, Stage};
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 20, 12, 0, 0).unwrap()
    }

    fn error(student: Uuid, days_ago: i64, tags: &[&str]) -> ErrorRecord {
        let mut e = ErrorRecord::new(student, Subject::Math, "problem", now() - Duration::days(days_ago));
        e.append_tags(tags.iter().copied());
        e
    }

    fn mastered(e: &ErrorRecord) -> ReviewSchedule {
        let mut s = create_schedule(e, now());
        s.stage = Stage::new(4).unwrap();
        record_outcome(&s, ReviewOutcome::Correct, now())
    }

    #[test]
    fn empty_student_has_zero_rate() {
        let stats = compute_stats(Uuid::new_v4(), &[], &[]);
        assert_eq!(stats.total, 0);
        assert_eq!(stats.mastered, 0);
        assert_eq!(stats.mastery_rate, 0.0);
    }

    #[test]
    fn one_of_three_mastered_is_an_exact_third() {
        let student = Uuid::new_v4();
        let errors = vec![error(student, 1, &[]), error(student, 2, &[]), error(student, 3, &[])];
        let schedules = vec![
            mastered(&errors[0]),
            create_schedule(&errors[1], now()),
            create_schedule(&errors[2], now()),
        ];

        let stats = compute_stats(student, &errors, &schedules);
        assert_eq!(stats.total, 3);
        assert_eq!(stats.mastered, 1);
        assert_eq!(stats.mastery_rate, 1.0 / 3.0);
    }

    #[test]
    fn other_students_do_not_leak_in() {
        let student = Uuid::new_v4();
        let other = Uuid::new_v4();
        let mine = error(student, 1, &[]);
        let theirs = error(other, 1, &[]);
        let schedules = vec![mastered(&theirs), create_schedule(&mine, now())];

        let stats = compute_stats(student, &[mine, theirs], &schedules);
        assert_eq!(stats.total, 1);
        assert_eq!(stats.mastered, 0);
        assert!((0.0..=1.0).contains(&stats.mastery_rate));
    }

    #[test]
    fn weak_topics_rank_by_count_then_recency() {
        let student = Uuid::new_v4();
        let errors = vec![
            error(student, 10, &["fractions", "decimals"]),
            error(student, 1, &["fractions"]),
            error(student, 2, &["ratios"]),
            error(student, 9, &["decimals"]),
        ];
        let topics = weak_topics(student, &errors, &[], 10, now());

        let tags: Vec<&str> = topics.iter().map(|t| t.tag.as_str()).collect();
        // fractions and decimals both appear twice; fractions was seen later.
        assert_eq!(tags, vec!["fractions", "decimals", "ratios"]);
        assert_eq!(topics[0].count, 2);
        // The newest occurrence wins regardless of input order.
        assert_eq!(topics[0].last_seen_at, now() - Duration::days(1));
        assert_eq!(topics[1].last_seen_at, now() - Duration::days(9));

        let limited = weak_topics(student, &errors, &[], 1, now());
        assert_eq!(limited.len(), 1);
    }

    #[test]
    fn mastered_errors_are_not_weak() {
        let student = Uuid::new_v4();
        let errors = vec![error(student, 1, &["vectors"]), error(student, 1, &["torque"])];
        let schedules = vec![mastered(&errors[0])];

        let topics = weak_topics(student, &errors, &schedules, 10, now());
        assert_eq!(topics.len(), 1);
        assert_eq!(topics[0].tag, "torque");
    }

    #[test]
    fn trend_compares_recent_and_prior_windows() {
        let student = Uuid::new_v4();
        let errors = vec![
            // "moles": 2 recent, 1 prior -> up
            error(student, 1, &["moles"]),
            error(student, 3, &["moles"]),
            error(student, 10, &["moles"]),
            // "acids": 0 recent, 2 prior -> down
            error(student, 8, &["acids"]),
            error(student, 12, &["acids"]),
            // "bonds": only old data -> stable
            error(student, 2, &["bonds"]),
            error(student, 30, &["bonds"]),
        ];
        let topics = weak_topics(student, &errors, &[], 10, now());
        let trend = |tag: &str| topics.iter().find(|t| t.tag == tag).map(|t| t.trend);

        assert_eq!(trend("moles"), Some(Trend::Up));
        assert_eq!(trend("acids"), Some(Trend::Down));
        assert_eq!(trend("bonds"), Some(Trend::Stable));
    }

    #[test]
    fn daily_activity_covers_requested_days() {
        let student = Uuid::new_v4();
        let errors = vec![error(student, 0, &[]), error(student, 0, &[]), error(student, 2, &[])];
        let days = daily_activity(student, &errors, now(), 3);

        assert_eq!(days.len(), 3);
        assert_eq!(days[2].date, now().date_naive());
        assert_eq!(days.iter().map(|d| d.count).collect::<Vec<_>>(), vec![1, 0, 2]);
    }

    #[test]
    fn subject_breakdown_counts_each_subject() {
        let student = Uuid::new_v4();
        let errors = vec![
            error(student, 0, &[]),
            ErrorRecord::new(student, Subject::Chemistry, "NaCl", now()),
        ];
        assert_eq!(
            subject_breakdown(student, &errors),
            vec![(Subject::Math, 1), (Subject::Physics, 0), (Subject::Chemistry, 1)]
        );
    }
}
