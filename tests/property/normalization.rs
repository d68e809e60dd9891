//! Property-based tests for document normalization and the completion rule.
//!
//! Uses proptest to verify:
//! 1. Provider timestamp maps and native timestamps normalize identically.
//! 2. Arbitrary text never panics the timestamp parser.
//! 3. Normalized tasks always have `completed == (status == completed)`.
//! 4. Across any sequence of status transitions, `completed_at` is set iff
//!    the task has ever been completed, and it always holds the time of the
//!    latest transition into `completed`.

use chrono::{DateTime, Duration, TimeZone, Utc};
use proptest::prelude::*;
use taskdeck_proto::FromDocument;
use taskdeck_proto::ident::UserId;
use taskdeck_proto::task::{Task, TaskDraft, TaskPatch, TaskStatus, fields};
use taskdeck_proto::value::{Document, Record, Value, provider_timestamp, timestamp};

fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

/// Strategy for instants between 1970 and roughly 2100, at second precision
/// plus arbitrary nanoseconds.
fn arb_instant() -> impl Strategy<Value = DateTime<Utc>> {
    (0i64..4_102_444_800, 0u32..1_000_000_000)
        .prop_map(|(secs, nanos)| DateTime::from_timestamp(secs, nanos).unwrap())
}

fn arb_status() -> impl Strategy<Value = TaskStatus> {
    prop_oneof![
        Just(TaskStatus::ToDo),
        Just(TaskStatus::InProgress),
        Just(TaskStatus::Completed),
    ]
}

proptest! {
    #[test]
    fn provider_and_native_timestamps_agree(ts in arb_instant()) {
        prop_assert_eq!(timestamp(&provider_timestamp(ts)), Some(ts));
        prop_assert_eq!(timestamp(&Value::Timestamp(ts)), Some(ts));
    }

    #[test]
    fn timestamp_text_parser_never_panics(s in ".*") {
        let _ = timestamp(&Value::Text(s));
    }

    #[test]
    fn normalized_completed_mirrors_status(status in ".{0,16}", completed in any::<bool>()) {
        let mut record = Record::new();
        record.insert(fields::STATUS.into(), Value::Text(status));
        record.insert(fields::COMPLETED.into(), Value::Bool(completed));
        let task = Task::from_document(&Document::new("t", record), base_time()).unwrap();
        prop_assert_eq!(task.completed, task.status == TaskStatus::Completed);
    }

    #[test]
    fn completed_at_tracks_completion_history(
        initial in arb_status(),
        steps in prop::collection::vec(arb_status(), 0..24),
    ) {
        let user = UserId::new("u1");
        let doc = Document::new("t", TaskDraft::new("prop").status(initial).to_record(&user, base_time()));
        let mut task = Task::from_document(&doc, base_time()).unwrap();
        let mut ever_completed = initial == TaskStatus::Completed;
        let mut expected_stamp = task.completed_at;

        for (i, status) in steps.into_iter().enumerate() {
            let now = base_time() + Duration::minutes(i64::try_from(i).unwrap() + 1);
            let before = task.status;
            let mut patch = TaskPatch::status(status);
            patch.synchronize_with(&task, now);
            task.apply_patch(&patch, now);

            if status == TaskStatus::Completed && before != TaskStatus::Completed {
                ever_completed = true;
                expected_stamp = Some(now);
            }
            prop_assert_eq!(task.completed, task.status == TaskStatus::Completed);
            prop_assert_eq!(task.completed_at.is_some(), ever_completed);
            prop_assert_eq!(task.completed_at, expected_stamp);
        }
    }
}
