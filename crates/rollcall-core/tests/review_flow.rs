mod common;

use common::{date, record_on, MemoryBackend};
use rollcall_core::backend::{AttendanceBackend, BackendError};
use rollcall_core::calendar::AttendanceCalendar;
use rollcall_core::review::{AttendanceReviewController, LoadOutcome, ReviewError, ReviewState};
use rollcall_core::types::{GroupKey, RecordId};
use std::sync::Arc;

const REVIEWER: i64 = 5;

fn controller(backend: &Arc<MemoryBackend>) -> AttendanceReviewController {
    let backend: Arc<dyn AttendanceBackend> = backend.clone();
    AttendanceReviewController::new(backend, REVIEWER, AttendanceCalendar::new(date(2024, 5, 20)))
}

fn approved_of(controller: &AttendanceReviewController, id: RecordId) -> bool {
    controller
        .records()
        .iter()
        .find(|r| r.id == id)
        .map(|r| r.reviewer_approved)
        .expect("record should be loaded")
}

#[tokio::test]
async fn test_initial_state() {
    let backend = MemoryBackend::new();
    let review = controller(&backend);
    assert_eq!(review.state(), &ReviewState::NoDateSelected);
    assert!(review.groups().is_empty());
}

#[tokio::test]
async fn test_empty_day_is_loaded_not_failed() {
    let backend = MemoryBackend::new();
    let mut review = controller(&backend);

    let records = review.select_day(date(2024, 5, 3)).await.unwrap();
    assert!(records.is_empty());
    assert_eq!(review.state(), &ReviewState::Loaded { date: date(2024, 5, 3) });
    assert_eq!(review.calendar().selected(), Some(date(2024, 5, 3)));
}

#[tokio::test]
async fn test_load_is_date_scoped_and_grouped() {
    let d = date(2024, 5, 2);
    let backend = MemoryBackend::with_records(vec![
        record_on(d, 1, Some(1), 95.0),
        record_on(d, 2, Some(1), 60.0),
        record_on(d, 3, Some(2), 80.0),
        record_on(date(2024, 5, 3), 4, Some(1), 99.0),
        record_on(d, 5, None, 71.0),
    ]);
    let mut review = controller(&backend);
    review.select_day(d).await.unwrap();

    let groups = review.groups();
    let keys: Vec<GroupKey> = groups.iter().map(|g| g.key).collect();
    assert_eq!(keys, vec![GroupKey::Class(1), GroupKey::Class(2), GroupKey::Unassigned]);
    assert_eq!(groups[0].len(), 2);
    assert_eq!(groups[0].low_confidence_count(), 1);

    let summary = review.summary();
    assert_eq!(summary.total, 4);
    assert_eq!(summary.low_confidence, 1);
    assert_eq!(summary.pending, 4);
}

#[tokio::test]
async fn test_select_day_clears_class_filter() {
    let d = date(2024, 5, 2);
    let backend = MemoryBackend::with_records(vec![
        record_on(d, 1, Some(1), 95.0),
        record_on(d, 2, Some(2), 95.0),
    ]);
    let mut review = controller(&backend);
    review.select_day(d).await.unwrap();

    review.set_class_filter(Some(GroupKey::Class(2)));
    assert_eq!(review.groups().len(), 1);
    assert_eq!(review.available_classes().len(), 2);

    review.select_day(d).await.unwrap();
    assert_eq!(review.class_filter(), None);
    assert_eq!(review.groups().len(), 2);
}

#[tokio::test]
async fn test_approval_resyncs_and_is_idempotent() {
    let d = date(2024, 5, 2);
    let backend = MemoryBackend::with_records(vec![record_on(d, 1, Some(1), 65.0)]);
    let mut review = controller(&backend);
    review.select_day(d).await.unwrap();
    assert!(!approved_of(&review, 1));

    review.set_approval(1, true).await.unwrap();
    assert!(approved_of(&review, 1));
    review.set_approval(1, true).await.unwrap();
    assert!(approved_of(&review, 1));

    let reloaded = review.load_for_date(d).await.unwrap();
    assert!(reloaded[0].reviewer_approved);

    assert_eq!(backend.approvals(), vec![(1, true, REVIEWER), (1, true, REVIEWER)]);
    // initial select + one resync per approval + explicit reload
    assert_eq!(backend.fetches().len(), 4);
}

#[tokio::test]
async fn test_invalidate_low_confidence_record() {
    let d = date(2024, 5, 2);
    let mut record = record_on(d, 1, Some(1), 30.0);
    record.reviewer_approved = true;
    let backend = MemoryBackend::with_records(vec![record]);
    let mut review = controller(&backend);
    review.select_day(d).await.unwrap();
    assert!(review.records()[0].is_low_confidence());

    review.invalidate(1).await.unwrap();
    assert!(!approved_of(&review, 1));
    review.validate(1).await.unwrap();
    assert!(approved_of(&review, 1));
}

#[tokio::test]
async fn test_stale_load_is_discarded() {
    let d1 = date(2024, 5, 1);
    let d2 = date(2024, 5, 2);
    let backend = MemoryBackend::with_records(vec![
        record_on(d1, 1, Some(1), 90.0),
        record_on(d2, 2, Some(1), 90.0),
        record_on(d2, 3, Some(2), 90.0),
    ]);
    let mut review = controller(&backend);

    let t1 = review.begin_load(d1);
    let f1 = review.fetch(t1);
    let t2 = review.begin_load(d2);
    let f2 = review.fetch(t2);

    // D2's response arrives first.
    let r2 = f2.await;
    assert_eq!(review.finish_load(t2, r2), LoadOutcome::Applied);
    let r1 = f1.await;
    assert_eq!(review.finish_load(t1, r1), LoadOutcome::Stale);

    assert_eq!(review.state(), &ReviewState::Loaded { date: d2 });
    assert_eq!(review.records_date(), Some(d2));
    let ids: Vec<RecordId> = review.records().iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![2, 3]);
}

#[tokio::test]
async fn test_stale_failure_does_not_clobber_state() {
    let d1 = date(2024, 5, 1);
    let d2 = date(2024, 5, 2);
    let backend = MemoryBackend::with_records(vec![record_on(d2, 2, Some(1), 90.0)]);
    let mut review = controller(&backend);

    let t1 = review.begin_load(d1);
    let t2 = review.begin_load(d2);
    let r2 = review.fetch(t2).await;
    review.finish_load(t2, r2);

    let late_error = Err(ReviewError::FetchFailed {
        date: d1,
        source: BackendError::Unreachable("timed out".into()),
    });
    assert_eq!(review.finish_load(t1, late_error), LoadOutcome::Stale);
    assert_eq!(review.state(), &ReviewState::Loaded { date: d2 });
    assert!(review.last_error().is_none());
}

#[tokio::test]
async fn test_fetch_failure_keeps_last_loaded_records() {
    let d1 = date(2024, 5, 1);
    let d2 = date(2024, 5, 2);
    let backend = MemoryBackend::with_records(vec![record_on(d1, 1, Some(1), 90.0)]);
    let mut review = controller(&backend);
    review.select_day(d1).await.unwrap();

    let failure = BackendError::Status {
        code: 502,
        message: "Bad Gateway".into(),
    };
    backend.fail_fetch(Some(failure.clone()));
    let err = review.select_day(d2).await.unwrap_err();
    assert_eq!(
        err,
        ReviewError::FetchFailed {
            date: d2,
            source: failure,
        }
    );
    assert!(err.to_string().contains("502"));
    assert!(err.to_string().contains("Bad Gateway"));
    assert!(matches!(review.state(), ReviewState::LoadFailed { date, .. } if *date == d2));
    assert_eq!(review.records().len(), 1);
    assert_eq!(review.records_date(), Some(d1));

    backend.fail_fetch(None);
    review.refresh().await.unwrap();
    assert!(review.last_error().is_none());
    assert!(review.records().is_empty());
}

#[tokio::test]
async fn test_approval_failure_leaves_records_untouched() {
    let d = date(2024, 5, 2);
    let backend = MemoryBackend::with_records(vec![record_on(d, 1, Some(1), 90.0)]);
    let mut review = controller(&backend);
    review.select_day(d).await.unwrap();
    let fetches_before = backend.fetches().len();

    backend.fail_approval(Some(BackendError::Unreachable("connection refused".into())));
    let err = review.set_approval(1, true).await.unwrap_err();
    assert!(matches!(err, ReviewError::ApprovalFailed { record_id: 1, .. }));
    assert!(!approved_of(&review, 1));
    assert_eq!(review.state(), &ReviewState::Loaded { date: d });
    assert_eq!(review.last_error(), Some(&err));
    assert_eq!(backend.fetches().len(), fetches_before);
}

#[tokio::test]
async fn test_approval_of_unknown_record_reports_backend_detail() {
    let d = date(2024, 5, 2);
    let backend = MemoryBackend::with_records(vec![record_on(d, 1, Some(1), 90.0)]);
    let mut review = controller(&backend);
    review.select_day(d).await.unwrap();

    let err = review.set_approval(99, true).await.unwrap_err();
    assert!(err.to_string().contains("Attendance record not found"));
}

#[tokio::test]
async fn test_approval_requires_selected_date() {
    let backend = MemoryBackend::new();
    let mut review = controller(&backend);
    assert_eq!(review.set_approval(1, true).await.unwrap_err(), ReviewError::NoDateSelected);
    assert!(backend.approvals().is_empty());
}
