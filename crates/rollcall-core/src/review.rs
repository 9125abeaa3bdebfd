//! Attendance review: date-scoped fetch, class grouping, confidence flags
//! and reviewer approval.
//!
//! The backend is the only source of truth. Every approval change is
//! followed by a reload of the selected date; nothing is patched locally.
//!
//! | state            | begin_load(d) | finish_load(ok)  | finish_load(err)   |
//! |------------------|---------------|------------------|--------------------|
//! | `NoDateSelected` | Loading(d)    | —                | —                  |
//! | `Loading(d)`     | Loading(d')   | Loaded(d)        | LoadFailed(d)      |
//! | `Loaded(d)`      | Loading(d')   | —                | —                  |
//! | `LoadFailed(d)`  | Loading(d')   | —                | —                  |
//!
//! A result is applied only if its date is still the selected one.

use crate::backend::{AttendanceBackend, BackendError};
use crate::calendar::AttendanceCalendar;
use crate::types::{AttendanceGroup, AttendanceRecord, GroupKey, RecordId, ReviewerId};
use chrono::NaiveDate;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;

const UNASSIGNED_CLASS_NAME: &str = "Unassigned";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReviewError {
    #[error("failed to load attendance for {date}: {source}")]
    FetchFailed { date: NaiveDate, source: BackendError },
    #[error("failed to update approval of record {record_id}: {source}")]
    ApprovalFailed {
        record_id: RecordId,
        source: BackendError,
    },
    #[error("no date selected")]
    NoDateSelected,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewState {
    NoDateSelected,
    Loading { date: NaiveDate },
    Loaded { date: NaiveDate },
    LoadFailed { date: NaiveDate, error: ReviewError },
}

/// Handle for one in-flight load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadTicket {
    date: NaiveDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Applied,
    /// The selected date changed while the request was in flight.
    Stale,
}

/// Counts over the currently visible groups.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReviewSummary {
    pub total: usize,
    pub approved: usize,
    pub pending: usize,
    pub low_confidence: usize,
}

/// Partition records by class, in the order classes are first seen.
///
/// Class name and teacher come from the first record of each class.
pub fn group_by_class(records: &[AttendanceRecord]) -> Vec<AttendanceGroup> {
    let mut groups: Vec<AttendanceGroup> = Vec::new();
    let mut index: HashMap<GroupKey, usize> = HashMap::new();

    for record in records {
        let key = record.group_key();
        let slot = *index.entry(key).or_insert_with(|| {
            groups.push(AttendanceGroup {
                key,
                class_name: match key {
                    GroupKey::Class(id) => record
                        .class_name
                        .clone()
                        .unwrap_or_else(|| format!("Class {id}")),
                    GroupKey::Unassigned => UNASSIGNED_CLASS_NAME.to_string(),
                },
                teacher_name: record.teacher_name.clone(),
                records: Vec::new(),
            });
            groups.len() - 1
        });
        groups[slot].records.push(record.clone());
    }
    groups
}

/// `None` keeps every group.
pub fn filter_by_class(
    groups: Vec<AttendanceGroup>,
    key: Option<GroupKey>,
) -> Vec<AttendanceGroup> {
    match key {
        None => groups,
        Some(key) => groups.into_iter().filter(|g| g.key == key).collect(),
    }
}

pub fn summarize(groups: &[AttendanceGroup]) -> ReviewSummary {
    groups
        .iter()
        .flat_map(|g| g.records.iter())
        .fold(ReviewSummary::default(), |mut s, r| {
            s.total += 1;
            if r.reviewer_approved {
                s.approved += 1;
            } else {
                s.pending += 1;
            }
            if r.is_low_confidence() {
                s.low_confidence += 1;
            }
            s
        })
}

pub struct AttendanceReviewController {
    backend: Arc<dyn AttendanceBackend>,
    reviewer_id: ReviewerId,
    calendar: AttendanceCalendar,
    state: ReviewState,
    /// Last successfully loaded records and their date.
    records: Vec<AttendanceRecord>,
    records_date: Option<NaiveDate>,
    class_filter: Option<GroupKey>,
    last_error: Option<ReviewError>,
}

impl AttendanceReviewController {
    pub fn new(
        backend: Arc<dyn AttendanceBackend>,
        reviewer_id: ReviewerId,
        calendar: AttendanceCalendar,
    ) -> Self {
        Self {
            backend,
            reviewer_id,
            calendar,
            state: ReviewState::NoDateSelected,
            records: Vec::new(),
            records_date: None,
            class_filter: None,
            last_error: None,
        }
    }

    pub fn state(&self) -> &ReviewState {
        &self.state
    }

    pub fn calendar(&self) -> &AttendanceCalendar {
        &self.calendar
    }

    pub fn selected_date(&self) -> Option<NaiveDate> {
        self.calendar.selected()
    }

    /// Records from the last successful load, which stay visible while a
    /// later load is in flight or has failed.
    pub fn records(&self) -> &[AttendanceRecord] {
        &self.records
    }

    pub fn records_date(&self) -> Option<NaiveDate> {
        self.records_date
    }

    pub fn last_error(&self) -> Option<&ReviewError> {
        self.last_error.as_ref()
    }

    pub fn class_filter(&self) -> Option<GroupKey> {
        self.class_filter
    }

    pub fn set_class_filter(&mut self, key: Option<GroupKey>) {
        self.class_filter = key;
    }

    /// Every class present in the loaded records, in first-seen order.
    pub fn available_classes(&self) -> Vec<(GroupKey, String)> {
        group_by_class(&self.records)
            .into_iter()
            .map(|g| (g.key, g.class_name))
            .collect()
    }

    /// Grouped and filtered view of the loaded records.
    pub fn groups(&self) -> Vec<AttendanceGroup> {
        filter_by_class(group_by_class(&self.records), self.class_filter)
    }

    pub fn summary(&self) -> ReviewSummary {
        summarize(&self.groups())
    }

    /// Pick a day on the calendar: clears the class filter and loads it.
    pub async fn select_day(
        &mut self,
        date: NaiveDate,
    ) -> Result<&[AttendanceRecord], ReviewError> {
        self.class_filter = None;
        self.load_for_date(date).await
    }

    /// Select `date` and enter `Loading`. Any older in-flight load for a
    /// different date becomes stale.
    pub fn begin_load(&mut self, date: NaiveDate) -> LoadTicket {
        if self.calendar.selected() != Some(date) {
            self.calendar.select_day(date);
        }
        self.state = ReviewState::Loading { date };
        tracing::debug!(%date, "attendance load started");
        LoadTicket { date }
    }

    /// The network half of a load. Borrows nothing from the controller.
    pub fn fetch(
        &self,
        ticket: LoadTicket,
    ) -> impl Future<Output = Result<Vec<AttendanceRecord>, ReviewError>> + Send + 'static {
        let backend = Arc::clone(&self.backend);
        async move {
            backend
                .attendance_for_date(ticket.date)
                .await
                .map_err(|source| ReviewError::FetchFailed {
                    date: ticket.date,
                    source,
                })
        }
    }

    /// Apply a fetch result, unless the selected date has moved on.
    pub fn finish_load(
        &mut self,
        ticket: LoadTicket,
        result: Result<Vec<AttendanceRecord>, ReviewError>,
    ) -> LoadOutcome {
        if self.calendar.selected() != Some(ticket.date) {
            tracing::debug!(date = %ticket.date, "discarding stale attendance response");
            return LoadOutcome::Stale;
        }

        match result {
            Ok(records) => {
                tracing::info!(date = %ticket.date, count = records.len(), "attendance loaded");
                self.records = records;
                self.records_date = Some(ticket.date);
                self.last_error = None;
                self.state = ReviewState::Loaded { date: ticket.date };
            }
            Err(error) => {
                tracing::warn!(date = %ticket.date, %error, "attendance load failed");
                self.last_error = Some(error.clone());
                self.state = ReviewState::LoadFailed {
                    date: ticket.date,
                    error,
                };
            }
        }
        LoadOutcome::Applied
    }

    /// Fetch all records for `date`. An empty day is `Loaded`, not a failure.
    pub async fn load_for_date(
        &mut self,
        date: NaiveDate,
    ) -> Result<&[AttendanceRecord], ReviewError> {
        let ticket = self.begin_load(date);
        let result = self.fetch(ticket).await;
        self.finish_load(ticket, result);

        match &self.state {
            ReviewState::LoadFailed { error, .. } => Err(error.clone()),
            _ => Ok(&self.records),
        }
    }

    /// Reload the selected date.
    pub async fn refresh(&mut self) -> Result<&[AttendanceRecord], ReviewError> {
        let date = self.selected_date().ok_or(ReviewError::NoDateSelected)?;
        self.load_for_date(date).await
    }

    /// Approve or reject a record, then resynchronize from the backend.
    ///
    /// On failure the loaded records are left untouched.
    pub async fn set_approval(
        &mut self,
        record_id: RecordId,
        approved: bool,
    ) -> Result<(), ReviewError> {
        let date = self.selected_date().ok_or(ReviewError::NoDateSelected)?;

        if let Err(source) = self
            .backend
            .set_approval(record_id, approved, self.reviewer_id)
            .await
        {
            let error = ReviewError::ApprovalFailed { record_id, source };
            tracing::warn!(record_id, approved, %error, "approval update failed");
            self.last_error = Some(error.clone());
            return Err(error);
        }

        tracing::info!(record_id, approved, reviewer = self.reviewer_id, "approval updated");
        self.load_for_date(date).await.map(|_| ())
    }

    pub async fn validate(&mut self, record_id: RecordId) -> Result<(), ReviewError> {
        self.set_approval(record_id, true).await
    }

    pub async fn invalidate(&mut self, record_id: RecordId) -> Result<(), ReviewError> {
        self.set_approval(record_id, false).await
    }
}
