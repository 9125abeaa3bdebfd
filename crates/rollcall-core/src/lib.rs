//! rollcall-core — Attendance capture and review engine.
//!
//! Drives the capture → recognize → display cycle against a remote
//! recognition backend and the reviewer's date-scoped attendance audit.
//! Recognition itself happens server-side.

pub mod backend;
pub mod calendar;
pub mod http;
pub mod recognition;
pub mod review;
pub mod session;
pub mod types;

pub use backend::{AttendanceBackend, BackendError, RecognitionReply, RecognitionUpload};
pub use calendar::{AttendanceCalendar, CalendarDay};
pub use http::{Endpoints, HttpBackend};
pub use recognition::{RecognitionClient, RecognitionError};
pub use review::{AttendanceReviewController, LoadOutcome, ReviewError, ReviewState, ReviewSummary};
pub use session::{RecognitionSession, SessionState, SubmitError};
pub use types::{
    AttendanceGroup, AttendanceRecord, CaptureResult, ClassRef, GroupKey, Recognition,
    RecognitionMode, RegistrationKind,
};
