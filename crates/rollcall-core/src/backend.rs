//! The attendance backend seam.
//!
//! Controllers only ever talk to an `AttendanceBackend`; the HTTP
//! implementation lives in [`crate::http`].

use crate::types::{
    AttendanceRecord, ClassId, ClassRef, PersonId, RecognitionMode, RecordId, RegistrationKind,
    ReviewerId,
};
use async_trait::async_trait;
use chrono::NaiveDate;
use rollcall_hw::ImagePayload;
use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("backend unreachable: {0}")]
    Unreachable(String),
    #[error("backend returned {code}: {message}")]
    Status { code: u16, message: String },
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// An image plus the context it is recognized in.
#[derive(Debug, Clone)]
pub struct RecognitionUpload {
    pub image: ImagePayload,
    pub class_id: Option<ClassId>,
}

impl RecognitionUpload {
    pub fn new(image: ImagePayload) -> Self {
        Self {
            image,
            class_id: None,
        }
    }

    pub fn for_class(mut self, class_id: Option<ClassId>) -> Self {
        self.class_id = class_id;
        self
    }
}

/// Raw recognition reply, before interpretation.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RecognitionReply {
    pub recognized: bool,
    #[serde(default)]
    pub person_id: Option<PersonId>,
    #[serde(default)]
    pub person_name: Option<String>,
    /// Match confidence in percent; for a non-match, the best score seen.
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub method: Option<String>,
    /// Server-side processing time in seconds.
    #[serde(default)]
    pub processing_time: Option<f64>,
    #[serde(default)]
    pub message: Option<String>,
    /// Whether a reviewer has already approved the matched identity.
    #[serde(default)]
    pub identity_approved: bool,
    #[serde(default)]
    pub registration_kind: Option<RegistrationKind>,
}

#[async_trait]
pub trait AttendanceBackend: Send + Sync {
    async fn list_classes(&self) -> Result<Vec<ClassRef>, BackendError>;

    async fn recognize(
        &self,
        mode: RecognitionMode,
        upload: &RecognitionUpload,
    ) -> Result<RecognitionReply, BackendError>;

    /// All records whose timestamp falls on `date`.
    async fn attendance_for_date(
        &self,
        date: NaiveDate,
    ) -> Result<Vec<AttendanceRecord>, BackendError>;

    async fn set_approval(
        &self,
        record_id: RecordId,
        approved: bool,
        reviewer_id: ReviewerId,
    ) -> Result<(), BackendError>;
}
