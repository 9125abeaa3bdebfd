//! Capture submission and reply interpretation.

use crate::backend::{AttendanceBackend, BackendError, RecognitionReply, RecognitionUpload};
use crate::types::{clamp_confidence, CaptureResult, Recognition, RecognitionMode, RegistrationKind};
use std::sync::Arc;
use thiserror::Error;

const DEFAULT_NOT_RECOGNIZED: &str = "Face not recognized";
const UNKNOWN_METHOD: &str = "unknown";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecognitionError {
    #[error("recognition service unreachable: {0}")]
    Unreachable(String),
    #[error("recognition service error {code}: {message}")]
    ServerError { code: u16, message: String },
    #[error("unexpected recognition reply: {0}")]
    InvalidResponse(String),
    #[error("could not build recognition request: {0}")]
    InvalidRequest(String),
}

impl From<BackendError> for RecognitionError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::Unreachable(msg) => Self::Unreachable(msg),
            BackendError::Status { code, message } => Self::ServerError { code, message },
            BackendError::InvalidResponse(msg) => Self::InvalidResponse(msg),
            BackendError::InvalidRequest(msg) => Self::InvalidRequest(msg),
        }
    }
}

/// Sends captures to the commit or dry-run endpoint. Never retries.
#[derive(Clone)]
pub struct RecognitionClient {
    backend: Arc<dyn AttendanceBackend>,
}

impl RecognitionClient {
    pub fn new(backend: Arc<dyn AttendanceBackend>) -> Self {
        Self { backend }
    }

    pub async fn recognize(
        &self,
        upload: RecognitionUpload,
        mode: RecognitionMode,
    ) -> Result<CaptureResult, RecognitionError> {
        let reply = self.backend.recognize(mode, &upload).await.map_err(|e| {
            tracing::warn!(%mode, error = %e, "recognition request failed");
            RecognitionError::from(e)
        })?;
        let result = interpret(reply, mode);

        match &result {
            CaptureResult::Recognized(r) => tracing::info!(
                %mode,
                person_id = r.person_id,
                confidence = r.confidence_percent,
                awaiting_approval = r.awaiting_reviewer_approval,
                "face recognized"
            ),
            CaptureResult::NotRecognized { message, .. } => {
                tracing::info!(%mode, %message, "face not recognized")
            }
        }
        Ok(result)
    }
}

/// Map a raw reply to a `CaptureResult`.
///
/// A match stays awaiting reviewer approval unless the identity was
/// already approved and the call was a commit. Confidence plays no part.
pub fn interpret(reply: RecognitionReply, mode: RecognitionMode) -> CaptureResult {
    let confidence = reply.confidence.map(clamp_confidence);

    let person_id = match (reply.recognized, reply.person_id) {
        (true, Some(id)) => id,
        _ => {
            return CaptureResult::NotRecognized {
                message: reply
                    .message
                    .unwrap_or_else(|| DEFAULT_NOT_RECOGNIZED.to_string()),
                max_confidence_percent: confidence,
            }
        }
    };

    let registration_kind = match mode {
        RecognitionMode::DryRun => RegistrationKind::Test,
        RecognitionMode::Commit => reply.registration_kind.unwrap_or(RegistrationKind::Entry),
    };

    CaptureResult::Recognized(Recognition {
        person_id,
        person_name: reply.person_name.unwrap_or_else(|| format!("#{person_id}")),
        confidence_percent: confidence.unwrap_or(0.0),
        method: reply.method.unwrap_or_else(|| UNKNOWN_METHOD.to_string()),
        processing_time_secs: reply.processing_time,
        message: reply.message,
        registration_kind,
        awaiting_reviewer_approval: !(reply.identity_approved && mode == RecognitionMode::Commit),
    })
}
