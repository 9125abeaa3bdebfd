//! Capture → recognize → display cycle for one operator session.
//!
//! | state        | toggle_streaming        | begin_submit            |
//! |--------------|-------------------------|-------------------------|
//! | `Idle`       | start camera → Streaming | `NotStreaming`          |
//! | `Streaming`  | stop camera → Idle       | capture → Submitting    |
//! | `Submitting` | stop camera → Idle       | `Busy`                  |
//!
//! `finish_submit` moves `Submitting` back to `Streaming`. An outcome that
//! arrives after the camera was stopped, or for an older submit, is dropped.
//!
//! Device work runs on the camera's own thread behind a `CameraWorker`;
//! every camera transition here is awaited.

use crate::backend::RecognitionUpload;
use crate::recognition::{RecognitionClient, RecognitionError};
use crate::types::{CaptureResult, ClassId, ClassRef, RecognitionMode};
use rollcall_hw::{CameraError, CameraWorker, CaptureEncoder, EncodeError, Frame};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Streaming,
    Submitting,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Streaming => "streaming",
            Self::Submitting => "submitting",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SubmitError {
    #[error("camera is not streaming")]
    NotStreaming,
    #[error("a capture is already being recognized")]
    Busy,
    #[error("capture superseded before its result arrived")]
    Superseded,
    #[error(transparent)]
    Camera(#[from] CameraError),
    #[error(transparent)]
    Encode(#[from] EncodeError),
    #[error(transparent)]
    Recognition(#[from] RecognitionError),
}

/// A captured frame on its way to the recognizer. Owns everything it
/// needs, so the controller stays free while it runs.
pub struct PendingSubmit {
    seq: u64,
    session_id: Uuid,
    mode: RecognitionMode,
    frame: Frame,
    class_id: Option<ClassId>,
    max_size: Option<(u32, u32)>,
    encoder: CaptureEncoder,
    client: RecognitionClient,
}

impl PendingSubmit {
    /// Encode the frame and send it for recognition.
    pub async fn run(self) -> SubmitOutcome {
        let Self {
            seq,
            session_id,
            mode,
            frame,
            class_id,
            max_size,
            encoder,
            client,
        } = self;

        let result =
            encode_and_recognize(&encoder, &client, frame, max_size, class_id, mode).await;
        if let Err(e) = &result {
            tracing::warn!(session = %session_id, %mode, error = %e, "submit failed");
        }
        SubmitOutcome { seq, result }
    }
}

async fn encode_and_recognize(
    encoder: &CaptureEncoder,
    client: &RecognitionClient,
    frame: Frame,
    max_size: Option<(u32, u32)>,
    class_id: Option<ClassId>,
    mode: RecognitionMode,
) -> Result<CaptureResult, SubmitError> {
    let image = encoder.capture(frame, max_size).await?;
    let upload = RecognitionUpload::new(image).for_class(class_id);
    Ok(client.recognize(upload, mode).await?)
}

pub struct SubmitOutcome {
    seq: u64,
    result: Result<CaptureResult, SubmitError>,
}

/// Dropping the session drops its `CameraWorker`, which releases the device.
pub struct RecognitionSession {
    id: Uuid,
    camera: CameraWorker,
    encoder: CaptureEncoder,
    client: RecognitionClient,
    max_upload_size: Option<(u32, u32)>,
    class: Option<ClassRef>,
    state: SessionState,
    submit_seq: u64,
    last_result: Option<CaptureResult>,
    banner: Option<String>,
}

impl RecognitionSession {
    pub fn new(camera: CameraWorker, encoder: CaptureEncoder, client: RecognitionClient) -> Self {
        let id = Uuid::new_v4();
        tracing::debug!(session = %id, "recognition session created");
        Self {
            id,
            camera,
            encoder,
            client,
            max_upload_size: None,
            class: None,
            state: SessionState::Idle,
            submit_seq: 0,
            last_result: None,
            banner: None,
        }
    }

    /// Scale captures down to fit within this size before upload. Frames
    /// that already fit are sent at the size the camera delivered.
    pub fn with_max_upload_size(mut self, width: u32, height: u32) -> Self {
        self.max_upload_size = Some((width, height));
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn class(&self) -> Option<&ClassRef> {
        self.class.as_ref()
    }

    pub fn last_result(&self) -> Option<&CaptureResult> {
        self.last_result.as_ref()
    }

    /// User-facing error from the last failed attempt.
    pub fn banner(&self) -> Option<&str> {
        self.banner.as_deref()
    }

    /// Bind the session to a class and clear whatever was displayed.
    /// The caller stops the camera before switching classes.
    pub fn bind_class(&mut self, class: Option<ClassRef>) {
        tracing::info!(
            session = %self.id,
            class_id = ?class.as_ref().map(|c| c.id),
            "class bound"
        );
        self.class = class;
        self.last_result = None;
        self.banner = None;
    }

    pub async fn toggle_streaming(&mut self) -> Result<SessionState, CameraError> {
        match self.state {
            SessionState::Idle => self.start_streaming().await?,
            SessionState::Streaming | SessionState::Submitting => self.stop_streaming().await,
        }
        Ok(self.state)
    }

    async fn start_streaming(&mut self) -> Result<(), CameraError> {
        match self.camera.start().await {
            Ok(()) => {
                self.state = SessionState::Streaming;
                self.banner = None;
                tracing::info!(session = %self.id, "streaming started");
                Ok(())
            }
            Err(e) => {
                // Release anything a partial start may have acquired.
                self.camera.stop().await;
                self.state = SessionState::Idle;
                self.banner = Some(e.to_string());
                tracing::warn!(session = %self.id, error = %e, "camera start failed");
                Err(e)
            }
        }
    }

    /// Stop the camera. Any in-flight submit result will be discarded.
    pub async fn stop_streaming(&mut self) {
        self.camera.stop().await;
        if self.state != SessionState::Idle {
            tracing::info!(session = %self.id, "streaming stopped");
        }
        self.state = SessionState::Idle;
    }

    /// Capture a frame and enter `Submitting`.
    pub async fn begin_submit(
        &mut self,
        mode: RecognitionMode,
    ) -> Result<PendingSubmit, SubmitError> {
        match self.state {
            SessionState::Idle => return Err(SubmitError::NotStreaming),
            SessionState::Submitting => {
                tracing::debug!(session = %self.id, "submit rejected: already in flight");
                return Err(SubmitError::Busy);
            }
            SessionState::Streaming => {}
        }

        let frame = match self.camera.capture_frame().await {
            Ok(frame) => frame,
            Err(e) => {
                self.banner = Some(e.to_string());
                return Err(e.into());
            }
        };

        self.submit_seq += 1;
        self.state = SessionState::Submitting;
        tracing::debug!(session = %self.id, seq = self.submit_seq, %mode, "capture taken");

        Ok(PendingSubmit {
            seq: self.submit_seq,
            session_id: self.id,
            mode,
            frame,
            class_id: self.class.as_ref().map(|c| c.id),
            max_size: self.max_upload_size,
            encoder: self.encoder,
            client: self.client.clone(),
        })
    }

    /// Apply a submit outcome and return to `Streaming`.
    pub fn finish_submit(
        &mut self,
        outcome: SubmitOutcome,
    ) -> Result<CaptureResult, SubmitError> {
        if self.state != SessionState::Submitting || outcome.seq != self.submit_seq {
            tracing::debug!(session = %self.id, seq = outcome.seq, "discarding superseded result");
            return Err(SubmitError::Superseded);
        }

        self.state = SessionState::Streaming;
        match outcome.result {
            Ok(result) => {
                self.last_result = Some(result.clone());
                self.banner = None;
                Ok(result)
            }
            Err(e) => {
                self.last_result = None;
                self.banner = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Capture, encode and recognize one frame.
    pub async fn submit(&mut self, mode: RecognitionMode) -> Result<CaptureResult, SubmitError> {
        let pending = self.begin_submit(mode).await?;
        let outcome = pending.run().await;
        self.finish_submit(outcome)
    }
}
