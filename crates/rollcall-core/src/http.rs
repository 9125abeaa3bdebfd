//! reqwest-backed `AttendanceBackend`.

use crate::backend::{AttendanceBackend, BackendError, RecognitionReply, RecognitionUpload};
use crate::types::{AttendanceRecord, ClassRef, RecognitionMode, RecordId, ReviewerId};
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const USER_AGENT: &str = concat!("rollcall/", env!("CARGO_PKG_VERSION"));
const CAPTURE_FILE_NAME: &str = "capture.jpg";

/// Backend paths. These are a deployment detail, so every one is configurable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    pub classes: String,
    pub recognize_commit: String,
    pub recognize_dry_run: String,
    pub attendance: String,
    /// Template; `{id}` is replaced by the record id.
    pub approval: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            classes: "/classes".into(),
            recognize_commit: "/recognition/commit".into(),
            recognize_dry_run: "/recognition/dry-run".into(),
            attendance: "/attendance".into(),
            approval: "/attendance/{id}/approval".into(),
        }
    }
}

impl Endpoints {
    pub fn recognize(&self, mode: RecognitionMode) -> &str {
        match mode {
            RecognitionMode::Commit => &self.recognize_commit,
            RecognitionMode::DryRun => &self.recognize_dry_run,
        }
    }

    pub fn approval_path(&self, record_id: RecordId) -> String {
        self.approval.replace("{id}", &record_id.to_string())
    }
}

#[derive(Serialize)]
struct ApprovalBody {
    approved: bool,
    reviewer_id: ReviewerId,
}

/// HTTP client for the attendance REST API.
pub struct HttpBackend {
    http_client: reqwest::Client,
    base_url: String,
    endpoints: Endpoints,
}

impl HttpBackend {
    pub fn new(
        base_url: &str,
        endpoints: Endpoints,
        timeout: Duration,
    ) -> Result<Self, BackendError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| BackendError::InvalidRequest(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            endpoints,
        })
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{path}", self.base_url)
        } else {
            format!("{}/{path}", self.base_url)
        }
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, BackendError> {
        let response = request
            .send()
            .await
            .map_err(|e| BackendError::Unreachable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), %message, "backend request failed");
            return Err(BackendError::Status {
                code: status.as_u16(),
                message,
            });
        }
        Ok(response)
    }

    async fn json<T: serde::de::DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, BackendError> {
        self.send(request)
            .await?
            .json()
            .await
            .map_err(|e| BackendError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl AttendanceBackend for HttpBackend {
    async fn list_classes(&self) -> Result<Vec<ClassRef>, BackendError> {
        let url = self.url(&self.endpoints.classes);
        tracing::debug!(%url, "listing classes");
        self.json(self.http_client.get(url)).await
    }

    async fn recognize(
        &self,
        mode: RecognitionMode,
        upload: &RecognitionUpload,
    ) -> Result<RecognitionReply, BackendError> {
        let url = self.url(self.endpoints.recognize(mode));

        let part = Part::bytes(upload.image.bytes.clone())
            .file_name(CAPTURE_FILE_NAME)
            .mime_str(upload.image.mime)
            .map_err(|e| BackendError::InvalidRequest(e.to_string()))?;
        let mut form = Form::new().part("image", part);
        if let Some(class_id) = upload.class_id {
            form = form.text("class_id", class_id.to_string());
        }

        tracing::debug!(
            %url,
            %mode,
            bytes = upload.image.bytes.len(),
            class_id = ?upload.class_id,
            "submitting capture"
        );
        self.json(self.http_client.post(url).multipart(form)).await
    }

    async fn attendance_for_date(
        &self,
        date: NaiveDate,
    ) -> Result<Vec<AttendanceRecord>, BackendError> {
        let url = self.url(&self.endpoints.attendance);
        let date = date.format("%Y-%m-%d").to_string();
        tracing::debug!(%url, %date, "fetching attendance");
        self.json(self.http_client.get(url).query(&[("date", date)])).await
    }

    async fn set_approval(
        &self,
        record_id: RecordId,
        approved: bool,
        reviewer_id: ReviewerId,
    ) -> Result<(), BackendError> {
        let url = self.url(&self.endpoints.approval_path(record_id));
        tracing::debug!(%url, record_id, approved, "updating approval");
        self.send(
            self.http_client
                .put(url)
                .json(&ApprovalBody { approved, reviewer_id }),
        )
        .await?;
        Ok(())
    }
}
