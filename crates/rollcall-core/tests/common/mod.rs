#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use rollcall_core::backend::{
    AttendanceBackend, BackendError, RecognitionReply, RecognitionUpload,
};
use rollcall_core::types::{
    AttendanceRecord, ClassId, ClassRef, PersonId, RecognitionMode, RecordId, ReviewerId,
};
use rollcall_hw::{CameraError, CameraSource, Frame};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::ThreadId;

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn record_on(
    day: NaiveDate,
    id: RecordId,
    class_id: Option<ClassId>,
    confidence: f64,
) -> AttendanceRecord {
    AttendanceRecord {
        id,
        person_id: id * 100,
        person_name: format!("person {id}"),
        class_id,
        class_name: class_id.map(|c| format!("class {c}")),
        teacher_name: None,
        timestamp: Utc.from_utc_datetime(&day.and_hms_opt(8, 0, 0).unwrap()),
        confidence_percent: confidence,
        reviewer_approved: false,
    }
}

/// Who the stub recognizer "sees" in every capture.
#[derive(Clone)]
pub struct Enrolled {
    pub person_id: PersonId,
    pub name: String,
    pub confidence: f64,
    pub identity_approved: bool,
}

#[derive(Default)]
struct MemoryState {
    classes: Vec<ClassRef>,
    records: Vec<AttendanceRecord>,
    next_id: RecordId,
    enrolled: Option<Enrolled>,
    commit_day: Option<NaiveDate>,
    recognize_error: Option<BackendError>,
    fetch_error: Option<BackendError>,
    approval_error: Option<BackendError>,
    uploads: Vec<(RecognitionMode, Option<ClassId>, usize)>,
    approvals: Vec<(RecordId, bool, ReviewerId)>,
    fetches: Vec<NaiveDate>,
}

/// In-memory backend: commits append a record, dry-runs never do.
#[derive(Default)]
pub struct MemoryBackend {
    state: Mutex<MemoryState>,
}

impl MemoryBackend {
    pub fn new() -> Arc<Self> {
        let backend = Self::default();
        backend.state.lock().unwrap().next_id = 1000;
        Arc::new(backend)
    }

    pub fn with_records(records: Vec<AttendanceRecord>) -> Arc<Self> {
        let backend = Self::new();
        backend.state.lock().unwrap().records = records;
        backend
    }

    pub fn set_classes(&self, classes: Vec<ClassRef>) {
        self.state.lock().unwrap().classes = classes;
    }

    pub fn enroll(&self, enrolled: Enrolled, commit_day: NaiveDate) {
        let mut state = self.state.lock().unwrap();
        state.enrolled = Some(enrolled);
        state.commit_day = Some(commit_day);
    }

    pub fn fail_recognition(&self, error: Option<BackendError>) {
        self.state.lock().unwrap().recognize_error = error;
    }

    pub fn fail_fetch(&self, error: Option<BackendError>) {
        self.state.lock().unwrap().fetch_error = error;
    }

    pub fn fail_approval(&self, error: Option<BackendError>) {
        self.state.lock().unwrap().approval_error = error;
    }

    pub fn uploads(&self) -> Vec<(RecognitionMode, Option<ClassId>, usize)> {
        self.state.lock().unwrap().uploads.clone()
    }

    pub fn approvals(&self) -> Vec<(RecordId, bool, ReviewerId)> {
        self.state.lock().unwrap().approvals.clone()
    }

    pub fn fetches(&self) -> Vec<NaiveDate> {
        self.state.lock().unwrap().fetches.clone()
    }

    pub fn record_count(&self) -> usize {
        self.state.lock().unwrap().records.len()
    }
}

#[async_trait]
impl AttendanceBackend for MemoryBackend {
    async fn list_classes(&self) -> Result<Vec<ClassRef>, BackendError> {
        Ok(self.state.lock().unwrap().classes.clone())
    }

    async fn recognize(
        &self,
        mode: RecognitionMode,
        upload: &RecognitionUpload,
    ) -> Result<RecognitionReply, BackendError> {
        let mut state = self.state.lock().unwrap();
        state
            .uploads
            .push((mode, upload.class_id, upload.image.bytes.len()));
        if let Some(err) = state.recognize_error.clone() {
            return Err(err);
        }

        let Some(enrolled) = state.enrolled.clone() else {
            return Ok(RecognitionReply {
                recognized: false,
                confidence: Some(12.0),
                message: Some("Face not recognized".into()),
                ..Default::default()
            });
        };

        if mode == RecognitionMode::Commit {
            let day = state.commit_day.unwrap_or_else(|| Utc::now().date_naive());
            let id = state.next_id;
            state.next_id += 1;
            let mut record = record_on(day, id, upload.class_id, enrolled.confidence);
            record.person_id = enrolled.person_id;
            record.person_name = enrolled.name.clone();
            state.records.push(record);
        }

        Ok(RecognitionReply {
            recognized: true,
            person_id: Some(enrolled.person_id),
            person_name: Some(enrolled.name),
            confidence: Some(enrolled.confidence),
            method: Some("stub".into()),
            processing_time: Some(0.01),
            message: None,
            identity_approved: enrolled.identity_approved,
            registration_kind: None,
        })
    }

    async fn attendance_for_date(
        &self,
        date: NaiveDate,
    ) -> Result<Vec<AttendanceRecord>, BackendError> {
        let mut state = self.state.lock().unwrap();
        state.fetches.push(date);
        if let Some(err) = state.fetch_error.clone() {
            return Err(err);
        }
        Ok(state
            .records
            .iter()
            .filter(|r| r.timestamp.date_naive() == date)
            .cloned()
            .collect())
    }

    async fn set_approval(
        &self,
        record_id: RecordId,
        approved: bool,
        reviewer_id: ReviewerId,
    ) -> Result<(), BackendError> {
        let mut state = self.state.lock().unwrap();
        state.approvals.push((record_id, approved, reviewer_id));
        if let Some(err) = state.approval_error.clone() {
            return Err(err);
        }
        match state.records.iter_mut().find(|r| r.id == record_id) {
            Some(record) => {
                record.reviewer_approved = approved;
                Ok(())
            }
            None => Err(BackendError::Status {
                code: 404,
                message: "{\"detail\":\"Attendance record not found\"}".into(),
            }),
        }
    }
}

/// Observable device state shared with the test after the camera moves
/// into a session.
#[derive(Default)]
pub struct CameraProbe {
    pub active: AtomicBool,
    pub starts: AtomicUsize,
    pub stops: AtomicUsize,
    /// Threads that ran `start` or `capture_frame`.
    pub threads: Mutex<Vec<ThreadId>>,
}

impl CameraProbe {
    fn record_thread(&self) {
        self.threads.lock().unwrap().push(std::thread::current().id());
    }
}

pub struct FakeCamera {
    pub probe: Arc<CameraProbe>,
    start_error: Option<CameraError>,
    capture_error: Option<CameraError>,
    sequence: u32,
}

impl FakeCamera {
    pub fn new() -> (Self, Arc<CameraProbe>) {
        let probe = Arc::new(CameraProbe::default());
        (
            Self {
                probe: Arc::clone(&probe),
                start_error: None,
                capture_error: None,
                sequence: 0,
            },
            probe,
        )
    }

    pub fn failing_start(error: CameraError) -> (Self, Arc<CameraProbe>) {
        let (mut camera, probe) = Self::new();
        camera.start_error = Some(error);
        (camera, probe)
    }

    pub fn failing_capture(error: CameraError) -> (Self, Arc<CameraProbe>) {
        let (mut camera, probe) = Self::new();
        camera.capture_error = Some(error);
        (camera, probe)
    }
}

impl CameraSource for FakeCamera {
    fn start(&mut self) -> Result<(), CameraError> {
        self.probe.starts.fetch_add(1, Ordering::SeqCst);
        self.probe.record_thread();
        if let Some(err) = self.start_error.clone() {
            return Err(err);
        }
        self.probe.active.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&mut self) {
        self.probe.stops.fetch_add(1, Ordering::SeqCst);
        self.probe.active.store(false, Ordering::SeqCst);
    }

    fn is_active(&self) -> bool {
        self.probe.active.load(Ordering::SeqCst)
    }

    fn capture_frame(&mut self) -> Result<Frame, CameraError> {
        self.probe.record_thread();
        if !self.is_active() {
            return Err(CameraError::NotStreaming);
        }
        if let Some(err) = self.capture_error.clone() {
            return Err(err);
        }
        self.sequence += 1;
        Ok(Frame {
            data: vec![120u8; 16 * 12 * 3],
            width: 16,
            height: 12,
            timestamp: std::time::Instant::now(),
            sequence: self.sequence,
        })
    }
}
