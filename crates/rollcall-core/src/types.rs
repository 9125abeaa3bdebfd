use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub type ClassId = i64;
pub type PersonId = i64;
pub type RecordId = i64;
pub type ReviewerId = i64;

/// Records strictly below this confidence get the low-confidence flag.
pub const LOW_CONFIDENCE_THRESHOLD: f64 = 70.0;

/// Read-only copy of a backend class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassRef {
    pub id: ClassId,
    pub name: String,
}

/// Which recognition endpoint a capture is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecognitionMode {
    /// A match is persisted as an attendance record.
    Commit,
    /// Preview only; the backend never mutates attendance.
    DryRun,
}

impl fmt::Display for RecognitionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Commit => f.write_str("commit"),
            Self::DryRun => f.write_str("dry-run"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistrationKind {
    Entry,
    Exit,
    Test,
}

/// A positive identification returned for one capture.
#[derive(Debug, Clone, PartialEq)]
pub struct Recognition {
    pub person_id: PersonId,
    pub person_name: String,
    pub confidence_percent: f64,
    pub method: String,
    pub processing_time_secs: Option<f64>,
    pub message: Option<String>,
    pub registration_kind: RegistrationKind,
    pub awaiting_reviewer_approval: bool,
}

/// Interpreted outcome of one recognition request.
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureResult {
    Recognized(Recognition),
    NotRecognized {
        message: String,
        max_confidence_percent: Option<f64>,
    },
}

/// One attendance entry as held by the backend.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "AttendanceRecordWire")]
pub struct AttendanceRecord {
    pub id: RecordId,
    pub person_id: PersonId,
    pub person_name: String,
    pub class_id: Option<ClassId>,
    pub class_name: Option<String>,
    pub teacher_name: Option<String>,
    pub timestamp: DateTime<Utc>,
    /// Always within [0, 100].
    pub confidence_percent: f64,
    pub reviewer_approved: bool,
}

impl AttendanceRecord {
    pub fn is_low_confidence(&self) -> bool {
        is_low_confidence(self)
    }

    pub fn group_key(&self) -> GroupKey {
        match self.class_id {
            Some(id) => GroupKey::Class(id),
            None => GroupKey::Unassigned,
        }
    }
}

/// Display-only flag; never gates validation.
pub fn is_low_confidence(record: &AttendanceRecord) -> bool {
    record.confidence_percent < LOW_CONFIDENCE_THRESHOLD
}

/// Clamp a reported confidence into [0, 100]. NaN becomes 0.
pub fn clamp_confidence(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 100.0)
    }
}

/// Key records are grouped under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GroupKey {
    Class(ClassId),
    Unassigned,
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Class(id) => write!(f, "{id}"),
            Self::Unassigned => f.write_str("unassigned"),
        }
    }
}

impl std::str::FromStr for GroupKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("unassigned") {
            return Ok(Self::Unassigned);
        }
        s.parse::<ClassId>()
            .map(Self::Class)
            .map_err(|_| format!("expected a class id or \"unassigned\", got {s:?}"))
    }
}

/// Records of one class for a single day, in backend order.
#[derive(Debug, Clone, PartialEq)]
pub struct AttendanceGroup {
    pub key: GroupKey,
    pub class_name: String,
    pub teacher_name: Option<String>,
    pub records: Vec<AttendanceRecord>,
}

impl AttendanceGroup {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn approved_count(&self) -> usize {
        self.records.iter().filter(|r| r.reviewer_approved).count()
    }

    pub fn low_confidence_count(&self) -> usize {
        self.records.iter().filter(|r| r.is_low_confidence()).count()
    }
}

// --- Wire shape ---

#[derive(Debug, Deserialize)]
struct NamedWire {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ClassWire {
    name: Option<String>,
    teacher_name: Option<String>,
}

/// Attendance record as served by the backend. Names may be flat or
/// nested, `class_id` 0 means unassigned, and `confidence` may be null.
#[derive(Debug, Deserialize)]
struct AttendanceRecordWire {
    id: RecordId,
    person_id: PersonId,
    #[serde(default)]
    person_name: Option<String>,
    #[serde(default)]
    person: Option<NamedWire>,
    #[serde(default)]
    class_id: Option<ClassId>,
    #[serde(default)]
    class_name: Option<String>,
    #[serde(default)]
    class: Option<ClassWire>,
    #[serde(default)]
    teacher_name: Option<String>,
    timestamp: String,
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default)]
    reviewer_approved: bool,
}

impl TryFrom<AttendanceRecordWire> for AttendanceRecord {
    type Error = String;

    fn try_from(wire: AttendanceRecordWire) -> Result<Self, Self::Error> {
        let timestamp = parse_timestamp(&wire.timestamp)?;
        let (nested_class_name, nested_teacher) = match wire.class {
            Some(c) => (c.name, c.teacher_name),
            None => (None, None),
        };

        Ok(Self {
            id: wire.id,
            person_id: wire.person_id,
            person_name: wire
                .person_name
                .or_else(|| wire.person.and_then(|p| p.name))
                .unwrap_or_else(|| "Unknown".to_string()),
            class_id: wire.class_id.filter(|&id| id != 0),
            class_name: wire.class_name.or(nested_class_name),
            teacher_name: wire.teacher_name.or(nested_teacher),
            timestamp,
            confidence_percent: clamp_confidence(wire.confidence.unwrap_or(0.0)),
            reviewer_approved: wire.reviewer_approved,
        })
    }
}

/// Accept RFC 3339, or a naive ISO-8601 date-time taken as UTC.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
        .ok_or_else(|| format!("invalid timestamp: {raw:?}"))
}
