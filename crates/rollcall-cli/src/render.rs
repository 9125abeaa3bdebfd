//! Plain-text views for the terminal front-end.

use chrono::{Datelike, Local};
use rollcall_core::calendar::WEEKDAY_HEADERS;
use rollcall_core::types::{RegistrationKind, LOW_CONFIDENCE_THRESHOLD};
use rollcall_core::{AttendanceCalendar, AttendanceGroup, CaptureResult, ReviewSummary};
use std::fmt::Write;

/// Month grid, Sunday first. Today is starred, the selection bracketed.
pub fn calendar(calendar: &AttendanceCalendar) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{:^28}", calendar.month_label());
    for header in WEEKDAY_HEADERS {
        let _ = write!(out, "{header} ");
    }
    out.push('\n');

    for week in calendar.grid().chunks(7) {
        if week.iter().all(Option::is_none) {
            continue;
        }
        for cell in week {
            match cell {
                None => out.push_str("    "),
                Some(day) => {
                    let (open, close) = if day.is_selected {
                        ('[', ']')
                    } else if day.is_today {
                        (' ', '*')
                    } else {
                        (' ', ' ')
                    };
                    let _ = write!(out, "{open}{:>2}{close}", day.date.day());
                }
            }
        }
        out.push('\n');
    }
    out
}

pub fn capture_result(result: &CaptureResult) -> String {
    match result {
        CaptureResult::Recognized(r) => {
            let kind = match r.registration_kind {
                RegistrationKind::Entry => "entry",
                RegistrationKind::Exit => "exit",
                RegistrationKind::Test => "test (not recorded)",
            };
            let mut out = format!(
                "Recognized {} (#{}) {:.1}% via {} [{kind}]",
                r.person_name, r.person_id, r.confidence_percent, r.method
            );
            if let Some(secs) = r.processing_time_secs {
                let _ = write!(out, " in {secs:.2}s");
            }
            if let Some(message) = &r.message {
                let _ = write!(out, "\n  {message}");
            }
            if r.awaiting_reviewer_approval {
                out.push_str("\n  awaiting reviewer approval");
            }
            out
        }
        CaptureResult::NotRecognized {
            message,
            max_confidence_percent,
        } => match max_confidence_percent {
            Some(best) => format!("Not recognized: {message} (best {best:.1}%)"),
            None => format!("Not recognized: {message}"),
        },
    }
}

/// Per-class listing; low-confidence rows carry a manual-check prompt.
pub fn groups(groups: &[AttendanceGroup], summary: &ReviewSummary) -> String {
    let mut out = String::new();
    if groups.is_empty() {
        out.push_str("No attendance recorded for this day.\n");
        return out;
    }
    for group in groups {
        let _ = write!(out, "{} [{}]", group.class_name, group.key);
        if let Some(teacher) = &group.teacher_name {
            let _ = write!(out, " - {teacher}");
        }
        let _ = writeln!(
            out,
            "  ({}/{} approved)",
            group.approved_count(),
            group.len()
        );
        for record in &group.records {
            let status = if record.reviewer_approved { "approved" } else { "pending" };
            let _ = write!(
                out,
                "  #{:<6} {:<24} {} {:>5.1}% {status}",
                record.id,
                record.person_name,
                record.timestamp.with_timezone(&Local).format("%H:%M"),
                record.confidence_percent,
            );
            if record.is_low_confidence() {
                let _ = write!(
                    out,
                    "  ! below {LOW_CONFIDENCE_THRESHOLD:.0}%, check manually: \
                     is this person #{} ({}) of class {}?",
                    record.person_id,
                    record.person_name,
                    record.group_key(),
                );
            }
            out.push('\n');
        }
    }
    let _ = writeln!(
        out,
        "{} records: {} approved, {} pending, {} low confidence",
        summary.total, summary.approved, summary.pending, summary.low_confidence
    );
    out
}
