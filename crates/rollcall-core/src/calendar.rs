//! Month grid for picking a review date.

use chrono::{Datelike, Local, Months, NaiveDate};

/// 6 rows × 7 columns, Sunday first.
pub const GRID_CELLS: usize = 42;
pub const WEEKDAY_HEADERS: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalendarDay {
    pub date: NaiveDate,
    pub is_today: bool,
    pub is_selected: bool,
}

/// Lay out the month containing `reference`.
///
/// Cells before the 1st are `None`; the days follow in ascending order and
/// the rest of the grid is `None`.
pub fn month_grid(
    reference: NaiveDate,
    today: NaiveDate,
    selected: Option<NaiveDate>,
) -> Vec<Option<CalendarDay>> {
    let first = first_of_month(reference);
    let leading = first.weekday().num_days_from_sunday() as usize;

    let mut cells = vec![None; leading];
    cells.extend(first.iter_days().take(days_in_month(first) as usize).map(|date| {
        Some(CalendarDay {
            date,
            is_today: date == today,
            is_selected: selected == Some(date),
        })
    }));
    cells.resize(GRID_CELLS, None);
    cells
}

pub fn first_of_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

pub fn days_in_month(date: NaiveDate) -> u32 {
    let first = first_of_month(date);
    first
        .checked_add_months(Months::new(1))
        .map(|next| next.signed_duration_since(first).num_days() as u32)
        // Only December of the last representable year lands here.
        .unwrap_or(31)
}

/// Calendar navigation state: a reference month plus an optional selection.
#[derive(Debug, Clone)]
pub struct AttendanceCalendar {
    reference: NaiveDate,
    today: NaiveDate,
    selected: Option<NaiveDate>,
}

impl Default for AttendanceCalendar {
    fn default() -> Self {
        Self::new(Local::now().date_naive())
    }
}

impl AttendanceCalendar {
    /// Start on the month containing `today`.
    pub fn new(today: NaiveDate) -> Self {
        Self {
            reference: today,
            today,
            selected: None,
        }
    }

    pub fn selected(&self) -> Option<NaiveDate> {
        self.selected
    }

    /// Move by `delta` whole months. The day of month is kept where the
    /// target month has it, otherwise clamped to the month's last day.
    pub fn navigate_month(&mut self, delta: i32) -> NaiveDate {
        let months = Months::new(delta.unsigned_abs());
        let moved = if delta >= 0 {
            self.reference.checked_add_months(months)
        } else {
            self.reference.checked_sub_months(months)
        };
        if let Some(date) = moved {
            self.reference = date;
        }
        self.reference
    }

    /// Jump the view to `month` without touching the selection.
    pub fn show_month(&mut self, month: NaiveDate) {
        self.reference = month;
    }

    /// Mark `date` selected and bring its month into view.
    pub fn select_day(&mut self, date: NaiveDate) {
        self.selected = Some(date);
        self.reference = date;
    }

    pub fn grid(&self) -> Vec<Option<CalendarDay>> {
        month_grid(self.reference, self.today, self.selected)
    }

    pub fn month_label(&self) -> String {
        self.reference.format("%B %Y").to_string()
    }
}
