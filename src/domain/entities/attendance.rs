use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

/// The two attendance event kinds an employee can record per day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttendanceEventKind {
    CheckIn,
    CheckOut,
}

impl AttendanceEventKind {
    /// Stable value stored in the `kind` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            AttendanceEventKind::CheckIn => "check_in",
            AttendanceEventKind::CheckOut => "check_out",
        }
    }
}

impl std::fmt::Display for AttendanceEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One line of an employee's attendance report: the first check-in and
/// the last check-out of a given day.
#[derive(Debug, Serialize)]
pub struct DailyAttendance {
    pub day: NaiveDate,
    pub first_check_in: Option<DateTime<Utc>>,
    pub last_check_out: Option<DateTime<Utc>>,
}
