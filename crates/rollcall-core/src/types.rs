use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Length of every face embedding produced by the recognition model.
pub const EMBEDDING_DIM: usize = 128;

const SECS_PER_DAY: u32 = 24 * 60 * 60;

/// Face location as reported by the detector, in pixel coordinates.
///
/// Passed through to callers untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
    pub left: i32,
}

/// Face embedding vector ([`EMBEDDING_DIM`] floats for a well-formed face).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Embedding {
    pub values: Vec<f32>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// False if any component is NaN or infinite.
    pub fn is_finite(&self) -> bool {
        self.values.iter().all(|v| v.is_finite())
    }

    /// Compute Euclidean distance between two embeddings.
    pub fn euclidean_distance(&self, other: &Embedding) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }
}

/// An enrolled person as held in the roster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    pub id: i64,
    pub name: String,
    pub embedding: Embedding,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("invalid time of day: {0:?} (expected HH:MM or HH:MM:SS)")]
    TimeOfDay(String),
    #[error("invalid attendance status: {0:?}")]
    Status(String),
}

/// Time of day as seconds since midnight, in `0..86400`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimeOfDay(u32);

impl TimeOfDay {
    pub fn from_hms(hour: u32, minute: u32, second: u32) -> Option<Self> {
        if hour >= 24 || minute >= 60 || second >= 60 {
            return None;
        }
        Some(Self(hour * 3600 + minute * 60 + second))
    }

    pub fn from_seconds(secs: u32) -> Option<Self> {
        (secs < SECS_PER_DAY).then_some(Self(secs))
    }

    pub fn seconds(self) -> u32 {
        self.0
    }

    /// This time of day on the given calendar date.
    pub fn on(self, date: NaiveDate) -> NaiveDateTime {
        date.and_time(NaiveTime::default()) + Duration::seconds(i64::from(self.0))
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (h, rem) = (self.0 / 3600, self.0 % 3600);
        write!(f, "{:02}:{:02}:{:02}", h, rem / 60, rem % 60)
    }
}

impl FromStr for TimeOfDay {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || ParseError::TimeOfDay(s.to_string());
        let parts: Vec<&str> = s.trim().split(':').collect();
        if !(2..=3).contains(&parts.len()) {
            return Err(bad());
        }
        let mut fields = [0u32; 3];
        for (slot, part) in fields.iter_mut().zip(&parts) {
            if part.is_empty() || part.len() > 2 {
                return Err(bad());
            }
            *slot = part.parse().map_err(|_| bad())?;
        }
        Self::from_hms(fields[0], fields[1], fields[2]).ok_or_else(bad)
    }
}

impl TryFrom<String> for TimeOfDay {
    type Error = ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TimeOfDay> for String {
    fn from(value: TimeOfDay) -> Self {
        value.to_string()
    }
}

/// A timetabled class occurrence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub schedule_id: i64,
    pub course_id: i64,
    pub teacher_id: i64,
    pub day_of_week: Weekday,
    pub start_time: TimeOfDay,
    pub end_time: TimeOfDay,
}

impl Session {
    /// Absolute start and end of this session on `date`.
    pub fn window_on(&self, date: NaiveDate) -> (NaiveDateTime, NaiveDateTime) {
        (self.start_time.on(date), self.end_time.on(date))
    }
}

/// A session joined with its course, as returned by the active-session lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveSession {
    pub session: Session,
    pub course_name: String,
}

/// A session resolved against a concrete day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionWindow {
    pub schedule_id: i64,
    pub course_id: i64,
    pub course_name: String,
    pub start_dt: NaiveDateTime,
    pub end_dt: NaiveDateTime,
}

/// Persisted attendance status.
///
/// A failed write is an outcome of the ledger, never a stored status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttendanceStatus {
    Present,
    Late,
    Absent,
}

impl AttendanceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AttendanceStatus::Present => "present",
            AttendanceStatus::Late => "late",
            AttendanceStatus::Absent => "absent",
        }
    }
}

impl fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttendanceStatus {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "present" => Ok(AttendanceStatus::Present),
            "late" => Ok(AttendanceStatus::Late),
            "absent" => Ok(AttendanceStatus::Absent),
            other => Err(ParseError::Status(other.to_string())),
        }
    }
}

/// One attendance row. Keyed by (identity_id, schedule_id, scan day).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub identity_id: i64,
    pub schedule_id: i64,
    pub scan_time: NaiveDateTime,
    pub status: AttendanceStatus,
}

impl AttendanceRecord {
    pub fn day(&self) -> NaiveDate {
        self.scan_time.date()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_euclidean_distance_identical() {
        let a = Embedding::new(vec![0.1, 0.2, 0.3]);
        assert_eq!(a.euclidean_distance(&a.clone()), 0.0);
    }

    #[test]
    fn test_euclidean_distance_known() {
        let a = Embedding::new(vec![0.0, 0.0]);
        let b = Embedding::new(vec![3.0, 4.0]);
        assert!((a.euclidean_distance(&b) - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_time_of_day_parse() {
        let t: TimeOfDay = "09:15".parse().unwrap();
        assert_eq!(t.seconds(), 9 * 3600 + 15 * 60);
        let t: TimeOfDay = "23:59:59".parse().unwrap();
        assert_eq!(t.seconds(), 86_399);
        assert_eq!(t.to_string(), "23:59:59");
    }

    #[test]
    fn test_time_of_day_rejects_garbage() {
        for bad in ["", "9", "24:00", "12:60", "12:00:60", "aa:bb", "1:2:3:4", "123:00"] {
            assert!(bad.parse::<TimeOfDay>().is_err(), "accepted {bad:?}");
        }
    }

    #[test]
    fn test_time_of_day_on_date() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 4).unwrap();
        let t = TimeOfDay::from_hms(9, 30, 5).unwrap();
        assert_eq!(t.on(date), date.and_hms_opt(9, 30, 5).unwrap());
    }

    #[test]
    fn test_time_of_day_serde_as_string() {
        let t = TimeOfDay::from_hms(8, 5, 0).unwrap();
        assert_eq!(serde_json::to_string(&t).unwrap(), "\"08:05:00\"");
        let back: TimeOfDay = serde_json::from_str("\"08:05\"").unwrap();
        assert_eq!(back, t);
    }

    #[test]
    fn test_status_round_trip_names() {
        for s in [AttendanceStatus::Present, AttendanceStatus::Late, AttendanceStatus::Absent] {
            assert_eq!(s.as_str().parse::<AttendanceStatus>().unwrap(), s);
        }
        assert!("error".parse::<AttendanceStatus>().is_err());
    }
}
