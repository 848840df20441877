//! Conversions between stored column values and domain types.

use chrono::{NaiveDate, NaiveDateTime, Weekday};
use rollcall_core::{AttendanceStatus, Embedding, Session, TimeOfDay, EMBEDDING_DIM};
use thiserror::Error;

/// Stored embeddings are `EMBEDDING_DIM` little-endian f64 values.
pub const EMBEDDING_BLOB_LEN: usize = EMBEDDING_DIM * 8;

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
pub const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("embedding blob is {actual} bytes, expected {}", EMBEDDING_BLOB_LEN)]
    EmbeddingLength { actual: usize },
    #[error("embedding component {index} is not a finite number")]
    NonFinite { index: usize },
    #[error("invalid timestamp {0:?}")]
    Timestamp(String),
    #[error("invalid weekday {0:?}")]
    Weekday(String),
    #[error("{0}")]
    Field(String),
    #[error("schedule {schedule_id} ends before it starts")]
    InvertedWindow { schedule_id: i64 },
}

pub fn encode_embedding(embedding: &Embedding) -> Vec<u8> {
    embedding
        .values
        .iter()
        .flat_map(|&v| f64::from(v).to_le_bytes())
        .collect()
}

pub fn decode_embedding(blob: &[u8]) -> Result<Embedding, DecodeError> {
    if blob.len() != EMBEDDING_BLOB_LEN {
        return Err(DecodeError::EmbeddingLength { actual: blob.len() });
    }
    let mut values = Vec::with_capacity(EMBEDDING_DIM);
    for (index, chunk) in blob.chunks_exact(8).enumerate() {
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(chunk);
        // Narrowing can overflow to infinity as well.
        let value = f64::from_le_bytes(bytes) as f32;
        if !value.is_finite() {
            return Err(DecodeError::NonFinite { index });
        }
        values.push(value);
    }
    Ok(Embedding::new(values))
}

pub fn format_timestamp(ts: NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

pub fn parse_timestamp(s: &str) -> Result<NaiveDateTime, DecodeError> {
    NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT).map_err(|_| DecodeError::Timestamp(s.to_string()))
}

pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// Full English day name, as stored in `schedules.day_of_week`.
pub fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

pub fn parse_weekday(s: &str) -> Result<Weekday, DecodeError> {
    s.parse().map_err(|_| DecodeError::Weekday(s.to_string()))
}

/// A `schedules` row as read, before validation.
pub(crate) struct SessionRow {
    pub schedule_id: i64,
    pub course_id: i64,
    pub teacher_id: i64,
    pub day_of_week: String,
    pub start_time: String,
    pub end_time: String,
}

pub(crate) const SESSION_COLUMNS: &str =
    "s.schedule_id, s.course_id, s.teacher_id, s.day_of_week, s.start_time, s.end_time";

impl SessionRow {
    /// Read the [`SESSION_COLUMNS`] starting at column `offset`.
    pub fn read(row: &rusqlite::Row<'_>, offset: usize) -> rusqlite::Result<Self> {
        Ok(Self {
            schedule_id: row.get(offset)?,
            course_id: row.get(offset + 1)?,
            teacher_id: row.get(offset + 2)?,
            day_of_week: row.get(offset + 3)?,
            start_time: row.get(offset + 4)?,
            end_time: row.get(offset + 5)?,
        })
    }

    pub fn into_session(self) -> Result<Session, DecodeError> {
        let start_time = parse_time(&self.start_time)?;
        let end_time = parse_time(&self.end_time)?;
        if end_time < start_time {
            return Err(DecodeError::InvertedWindow {
                schedule_id: self.schedule_id,
            });
        }
        Ok(Session {
            schedule_id: self.schedule_id,
            course_id: self.course_id,
            teacher_id: self.teacher_id,
            day_of_week: parse_weekday(&self.day_of_week)?,
            start_time,
            end_time,
        })
    }
}

fn parse_time(s: &str) -> Result<TimeOfDay, DecodeError> {
    s.parse::<TimeOfDay>().map_err(|e| DecodeError::Field(e.to_string()))
}

pub fn parse_status(s: &str) -> Result<AttendanceStatus, DecodeError> {
    s.parse::<AttendanceStatus>().map_err(|e| DecodeError::Field(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedding_blob_layout() {
        let mut values = vec![0.0f32; EMBEDDING_DIM];
        values[0] = 0.25;
        values[EMBEDDING_DIM - 1] = -1.5;
        let blob = encode_embedding(&Embedding::new(values.clone()));
        assert_eq!(blob.len(), 1024);
        assert_eq!(&blob[..8], &0.25f64.to_le_bytes());
        assert_eq!(decode_embedding(&blob).unwrap().values, values);
    }

    #[test]
    fn test_embedding_blob_wrong_length() {
        assert_eq!(
            decode_embedding(&[0u8; 512]).unwrap_err(),
            DecodeError::EmbeddingLength { actual: 512 }
        );
    }

    #[test]
    fn test_embedding_blob_non_finite() {
        let mut values = vec![0.0f32; EMBEDDING_DIM];
        values[3] = f32::NAN;
        let blob = encode_embedding(&Embedding::new(values));
        assert_eq!(decode_embedding(&blob).unwrap_err(), DecodeError::NonFinite { index: 3 });

        let mut blob = vec![0u8; EMBEDDING_BLOB_LEN];
        blob[8..16].copy_from_slice(&f64::MAX.to_le_bytes());
        assert_eq!(decode_embedding(&blob).unwrap_err(), DecodeError::NonFinite { index: 1 });
    }

    #[test]
    fn test_weekday_names_parse_back() {
        for day in [Weekday::Mon, Weekday::Wed, Weekday::Sun] {
            assert_eq!(parse_weekday(weekday_name(day)).unwrap(), day);
        }
        assert!(parse_weekday("Someday").is_err());
    }

    #[test]
    fn test_timestamps_sort_as_text() {
        let a = NaiveDate::from_ymd_opt(2024, 3, 4).unwrap().and_hms_opt(9, 5, 0).unwrap();
        let b = NaiveDate::from_ymd_opt(2024, 3, 4).unwrap().and_hms_opt(10, 0, 0).unwrap();
        assert!(format_timestamp(a) < format_timestamp(b));
        assert_eq!(parse_timestamp(&format_timestamp(a)).unwrap(), a);
    }

    #[test]
    fn test_inverted_session_rejected() {
        let row = SessionRow {
            schedule_id: 3,
            course_id: 1,
            teacher_id: 1,
            day_of_week: "Monday".into(),
            start_time: "10:00:00".into(),
            end_time: "09:00:00".into(),
        };
        assert_eq!(row.into_session().unwrap_err(), DecodeError::InvertedWindow { schedule_id: 3 });
    }
}
