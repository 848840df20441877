//! Read-only attendance views for the daemon's report endpoints and the CLI.

use crate::codec::{format_date, format_timestamp, parse_status, parse_timestamp, DecodeError};
use crate::sqlite::{corrupt, SqliteStore};
use chrono::{NaiveDate, NaiveDateTime};
use rollcall_core::{AttendanceStatus, StoreError};
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};

/// One attendance record of the day, joined with identity and course names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanEntry {
    pub identity_id: i64,
    pub name: String,
    pub schedule_id: i64,
    pub course_name: String,
    pub scan_time: NaiveDateTime,
    pub status: AttendanceStatus,
}

/// One enrolled identity in a [`CourseReport`].
///
/// When the identity has records in several of the course's sessions that
/// day, the latest scan is shown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportRow {
    pub identity_id: i64,
    pub name: String,
    pub schedule_id: Option<i64>,
    pub scan_time: Option<NaiveDateTime>,
    pub status: Option<AttendanceStatus>,
}

/// Every enrolled identity of a course with their record for one day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseReport {
    pub course_id: i64,
    pub course_code: String,
    pub course_name: String,
    pub date: NaiveDate,
    pub rows: Vec<ReportRow>,
}

impl CourseReport {
    pub const CSV_HEADER: [&'static str; 5] = ["identity_id", "name", "schedule_id", "scan_time", "status"];

    /// Write the rows as CSV with a header line. Unscanned identities get
    /// empty schedule, time and status cells.
    pub fn write_csv<W: std::io::Write>(&self, out: W) -> Result<(), csv::Error> {
        let mut writer = csv::Writer::from_writer(out);
        writer.write_record(Self::CSV_HEADER)?;
        for row in &self.rows {
            writer.write_record([
                row.identity_id.to_string(),
                row.name.clone(),
                row.schedule_id.map(|id| id.to_string()).unwrap_or_default(),
                row.scan_time.map(format_timestamp).unwrap_or_default(),
                row.status.map(|s| s.as_str().to_string()).unwrap_or_default(),
            ])?;
        }
        writer.flush()?;
        Ok(())
    }
}

type RawScan = (i64, String, i64, String, String, String);
type RawReportRow = (i64, String, Option<i64>, Option<String>, Option<String>);

fn decode_scan(raw: RawScan) -> Result<ScanEntry, DecodeError> {
    let (identity_id, name, schedule_id, course_name, scan_time, status) = raw;
    Ok(ScanEntry {
        identity_id,
        name,
        schedule_id,
        course_name,
        scan_time: parse_timestamp(&scan_time)?,
        status: parse_status(&status)?,
    })
}

fn decode_report_row(raw: RawReportRow) -> Result<ReportRow, DecodeError> {
    let (identity_id, name, schedule_id, scan_time, status) = raw;
    Ok(ReportRow {
        identity_id,
        name,
        schedule_id,
        scan_time: scan_time.as_deref().map(parse_timestamp).transpose()?,
        status: status.as_deref().map(parse_status).transpose()?,
    })
}

impl SqliteStore {
    /// All records written on `day`, oldest first.
    pub async fn scans_on(&self, day: NaiveDate) -> Result<Vec<ScanEntry>, StoreError> {
        let day = format_date(day);
        let raw: Vec<RawScan> = self
            .run(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT a.identity_id, i.name, a.schedule_id, c.course_name, a.scan_time, a.status
                     FROM attendance a
                     JOIN identities i ON i.id = a.identity_id
                     JOIN schedules s ON s.schedule_id = a.schedule_id
                     JOIN courses c ON c.course_id = s.course_id
                     WHERE a.scan_day = ?1
                     ORDER BY a.scan_time, a.identity_id",
                )?;
                let rows = stmt
                    .query_map(params![day], |r| {
                        Ok((
                            r.get::<_, i64>(0)?,
                            r.get::<_, String>(1)?,
                            r.get::<_, i64>(2)?,
                            r.get::<_, String>(3)?,
                            r.get::<_, String>(4)?,
                            r.get::<_, String>(5)?,
                        ))
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;
        raw.into_iter()
            .map(|r| decode_scan(r).map_err(corrupt))
            .collect()
    }

    /// Per-course report for `day`. `None` if the course does not exist.
    ///
    /// One row per enrolled identity. An identity without a record on `day`
    /// appears with empty `schedule_id`, `scan_time` and `status`.
    pub async fn course_report(
        &self,
        course_id: i64,
        day: NaiveDate,
    ) -> Result<Option<CourseReport>, StoreError> {
        let day_text = format_date(day);
        let raw = self
            .run(move |conn| {
                let course = conn
                    .query_row(
                        "SELECT course_code, course_name FROM courses WHERE course_id = ?1",
                        params![course_id],
                        |r| Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?)),
                    )
                    .optional()?;
                let Some(course) = course else {
                    return Ok(None);
                };

                let mut stmt = conn.prepare(
                    "SELECT e.identity_id, COALESCE(i.name, ''), a.schedule_id, a.scan_time, a.status
                     FROM enrollments e
                     LEFT JOIN identities i ON i.id = e.identity_id
                     LEFT JOIN attendance a ON a.rowid = (
                       SELECT latest.rowid FROM attendance latest
                       JOIN schedules s ON s.schedule_id = latest.schedule_id
                       WHERE latest.identity_id = e.identity_id
                         AND latest.scan_day = ?2
                         AND s.course_id = ?1
                       ORDER BY latest.scan_time DESC, latest.schedule_id DESC
                       LIMIT 1
                     )
                     WHERE e.course_id = ?1
                     ORDER BY i.name, e.identity_id",
                )?;
                let rows = stmt
                    .query_map(params![course_id, day_text], |r| {
                        Ok((
                            r.get::<_, i64>(0)?,
                            r.get::<_, String>(1)?,
                            r.get::<_, Option<i64>>(2)?,
                            r.get::<_, Option<String>>(3)?,
                            r.get::<_, Option<String>>(4)?,
                        ))
                    })?
                    .collect::<rusqlite::Result<Vec<RawReportRow>>>()?;
                Ok(Some((course, rows)))
            })
            .await?;

        let Some(((course_code, course_name), raw_rows)) = raw else {
            return Ok(None);
        };
        let rows = raw_rows
            .into_iter()
            .map(|r| decode_report_row(r).map_err(corrupt))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Some(CourseReport {
            course_id,
            course_code,
            course_name,
            date: day,
            rows,
        }))
    }
}
