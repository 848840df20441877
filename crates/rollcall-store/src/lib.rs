//! rollcall-store: SQLite persistence for the attendance engine.
//!
//! [`SqliteStore`] implements [`rollcall_core::AttendanceStore`] over a small
//! pool of `tokio-rusqlite` connections. It also carries the administrative
//! writes used by enrollment tooling, the read-only report queries, and the
//! [`Config`] shared by the daemon and the CLI.

pub mod admin;
pub mod codec;
pub mod config;
mod pool;
pub mod report;
mod schema;
pub mod sqlite;

pub use admin::Course;
pub use config::Config;
pub use report::{CourseReport, ReportRow, ScanEntry};
pub use sqlite::{SqliteStore, StoreOptions};
