//! Decides whether the requested session is running right now for a given
//! identity.

use crate::store::{AttendanceStore, StoreError};
use crate::types::SessionWindow;
use chrono::{Datelike, NaiveDateTime};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("identity is not enrolled in the course, or the schedule does not exist today")]
    NotEnrolledOrInvalidSchedule,
    #[error("outside session time ({} to {})", .0.start_dt, .0.end_dt)]
    OutsideScheduleTime(SessionWindow),
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct ScheduleResolver<'a> {
    store: &'a dyn AttendanceStore,
}

impl<'a> ScheduleResolver<'a> {
    pub fn new(store: &'a dyn AttendanceStore) -> Self {
        Self { store }
    }

    /// Resolve the (course, schedule) pair for `identity_id` at `now`.
    ///
    /// The window is inclusive at both ends.
    pub async fn resolve(
        &self,
        identity_id: i64,
        course_id: i64,
        schedule_id: i64,
        now: NaiveDateTime,
    ) -> Result<SessionWindow, ResolveError> {
        let active = self
            .store
            .find_active_session(identity_id, course_id, schedule_id, now.weekday())
            .await?
            .ok_or(ResolveError::NotEnrolledOrInvalidSchedule)?;

        let (start_dt, end_dt) = active.session.window_on(now.date());
        let window = SessionWindow {
            schedule_id: active.session.schedule_id,
            course_id: active.session.course_id,
            course_name: active.course_name,
            start_dt,
            end_dt,
        };

        if now < start_dt || now > end_dt {
            tracing::debug!(identity = identity_id, schedule = schedule_id, %now, "scan outside session window");
            return Err(ResolveError::OutsideScheduleTime(window));
        }
        Ok(window)
    }
}
