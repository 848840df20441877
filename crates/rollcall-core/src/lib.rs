//! rollcall-core: attendance decision engine.
//!
//! Matches detected face embeddings against the enrolled roster, resolves
//! the requested timetable session, and records attendance through a
//! cooldown-guarded ledger. Persistence and face detection are consumed
//! through the [`AttendanceStore`] and [`FaceDetector`] traits.

pub mod clock;
pub mod detector;
pub mod frame;
pub mod ledger;
pub mod matcher;
pub mod memory;
pub mod roster;
pub mod schedule;
pub mod store;
pub mod types;

pub use clock::{Clock, FixedClock, SystemClock};
pub use detector::{DetectedFace, DetectorError, FaceDetector};
pub use frame::{FaceResult, FrameProcessor, ResultKey};
pub use ledger::{AttendancePolicy, Ledger, LedgerError, LogOutcome};
pub use matcher::{EuclideanMatcher, MatchError, MatchResult, Matcher};
pub use roster::{Roster, RosterHandle};
pub use schedule::{ResolveError, ScheduleResolver};
pub use store::{AttendanceStore, StoreError, WriteGuard, WriteOutcome};
pub use types::{
    ActiveSession, AttendanceRecord, AttendanceStatus, BoundingBox, Embedding, Identity, Session,
    SessionWindow, TimeOfDay, EMBEDDING_DIM,
};
