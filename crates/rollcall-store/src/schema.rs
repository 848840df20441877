pub const SCHEMA_V1: &str = r"
CREATE TABLE IF NOT EXISTS identities (
  id INTEGER PRIMARY KEY,
  name TEXT NOT NULL,
  face_encoding BLOB NOT NULL
);

CREATE TABLE IF NOT EXISTS courses (
  course_id INTEGER PRIMARY KEY,
  course_code TEXT NOT NULL,
  course_name TEXT NOT NULL,
  teacher_id INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS schedules (
  schedule_id INTEGER PRIMARY KEY,
  course_id INTEGER NOT NULL REFERENCES courses(course_id),
  teacher_id INTEGER NOT NULL,
  day_of_week TEXT NOT NULL CHECK (
    day_of_week IN ('Monday','Tuesday','Wednesday','Thursday','Friday','Saturday','Sunday')
  ),
  start_time TEXT NOT NULL,
  end_time TEXT NOT NULL,
  CHECK (start_time <= end_time)
);

CREATE TABLE IF NOT EXISTS enrollments (
  identity_id INTEGER NOT NULL,
  course_id INTEGER NOT NULL REFERENCES courses(course_id),
  PRIMARY KEY (identity_id, course_id)
);

CREATE TABLE IF NOT EXISTS attendance (
  identity_id INTEGER NOT NULL,
  schedule_id INTEGER NOT NULL REFERENCES schedules(schedule_id),
  scan_day TEXT NOT NULL,
  scan_time TEXT NOT NULL,
  status TEXT NOT NULL CHECK (status IN ('present','late','absent')),
  UNIQUE (identity_id, schedule_id, scan_day)
);

CREATE INDEX IF NOT EXISTS idx_attendance_day ON attendance(scan_day, scan_time);
";
