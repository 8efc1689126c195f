//! SQL schema for the Roll SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;

CREATE TABLE IF NOT EXISTS attendance (
    attendance_id   TEXT PRIMARY KEY,
    user_id         TEXT NOT NULL,
    parent_id       TEXT NOT NULL,
    parent_type     TEXT NOT NULL CHECK (parent_type IN ('event', 'meeting')),
    status          TEXT NOT NULL DEFAULT 'present'
                    CHECK (status IN ('present', 'absent', 'late', 'excused')),
    notes           TEXT,
    submitted_by    TEXT NOT NULL,
    question_id     TEXT,
    organization_id TEXT,
    created_at      TEXT NOT NULL,   -- RFC 3339 UTC, fixed microsecond width
    updated_at      TEXT NOT NULL,
    -- At most one record per person per occasion.
    UNIQUE (user_id, parent_type, parent_id)
);

CREATE INDEX IF NOT EXISTS attendance_parent_idx  ON attendance(parent_type, parent_id);
CREATE INDEX IF NOT EXISTS attendance_created_idx ON attendance(created_at);
CREATE INDEX IF NOT EXISTS attendance_org_idx     ON attendance(organization_id, created_at);

PRAGMA user_version = 1;
";

/// Column list shared by every query that decodes into a `RawRecord`.
pub const RECORD_COLUMNS: &str = "attendance_id, user_id, parent_id, parent_type, status, \
   notes, submitted_by, question_id, organization_id, created_at, updated_at";
