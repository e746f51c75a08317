//! SQL schema for the Urbanwatch SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS users (
    user_id       TEXT PRIMARY KEY,
    username      TEXT NOT NULL UNIQUE,
    email         TEXT NOT NULL DEFAULT '',
    first_name    TEXT NOT NULL DEFAULT '',
    last_name     TEXT NOT NULL DEFAULT '',
    role          TEXT NOT NULL DEFAULT 'citizen',  -- 'citizen' | 'admin'
    password_hash TEXT NOT NULL,                    -- argon2 PHC string
    date_joined   TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS incidents (
    incident_id          TEXT PRIMARY KEY,
    user_id              TEXT NOT NULL REFERENCES users(user_id) ON DELETE CASCADE,
    incident_type        TEXT NOT NULL,
    title                TEXT NOT NULL,
    description          TEXT NOT NULL,
    photo                TEXT NOT NULL,
    latitude             REAL NOT NULL,
    longitude            REAL NOT NULL,
    address              TEXT,
    created_at           TEXT NOT NULL,   -- RFC 3339 UTC; never updated
    updated_at           TEXT NOT NULL,
    status               TEXT NOT NULL DEFAULT 'new',
    is_voice_description INTEGER NOT NULL DEFAULT 0,
    local_id             TEXT             -- client idempotency key
);

-- Blank and NULL keys opt out of deduplication.
CREATE UNIQUE INDEX IF NOT EXISTS incidents_local_id_uq
    ON incidents(local_id)
    WHERE local_id IS NOT NULL AND local_id != '';

CREATE INDEX IF NOT EXISTS incidents_user_idx    ON incidents(user_id);
CREATE INDEX IF NOT EXISTS incidents_created_idx ON incidents(created_at);

PRAGMA user_version = 1;
";
