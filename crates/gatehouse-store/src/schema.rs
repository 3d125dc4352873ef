//! SQL schema for the Gatehouse SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS sites (
    site_id    TEXT PRIMARY KEY,
    name       TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS people (
    person_id   TEXT PRIMARY KEY,
    site_id     TEXT NOT NULL REFERENCES sites(site_id),
    national_id TEXT NOT NULL,
    full_name   TEXT NOT NULL,
    kind        TEXT NOT NULL,   -- 'worker' | 'visitor'
    contractor  TEXT,
    descriptor  BLOB,            -- little-endian f32; sealed when a cipher is configured
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL,
    UNIQUE (site_id, national_id)
);

-- One presence interval per row. Snapshot columns freeze the person's
-- attributes at entry time; voided rows are logically deleted.
CREATE TABLE IF NOT EXISTS sessions (
    session_id           TEXT PRIMARY KEY,
    site_id              TEXT NOT NULL REFERENCES sites(site_id),
    person_id            TEXT NOT NULL REFERENCES people(person_id),
    entry_at             TEXT NOT NULL,
    exit_at              TEXT,            -- NULL while inside
    entry_operator       TEXT,
    exit_operator        TEXT,
    note                 TEXT,
    name_snapshot        TEXT NOT NULL,
    national_id_snapshot TEXT NOT NULL,
    kind_snapshot        TEXT NOT NULL,
    contractor_snapshot  TEXT,
    voided_at            TEXT,
    voided_by            TEXT,
    void_reason          TEXT,
    created_at           TEXT NOT NULL
);

-- At most one open, non-voided session per person per site.
CREATE UNIQUE INDEX IF NOT EXISTS sessions_open_uniq
    ON sessions(site_id, person_id)
    WHERE exit_at IS NULL AND voided_at IS NULL;

CREATE INDEX IF NOT EXISTS sessions_site_entry_idx ON sessions(site_id, entry_at);
CREATE INDEX IF NOT EXISTS sessions_person_idx     ON sessions(person_id);

CREATE TABLE IF NOT EXISTS site_settings (
    site_id    TEXT PRIMARY KEY REFERENCES sites(site_id),
    warn_hours REAL NOT NULL,
    crit_hours REAL NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS audit_events (
    audit_id    TEXT PRIMARY KEY,
    site_id     TEXT NOT NULL REFERENCES sites(site_id),
    operator    TEXT,
    action      TEXT NOT NULL,
    entity_id   TEXT,
    before_json TEXT,
    after_json  TEXT,
    note        TEXT,
    recorded_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS audit_site_time_idx ON audit_events(site_id, recorded_at);

PRAGMA user_version = 1;
";
