//! Database schema and migrations
//!
//! Uses SQLite with embedded migrations managed via PRAGMA user_version.

use rusqlite::Connection;

/// Current schema version
pub const SCHEMA_VERSION: i32 = 4;

/// SQL migrations, indexed by version number
const MIGRATIONS: &[&str] = &[
    // Version 1: Initial schema
    r#"
    -- ============================================
    -- Tenants
    -- ============================================

    CREATE TABLE IF NOT EXISTS schools (
        id               INTEGER PRIMARY KEY AUTOINCREMENT,
        name             TEXT NOT NULL,
        invitation_code  TEXT NOT NULL UNIQUE,
        is_active        INTEGER NOT NULL DEFAULT 1,
        created_at       DATETIME NOT NULL
    );

    -- ============================================
    -- Accounts
    -- ============================================

    CREATE TABLE IF NOT EXISTS users (
        id                  INTEGER PRIMARY KEY AUTOINCREMENT,
        phone_number        TEXT NOT NULL UNIQUE,
        full_name           TEXT NOT NULL DEFAULT '',
        role                TEXT NOT NULL DEFAULT 'student',
        school_id           INTEGER REFERENCES schools(id) ON DELETE SET NULL,
        grade               TEXT,
        olympiad_field      TEXT,
        is_profile_complete INTEGER NOT NULL DEFAULT 0,
        created_at          DATETIME NOT NULL,
        updated_at          DATETIME NOT NULL
    );

    -- ============================================
    -- Study data
    -- ============================================

    CREATE TABLE IF NOT EXISTS subjects (
        id               INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id          INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        name             TEXT NOT NULL,
        color_code       TEXT NOT NULL,

        UNIQUE(user_id, name)
    );

    CREATE TABLE IF NOT EXISTS study_sessions (
        id               INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id          INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        subject_id       INTEGER NOT NULL REFERENCES subjects(id) ON DELETE CASCADE,
        description      TEXT NOT NULL DEFAULT '',
        start_time       DATETIME NOT NULL,
        end_time         DATETIME,
        duration_seconds INTEGER NOT NULL DEFAULT 0,
        is_valid         INTEGER NOT NULL DEFAULT 1
    );

    -- ============================================
    -- Indexes
    -- ============================================

    CREATE INDEX IF NOT EXISTS idx_users_school ON users(school_id);
    CREATE INDEX IF NOT EXISTS idx_users_role ON users(role);
    CREATE INDEX IF NOT EXISTS idx_subjects_user ON subjects(user_id);
    CREATE INDEX IF NOT EXISTS idx_sessions_user ON study_sessions(user_id);
    CREATE INDEX IF NOT EXISTS idx_sessions_user_start ON study_sessions(user_id, start_time DESC);
    CREATE INDEX IF NOT EXISTS idx_sessions_start ON study_sessions(start_time);
    "#,
    // Version 2: Add the live-status heartbeat flag
    r#"
    ALTER TABLE users ADD COLUMN is_studying INTEGER NOT NULL DEFAULT 0;
    "#,
    // Version 3: Per-school configurable daily study threshold
    r#"
    ALTER TABLE schools ADD COLUMN daily_threshold_seconds INTEGER NOT NULL DEFAULT 21600;
    "#,
    // Version 4: Consultant tickets
    r#"
    CREATE TABLE IF NOT EXISTS consultant_tickets (
        id           INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id      INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        message      TEXT NOT NULL,
        request_call INTEGER NOT NULL DEFAULT 0,
        is_resolved  INTEGER NOT NULL DEFAULT 0,
        created_at   DATETIME NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_tickets_user_created
        ON consultant_tickets(user_id, created_at DESC);
    "#,
];

/// Run all pending migrations
pub fn run_migrations(conn: &Connection) -> crate::error::Result<()> {
    let current_version: i32 = conn
        .query_row("PRAGMA user_version", [], |r| r.get(0))
        .unwrap_or(0);

    tracing::info!(
        current_version,
        target_version = SCHEMA_VERSION,
        "Checking database migrations"
    );

    for (i, migration) in MIGRATIONS.iter().enumerate() {
        let version = (i + 1) as i32;
        if version > current_version {
            tracing::info!(version, "Running migration");
            conn.execute_batch(migration)?;
            conn.execute(&format!("PRAGMA user_version = {}", version), [])?;
        }
    }

    if current_version < SCHEMA_VERSION {
        tracing::info!(
            from = current_version,
            to = SCHEMA_VERSION,
            "Migrations complete"
        );
    }

    Ok(())
}

/// Get the current schema version from the database
pub fn get_schema_version(conn: &Connection) -> crate::error::Result<i32> {
    let version: i32 = conn.query_row("PRAGMA user_version", [], |r| r.get(0))?;
    Ok(version)
}
