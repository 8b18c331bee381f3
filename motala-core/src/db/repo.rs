//! Database repository layer
//!
//! Provides query and insert operations for schools, users, subjects,
//! and the study-session ledger, plus the aggregate queries consumed
//! by [`crate::analytics`].
//!
//! Aggregates are never cached: every read reflects the ledger at
//! query time. The only read-modify-write operations are the manager
//! swap and the heartbeat flag, both applied atomically here.

use crate::error::{Error, Result};
use crate::types::*;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::PathBuf;
use std::sync::Mutex;
use uuid::Uuid;

/// Fields for creating a new account.
#[derive(Debug, Clone)]
pub struct NewUser {
    /// Unique phone identifier
    pub phone_number: String,
    /// Display name (may be empty for shell accounts)
    pub full_name: String,
    /// Initial role
    pub role: Role,
    /// Tenant affiliation, if known at creation
    pub school_id: Option<i64>,
}

/// Partial profile update. `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub full_name: Option<String>,
    pub grade: Option<Grade>,
    pub olympiad_field: Option<OlympiadField>,
}

/// Per-user duration total over a window, as returned by the
/// cohort aggregation query. Ordered total-descending with ties broken
/// by lexicographically smaller phone number, so the first row is the
/// deterministic top scorer.
#[derive(Debug, Clone)]
pub struct UserTotal {
    pub user_id: i64,
    pub phone_number: String,
    pub full_name: String,
    pub total_seconds: i64,
    pub session_count: i64,
}

const INVITATION_CODE_LEN: usize = 8;
const INVITATION_CODE_ATTEMPTS: usize = 16;

/// Database handle (single connection guarded by a mutex)
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open or create a database at the given path
    pub fn open(path: &PathBuf) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        // Enable foreign keys and WAL mode for better concurrency
        conn.execute_batch(
            "
            PRAGMA foreign_keys = ON;
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            ",
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Run migrations on this database
    pub fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        super::schema::run_migrations(&conn)
    }

    // ============================================
    // School operations
    // ============================================

    /// Create a school with a freshly generated invitation code.
    ///
    /// The code is 8 characters, derived from a v4 UUID and checked
    /// against existing codes before insertion.
    pub fn create_school(&self, name: &str, daily_threshold_seconds: i64) -> Result<School> {
        if name.trim().is_empty() {
            return Err(Error::validation("name", "school name must not be empty"));
        }

        let conn = self.conn.lock().unwrap();
        let code = Self::generate_invitation_code(&conn)?;
        let created_at = Utc::now();

        conn.execute(
            r#"
            INSERT INTO schools (name, invitation_code, daily_threshold_seconds, is_active, created_at)
            VALUES (?1, ?2, ?3, 1, ?4)
            "#,
            params![name, code, daily_threshold_seconds, created_at.to_rfc3339()],
        )?;
        let id = conn.last_insert_rowid();

        tracing::info!(school_id = id, name, "Created school");

        Ok(School {
            id,
            name: name.to_string(),
            invitation_code: code,
            daily_threshold_seconds,
            is_active: true,
            created_at,
        })
    }

    fn generate_invitation_code(conn: &Connection) -> Result<String> {
        for _ in 0..INVITATION_CODE_ATTEMPTS {
            let candidate: String = Uuid::new_v4()
                .simple()
                .to_string()
                .chars()
                .take(INVITATION_CODE_LEN)
                .collect::<String>()
                .to_uppercase();

            let exists: i64 = conn.query_row(
                "SELECT COUNT(*) FROM schools WHERE invitation_code = ?",
                [&candidate],
                |r| r.get(0),
            )?;
            if exists == 0 {
                return Ok(candidate);
            }
        }
        Err(Error::Config(
            "failed to generate a unique invitation code".to_string(),
        ))
    }

    /// Get a school by ID
    pub fn get_school(&self, id: i64) -> Result<Option<School>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row("SELECT * FROM schools WHERE id = ?", [id], |row| {
            Self::row_to_school(row)
        })
        .optional()
        .map_err(Error::from)
    }

    /// Look up a school by invitation code
    pub fn get_school_by_code(&self, code: &str) -> Result<Option<School>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT * FROM schools WHERE invitation_code = ?",
            [code],
            Self::row_to_school,
        )
        .optional()
        .map_err(Error::from)
    }

    /// List all schools, newest first
    pub fn list_schools(&self) -> Result<Vec<School>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT * FROM schools ORDER BY id DESC")?;
        let schools = stmt
            .query_map([], Self::row_to_school)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(schools)
    }

    /// Update a school's name, threshold, and active flag
    pub fn update_school(
        &self,
        id: i64,
        name: &str,
        daily_threshold_seconds: i64,
        is_active: bool,
    ) -> Result<School> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            r#"
            UPDATE schools
            SET name = ?2, daily_threshold_seconds = ?3, is_active = ?4
            WHERE id = ?1
            "#,
            params![id, name, daily_threshold_seconds, is_active],
        )?;
        if changed == 0 {
            return Err(Error::not_found("school", id));
        }
        conn.query_row("SELECT * FROM schools WHERE id = ?", [id], |row| {
            Self::row_to_school(row)
        })
        .map_err(Error::from)
    }

    /// Delete a school. Members are detached (school_id set to NULL),
    /// their sessions are untouched.
    pub fn delete_school(&self, id: i64) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute("DELETE FROM schools WHERE id = ?", [id])?;
        if changed == 0 {
            return Err(Error::not_found("school", id));
        }
        tracing::info!(school_id = id, "Deleted school");
        Ok(())
    }

    fn row_to_school(row: &Row) -> rusqlite::Result<School> {
        let created_at_str: String = row.get("created_at")?;
        Ok(School {
            id: row.get("id")?,
            name: row.get("name")?,
            invitation_code: row.get("invitation_code")?,
            daily_threshold_seconds: row.get("daily_threshold_seconds")?,
            is_active: row.get("is_active")?,
            created_at: DateTime::parse_from_rfc3339(&created_at_str)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now()),
        })
    }

    // ============================================
    // User operations
    // ============================================

    /// Create a new account. Fails with `AlreadyRegistered` if the
    /// phone number is taken.
    pub fn create_user(&self, new: &NewUser) -> Result<UserProfile> {
        let conn = self.conn.lock().unwrap();
        Self::insert_user(&conn, new)
    }

    fn insert_user(conn: &Connection, new: &NewUser) -> Result<UserProfile> {
        let exists: i64 = conn.query_row(
            "SELECT COUNT(*) FROM users WHERE phone_number = ?",
            [&new.phone_number],
            |r| r.get(0),
        )?;
        if exists > 0 {
            return Err(Error::AlreadyRegistered(new.phone_number.clone()));
        }

        let now = Utc::now().to_rfc3339();
        conn.execute(
            r#"
            INSERT INTO users (phone_number, full_name, role, school_id, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?5)
            "#,
            params![
                new.phone_number,
                new.full_name,
                new.role.as_str(),
                new.school_id,
                now
            ],
        )?;
        let id = conn.last_insert_rowid();

        tracing::info!(user_id = id, phone = %new.phone_number, role = %new.role, "Created user");

        Self::fetch_user(conn, id)?.ok_or_else(|| Error::not_found("user", id))
    }

    /// Find an account by phone number, creating a student shell
    /// account if absent. Uniqueness key: phone number.
    ///
    /// Returns the profile and whether it was newly created.
    pub fn find_or_create_user(&self, phone_number: &str) -> Result<(UserProfile, bool)> {
        let conn = self.conn.lock().unwrap();
        if let Some(user) = Self::fetch_user_by_phone(&conn, phone_number)? {
            return Ok((user, false));
        }
        let user = Self::insert_user(
            &conn,
            &NewUser {
                phone_number: phone_number.to_string(),
                full_name: String::new(),
                role: Role::Student,
                school_id: None,
            },
        )?;
        Ok((user, true))
    }

    /// Get a user by ID
    pub fn get_user(&self, id: i64) -> Result<Option<UserProfile>> {
        let conn = self.conn.lock().unwrap();
        Self::fetch_user(&conn, id)
    }

    /// Get a user by phone number
    pub fn get_user_by_phone(&self, phone_number: &str) -> Result<Option<UserProfile>> {
        let conn = self.conn.lock().unwrap();
        Self::fetch_user_by_phone(&conn, phone_number)
    }

    fn fetch_user(conn: &Connection, id: i64) -> Result<Option<UserProfile>> {
        conn.query_row("SELECT * FROM users WHERE id = ?", [id], Self::row_to_user)
            .optional()
            .map_err(Error::from)
    }

    fn fetch_user_by_phone(conn: &Connection, phone: &str) -> Result<Option<UserProfile>> {
        conn.query_row(
            "SELECT * FROM users WHERE phone_number = ?",
            [phone],
            Self::row_to_user,
        )
        .optional()
        .map_err(Error::from)
    }

    /// Apply a partial profile update. Does not touch school
    /// membership or the completeness flag; see
    /// [`crate::access::complete_profile`] for the onboarding path.
    pub fn update_profile(&self, id: i64, update: &ProfileUpdate) -> Result<UserProfile> {
        let conn = self.conn.lock().unwrap();
        let current = Self::fetch_user(&conn, id)?.ok_or_else(|| Error::not_found("user", id))?;

        let full_name = update.full_name.clone().unwrap_or(current.full_name);
        let grade = update.grade.or(current.grade);
        let olympiad = update.olympiad_field.or(current.olympiad_field);

        conn.execute(
            r#"
            UPDATE users
            SET full_name = ?2, grade = ?3, olympiad_field = ?4, updated_at = ?5
            WHERE id = ?1
            "#,
            params![
                id,
                full_name,
                grade.map(|g| g.as_str()),
                olympiad.map(|o| o.as_str()),
                Utc::now().to_rfc3339()
            ],
        )?;

        Self::fetch_user(&conn, id)?.ok_or_else(|| Error::not_found("user", id))
    }

    /// Attach a user to a school and mark the profile complete.
    /// Membership is sticky; callers validate the invitation code
    /// before reaching this.
    pub fn attach_to_school(&self, user_id: i64, school_id: i64) -> Result<UserProfile> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            r#"
            UPDATE users
            SET school_id = ?2, is_profile_complete = 1, updated_at = ?3
            WHERE id = ?1
            "#,
            params![user_id, school_id, Utc::now().to_rfc3339()],
        )?;
        if changed == 0 {
            return Err(Error::not_found("user", user_id));
        }
        tracing::info!(user_id, school_id, "Attached user to school");
        Self::fetch_user(&conn, user_id)?.ok_or_else(|| Error::not_found("user", user_id))
    }

    /// Mark a profile complete without changing school membership
    pub fn mark_profile_complete(&self, user_id: i64) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE users SET is_profile_complete = 1, updated_at = ?2 WHERE id = ?1",
            params![user_id, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// Students of a school, in stable enumeration order (row id)
    pub fn school_students(&self, school_id: i64) -> Result<Vec<UserProfile>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT * FROM users WHERE school_id = ?1 AND role = 'student' ORDER BY id",
        )?;
        let users = stmt
            .query_map([school_id], Self::row_to_user)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(users)
    }

    /// All members of a school (any role), in stable enumeration order
    pub fn school_members(&self, school_id: i64) -> Result<Vec<UserProfile>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT * FROM users WHERE school_id = ?1 ORDER BY id")?;
        let users = stmt
            .query_map([school_id], Self::row_to_user)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(users)
    }

    /// The active manager of a school, if any
    pub fn school_manager(&self, school_id: i64) -> Result<Option<UserProfile>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT * FROM users WHERE school_id = ?1 AND role = 'manager'",
            [school_id],
            Self::row_to_user,
        )
        .optional()
        .map_err(Error::from)
    }

    /// Assign a manager to a school as a transactional swap.
    ///
    /// In one transaction: any current manager of the school is
    /// demoted to student, then the target account (created as an
    /// unauthenticated shell if the phone is unknown) is promoted and
    /// attached. Two concurrent assignments can never leave a school
    /// with two managers.
    pub fn assign_manager(
        &self,
        school_id: i64,
        phone_number: &str,
        full_name: &str,
    ) -> Result<UserProfile> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let school_exists: i64 =
            tx.query_row("SELECT COUNT(*) FROM schools WHERE id = ?", [school_id], |r| {
                r.get(0)
            })?;
        if school_exists == 0 {
            return Err(Error::not_found("school", school_id));
        }

        let now = Utc::now().to_rfc3339();

        // Demote the previous manager, if any
        let demoted = tx.execute(
            r#"
            UPDATE users SET role = 'student', updated_at = ?2
            WHERE school_id = ?1 AND role = 'manager'
            "#,
            params![school_id, now],
        )?;
        if demoted > 0 {
            tracing::info!(school_id, demoted, "Demoted previous manager");
        }

        // Promote the target, creating a shell account if needed
        let existing: Option<i64> = tx
            .query_row(
                "SELECT id FROM users WHERE phone_number = ?",
                [phone_number],
                |r| r.get(0),
            )
            .optional()?;

        let user_id = match existing {
            Some(id) => {
                tx.execute(
                    r#"
                    UPDATE users
                    SET role = 'manager', school_id = ?2, updated_at = ?3
                    WHERE id = ?1
                    "#,
                    params![id, school_id, now],
                )?;
                id
            }
            None => {
                tx.execute(
                    r#"
                    INSERT INTO users (phone_number, full_name, role, school_id, created_at, updated_at)
                    VALUES (?1, ?2, 'manager', ?3, ?4, ?4)
                    "#,
                    params![phone_number, full_name, school_id, now],
                )?;
                tx.last_insert_rowid()
            }
        };

        tx.commit()?;

        tracing::info!(school_id, user_id, "Assigned manager");

        Self::fetch_user(&conn, user_id)?.ok_or_else(|| Error::not_found("user", user_id))
    }

    /// Delete a user; sessions and subjects cascade
    pub fn delete_user(&self, id: i64) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute("DELETE FROM users WHERE id = ?", [id])?;
        if changed == 0 {
            return Err(Error::not_found("user", id));
        }
        Ok(())
    }

    fn row_to_user(row: &Row) -> rusqlite::Result<UserProfile> {
        let role_str: String = row.get("role")?;
        let grade_str: Option<String> = row.get("grade")?;
        let olympiad_str: Option<String> = row.get("olympiad_field")?;
        let created_at_str: String = row.get("created_at")?;
        let updated_at_str: String = row.get("updated_at")?;

        Ok(UserProfile {
            id: row.get("id")?,
            phone_number: row.get("phone_number")?,
            full_name: row.get("full_name")?,
            role: role_str.parse().unwrap_or(Role::Student),
            school_id: row.get("school_id")?,
            grade: grade_str.and_then(|s| s.parse().ok()),
            olympiad_field: olympiad_str.and_then(|s| s.parse().ok()),
            is_profile_complete: row.get("is_profile_complete")?,
            is_studying: row.get("is_studying")?,
            created_at: DateTime::parse_from_rfc3339(&created_at_str)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now()),
            updated_at: DateTime::parse_from_rfc3339(&updated_at_str)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now()),
        })
    }

    // ============================================
    // Live-status heartbeat
    // ============================================

    /// Flip the heartbeat flag. Single UPDATE, last write wins,
    /// idempotent. Deliberately decoupled from session open/close
    /// state; a client may set it without an open session.
    ///
    /// Known limitation: there is no expiry. A client that sets the
    /// flag and disappears leaves it set until explicitly cleared.
    pub fn set_studying(&self, user_id: i64, is_studying: bool) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE users SET is_studying = ?2, updated_at = ?3 WHERE id = ?1",
            params![user_id, is_studying, Utc::now().to_rfc3339()],
        )?;
        if changed == 0 {
            return Err(Error::not_found("user", user_id));
        }
        tracing::debug!(user_id, is_studying, "Updated heartbeat flag");
        Ok(is_studying)
    }

    /// Count of students in a school with the heartbeat flag set
    pub fn count_studying(&self, school_id: i64) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            r#"
            SELECT COUNT(*) FROM users
            WHERE school_id = ?1 AND role = 'student' AND is_studying = 1
            "#,
            [school_id],
            |r| r.get(0),
        )?;
        Ok(count)
    }

    // ============================================
    // Subject operations
    // ============================================

    /// Find a subject by (owner, name), inserting it with the given
    /// color when absent. Idempotent; the color of an existing subject
    /// is left untouched.
    pub fn find_or_create_subject(
        &self,
        user_id: i64,
        name: &str,
        color_code: &str,
    ) -> Result<Subject> {
        if name.trim().is_empty() {
            return Err(Error::validation("name", "subject name must not be empty"));
        }

        let conn = self.conn.lock().unwrap();
        if let Some(subject) = conn
            .query_row(
                "SELECT * FROM subjects WHERE user_id = ?1 AND name = ?2",
                params![user_id, name],
                Self::row_to_subject,
            )
            .optional()?
        {
            return Ok(subject);
        }

        conn.execute(
            "INSERT INTO subjects (user_id, name, color_code) VALUES (?1, ?2, ?3)",
            params![user_id, name, color_code],
        )?;
        let id = conn.last_insert_rowid();

        Ok(Subject {
            id,
            user_id,
            name: name.to_string(),
            color_code: color_code.to_string(),
        })
    }

    /// Subjects owned by a user, ordered by name
    pub fn list_subjects(&self, user_id: i64) -> Result<Vec<Subject>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare("SELECT * FROM subjects WHERE user_id = ?1 ORDER BY name")?;
        let subjects = stmt
            .query_map([user_id], Self::row_to_subject)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(subjects)
    }

    /// Get a subject by ID
    pub fn get_subject(&self, id: i64) -> Result<Option<Subject>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT * FROM subjects WHERE id = ?",
            [id],
            Self::row_to_subject,
        )
        .optional()
        .map_err(Error::from)
    }

    fn row_to_subject(row: &Row) -> rusqlite::Result<Subject> {
        Ok(Subject {
            id: row.get("id")?,
            user_id: row.get("user_id")?,
            name: row.get("name")?,
            color_code: row.get("color_code")?,
        })
    }

    // ============================================
    // Session ledger
    // ============================================

    /// Open a session. `end_time` stays NULL and the duration zero
    /// until the session is closed.
    pub fn start_session(
        &self,
        user_id: i64,
        subject_id: i64,
        start_time: DateTime<Utc>,
        description: &str,
    ) -> Result<StudySession> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO study_sessions (user_id, subject_id, description, start_time)
            VALUES (?1, ?2, ?3, ?4)
            "#,
            params![user_id, subject_id, description, start_time.to_rfc3339()],
        )?;
        let id = conn.last_insert_rowid();

        tracing::debug!(session_id = id, user_id, "Opened study session");

        Self::fetch_session(&conn, id)?.ok_or_else(|| Error::not_found("session", id))
    }

    /// Close a session, deriving and storing its duration in the same
    /// UPDATE as the `end_time` write. The duration is whole seconds,
    /// truncated, and is never recomputed afterwards.
    ///
    /// Fails with `InvalidInterval` if `end_time` precedes the start,
    /// and with `Validation` if the session is already closed.
    pub fn close_session(&self, session_id: i64, end_time: DateTime<Utc>) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        let session = Self::fetch_session(&conn, session_id)?
            .ok_or_else(|| Error::not_found("session", session_id))?;

        if session.is_closed() {
            return Err(Error::validation(
                "session",
                format!("session {} is already closed", session_id),
            ));
        }
        if end_time < session.start_time {
            return Err(Error::InvalidInterval {
                start: session.start_time,
                end: end_time,
            });
        }

        let duration = (end_time - session.start_time).num_seconds();
        conn.execute(
            r#"
            UPDATE study_sessions SET end_time = ?2, duration_seconds = ?3
            WHERE id = ?1
            "#,
            params![session_id, end_time.to_rfc3339(), duration],
        )?;

        tracing::debug!(session_id, duration, "Closed study session");
        Ok(duration)
    }

    /// Record a pre-timed interval in one write (client-side timing).
    /// Same duration derivation as [`Self::close_session`].
    pub fn record_session(
        &self,
        user_id: i64,
        subject_id: i64,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        description: &str,
    ) -> Result<StudySession> {
        if end_time < start_time {
            return Err(Error::InvalidInterval {
                start: start_time,
                end: end_time,
            });
        }
        let duration = (end_time - start_time).num_seconds();

        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO study_sessions (user_id, subject_id, description, start_time, end_time, duration_seconds)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                user_id,
                subject_id,
                description,
                start_time.to_rfc3339(),
                end_time.to_rfc3339(),
                duration
            ],
        )?;
        let id = conn.last_insert_rowid();

        Self::fetch_session(&conn, id)?.ok_or_else(|| Error::not_found("session", id))
    }

    /// Get a session by ID
    pub fn get_session(&self, id: i64) -> Result<Option<StudySession>> {
        let conn = self.conn.lock().unwrap();
        Self::fetch_session(&conn, id)
    }

    fn fetch_session(conn: &Connection, id: i64) -> Result<Option<StudySession>> {
        conn.query_row(
            "SELECT * FROM study_sessions WHERE id = ?",
            [id],
            Self::row_to_session,
        )
        .optional()
        .map_err(Error::from)
    }

    /// Closed, valid sessions with `start_time` in `[start, end)`,
    /// newest first.
    pub fn sessions_in_range(
        &self,
        user_id: i64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<StudySession>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            r#"
            SELECT * FROM study_sessions
            WHERE user_id = ?1 AND is_valid = 1 AND end_time IS NOT NULL
              AND start_time >= ?2 AND start_time < ?3
            ORDER BY start_time DESC
            "#,
        )?;
        let sessions = stmt
            .query_map(
                params![user_id, start.to_rfc3339(), end.to_rfc3339()],
                Self::row_to_session,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(sessions)
    }

    /// The N most recent closed, valid sessions of a user
    pub fn recent_sessions(&self, user_id: i64, limit: usize) -> Result<Vec<StudySession>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            r#"
            SELECT * FROM study_sessions
            WHERE user_id = ?1 AND is_valid = 1 AND end_time IS NOT NULL
            ORDER BY start_time DESC
            LIMIT ?2
            "#,
        )?;
        let sessions = stmt
            .query_map(params![user_id, limit as i64], Self::row_to_session)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(sessions)
    }

    /// Total closed, valid session count for a user
    pub fn count_sessions(&self, user_id: i64) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            r#"
            SELECT COUNT(*) FROM study_sessions
            WHERE user_id = ?1 AND is_valid = 1 AND end_time IS NOT NULL
            "#,
            [user_id],
            |r| r.get(0),
        )?;
        Ok(count)
    }

    /// Soft-delete a session (dispute marker); it stops aggregating
    pub fn invalidate_session(&self, id: i64) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute("UPDATE study_sessions SET is_valid = 0 WHERE id = ?", [id])?;
        if changed == 0 {
            return Err(Error::not_found("session", id));
        }
        Ok(())
    }

    fn row_to_session(row: &Row) -> rusqlite::Result<StudySession> {
        let start_str: String = row.get("start_time")?;
        let end_str: Option<String> = row.get("end_time")?;

        Ok(StudySession {
            id: row.get("id")?,
            user_id: row.get("user_id")?,
            subject_id: row.get("subject_id")?,
            description: row.get("description")?,
            start_time: DateTime::parse_from_rfc3339(&start_str)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now()),
            end_time: end_str
                .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
                .map(|dt| dt.with_timezone(&Utc)),
            duration_seconds: row.get("duration_seconds")?,
            is_valid: row.get("is_valid")?,
        })
    }

    // ============================================
    // Consultant tickets
    // ============================================

    /// File a consultant ticket for a user.
    pub fn create_ticket(
        &self,
        user_id: i64,
        message: &str,
        request_call: bool,
    ) -> Result<ConsultantTicket> {
        if message.trim().is_empty() {
            return Err(Error::validation("message", "ticket message must not be empty"));
        }

        let created_at = Utc::now();
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO consultant_tickets (user_id, message, request_call, created_at)
            VALUES (?1, ?2, ?3, ?4)
            "#,
            params![user_id, message, request_call, created_at.to_rfc3339()],
        )?;
        let id = conn.last_insert_rowid();

        tracing::info!(ticket_id = id, user_id, request_call, "Filed consultant ticket");

        Ok(ConsultantTicket {
            id,
            user_id,
            message: message.to_string(),
            request_call,
            is_resolved: false,
            created_at,
        })
    }

    /// A user's tickets, newest first
    pub fn list_tickets(&self, user_id: i64) -> Result<Vec<ConsultantTicket>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT * FROM consultant_tickets WHERE user_id = ?1 ORDER BY created_at DESC, id DESC",
        )?;
        let tickets = stmt
            .query_map([user_id], Self::row_to_ticket)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(tickets)
    }

    /// Mark a ticket handled
    pub fn resolve_ticket(&self, id: i64) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE consultant_tickets SET is_resolved = 1 WHERE id = ?1",
            [id],
        )?;
        if changed == 0 {
            return Err(Error::not_found("ticket", id));
        }
        Ok(())
    }

    fn row_to_ticket(row: &Row) -> rusqlite::Result<ConsultantTicket> {
        let created_at_str: String = row.get("created_at")?;
        Ok(ConsultantTicket {
            id: row.get("id")?,
            user_id: row.get("user_id")?,
            message: row.get("message")?,
            request_call: row.get("request_call")?,
            is_resolved: row.get("is_resolved")?,
            created_at: DateTime::parse_from_rfc3339(&created_at_str)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now()),
        })
    }

    // ============================================
    // Aggregate queries
    // ============================================

    /// Sum of durations for one user over `[start, end)`
    pub fn total_seconds_in_range(
        &self,
        user_id: i64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        let total: i64 = conn.query_row(
            r#"
            SELECT COALESCE(SUM(duration_seconds), 0) FROM study_sessions
            WHERE user_id = ?1 AND is_valid = 1 AND end_time IS NOT NULL
              AND start_time >= ?2 AND start_time < ?3
            "#,
            params![user_id, start.to_rfc3339(), end.to_rfc3339()],
            |r| r.get(0),
        )?;
        Ok(total)
    }

    /// Per-user totals over `[start, end)` for students of a school.
    ///
    /// Only users with at least one counted session appear. Ordered
    /// total-descending, ties broken by ascending phone number so the
    /// top scorer is deterministic regardless of insertion order.
    pub fn school_totals_in_range(
        &self,
        school_id: i64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<UserTotal>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            r#"
            SELECT u.id, u.phone_number, u.full_name,
                   SUM(s.duration_seconds) AS total_seconds,
                   COUNT(s.id) AS session_count
            FROM study_sessions s
            JOIN users u ON u.id = s.user_id
            WHERE u.school_id = ?1 AND u.role = 'student'
              AND s.is_valid = 1 AND s.end_time IS NOT NULL
              AND s.start_time >= ?2 AND s.start_time < ?3
            GROUP BY u.id
            ORDER BY total_seconds DESC, u.phone_number ASC
            "#,
        )?;
        let totals = stmt
            .query_map(
                params![school_id, start.to_rfc3339(), end.to_rfc3339()],
                |row| {
                    Ok(UserTotal {
                        user_id: row.get(0)?,
                        phone_number: row.get(1)?,
                        full_name: row.get(2)?,
                        total_seconds: row.get(3)?,
                        session_count: row.get(4)?,
                    })
                },
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(totals)
    }

    /// Most recent session start for a user, if any
    pub fn last_activity(&self, user_id: i64) -> Result<Option<DateTime<Utc>>> {
        let conn = self.conn.lock().unwrap();
        let latest: Option<String> = conn.query_row(
            r#"
            SELECT MAX(start_time) FROM study_sessions
            WHERE user_id = ?1 AND is_valid = 1 AND end_time IS NOT NULL
            "#,
            [user_id],
            |r| r.get(0),
        )?;
        Ok(latest
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|dt| dt.with_timezone(&Utc)))
    }

    /// Per-subject totals across a user's whole ledger:
    /// (subject name, color, total seconds), largest first.
    pub fn subject_breakdown(&self, user_id: i64) -> Result<Vec<(String, String, i64)>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            r#"
            SELECT sub.name, sub.color_code, SUM(s.duration_seconds) AS total_seconds
            FROM study_sessions s
            JOIN subjects sub ON sub.id = s.subject_id
            WHERE s.user_id = ?1 AND s.is_valid = 1 AND s.end_time IS NOT NULL
            GROUP BY sub.id
            ORDER BY total_seconds DESC
            "#,
        )?;
        let rows = stmt
            .query_map([user_id], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn test_db() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.migrate().unwrap();
        db
    }

    fn student(db: &Database, phone: &str, school_id: Option<i64>) -> UserProfile {
        db.create_user(&NewUser {
            phone_number: phone.to_string(),
            full_name: format!("Student {}", phone),
            role: Role::Student,
            school_id,
        })
        .unwrap()
    }

    #[test]
    fn test_school_creation_generates_unique_code() {
        let db = test_db();
        let a = db.create_school("Alborz", 21_600).unwrap();
        let b = db.create_school("Farzanegan", 21_600).unwrap();

        assert_eq!(a.invitation_code.len(), 8);
        assert_ne!(a.invitation_code, b.invitation_code);
        assert!(a.is_active);

        let found = db.get_school_by_code(&a.invitation_code).unwrap().unwrap();
        assert_eq!(found.id, a.id);
    }

    #[test]
    fn test_duplicate_phone_rejected() {
        let db = test_db();
        student(&db, "09120000001", None);
        let err = db
            .create_user(&NewUser {
                phone_number: "09120000001".to_string(),
                full_name: String::new(),
                role: Role::Student,
                school_id: None,
            })
            .unwrap_err();
        assert!(matches!(err, Error::AlreadyRegistered(_)));
    }

    #[test]
    fn test_find_or_create_is_idempotent() {
        let db = test_db();
        let (first, created) = db.find_or_create_user("09120000009").unwrap();
        assert!(created);
        let (second, created_again) = db.find_or_create_user("09120000009").unwrap();
        assert!(!created_again);
        assert_eq!(first.id, second.id);
    }

    #[test]
    fn test_close_session_derives_duration_once() {
        let db = test_db();
        let user = student(&db, "09120000001", None);
        let subject = db
            .find_or_create_subject(user.id, "Physics", "#ff0000")
            .unwrap();

        let start = Utc::now() - Duration::hours(2);
        let session = db.start_session(user.id, subject.id, start, "").unwrap();
        assert!(!session.is_closed());
        assert_eq!(session.duration_seconds, 0);

        let duration = db
            .close_session(session.id, start + Duration::seconds(3723))
            .unwrap();
        assert_eq!(duration, 3723);

        let stored = db.get_session(session.id).unwrap().unwrap();
        assert_eq!(stored.duration_seconds, 3723);
        assert!(stored.is_closed());

        // Re-closing is rejected
        let err = db.close_session(session.id, Utc::now()).unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }

    #[test]
    fn test_close_session_rejects_inverted_interval() {
        let db = test_db();
        let user = student(&db, "09120000001", None);
        let subject = db
            .find_or_create_subject(user.id, "Math", "#00ff00")
            .unwrap();

        let start = Utc::now();
        let session = db.start_session(user.id, subject.id, start, "").unwrap();
        let err = db
            .close_session(session.id, start - Duration::seconds(1))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInterval { .. }));

        // No partial write: the session is still open
        let stored = db.get_session(session.id).unwrap().unwrap();
        assert!(!stored.is_closed());
    }

    #[test]
    fn test_open_sessions_excluded_from_aggregates() {
        let db = test_db();
        let user = student(&db, "09120000001", None);
        let subject = db
            .find_or_create_subject(user.id, "Math", "#00ff00")
            .unwrap();

        let now = Utc::now();
        db.record_session(user.id, subject.id, now - Duration::hours(3), now - Duration::hours(2), "")
            .unwrap();
        // Open session must not count
        db.start_session(user.id, subject.id, now - Duration::hours(1), "")
            .unwrap();

        let total = db
            .total_seconds_in_range(user.id, now - Duration::days(1), now)
            .unwrap();
        assert_eq!(total, 3600);
        assert_eq!(db.count_sessions(user.id).unwrap(), 1);
    }

    #[test]
    fn test_invalidated_session_stops_aggregating() {
        let db = test_db();
        let user = student(&db, "09120000001", None);
        let subject = db
            .find_or_create_subject(user.id, "Math", "#00ff00")
            .unwrap();

        let now = Utc::now();
        let session = db
            .record_session(user.id, subject.id, now - Duration::hours(2), now - Duration::hours(1), "")
            .unwrap();
        assert_eq!(
            db.total_seconds_in_range(user.id, now - Duration::days(1), now)
                .unwrap(),
            3600
        );

        db.invalidate_session(session.id).unwrap();
        assert_eq!(
            db.total_seconds_in_range(user.id, now - Duration::days(1), now)
                .unwrap(),
            0
        );
    }

    #[test]
    fn test_school_totals_tie_break_on_phone() {
        let db = test_db();
        let school = db.create_school("Alborz", 21_600).unwrap();
        // Insert in descending-phone order so insertion order and
        // phone order disagree
        let b = student(&db, "09120000002", Some(school.id));
        let a = student(&db, "09120000001", Some(school.id));
        let subject_a = db.find_or_create_subject(a.id, "Math", "#fff").unwrap();
        let subject_b = db.find_or_create_subject(b.id, "Math", "#fff").unwrap();

        let now = Utc::now();
        db.record_session(a.id, subject_a.id, now - Duration::hours(2), now - Duration::hours(1), "")
            .unwrap();
        db.record_session(b.id, subject_b.id, now - Duration::hours(3), now - Duration::hours(2), "")
            .unwrap();

        let totals = db
            .school_totals_in_range(school.id, now - Duration::days(1), now)
            .unwrap();
        assert_eq!(totals.len(), 2);
        assert_eq!(totals[0].total_seconds, totals[1].total_seconds);
        // Equal totals: the lexicographically smaller phone wins
        assert_eq!(totals[0].user_id, a.id);
    }

    #[test]
    fn test_assign_manager_swap() {
        let db = test_db();
        let school = db.create_school("Alborz", 21_600).unwrap();

        let first = db
            .assign_manager(school.id, "09121111111", "First Manager")
            .unwrap();
        assert_eq!(first.role, Role::Manager);
        assert_eq!(first.school_id, Some(school.id));

        let second = db
            .assign_manager(school.id, "09122222222", "Second Manager")
            .unwrap();
        assert_eq!(second.role, Role::Manager);

        // Exactly one manager remains; the first was demoted
        let manager = db.school_manager(school.id).unwrap().unwrap();
        assert_eq!(manager.id, second.id);
        let demoted = db.get_user(first.id).unwrap().unwrap();
        assert_eq!(demoted.role, Role::Student);

        let managers: Vec<_> = db
            .school_members(school.id)
            .unwrap()
            .into_iter()
            .filter(|u| u.role == Role::Manager)
            .collect();
        assert_eq!(managers.len(), 1);
    }

    #[test]
    fn test_assign_manager_creates_shell_account() {
        let db = test_db();
        let school = db.create_school("Alborz", 21_600).unwrap();
        assert!(db.get_user_by_phone("09123333333").unwrap().is_none());

        let manager = db
            .assign_manager(school.id, "09123333333", "New Manager")
            .unwrap();
        assert_eq!(manager.phone_number, "09123333333");
        assert!(!manager.is_profile_complete);
    }

    #[test]
    fn test_heartbeat_flag_round_trip() {
        let db = test_db();
        let school = db.create_school("Alborz", 21_600).unwrap();
        let user = student(&db, "09120000001", Some(school.id));

        assert_eq!(db.count_studying(school.id).unwrap(), 0);
        assert!(db.set_studying(user.id, true).unwrap());
        assert_eq!(db.count_studying(school.id).unwrap(), 1);

        // Idempotent
        assert!(db.set_studying(user.id, true).unwrap());
        assert_eq!(db.count_studying(school.id).unwrap(), 1);

        assert!(!db.set_studying(user.id, false).unwrap());
        assert_eq!(db.count_studying(school.id).unwrap(), 0);
    }

    #[test]
    fn test_subject_find_or_create_scoped_to_owner() {
        let db = test_db();
        let a = student(&db, "09120000001", None);
        let b = student(&db, "09120000002", None);

        let sa = db.find_or_create_subject(a.id, "Math", "#111111").unwrap();
        let sa_again = db.find_or_create_subject(a.id, "Math", "#222222").unwrap();
        let sb = db.find_or_create_subject(b.id, "Math", "#333333").unwrap();

        assert_eq!(sa.id, sa_again.id);
        // Existing subject keeps its color
        assert_eq!(sa_again.color_code, "#111111");
        // Same name, different owner: distinct entity
        assert_ne!(sa.id, sb.id);
    }

    #[test]
    fn test_tickets_list_newest_first() {
        let db = test_db();
        let user = student(&db, "09120000001", None);

        let first = db.create_ticket(user.id, "How do I plan my week?", false).unwrap();
        let second = db.create_ticket(user.id, "Please call me", true).unwrap();
        assert!(!first.is_resolved);
        assert!(second.request_call);

        let tickets = db.list_tickets(user.id).unwrap();
        assert_eq!(tickets.len(), 2);
        assert_eq!(tickets[0].id, second.id);
        assert_eq!(tickets[1].id, first.id);

        let err = db.create_ticket(user.id, "   ", false).unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));

        db.resolve_ticket(first.id).unwrap();
        let tickets = db.list_tickets(user.id).unwrap();
        assert!(tickets[1].is_resolved);
    }

    #[test]
    fn test_delete_user_cascades_sessions_and_subjects() {
        let db = test_db();
        let user = student(&db, "09120000001", None);
        let subject = db.find_or_create_subject(user.id, "Math", "#fff").unwrap();
        let now = Utc::now();
        let session = db
            .record_session(user.id, subject.id, now - Duration::hours(1), now, "")
            .unwrap();

        db.delete_user(user.id).unwrap();
        assert!(db.get_session(session.id).unwrap().is_none());
        assert!(db.get_subject(subject.id).unwrap().is_none());
    }

    #[test]
    fn test_delete_school_detaches_members() {
        let db = test_db();
        let school = db.create_school("Alborz", 21_600).unwrap();
        let user = student(&db, "09120000001", Some(school.id));

        db.delete_school(school.id).unwrap();
        let detached = db.get_user(user.id).unwrap().unwrap();
        assert_eq!(detached.school_id, None);
    }
}
