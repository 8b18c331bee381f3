//! Student-facing handlers: own dashboard, session logging, subjects,
//! profile completion, and the live-status heartbeat.

use chrono::{DateTime, Utc};
use motala_core::analytics::{window, Window};
use motala_core::db::{Database, ProfileUpdate};
use motala_core::types::{
    ConsultantTicket, StudySession, Subject, UserProfile, DEFAULT_SUBJECT_COLOR,
};
use motala_core::{access, Error, Result};
use serde::{Deserialize, Serialize};

// ============================================
// Views
// ============================================

/// One ledger row joined with its subject, as clients see it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionView {
    pub id: i64,
    pub subject: String,
    pub color_code: String,
    pub description: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_seconds: i64,
}

/// A user as returned by profile endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileView {
    pub id: i64,
    pub phone_number: String,
    pub full_name: String,
    pub role: String,
    pub school_id: Option<i64>,
    pub school_name: Option<String>,
    pub grade: Option<String>,
    pub olympiad_field: Option<String>,
    pub is_profile_complete: bool,
    pub is_studying: bool,
}

/// Study totals over the standard dashboard windows, in seconds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardStats {
    /// Since local midnight
    pub today: i64,
    /// Trailing 7 days
    pub week: i64,
    /// Trailing 30 days
    pub month: i64,
    /// Lifetime count of counted sessions
    pub total_sessions: i64,
}

pub(crate) fn session_view(db: &Database, session: &StudySession) -> Result<SessionView> {
    let subject = db
        .get_subject(session.subject_id)?
        .ok_or_else(|| Error::not_found("subject", session.subject_id))?;
    Ok(SessionView {
        id: session.id,
        subject: subject.name,
        color_code: subject.color_code,
        description: session.description.clone(),
        start_time: session.start_time,
        end_time: session.end_time,
        duration_seconds: session.duration_seconds,
    })
}

pub(crate) fn profile_view(db: &Database, user: &UserProfile) -> Result<ProfileView> {
    let school_name = match user.school_id {
        Some(school_id) => db.get_school(school_id)?.map(|s| s.name),
        None => None,
    };
    Ok(ProfileView {
        id: user.id,
        phone_number: user.phone_number.clone(),
        full_name: user.full_name.clone(),
        role: user.role.as_str().to_string(),
        school_id: user.school_id,
        school_name,
        grade: user.grade.map(|g| g.as_str().to_string()),
        olympiad_field: user.olympiad_field.map(|f| f.as_str().to_string()),
        is_profile_complete: user.is_profile_complete,
        is_studying: user.is_studying,
    })
}

// ============================================
// Dashboard
// ============================================

/// Study totals for the acting student's own dashboard.
///
/// "Today" is anchored at local midnight and recomputed per call, so
/// the figure resets as the clock crosses midnight without any stored
/// state.
pub fn dashboard_stats(db: &Database, user_id: i64, now: DateTime<Utc>) -> Result<DashboardStats> {
    Ok(DashboardStats {
        today: window::total_seconds(db, user_id, Window::Today, now)?,
        week: window::total_seconds(db, user_id, Window::LastNDays(7), now)?,
        month: window::total_seconds(db, user_id, Window::LastNDays(30), now)?,
        total_sessions: db.count_sessions(user_id)?,
    })
}

// ============================================
// Sessions
// ============================================

/// A client-timed interval to append to the ledger
#[derive(Debug, Clone, Deserialize)]
pub struct LogSessionRequest {
    /// Subject name; created on first use with the default color
    pub subject: String,
    #[serde(default)]
    pub description: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

/// Append a closed session. The subject is resolved by name within
/// the student's own namespace, created if missing.
pub fn log_session(db: &Database, user_id: i64, req: &LogSessionRequest) -> Result<SessionView> {
    let name = req.subject.trim();
    if name.is_empty() {
        return Err(Error::validation("subject", "subject name must not be empty"));
    }

    let subject = db.find_or_create_subject(user_id, name, DEFAULT_SUBJECT_COLOR)?;
    let session =
        db.record_session(user_id, subject.id, req.start_time, req.end_time, &req.description)?;

    tracing::info!(
        user_id,
        session_id = session.id,
        duration = session.duration_seconds,
        "Logged study session"
    );
    session_view(db, &session)
}

/// The student's most recent counted sessions, newest first
pub fn list_sessions(db: &Database, user_id: i64, limit: Option<usize>) -> Result<Vec<SessionView>> {
    let sessions = db.recent_sessions(user_id, limit.unwrap_or(50))?;
    sessions.iter().map(|s| session_view(db, s)).collect()
}

/// The student's subjects, ordered by name
pub fn list_subjects(db: &Database, user_id: i64) -> Result<Vec<Subject>> {
    db.list_subjects(user_id)
}

// ============================================
// Profile
// ============================================

/// Partial profile write; all fields optional
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateProfileRequest {
    pub full_name: Option<String>,
    pub grade: Option<String>,
    pub olympiad_field: Option<String>,
    /// Required on the first completion, ignored once a school is set
    pub invitation_code: Option<String>,
}

/// Update the acting student's profile, redeeming an invitation code
/// when the account has no school yet.
pub fn update_profile(
    db: &Database,
    user_id: i64,
    req: &UpdateProfileRequest,
) -> Result<ProfileView> {
    let update = ProfileUpdate {
        full_name: req.full_name.clone(),
        grade: req
            .grade
            .as_deref()
            .map(|g| {
                g.parse()
                    .map_err(|_| Error::validation("grade", format!("unknown grade {:?}", g)))
            })
            .transpose()?,
        olympiad_field: req
            .olympiad_field
            .as_deref()
            .map(|f| {
                f.parse().map_err(|_| {
                    Error::validation("olympiad_field", format!("unknown field {:?}", f))
                })
            })
            .transpose()?,
    };

    let user = access::complete_profile(db, user_id, &update, req.invitation_code.as_deref())?;
    profile_view(db, &user)
}

/// The acting user's own profile
pub fn get_profile(db: &Database, user_id: i64) -> Result<ProfileView> {
    let user = db
        .get_user(user_id)?
        .ok_or_else(|| Error::not_found("user", user_id))?;
    profile_view(db, &user)
}

// ============================================
// Consultant tickets
// ============================================

#[derive(Debug, Clone, Deserialize)]
pub struct CreateTicketRequest {
    pub message: String,
    /// Whether the student wants a phone call back
    #[serde(default)]
    pub request_call: bool,
}

/// File a consultant ticket for the acting student.
pub fn create_ticket(
    db: &Database,
    user_id: i64,
    req: &CreateTicketRequest,
) -> Result<ConsultantTicket> {
    db.get_user(user_id)?
        .ok_or_else(|| Error::not_found("user", user_id))?;
    db.create_ticket(user_id, req.message.trim(), req.request_call)
}

/// The acting student's tickets, newest first
pub fn list_tickets(db: &Database, user_id: i64) -> Result<Vec<ConsultantTicket>> {
    db.list_tickets(user_id)
}

// ============================================
// Live status
// ============================================

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct LiveStatusRequest {
    pub is_studying: bool,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct LiveStatusResponse {
    /// The applied value, echoed back
    pub is_studying: bool,
}

/// Toggle the heartbeat flag. Idempotent: re-sending the current
/// value is a no-op that still echoes it back.
pub fn set_live_status(
    db: &Database,
    user_id: i64,
    req: &LiveStatusRequest,
) -> Result<LiveStatusResponse> {
    let applied = db.set_studying(user_id, req.is_studying)?;
    Ok(LiveStatusResponse {
        is_studying: applied,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use motala_core::db::NewUser;
    use motala_core::types::Role;

    fn test_db() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.migrate().unwrap();
        db
    }

    fn seed_student(db: &Database) -> (i64, i64) {
        let school = db.create_school("Alborz", 21_600).unwrap();
        let user = db
            .create_user(&NewUser {
                phone_number: "09120000001".to_string(),
                full_name: "Sara".to_string(),
                role: Role::Student,
                school_id: Some(school.id),
            })
            .unwrap();
        (user.id, school.id)
    }

    #[test]
    fn test_log_session_creates_subject_with_default_color() {
        let db = test_db();
        let (user_id, _) = seed_student(&db);

        let start = Utc::now() - Duration::hours(1);
        let view = log_session(
            &db,
            user_id,
            &LogSessionRequest {
                subject: "  Math ".to_string(),
                description: "derivatives".to_string(),
                start_time: start,
                end_time: start + Duration::seconds(1500),
            },
        )
        .unwrap();

        assert_eq!(view.subject, "Math");
        assert_eq!(view.color_code, DEFAULT_SUBJECT_COLOR);
        assert_eq!(view.duration_seconds, 1500);
    }

    #[test]
    fn test_log_session_rejects_blank_subject() {
        let db = test_db();
        let (user_id, _) = seed_student(&db);

        let err = log_session(
            &db,
            user_id,
            &LogSessionRequest {
                subject: "   ".to_string(),
                description: String::new(),
                start_time: Utc::now(),
                end_time: Utc::now(),
            },
        )
        .unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }

    #[test]
    fn test_dashboard_stats_counts_only_counted_sessions() {
        let db = test_db();
        let (user_id, _) = seed_student(&db);
        let now = Utc::now();

        let start = now - Duration::hours(2);
        log_session(
            &db,
            user_id,
            &LogSessionRequest {
                subject: "Math".to_string(),
                description: String::new(),
                start_time: start,
                end_time: start + Duration::seconds(600),
            },
        )
        .unwrap();

        // An open session must not move any figure
        let subject = db.find_or_create_subject(user_id, "Math", "#fff").unwrap();
        db.start_session(user_id, subject.id, now - Duration::minutes(5), "")
            .unwrap();

        let stats = dashboard_stats(&db, user_id, now).unwrap();
        assert_eq!(stats.week, 600);
        assert_eq!(stats.month, 600);
        assert_eq!(stats.total_sessions, 1);
    }

    #[test]
    fn test_update_profile_rejects_unknown_grade() {
        let db = test_db();
        let (user_id, _) = seed_student(&db);

        let err = update_profile(
            &db,
            user_id,
            &UpdateProfileRequest {
                grade: Some("13".to_string()),
                ..Default::default()
            },
        )
        .unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }

    #[test]
    fn test_create_ticket_and_list_newest_first() {
        let db = test_db();
        let (user_id, _) = seed_student(&db);

        let first = create_ticket(
            &db,
            user_id,
            &CreateTicketRequest {
                message: "How should I split math and physics?".to_string(),
                request_call: false,
            },
        )
        .unwrap();
        let second = create_ticket(
            &db,
            user_id,
            &CreateTicketRequest {
                message: "Please call me".to_string(),
                request_call: true,
            },
        )
        .unwrap();
        assert!(second.request_call);
        assert!(!second.is_resolved);

        let tickets = list_tickets(&db, user_id).unwrap();
        assert_eq!(tickets.len(), 2);
        assert_eq!(tickets[0].id, second.id);
        assert_eq!(tickets[1].id, first.id);

        let err = create_ticket(
            &db,
            user_id,
            &CreateTicketRequest {
                message: "  ".to_string(),
                request_call: false,
            },
        )
        .unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }

    #[test]
    fn test_live_status_round_trip_echoes_applied_value() {
        let db = test_db();
        let (user_id, _) = seed_student(&db);

        let on = set_live_status(&db, user_id, &LiveStatusRequest { is_studying: true }).unwrap();
        assert!(on.is_studying);
        // Idempotent re-send
        let on = set_live_status(&db, user_id, &LiveStatusRequest { is_studying: true }).unwrap();
        assert!(on.is_studying);
        let off =
            set_live_status(&db, user_id, &LiveStatusRequest { is_studying: false }).unwrap();
        assert!(!off.is_studying);
    }

    #[test]
    fn test_profile_view_includes_school_name() {
        let db = test_db();
        let (user_id, _) = seed_student(&db);

        let view = get_profile(&db, user_id).unwrap();
        assert_eq!(view.school_name.as_deref(), Some("Alborz"));
        assert_eq!(view.role, "student");
    }
}
