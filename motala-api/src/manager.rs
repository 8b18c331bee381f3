//! Manager-facing handlers: school dashboard KPIs, the ranked student
//! list, per-student drill-down, and export rows.
//!
//! Every handler resolves a [`Scope`] from the acting user first; a
//! student calling these gets a scope error before any query runs.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use motala_core::access::{self, Scope};
use motala_core::analytics::{export, kpi, ranking, window, StudentFilter, TrendDirection};
use motala_core::analytics::{ExportRow, SchoolKpi};
use motala_core::db::Database;
use motala_core::types::UserProfile;
use motala_core::{Error, Result};
use serde::{Deserialize, Serialize};

use crate::student::{self, DashboardStats, SessionView};

/// Resolve the school a manager-level handler operates on.
///
/// Superadmins may act on any school they name; managers are pinned
/// to their own.
fn school_scope(acting: &UserProfile) -> Result<i64> {
    match Scope::for_user(acting)? {
        Scope::School(school_id) => Ok(school_id),
        Scope::All => acting.school_id.ok_or_else(|| {
            Error::ScopeViolation("superadmin must name a school for this view".to_string())
        }),
        Scope::SelfOnly(_) => Err(Error::ScopeViolation(
            "student accounts cannot access school dashboards".to_string(),
        )),
    }
}

// ============================================
// Dashboard
// ============================================

/// KPI card figures for the acting manager's school
pub fn dashboard_kpi(db: &Database, acting: &UserProfile, now: DateTime<Utc>) -> Result<SchoolKpi> {
    let school_id = school_scope(acting)?;
    kpi::school_kpi(db, school_id, now)
}

// ============================================
// Student list
// ============================================

/// Filters on the ranked student list; all optional, conjunctive
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListStudentsRequest {
    pub grade: Option<String>,
    pub olympiad: Option<String>,
    pub search: Option<String>,
}

/// One row of the ranked list, trend flattened for the wire
#[derive(Debug, Clone, Serialize)]
pub struct StudentRow {
    pub user_id: i64,
    pub full_name: String,
    pub phone_number: String,
    pub grade: Option<String>,
    pub olympiad_field: Option<String>,
    pub today_total: i64,
    pub week_total: i64,
    pub trend: TrendDirection,
    pub trend_percent: f64,
    pub last_activity: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListStudentsResponse {
    pub students: Vec<StudentRow>,
    /// Row count after filtering
    pub count: usize,
}

fn parse_filter(req: &ListStudentsRequest) -> Result<StudentFilter> {
    Ok(StudentFilter {
        grade: req
            .grade
            .as_deref()
            .map(|g| {
                g.parse()
                    .map_err(|_| Error::validation("grade", format!("unknown grade {:?}", g)))
            })
            .transpose()?,
        olympiad: req
            .olympiad
            .as_deref()
            .map(|f| {
                f.parse().map_err(|_| {
                    Error::validation("olympiad", format!("unknown field {:?}", f))
                })
            })
            .transpose()?,
        search: req.search.clone(),
    })
}

/// The school's students ranked by weekly total, filtered.
///
/// Filtering happens before aggregation, so a narrow filter keeps the
/// per-student window queries proportional to the rows returned.
pub fn list_students(
    db: &Database,
    acting: &UserProfile,
    req: &ListStudentsRequest,
    now: DateTime<Utc>,
) -> Result<ListStudentsResponse> {
    let school_id = school_scope(acting)?;
    let filter = parse_filter(req)?;
    let cohort = db.school_students(school_id)?;
    let rows = ranking::rank_students(db, &cohort, &filter, now)?;

    let students: Vec<StudentRow> = rows
        .into_iter()
        .map(|r| StudentRow {
            user_id: r.user_id,
            full_name: r.full_name,
            phone_number: r.phone_number,
            grade: r.grade.map(|g| g.as_str().to_string()),
            olympiad_field: r.olympiad_field.map(|f| f.as_str().to_string()),
            today_total: r.today_total,
            week_total: r.week_total,
            trend: r.trend.direction,
            trend_percent: r.trend.percent,
            last_activity: r.last_activity,
        })
        .collect();

    let count = students.len();
    Ok(ListStudentsResponse { students, count })
}

// ============================================
// Drill-down
// ============================================

/// How far back the per-day activity map reaches
const DAILY_MAP_DAYS: u32 = 60;
/// Recent sessions shown on the drill-down view
const RECENT_SESSION_LIMIT: usize = 10;

/// Per-subject lifetime total
#[derive(Debug, Clone, Serialize)]
pub struct SubjectTotal {
    pub name: String,
    pub color_code: String,
    pub total_seconds: i64,
}

/// Everything the manager's per-student view needs in one response
#[derive(Debug, Clone, Serialize)]
pub struct StudentProfileResponse {
    pub profile: student::ProfileView,
    pub stats: DashboardStats,
    pub recent_sessions: Vec<SessionView>,
    pub subjects: Vec<SubjectTotal>,
    /// Sparse: dates without activity are absent
    pub daily_totals: BTreeMap<NaiveDate, i64>,
}

/// Drill into one student of the manager's school.
///
/// A student id outside the school fails with a scope error even when
/// the row exists, so probing ids cannot distinguish other schools'
/// students from nonexistent ones by timing alone.
pub fn student_profile(
    db: &Database,
    acting: &UserProfile,
    student_id: i64,
    now: DateTime<Utc>,
) -> Result<StudentProfileResponse> {
    let scope = Scope::for_user(acting)?;
    let target = access::scoped_student(db, scope, student_id)?;

    let stats = student::dashboard_stats(db, target.id, now)?;
    let recent = db.recent_sessions(target.id, RECENT_SESSION_LIMIT)?;
    let recent_sessions = recent
        .iter()
        .map(|s| student::session_view(db, s))
        .collect::<Result<Vec<_>>>()?;
    let subjects = db
        .subject_breakdown(target.id)?
        .into_iter()
        .map(|(name, color_code, total_seconds)| SubjectTotal {
            name,
            color_code,
            total_seconds,
        })
        .collect();
    let daily_totals = window::daily_totals(db, target.id, DAILY_MAP_DAYS, now)?;

    Ok(StudentProfileResponse {
        profile: student::profile_view(db, &target)?,
        stats,
        recent_sessions,
        subjects,
        daily_totals,
    })
}

// ============================================
// Export
// ============================================

/// Range for the export; defaults to the trailing 30 days
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExportRequest {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

/// Flat per-student rows a spreadsheet writer can render directly
pub fn export_rows(
    db: &Database,
    acting: &UserProfile,
    req: &ExportRequest,
    now: DateTime<Utc>,
) -> Result<Vec<ExportRow>> {
    let school_id = school_scope(acting)?;
    let end = req.end.unwrap_or(now);
    let start = req.start.unwrap_or_else(|| end - Duration::days(30));
    if end < start {
        return Err(Error::InvalidInterval { start, end });
    }
    export::export_rows(db, school_id, start, end)
}
