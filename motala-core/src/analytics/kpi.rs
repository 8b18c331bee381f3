//! Manager dashboard KPIs
//!
//! Everything here is derived from the ledger at call time and scoped
//! to one school. Every sub-aggregate (totals, active counts, top
//! scorer) carries the school scope; none may fall back to a global
//! query.

use crate::analytics::trend::Trend;
use crate::analytics::window::{self, Window};
use crate::db::Database;
use crate::error::Result;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// The single highest-scoring student of the day.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopStudent {
    pub name: String,
    /// Seconds studied today
    pub total: i64,
}

/// Aggregated dashboard figures for one school.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchoolKpi {
    /// Average study time today, formatted "H:MM"
    pub avg_study_today: String,
    /// Same figure in seconds
    pub avg_study_today_seconds: i64,
    /// Today's school total versus yesterday's, percent
    pub change_percent: f64,
    /// `None` when nobody has studied today
    pub top_student: Option<TopStudent>,
    /// Students with no counted session today
    pub absent_count: i64,
    /// Students with the heartbeat flag set right now
    pub active_now: i64,
    pub total_students: i64,
}

/// Format seconds as "H:MM": no leading zero on hours, two-digit
/// zero-padded minutes.
pub fn format_hours_minutes(seconds: i64) -> String {
    let seconds = seconds.max(0);
    format!("{}:{:02}", seconds / 3600, (seconds % 3600) / 60)
}

/// Compute the KPI block for a school's dashboard.
///
/// An empty school yields `"0:00"`, zero counts, and no top student;
/// the zero-student denominator never divides.
pub fn school_kpi(db: &Database, school_id: i64, now: DateTime<Utc>) -> Result<SchoolKpi> {
    let students = db.school_students(school_id)?;
    let total_students = students.len() as i64;

    let today = window::school_cohort_totals(db, school_id, Window::Today, now)?;

    // Yesterday: the full local day preceding today's midnight
    let midnight = window::local_midnight(now);
    let yesterday = window::school_cohort_totals(
        db,
        school_id,
        Window::Custom {
            start: midnight - Duration::days(1),
            end: midnight,
        },
        now,
    )?;

    // Average over the whole roster, idle students included; the
    // distinct-active count only feeds absent_count.
    let avg_seconds = window::average_seconds(today.total_seconds, total_students);
    let change = Trend::compare(today.total_seconds, yesterday.total_seconds);

    let kpi = SchoolKpi {
        avg_study_today: format_hours_minutes(avg_seconds),
        avg_study_today_seconds: avg_seconds,
        change_percent: change.percent,
        top_student: today.top.map(|top| TopStudent {
            name: if top.full_name.is_empty() {
                top.phone_number
            } else {
                top.full_name
            },
            total: top.total_seconds,
        }),
        absent_count: total_students - today.active_users,
        active_now: db.count_studying(school_id)?,
        total_students,
    };

    tracing::debug!(
        school_id,
        total_students,
        active_today = today.active_users,
        "Computed school KPI"
    );
    Ok(kpi)
}
