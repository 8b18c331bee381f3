//! Time-window aggregation
//!
//! Sums closed, valid session durations over half-open windows
//! `[start, end)`. A session belongs to the window that contains its
//! `start_time`. The "today" boundary is midnight in the server's
//! local time zone, computed fresh per call so results stay correct
//! across midnight.

use crate::db::{Database, UserTotal};
use crate::error::Result;
use chrono::{DateTime, Duration, Local, NaiveDate, TimeZone, Utc};
use std::collections::BTreeMap;

/// A half-open time interval to aggregate over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Window {
    /// From local midnight to now
    Today,
    /// From `now - n days` to now
    LastNDays(u32),
    /// Caller-supplied `[start, end)`
    Custom {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}

impl Window {
    /// Resolve to concrete `[start, end)` UTC instants.
    pub fn resolve(&self, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        match *self {
            Window::Today => (local_midnight(now), now),
            Window::LastNDays(n) => (now - Duration::days(i64::from(n)), now),
            Window::Custom { start, end } => (start, end),
        }
    }
}

/// Midnight of the local calendar day containing `instant`, as UTC.
pub fn local_midnight(instant: DateTime<Utc>) -> DateTime<Utc> {
    let local_day = instant.with_timezone(&Local).date_naive();
    let midnight = local_day.and_time(chrono::NaiveTime::MIN);
    // DST gaps can make midnight ambiguous or skipped; take the
    // earliest representable instant.
    Local
        .from_local_datetime(&midnight)
        .earliest()
        .unwrap_or_else(|| Utc.from_utc_datetime(&midnight).with_timezone(&Local))
        .with_timezone(&Utc)
}

/// Local calendar date of an instant (used for daily breakdown keys).
pub fn local_date(instant: DateTime<Utc>) -> NaiveDate {
    instant.with_timezone(&Local).date_naive()
}

/// Total seconds for one user over a window.
pub fn total_seconds(
    db: &Database,
    user_id: i64,
    window: Window,
    now: DateTime<Utc>,
) -> Result<i64> {
    let (start, end) = window.resolve(now);
    db.total_seconds_in_range(user_id, start, end)
}

/// Aggregates over a school's student cohort in one window.
#[derive(Debug, Clone, Default)]
pub struct CohortTotals {
    /// Per-user totals, highest first; users with no counted sessions
    /// are absent
    pub per_user: Vec<UserTotal>,
    /// Sum across the cohort
    pub total_seconds: i64,
    /// Distinct users with at least one counted session
    pub active_users: i64,
    /// The single top scorer; ties go to the lexicographically
    /// smaller phone number. `None` for an empty window.
    pub top: Option<UserTotal>,
}

/// Compute cohort totals for a school's students over a window.
pub fn school_cohort_totals(
    db: &Database,
    school_id: i64,
    window: Window,
    now: DateTime<Utc>,
) -> Result<CohortTotals> {
    let (start, end) = window.resolve(now);
    let per_user = db.school_totals_in_range(school_id, start, end)?;

    let total_seconds = per_user.iter().map(|t| t.total_seconds).sum();
    let active_users = per_user.len() as i64;
    // The repo query already orders by total desc, phone asc
    let top = per_user.first().cloned();

    tracing::debug!(
        school_id,
        %start,
        %end,
        total_seconds,
        active_users,
        "Computed cohort totals"
    );

    Ok(CohortTotals {
        per_user,
        total_seconds,
        active_users,
        top,
    })
}

/// Zero-safe average: an empty cohort averages to 0 rather than
/// dividing by zero.
pub fn average_seconds(total_seconds: i64, user_count: i64) -> i64 {
    if user_count == 0 {
        0
    } else {
        total_seconds / user_count
    }
}

/// Per-local-date totals for one user over the trailing `days` days.
///
/// Sparse: dates with no activity are simply absent, never present
/// with 0.
pub fn daily_totals(
    db: &Database,
    user_id: i64,
    days: u32,
    now: DateTime<Utc>,
) -> Result<BTreeMap<NaiveDate, i64>> {
    let start = local_midnight(now) - Duration::days(i64::from(days.saturating_sub(1)));
    let sessions = db.sessions_in_range(user_id, start, now)?;

    let mut by_date: BTreeMap<NaiveDate, i64> = BTreeMap::new();
    for session in sessions {
        *by_date.entry(local_date(session.start_time)).or_insert(0) +=
            session.duration_seconds;
    }
    Ok(by_date)
}
