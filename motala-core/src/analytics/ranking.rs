//! Student ranking and filtering
//!
//! Turns a tenant-scoped student set into per-student aggregate rows,
//! filtered conjunctively and ordered by week total descending. The
//! sort is stable: equal week totals keep the scope resolver's
//! enumeration order.

use crate::analytics::trend::Trend;
use crate::analytics::window::{total_seconds, Window};
use crate::db::Database;
use crate::error::Result;
use crate::types::{Grade, OlympiadField, UserProfile};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Optional filters over a student cohort. All provided filters must
/// match (AND); the free-text search is a case-insensitive substring
/// test against name OR phone.
#[derive(Debug, Clone, Default)]
pub struct StudentFilter {
    pub grade: Option<Grade>,
    pub olympiad: Option<OlympiadField>,
    pub search: Option<String>,
}

impl StudentFilter {
    /// Whether a student passes every provided filter
    pub fn matches(&self, user: &UserProfile) -> bool {
        if let Some(grade) = self.grade {
            if user.grade != Some(grade) {
                return false;
            }
        }
        if let Some(olympiad) = self.olympiad {
            if user.olympiad_field != Some(olympiad) {
                return false;
            }
        }
        if let Some(ref search) = self.search {
            let needle = search.to_lowercase();
            let name_hit = user.full_name.to_lowercase().contains(&needle);
            let phone_hit = user.phone_number.to_lowercase().contains(&needle);
            if !name_hit && !phone_hit {
                return false;
            }
        }
        true
    }
}

/// Per-student aggregate tuple. Derived on demand, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateRow {
    pub user_id: i64,
    pub full_name: String,
    pub phone_number: String,
    pub grade: Option<Grade>,
    pub olympiad_field: Option<OlympiadField>,
    /// Seconds studied since local midnight
    pub today_total: i64,
    /// Seconds studied in the trailing 7 days
    pub week_total: i64,
    /// This week versus the week before
    pub trend: Trend,
    /// Most recent counted session start
    pub last_activity: Option<DateTime<Utc>>,
}

/// Build ranked aggregate rows for a student set.
///
/// `students` is expected to come from the tenant scope resolver in
/// its stable enumeration order; that order is what ties fall back to.
pub fn rank_students(
    db: &Database,
    students: &[UserProfile],
    filter: &StudentFilter,
    now: DateTime<Utc>,
) -> Result<Vec<AggregateRow>> {
    let week = Window::LastNDays(7);
    let previous_week = Window::Custom {
        start: now - Duration::days(14),
        end: now - Duration::days(7),
    };

    let mut rows = Vec::new();
    for student in students.iter().filter(|s| filter.matches(s)) {
        let today_total = total_seconds(db, student.id, Window::Today, now)?;
        let week_total = total_seconds(db, student.id, week, now)?;
        let previous_total = total_seconds(db, student.id, previous_week, now)?;

        rows.push(AggregateRow {
            user_id: student.id,
            full_name: student.full_name.clone(),
            phone_number: student.phone_number.clone(),
            grade: student.grade,
            olympiad_field: student.olympiad_field,
            today_total,
            week_total,
            trend: Trend::compare(week_total, previous_total),
            last_activity: db.last_activity(student.id)?,
        });
    }

    // Stable: equal week totals keep enumeration order
    rows.sort_by(|a, b| b.week_total.cmp(&a.week_total));

    tracing::debug!(students = rows.len(), "Ranked student cohort");
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::NewUser;
    use crate::types::Role;

    fn test_db() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.migrate().unwrap();
        db
    }

    fn seed_student(db: &Database, phone: &str, name: &str, school_id: i64) -> UserProfile {
        db.create_user(&NewUser {
            phone_number: phone.to_string(),
            full_name: name.to_string(),
            role: Role::Student,
            school_id: Some(school_id),
        })
        .unwrap()
    }

    fn seed_week_seconds(db: &Database, user_id: i64, secs: i64) {
        let subject = db.find_or_create_subject(user_id, "Math", "#fff").unwrap();
        let start = Utc::now() - Duration::days(2);
        db.record_session(user_id, subject.id, start, start + Duration::seconds(secs), "")
            .unwrap();
    }

    #[test]
    fn test_ranking_order_with_stable_ties() {
        let db = test_db();
        let school = db.create_school("Alborz", 21_600).unwrap();

        // Enumeration order: p50, p200a, p200b, p10
        let students = [
            ("09120000001", "A", 50),
            ("09120000002", "B", 200),
            ("09120000003", "C", 200),
            ("09120000004", "D", 10),
        ]
        .map(|(phone, name, secs)| {
            let user = seed_student(&db, phone, name, school.id);
            seed_week_seconds(&db, user.id, secs);
            user
        });

        let rows = rank_students(&db, &students, &StudentFilter::default(), Utc::now()).unwrap();
        let totals: Vec<i64> = rows.iter().map(|r| r.week_total).collect();
        assert_eq!(totals, vec![200, 200, 50, 10]);
        // The two 200s keep their enumeration order: B before C
        assert_eq!(rows[0].full_name, "B");
        assert_eq!(rows[1].full_name, "C");
    }

    #[test]
    fn test_filters_are_conjunctive() {
        let db = test_db();
        let school = db.create_school("Alborz", 21_600).unwrap();
        let a = seed_student(&db, "09120000001", "Sara Ahmadi", school.id);
        let b = seed_student(&db, "09120000002", "Sara Karimi", school.id);

        db.update_profile(
            a.id,
            &crate::db::ProfileUpdate {
                grade: Some(Grade::Tenth),
                olympiad_field: Some(OlympiadField::Math),
                ..Default::default()
            },
        )
        .unwrap();
        db.update_profile(
            b.id,
            &crate::db::ProfileUpdate {
                grade: Some(Grade::Eleventh),
                olympiad_field: Some(OlympiadField::Math),
                ..Default::default()
            },
        )
        .unwrap();

        let students = db.school_students(school.id).unwrap();

        let filter = StudentFilter {
            grade: Some(Grade::Tenth),
            olympiad: Some(OlympiadField::Math),
            search: Some("sara".to_string()),
        };
        let rows = rank_students(&db, &students, &filter, Utc::now()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].full_name, "Sara Ahmadi");
    }

    #[test]
    fn test_search_matches_name_or_phone() {
        let db = test_db();
        let school = db.create_school("Alborz", 21_600).unwrap();
        seed_student(&db, "09120000001", "Sara Ahmadi", school.id);
        seed_student(&db, "09995550002", "Reza Karimi", school.id);
        let students = db.school_students(school.id).unwrap();

        // Case-insensitive name substring
        let filter = StudentFilter {
            search: Some("AHMADI".to_string()),
            ..Default::default()
        };
        let rows = rank_students(&db, &students, &filter, Utc::now()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].full_name, "Sara Ahmadi");

        // Phone substring
        let filter = StudentFilter {
            search: Some("9995".to_string()),
            ..Default::default()
        };
        let rows = rank_students(&db, &students, &filter, Utc::now()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].full_name, "Reza Karimi");
    }

    #[test]
    fn test_week_trend_against_previous_week() {
        let db = test_db();
        let school = db.create_school("Alborz", 21_600).unwrap();
        let user = seed_student(&db, "09120000001", "Sara", school.id);
        let subject = db.find_or_create_subject(user.id, "Math", "#fff").unwrap();

        let now = Utc::now();
        // Last week: 1000s, this week: 2000s -> +100% up
        let last_week_start = now - Duration::days(10);
        db.record_session(
            user.id,
            subject.id,
            last_week_start,
            last_week_start + Duration::seconds(1000),
            "",
        )
        .unwrap();
        let this_week_start = now - Duration::days(2);
        db.record_session(
            user.id,
            subject.id,
            this_week_start,
            this_week_start + Duration::seconds(2000),
            "",
        )
        .unwrap();

        let rows = rank_students(&db, &[user], &StudentFilter::default(), now).unwrap();
        assert_eq!(rows[0].week_total, 2000);
        assert_eq!(rows[0].trend.percent, 100.0);
        assert_eq!(rows[0].trend.direction, crate::analytics::TrendDirection::Up);
    }
}
