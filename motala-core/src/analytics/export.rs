//! Export row projection
//!
//! Produces the flat row list consumed by the external spreadsheet
//! renderer. This is strictly a projection of the window aggregator
//! over a caller-supplied range; there is no separate computation
//! path.

use crate::analytics::window::{self, Window};
use crate::db::Database;
use crate::error::Result;
use crate::types::{Grade, OlympiadField};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One spreadsheet row per student, zero totals included.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportRow {
    pub name: String,
    pub phone: String,
    pub grade: Option<Grade>,
    pub specialization: Option<OlympiadField>,
    /// Hours, rounded to two decimal places
    pub total_hours: f64,
    pub session_count: i64,
}

/// Round seconds to hours with two decimals.
fn seconds_to_hours(seconds: i64) -> f64 {
    (seconds as f64 / 3600.0 * 100.0).round() / 100.0
}

/// Build export rows for every student of a school over `[start, end)`.
///
/// Callers default the range to the trailing 30 days.
pub fn export_rows(
    db: &Database,
    school_id: i64,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<Vec<ExportRow>> {
    let students = db.school_students(school_id)?;
    let totals = window::school_cohort_totals(
        db,
        school_id,
        Window::Custom { start, end },
        end,
    )?;

    let rows = students
        .into_iter()
        .map(|student| {
            let stat = totals.per_user.iter().find(|t| t.user_id == student.id);
            ExportRow {
                name: student.display_name().to_string(),
                phone: student.phone_number.clone(),
                grade: student.grade,
                specialization: student.olympiad_field,
                total_hours: seconds_to_hours(stat.map_or(0, |t| t.total_seconds)),
                session_count: stat.map_or(0, |t| t.session_count),
            }
        })
        .collect();

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::NewUser;
    use crate::types::Role;
    use chrono::Duration;

    fn test_db() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.migrate().unwrap();
        db
    }

    #[test]
    fn test_seconds_to_hours_two_decimals() {
        assert_eq!(seconds_to_hours(0), 0.0);
        assert_eq!(seconds_to_hours(3600), 1.0);
        assert_eq!(seconds_to_hours(5400), 1.5);
        // 4000s = 1.111...h -> 1.11
        assert_eq!(seconds_to_hours(4000), 1.11);
    }

    #[test]
    fn test_export_includes_idle_students() {
        let db = test_db();
        let school = db.create_school("Alborz", 21_600).unwrap();

        let active = db
            .create_user(&NewUser {
                phone_number: "09120000001".to_string(),
                full_name: "Sara".to_string(),
                role: Role::Student,
                school_id: Some(school.id),
            })
            .unwrap();
        db.create_user(&NewUser {
            phone_number: "09120000002".to_string(),
            full_name: "Reza".to_string(),
            role: Role::Student,
            school_id: Some(school.id),
        })
        .unwrap();

        let now = Utc::now();
        let subject = db
            .find_or_create_subject(active.id, "Math", "#fff")
            .unwrap();
        db.record_session(
            active.id,
            subject.id,
            now - Duration::days(3),
            now - Duration::days(3) + Duration::seconds(5400),
            "",
        )
        .unwrap();

        let rows = export_rows(&db, school.id, now - Duration::days(30), now).unwrap();
        assert_eq!(rows.len(), 2);

        let sara = rows.iter().find(|r| r.name == "Sara").unwrap();
        assert_eq!(sara.total_hours, 1.5);
        assert_eq!(sara.session_count, 1);

        let reza = rows.iter().find(|r| r.name == "Reza").unwrap();
        assert_eq!(reza.total_hours, 0.0);
        assert_eq!(reza.session_count, 0);
    }

    #[test]
    fn test_export_honors_range() {
        let db = test_db();
        let school = db.create_school("Alborz", 21_600).unwrap();
        let user = db
            .create_user(&NewUser {
                phone_number: "09120000001".to_string(),
                full_name: "Sara".to_string(),
                role: Role::Student,
                school_id: Some(school.id),
            })
            .unwrap();
        let subject = db.find_or_create_subject(user.id, "Math", "#fff").unwrap();

        let now = Utc::now();
        // Inside a 7-day range
        db.record_session(
            user.id,
            subject.id,
            now - Duration::days(2),
            now - Duration::days(2) + Duration::seconds(3600),
            "",
        )
        .unwrap();
        // Outside it
        db.record_session(
            user.id,
            subject.id,
            now - Duration::days(20),
            now - Duration::days(20) + Duration::seconds(7200),
            "",
        )
        .unwrap();

        let rows = export_rows(&db, school.id, now - Duration::days(7), now).unwrap();
        assert_eq!(rows[0].total_hours, 1.0);
        assert_eq!(rows[0].session_count, 1);

        let rows = export_rows(&db, school.id, now - Duration::days(30), now).unwrap();
        assert_eq!(rows[0].total_hours, 3.0);
        assert_eq!(rows[0].session_count, 2);
    }
}
