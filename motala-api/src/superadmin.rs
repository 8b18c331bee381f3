//! Superadmin handlers: school CRUD, manager assignment, member
//! listing. Everything here requires an unrestricted scope.

use motala_core::access::Scope;
use motala_core::db::Database;
use motala_core::types::{School, UserProfile, DEFAULT_DAILY_THRESHOLD_SECONDS};
use motala_core::{Error, Result};
use serde::{Deserialize, Serialize};

use crate::student::{profile_view, ProfileView};

fn require_all(acting: &UserProfile) -> Result<()> {
    match Scope::for_user(acting)? {
        Scope::All => Ok(()),
        _ => Err(Error::ScopeViolation(
            "school administration requires a superadmin account".to_string(),
        )),
    }
}

// ============================================
// Views
// ============================================

/// A school plus the derived figures the admin list shows
#[derive(Debug, Clone, Serialize)]
pub struct SchoolView {
    pub id: i64,
    pub name: String,
    pub invitation_code: String,
    pub daily_threshold_seconds: i64,
    pub is_active: bool,
    pub student_count: usize,
    /// Display name of the current manager, if one is assigned
    pub manager: Option<String>,
}

fn school_view(db: &Database, school: School) -> Result<SchoolView> {
    let student_count = db.school_students(school.id)?.len();
    let manager = db
        .school_manager(school.id)?
        .map(|m| m.display_name().to_string());
    Ok(SchoolView {
        id: school.id,
        name: school.name,
        invitation_code: school.invitation_code,
        daily_threshold_seconds: school.daily_threshold_seconds,
        is_active: school.is_active,
        student_count,
        manager,
    })
}

// ============================================
// School CRUD
// ============================================

/// All schools, including inactive ones
pub fn list_schools(db: &Database, acting: &UserProfile) -> Result<Vec<SchoolView>> {
    require_all(acting)?;
    db.list_schools()?
        .into_iter()
        .map(|s| school_view(db, s))
        .collect()
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateSchoolRequest {
    pub name: String,
    /// Defaults to 6 hours when omitted
    pub daily_threshold_seconds: Option<i64>,
}

/// Create a school; the invitation code is generated, never supplied.
pub fn create_school(
    db: &Database,
    acting: &UserProfile,
    req: &CreateSchoolRequest,
) -> Result<SchoolView> {
    require_all(acting)?;
    let name = req.name.trim();
    if name.is_empty() {
        return Err(Error::validation("name", "school name must not be empty"));
    }
    let threshold = req
        .daily_threshold_seconds
        .unwrap_or(DEFAULT_DAILY_THRESHOLD_SECONDS);
    if threshold <= 0 {
        return Err(Error::validation(
            "daily_threshold_seconds",
            "threshold must be positive",
        ));
    }

    let school = db.create_school(name, threshold)?;
    tracing::info!(school_id = school.id, name, "Created school");
    school_view(db, school)
}

/// Partial school update; omitted fields keep their current value
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateSchoolRequest {
    pub name: Option<String>,
    pub daily_threshold_seconds: Option<i64>,
    pub is_active: Option<bool>,
}

pub fn update_school(
    db: &Database,
    acting: &UserProfile,
    school_id: i64,
    req: &UpdateSchoolRequest,
) -> Result<SchoolView> {
    require_all(acting)?;
    let current = db
        .get_school(school_id)?
        .ok_or_else(|| Error::not_found("school", school_id))?;

    let name = match &req.name {
        Some(name) if name.trim().is_empty() => {
            return Err(Error::validation("name", "school name must not be empty"))
        }
        Some(name) => name.trim().to_string(),
        None => current.name,
    };
    let threshold = req
        .daily_threshold_seconds
        .unwrap_or(current.daily_threshold_seconds);
    if threshold <= 0 {
        return Err(Error::validation(
            "daily_threshold_seconds",
            "threshold must be positive",
        ));
    }
    let is_active = req.is_active.unwrap_or(current.is_active);

    let school = db.update_school(school_id, &name, threshold, is_active)?;
    school_view(db, school)
}

/// Delete a school. Members survive with their affiliation cleared;
/// their ledgers are untouched.
pub fn delete_school(db: &Database, acting: &UserProfile, school_id: i64) -> Result<()> {
    require_all(acting)?;
    db.get_school(school_id)?
        .ok_or_else(|| Error::not_found("school", school_id))?;
    db.delete_school(school_id)?;
    tracing::info!(school_id, "Deleted school");
    Ok(())
}

// ============================================
// Manager assignment
// ============================================

#[derive(Debug, Clone, Deserialize)]
pub struct AssignManagerRequest {
    pub phone_number: String,
    #[serde(default)]
    pub full_name: String,
}

/// Make the named account the school's manager, demoting the previous
/// one. Creates a shell account when the phone is unknown.
pub fn assign_manager(
    db: &Database,
    acting: &UserProfile,
    school_id: i64,
    req: &AssignManagerRequest,
) -> Result<ProfileView> {
    require_all(acting)?;
    let phone = req.phone_number.trim();
    if phone.is_empty() {
        return Err(Error::validation("phone_number", "phone number must not be empty"));
    }

    let manager = db.assign_manager(school_id, phone, req.full_name.trim())?;
    tracing::info!(school_id, manager_id = manager.id, "Assigned school manager");
    profile_view(db, &manager)
}

/// Every member of a school, manager included
pub fn school_members(
    db: &Database,
    acting: &UserProfile,
    school_id: i64,
) -> Result<Vec<ProfileView>> {
    require_all(acting)?;
    db.get_school(school_id)?
        .ok_or_else(|| Error::not_found("school", school_id))?;
    db.school_members(school_id)?
        .iter()
        .map(|m| profile_view(db, m))
        .collect()
}
