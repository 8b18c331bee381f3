//! Tenant scope resolution and onboarding
//!
//! Every aggregate or listing query is gated by a [`Scope`] derived
//! from the acting user's role before any student data enters the
//! analytics pipeline:
//!
//! - students see only themselves
//! - a manager sees the students of exactly one school
//! - a superadmin is unrestricted and may reassign school managers
//!
//! The scope is a capability descriptor, not a runtime role probe:
//! resolving it is the only place that branches on [`Role`].

use crate::db::{Database, ProfileUpdate};
use crate::error::{Error, Result};
use crate::types::{Role, School, UserProfile};

/// What an acting user is allowed to read or aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Own data only
    SelfOnly(i64),
    /// Students of one school
    School(i64),
    /// Unrestricted
    All,
}

impl Scope {
    /// Resolve the scope for an acting user.
    ///
    /// A manager without a school fails with `NoSchoolAssigned`;
    /// callers must surface that as a client-visible error, never as
    /// an empty result set.
    pub fn for_user(acting: &UserProfile) -> Result<Scope> {
        match acting.role {
            Role::Student => Ok(Scope::SelfOnly(acting.id)),
            Role::Manager => match acting.school_id {
                Some(school_id) => Ok(Scope::School(school_id)),
                None => Err(Error::NoSchoolAssigned),
            },
            Role::SuperAdmin => Ok(Scope::All),
        }
    }

    /// Whether a target user's data is visible under this scope
    pub fn permits(&self, target: &UserProfile) -> bool {
        match *self {
            Scope::SelfOnly(user_id) => target.id == user_id,
            Scope::School(school_id) => {
                target.role == Role::Student && target.school_id == Some(school_id)
            }
            Scope::All => true,
        }
    }

    /// The student set this scope admits, in stable enumeration order.
    pub fn students(&self, db: &Database) -> Result<Vec<UserProfile>> {
        match *self {
            Scope::SelfOnly(user_id) => {
                let user = db
                    .get_user(user_id)?
                    .ok_or_else(|| Error::not_found("user", user_id))?;
                Ok(vec![user])
            }
            Scope::School(school_id) => db.school_students(school_id),
            Scope::All => Err(Error::ScopeViolation(
                "unbounded student enumeration requires a school".to_string(),
            )),
        }
    }
}

/// Fetch one student's profile under a scope.
///
/// An absent user is `NotFound`; a user that exists outside the scope
/// is `ScopeViolation`, so callers can distinguish "doesn't exist"
/// from "not yours".
pub fn scoped_student(db: &Database, scope: Scope, user_id: i64) -> Result<UserProfile> {
    let user = db
        .get_user(user_id)?
        .ok_or_else(|| Error::not_found("user", user_id))?;
    if !scope.permits(&user) {
        tracing::warn!(user_id, ?scope, "Denied cross-scope read");
        return Err(Error::ScopeViolation(format!(
            "user {} is outside the caller's scope",
            user_id
        )));
    }
    Ok(user)
}

/// Redeem an invitation code: returns the active school it maps to.
pub fn redeem_invitation(db: &Database, code: &str) -> Result<School> {
    let school = db
        .get_school_by_code(code)?
        .filter(|school| school.is_active)
        .ok_or_else(|| Error::InvalidInvitationCode(code.to_string()))?;
    Ok(school)
}

/// Complete or update a profile.
///
/// The first successful completion must present an invitation code for
/// an active school; membership is sticky afterwards, so later updates
/// without a code succeed without re-validation.
pub fn complete_profile(
    db: &Database,
    user_id: i64,
    update: &ProfileUpdate,
    invitation_code: Option<&str>,
) -> Result<UserProfile> {
    let user = db
        .get_user(user_id)?
        .ok_or_else(|| Error::not_found("user", user_id))?;

    if user.school_id.is_some() {
        // Sticky membership: nothing to redeem
        let updated = db.update_profile(user_id, update)?;
        if !user.is_profile_complete {
            db.mark_profile_complete(user_id)?;
            return db
                .get_user(user_id)?
                .ok_or_else(|| Error::not_found("user", user_id));
        }
        return Ok(updated);
    }

    // Redeem before any write: a rejected code must leave the row
    // exactly as it was.
    let code = invitation_code.ok_or_else(|| {
        Error::validation(
            "invitation_code",
            "an invitation code is required to complete the profile",
        )
    })?;
    let school = redeem_invitation(db, code)?;

    db.update_profile(user_id, update)?;
    tracing::info!(user_id, school_id = school.id, "Completed profile via invitation");
    db.attach_to_school(user_id, school.id)
}
