//! Core domain types for motala
//!
//! These types represent the canonical data model persisted in SQLite.
//! Everything derived from them (window totals, trends, rankings, KPI
//! payloads) lives in [`crate::analytics`] and is recomputed on read.
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **School** | The tenant boundary; a manager sees exactly one school's students |
//! | **UserProfile** | An account identified by phone number; role is student, manager, or superadmin |
//! | **StudySession** | One study interval; immutable once closed |
//! | **Subject** | A labeled, colored category owned by one user |
//! | **Heartbeat flag** | `is_studying` on the profile; toggled by clients, never derived from sessions |

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================
// Roles
// ============================================

/// Access role of an account.
///
/// A single tagged enum instead of role-gated views: scope resolution
/// ([`crate::access::Scope`]) is the only place that branches on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Student,
    Manager,
    SuperAdmin,
}

impl Role {
    /// Returns the identifier used in database storage
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Manager => "manager",
            Role::SuperAdmin => "superadmin",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "student" => Ok(Role::Student),
            "manager" => Ok(Role::Manager),
            "superadmin" => Ok(Role::SuperAdmin),
            _ => Err(format!("unknown role: {}", s)),
        }
    }
}

// ============================================
// Grade and specialization track
// ============================================

/// School grade of a student.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Grade {
    Seventh,
    Eighth,
    Ninth,
    Tenth,
    Eleventh,
    Twelfth,
    Graduate,
}

impl Grade {
    pub fn as_str(&self) -> &'static str {
        match self {
            Grade::Seventh => "7",
            Grade::Eighth => "8",
            Grade::Ninth => "9",
            Grade::Tenth => "10",
            Grade::Eleventh => "11",
            Grade::Twelfth => "12",
            Grade::Graduate => "graduate",
        }
    }
}

impl std::fmt::Display for Grade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Grade {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "7" => Ok(Grade::Seventh),
            "8" => Ok(Grade::Eighth),
            "9" => Ok(Grade::Ninth),
            "10" => Ok(Grade::Tenth),
            "11" => Ok(Grade::Eleventh),
            "12" => Ok(Grade::Twelfth),
            "graduate" => Ok(Grade::Graduate),
            _ => Err(format!("unknown grade: {}", s)),
        }
    }
}

/// Olympiad specialization track of a student.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OlympiadField {
    Math,
    Physics,
    Chemistry,
    Biology,
    Computer,
    Astronomy,
    None,
}

impl OlympiadField {
    pub fn as_str(&self) -> &'static str {
        match self {
            OlympiadField::Math => "math",
            OlympiadField::Physics => "physics",
            OlympiadField::Chemistry => "chemistry",
            OlympiadField::Biology => "biology",
            OlympiadField::Computer => "computer",
            OlympiadField::Astronomy => "astronomy",
            OlympiadField::None => "none",
        }
    }
}

impl std::fmt::Display for OlympiadField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for OlympiadField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "math" => Ok(OlympiadField::Math),
            "physics" => Ok(OlympiadField::Physics),
            "chemistry" => Ok(OlympiadField::Chemistry),
            "biology" => Ok(OlympiadField::Biology),
            "computer" => Ok(OlympiadField::Computer),
            "astronomy" => Ok(OlympiadField::Astronomy),
            "none" => Ok(OlympiadField::None),
            _ => Err(format!("unknown olympiad field: {}", s)),
        }
    }
}

// ============================================
// User profile
// ============================================

/// An account, identified by phone number.
///
/// Invariant: a student or manager belongs to exactly one school once
/// `is_profile_complete` is set; a superadmin never has a school.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    /// Database row id
    pub id: i64,
    /// Unique phone identifier (also the stable tie-break key)
    pub phone_number: String,
    /// Display name; empty until the profile is completed
    pub full_name: String,
    /// Access role
    pub role: Role,
    /// Tenant affiliation; `None` until onboarding
    pub school_id: Option<i64>,
    /// School grade (students only)
    pub grade: Option<Grade>,
    /// Specialization track (students only)
    pub olympiad_field: Option<OlympiadField>,
    /// Set on the first successful profile completion
    pub is_profile_complete: bool,
    /// Heartbeat flag toggled by clients; not derived from sessions
    pub is_studying: bool,
    /// When the account was created
    pub created_at: DateTime<Utc>,
    /// Last profile write
    pub updated_at: DateTime<Utc>,
}

impl UserProfile {
    /// Display name, falling back to the phone number
    pub fn display_name(&self) -> &str {
        if self.full_name.is_empty() {
            &self.phone_number
        } else {
            &self.full_name
        }
    }
}

// ============================================
// School
// ============================================

/// Default "normal daily study" threshold: 6 hours.
pub const DEFAULT_DAILY_THRESHOLD_SECONDS: i64 = 21_600;

/// A tenant. Owns a set of member users via their `school_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct School {
    /// Database row id
    pub id: i64,
    /// School name
    pub name: String,
    /// Unique 8-character invitation code, generated at creation
    pub invitation_code: String,
    /// Seconds of study per day considered "normal" for this school
    pub daily_threshold_seconds: i64,
    /// Inactive schools reject invitation codes
    pub is_active: bool,
    /// When the school was created
    pub created_at: DateTime<Utc>,
}

// ============================================
// Subject
// ============================================

/// A study category scoped to its creating user.
///
/// Two users may each own a subject with the same name; they are
/// distinct entities. Uniqueness key: (user_id, name).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subject {
    pub id: i64,
    /// Owning user
    pub user_id: i64,
    pub name: String,
    /// Hex color, e.g. "#10b981"
    pub color_code: String,
}

/// Fallback color for subjects created implicitly while logging a session.
pub const DEFAULT_SUBJECT_COLOR: &str = "#10b981";

// ============================================
// Study session
// ============================================

/// One study interval.
///
/// Created open (`end_time = None`, `duration_seconds = 0`). Closing
/// sets `end_time` and derives `duration_seconds` once; after that the
/// row is read-only for aggregation purposes. Open sessions are
/// excluded from every duration aggregate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudySession {
    pub id: i64,
    /// Owning user
    pub user_id: i64,
    /// Subject reference
    pub subject_id: i64,
    /// Free-text note
    pub description: String,
    pub start_time: DateTime<Utc>,
    /// `None` while the session is open
    pub end_time: Option<DateTime<Utc>>,
    /// Whole seconds, truncated; derived at close, never recomputed
    pub duration_seconds: i64,
    /// Soft-delete / dispute marker; invalid sessions never aggregate
    pub is_valid: bool,
}

impl StudySession {
    /// Whether the session has been closed
    pub fn is_closed(&self) -> bool {
        self.end_time.is_some()
    }
}

// ============================================
// Consultant ticket
// ============================================

/// A student's request for consultant attention.
///
/// Write-once from the student's side; consultants flip `is_resolved`
/// out of band. Listed newest-first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsultantTicket {
    pub id: i64,
    /// Owning user
    pub user_id: i64,
    /// Free-text question or concern
    pub message: String,
    /// Whether the student wants a phone call back
    pub request_call: bool,
    pub is_resolved: bool,
    pub created_at: DateTime<Utc>,
}
