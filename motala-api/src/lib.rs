//! # motala-api
//!
//! Transport-independent request handlers over `motala-core`.
//!
//! Every handler is a plain function taking the database, the acting
//! user (already authenticated by whatever transport embeds this
//! crate), and a typed request struct, and returning a typed response.
//! No HTTP, no routing, no credential handling lives here; a server
//! binary maps routes onto these functions and [`ErrorKind`] onto
//! status codes.
//!
//! Handlers are grouped by the role that calls them:
//! - [`student`] — dashboard, session logging, profile, live status
//! - [`manager`] — school KPIs, ranked student lists, per-student
//!   drill-down, export rows
//! - [`superadmin`] — school CRUD, manager assignment, member listing

pub use error::{ErrorBody, ErrorKind};

pub mod error;
pub mod manager;
pub mod student;
pub mod superadmin;
