//! # motala-core
//!
//! Core library for motala - a study-time tracker with per-school
//! dashboards.
//!
//! This library provides:
//! - Domain types for schools, users, subjects, and study sessions
//! - SQLite storage layer with an append-only session ledger
//! - Window aggregation, trend classification, ranking, KPIs, export
//! - Role-based tenant scoping
//! - Configuration management and logging infrastructure
//!
//! ## Architecture
//!
//! The ledger is the single source of truth; every aggregate is
//! derived on read and never cached:
//!
//! ```text
//! session writes -> ledger -> window totals -> trends -> ranking/KPI/export
//! ```
//!
//! The tenant scope resolver gates which users ever enter that
//! pipeline. The heartbeat flag ("currently studying") is an
//! independent side channel consulted only for the active-now count.
//!
//! ## Example
//!
//! ```rust,no_run
//! use motala_core::{Config, Database};
//!
//! let config = Config::load().expect("failed to load config");
//! let db = Database::open(&config.database_path()).expect("failed to open database");
//! db.migrate().expect("failed to run migrations");
//! ```

// Re-export commonly used items at the crate root
pub use access::Scope;
pub use config::Config;
pub use db::Database;
pub use error::{Error, Result};
pub use types::*;

// Public modules
pub mod access;
pub mod analytics;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod types;
