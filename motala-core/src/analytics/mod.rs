//! Derived analytics over the session ledger
//!
//! Everything in this module is computed on read from the ledger;
//! nothing is cached or persisted. The pipeline is:
//!
//! ```text
//! session ledger ──> window totals ──> trends ──> ranking / KPI / export
//! ```
//!
//! Tenant scoping happens before any of this runs: callers hand these
//! functions a school id or user set already narrowed by
//! [`crate::access::Scope`].

pub mod export;
pub mod kpi;
pub mod ranking;
pub mod trend;
pub mod window;

pub use export::ExportRow;
pub use kpi::SchoolKpi;
pub use ranking::{AggregateRow, StudentFilter};
pub use trend::{Trend, TrendDirection};
pub use window::{CohortTotals, Window};
