//! Database layer for motala
//!
//! This module provides the storage layer using SQLite with:
//! - Schema migrations
//! - Repository pattern for queries
//! - Transactional writes for the manager swap and heartbeat flag

pub mod repo;
pub mod schema;

pub use repo::{Database, NewUser, ProfileUpdate, UserTotal};
