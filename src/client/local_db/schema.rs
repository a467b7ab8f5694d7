//! Database Schema Definitions
//!
//! Contains schema-related constants and utilities.

/// Current database schema version
pub const CURRENT_SCHEMA_VERSION: i32 = 1;

/// Schema migration versions
pub const MIGRATION_VERSIONS: &[i32] = &[1];

/// Base tables, applied on every open
pub const BASE_SCHEMA: &str = include_str!("schema.sql");

/// Get pending migrations
pub fn pending_migrations(current_version: i32) -> Vec<i32> {
    MIGRATION_VERSIONS
        .iter()
        .filter(|&&v| v > current_version)
        .cloned()
        .collect()
}
