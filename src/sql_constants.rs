//! SQL query constants used by the admin and introspection paths.
//!
//! Identifiers (database names) cannot be bound as parameters, so
//! `CREATE DATABASE` / `DROP DATABASE` are formatted inline after the name has
//! been validated by [`crate::db::quote_identifier`].

// ============================================================================
// Database administration
// ============================================================================

/// Check whether a logical database exists
pub const CHECK_DATABASE_EXISTS: &str =
    "SELECT EXISTS(SELECT 1 FROM pg_database WHERE datname = $1)";

/// Keep server notices out of test output
pub const QUIET_NOTICES: &str = "SET client_min_messages TO WARNING";

// ============================================================================
// Introspection
// ============================================================================

/// Column list returned for every reflected column
///
/// information_schema columns are domain types; cast to plain text/int4 so
/// they decode as `String`/`i32`.
pub const COLUMN_FIELDS: &str = "column_name::text, data_type::text, \
     (is_nullable = 'YES') AS nullable, ordinal_position::int4";

/// Reflect the columns of one table, in declaration order
pub const SELECT_TABLE_COLUMNS: &str = const_format::formatcp!(
    "SELECT {} FROM information_schema.columns \
     WHERE table_schema = $1 AND table_name = $2 \
     ORDER BY ordinal_position",
    COLUMN_FIELDS
);

/// Schema used when a table name is not qualified
pub const DEFAULT_TABLE_SCHEMA: &str = "public";
