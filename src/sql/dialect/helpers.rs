//! Shared helper functions for SQL dialect implementations.
//!
//! Dialects compose these building blocks to implement [`super::DbDialect`]
//! with minimal duplication.

/// Quote identifier with double quotes (ANSI style).
/// Used by: Postgres, Redshift, SQLite
pub fn quote_double(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Quote identifier with backticks.
/// Used by: MySQL, BigQuery
pub fn quote_backtick(ident: &str) -> String {
    format!("`{}`", ident.replace('`', "``"))
}

/// Quote identifier with square brackets.
/// Used by: SQL Server
pub fn quote_bracket(ident: &str) -> String {
    format!("[{}]", ident.replace(']', "]]"))
}

/// Quote a string literal with single quotes (standard SQL).
pub fn quote_string_single(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}
