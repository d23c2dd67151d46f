//! Microsoft SQL Server dialect.

use super::helpers;
use super::{DbDialect, CHECKSUM_MASK};

/// SQL Server dialect.
#[derive(Debug, Clone, Copy)]
pub struct MsSql;

impl DbDialect for MsSql {
    fn name(&self) -> &'static str {
        "mssql"
    }

    fn quote(&self, ident: &str) -> String {
        helpers::quote_bracket(ident)
    }

    /// `HashBytes` yields the raw digest; reinterpreting its tail as
    /// `bigint` gives a signed 64-bit value, so the 60-bit mask is required
    /// to line up with the other dialects.
    fn md5_to_int(&self, expr: &str) -> String {
        format!(
            "CONVERT(decimal(38,0), CONVERT(bigint, HashBytes('MD5', {expr}), 2) & {CHECKSUM_MASK})"
        )
    }

    fn to_text(&self, expr: &str) -> String {
        format!("CONVERT(varchar, {expr})")
    }
}
