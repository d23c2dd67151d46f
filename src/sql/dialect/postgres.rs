//! PostgreSQL dialect.
//!
//! PostgreSQL has a native `md5()` returning hex text; the fold slices off
//! the leading 17 hex digits, reinterprets the remainder as a bit string and
//! casts it to `bigint`, which is guaranteed non-negative at 60 bits.

use super::helpers;
use super::{DbDialect, CHECKSUM_BITSIZE, MD5_SUBSTR_START};

/// PostgreSQL dialect.
#[derive(Debug, Clone, Copy)]
pub struct Postgres;

impl DbDialect for Postgres {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn quote(&self, ident: &str) -> String {
        helpers::quote_double(ident)
    }

    fn md5_to_int(&self, expr: &str) -> String {
        format!(
            "('x' || substring(md5({expr}), {MD5_SUBSTR_START}))::bit({CHECKSUM_BITSIZE})::bigint"
        )
    }

    fn to_text(&self, expr: &str) -> String {
        format!("{expr}::varchar")
    }
}
