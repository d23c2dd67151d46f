//! Amazon Redshift dialect.
//!
//! Speaks the PostgreSQL wire protocol but lacks `bit(n)` casts, so the
//! fold goes through `strtol` into a wide decimal instead.

use super::helpers;
use super::{DbDialect, MD5_SUBSTR_START};

/// Redshift dialect.
#[derive(Debug, Clone, Copy)]
pub struct Redshift;

impl DbDialect for Redshift {
    fn name(&self) -> &'static str {
        "redshift"
    }

    fn quote(&self, ident: &str) -> String {
        helpers::quote_double(ident)
    }

    fn md5_to_int(&self, expr: &str) -> String {
        format!("strtol(substring(md5({expr}), {MD5_SUBSTR_START}), 16)::decimal(38)")
    }

    fn to_text(&self, expr: &str) -> String {
        format!("{expr}::varchar")
    }
}
