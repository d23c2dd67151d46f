//! Snowflake dialect.
//!
//! Snowflake resolves unquoted identifiers case-insensitively, so `quote`
//! is the identity. `md5_number_lower64` hands back the digest tail as a
//! number directly; masking trims it to the shared 60 bits.

use super::{DbDialect, CHECKSUM_MASK};

/// Snowflake dialect.
#[derive(Debug, Clone, Copy)]
pub struct Snowflake;

impl DbDialect for Snowflake {
    fn name(&self) -> &'static str {
        "snowflake"
    }

    fn quote(&self, ident: &str) -> String {
        ident.to_string()
    }

    fn md5_to_int(&self, expr: &str) -> String {
        format!("BITAND(md5_number_lower64({expr}), {CHECKSUM_MASK})")
    }
}
