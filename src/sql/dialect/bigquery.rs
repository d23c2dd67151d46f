//! Google BigQuery dialect.

use super::helpers;
use super::{DbDialect, MD5_SUBSTR_START};

/// BigQuery dialect.
#[derive(Debug, Clone, Copy)]
pub struct BigQuery;

impl DbDialect for BigQuery {
    fn name(&self) -> &'static str {
        "bigquery"
    }

    fn quote(&self, ident: &str) -> String {
        helpers::quote_backtick(ident)
    }

    /// BigQuery's `md5()` returns bytes; `TO_HEX` brings it back to the hex
    /// form the substring fold expects. The outer NUMERIC cast keeps SUM
    /// exact beyond 64 bits.
    fn md5_to_int(&self, expr: &str) -> String {
        format!(
            "cast(cast( ('0x' || substr(TO_HEX(md5({expr})), {MD5_SUBSTR_START})) as int64) as numeric)"
        )
    }
}
