//! SQLite dialect.
//!
//! SQLite ships neither `md5()` nor an overflow-proof integer SUM, so the
//! embedded gateway registers application-defined functions on every
//! connection (see `crate::db::sqlite`). This dialect emits calls to the
//! registered `md5_int`.

use super::helpers;
use super::DbDialect;

/// SQLite dialect.
#[derive(Debug, Clone, Copy)]
pub struct Sqlite;

impl DbDialect for Sqlite {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn quote(&self, ident: &str) -> String {
        helpers::quote_double(ident)
    }

    fn md5_to_int(&self, expr: &str) -> String {
        format!("md5_int({expr})")
    }

    fn to_text(&self, expr: &str) -> String {
        format!("cast({expr} as text)")
    }
}
