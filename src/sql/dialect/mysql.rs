//! MySQL dialect.

use super::helpers;
use super::{DbDialect, MD5_SUBSTR_START};

/// MySQL dialect.
#[derive(Debug, Clone, Copy)]
pub struct MySql;

impl DbDialect for MySql {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn quote(&self, ident: &str) -> String {
        helpers::quote_backtick(ident)
    }

    /// `conv(..., 16, 10)` parses the trailing hex digits in base 16; the
    /// unsigned cast keeps SUM exact (it promotes to DECIMAL).
    fn md5_to_int(&self, expr: &str) -> String {
        format!("cast(conv(substring(md5({expr}), {MD5_SUBSTR_START}), 16, 10) as unsigned)")
    }

    fn to_text(&self, expr: &str) -> String {
        format!("cast({expr} as char)")
    }
}
