//! Database gateways.
//!
//! A gateway compiles expressions for its dialect, runs the SQL, and
//! decodes results. Implementations must be safe to query concurrently
//! from multiple tasks; drivers whose connections are not multiplexed
//! serialize through a bounded worker pool instead.
//!
//! Every result cell is normalized to its text form. That is deliberate:
//! the row checksum concatenates the *text cast* of each column on the
//! server, so textual equality of downloaded rows is exactly the equality
//! the checksum certifies. Checksums themselves decode as `u128`, since a
//! sum of 60-bit terms can exceed 64 bits long before it exceeds any
//! server-side decimal.

pub mod connect;
pub mod mysql;
pub mod postgres;
pub mod sqlite;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::sql::{Compiler, DbKey, Dialect, Expr};

pub use connect::connect_to_uri;
pub use mysql::MySqlDb;
pub use postgres::PostgresDb;
pub use sqlite::SqliteDb;

/// One result row: column values in order, `None` for SQL NULL.
pub type Row = Vec<Option<String>>;

/// A live connection to one database.
///
/// `query_raw` is the single required operation; the typed helpers compile
/// an expression, log it, execute, and decode one of the three result
/// shapes the engine consumes.
#[async_trait]
pub trait Database: std::fmt::Debug + Send + Sync {
    /// The SQL dialect this gateway compiles for.
    fn dialect(&self) -> Dialect;

    /// Execute a SQL string and return all rows with text-normalized cells.
    async fn query_raw(&self, sql: &str) -> Result<Vec<Row>>;

    /// Compile and execute an expression.
    async fn query(&self, expr: &Expr) -> Result<Vec<Row>> {
        let sql = Compiler::new(self.dialect()).compile(expr);
        tracing::debug!(dialect = %self.dialect(), %sql, "running query");
        self.query_raw(&sql).await
    }

    /// Expect a single row with a single column; `None` for a NULL cell.
    async fn query_one_int(&self, expr: &Expr) -> Result<Option<u128>> {
        let rows = self.query(expr).await?;
        let row = one(rows, "a single row")?;
        let cell = one(row, "a single column")?;
        match cell {
            None => Ok(None),
            Some(text) => text
                .trim()
                .parse::<u128>()
                .map(Some)
                .map_err(|_| Error::Query(format!("expected a non-negative integer, got {text:?}"))),
        }
    }

    /// Expect one-column rows of key scalars.
    async fn query_keys(&self, expr: &Expr) -> Result<Vec<DbKey>> {
        let rows = self.query(expr).await?;
        rows.into_iter()
            .map(|row| {
                let cell = one(row, "a single column")?;
                match cell {
                    Some(text) => Ok(DbKey::parse(&text)),
                    None => Err(Error::Query("key column returned NULL".to_string())),
                }
            })
            .collect()
    }

    /// Expect rows of tuples, columns preserved in order.
    async fn query_rows(&self, expr: &Expr) -> Result<Vec<Row>> {
        self.query(expr).await
    }
}

fn one<T>(mut items: Vec<T>, expected: &str) -> Result<T> {
    if items.len() == 1 {
        Ok(items.remove(0))
    } else {
        Err(Error::Query(format!(
            "expected {expected}, got {}",
            items.len()
        )))
    }
}
