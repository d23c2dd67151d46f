//! MySQL gateway.
//!
//! Built on `mysql_async`. The pool's connection count is bounded by the
//! caller-supplied thread count, so per-level query fan-out never opens
//! more sessions than the caller budgeted for.

use async_trait::async_trait;
use mysql_async::prelude::Queryable;
use mysql_async::{Opts, OptsBuilder, Pool, PoolConstraints, PoolOpts, Value};

use super::{Database, Row};
use crate::error::{Error, Result};
use crate::sql::Dialect;

/// MySQL gateway.
pub struct MySqlDb {
    pool: Pool,
}

impl MySqlDb {
    /// Connect, verifying the credentials with an eager session.
    pub async fn connect(url: &str, connection_count: usize) -> Result<Self> {
        let opts = Opts::from_url(url)
            .map_err(|e| Error::Config(format!("invalid mysql uri: {e}")))?;

        let constraints = PoolConstraints::new(1, connection_count.max(1))
            .ok_or_else(|| Error::Config("invalid mysql pool bounds".to_string()))?;
        let opts = OptsBuilder::from_opts(opts)
            .pool_opts(PoolOpts::default().with_constraints(constraints));

        let pool = Pool::new(opts);
        pool.get_conn()
            .await
            .map_err(|e| Error::Connect(e.to_string()))?;

        Ok(Self { pool })
    }
}

impl std::fmt::Debug for MySqlDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MySqlDb").finish_non_exhaustive()
    }
}

#[async_trait]
impl Database for MySqlDb {
    fn dialect(&self) -> Dialect {
        Dialect::MySql
    }

    async fn query_raw(&self, sql: &str) -> Result<Vec<Row>> {
        let mut conn = self
            .pool
            .get_conn()
            .await
            .map_err(|e| Error::Query(e.to_string()))?;

        let rows: Vec<mysql_async::Row> = conn
            .query(sql)
            .await
            .map_err(|e| Error::Query(e.to_string()))?;

        rows.into_iter()
            .map(|row| {
                (0..row.len())
                    .map(|i| {
                        row.as_ref(i)
                            .map(value_to_text)
                            .ok_or_else(|| Error::Query(format!("missing column {i}")))
                    })
                    .collect()
            })
            .collect()
    }
}

/// Render a driver value in the same textual form the server's own text
/// casts use.
fn value_to_text(value: &Value) -> Option<String> {
    match value {
        Value::NULL => None,
        Value::Bytes(bytes) => Some(String::from_utf8_lossy(bytes).into_owned()),
        Value::Int(n) => Some(n.to_string()),
        Value::UInt(n) => Some(n.to_string()),
        Value::Float(f) => Some(f.to_string()),
        Value::Double(f) => Some(f.to_string()),
        Value::Date(y, mo, d, 0, 0, 0, 0) => Some(format!("{y:04}-{mo:02}-{d:02}")),
        Value::Date(y, mo, d, h, mi, s, 0) => {
            Some(format!("{y:04}-{mo:02}-{d:02} {h:02}:{mi:02}:{s:02}"))
        }
        Value::Date(y, mo, d, h, mi, s, us) => {
            Some(format!("{y:04}-{mo:02}-{d:02} {h:02}:{mi:02}:{s:02}.{us:06}"))
        }
        Value::Time(neg, d, h, mi, s, us) => {
            let sign = if *neg { "-" } else { "" };
            let hours = u32::from(*h) + d * 24;
            if *us == 0 {
                Some(format!("{sign}{hours:02}:{mi:02}:{s:02}"))
            } else {
                Some(format!("{sign}{hours:02}:{mi:02}:{s:02}.{us:06}"))
            }
        }
    }
}
