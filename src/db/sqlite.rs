//! SQLite gateway.
//!
//! rusqlite is a blocking driver, so queries are shipped to a pool of
//! dedicated worker threads over a channel and answered through oneshot
//! replies. The pool size is caller-supplied (default 1); in-memory
//! databases always get a single worker, since each new connection to
//! `:memory:` would otherwise see its own empty database.
//!
//! SQLite has no `md5()`, and its built-in integer `sum()` aborts on
//! overflow while the float fallback drops exactly the low bits the
//! checksum lives in. Every connection therefore registers:
//!
//! - `md5_int(text)`: the 60-bit MD5 fold as a deterministic scalar
//! - `sum(x)`: replaced with a 128-bit accumulator returning decimal text

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use md5::{Digest, Md5};
use rusqlite::functions::{Aggregate, Context, FunctionFlags};
use rusqlite::types::ValueRef;
use rusqlite::Connection;
use tokio::sync::{mpsc, oneshot};

use super::{Database, Row};
use crate::error::{Error, Result};
use crate::sql::{Dialect, CHECKSUM_MASK};

struct Job {
    sql: String,
    reply: oneshot::Sender<Result<Vec<Row>>>,
}

/// Embedded SQLite gateway.
pub struct SqliteDb {
    tx: mpsc::UnboundedSender<Job>,
}

impl SqliteDb {
    /// Open a database file (or `:memory:`) with a pool of `worker_count`
    /// connection threads.
    pub fn open(path: &str, worker_count: usize) -> Result<Self> {
        let workers = if path == ":memory:" {
            1
        } else {
            worker_count.max(1)
        };

        let (tx, rx) = mpsc::unbounded_channel();
        let rx = Arc::new(Mutex::new(rx));

        for _ in 0..workers {
            let conn = open_connection(path)?;
            let rx = Arc::clone(&rx);
            std::thread::Builder::new()
                .name("rowdiff-sqlite".to_string())
                .spawn(move || worker_loop(conn, rx))
                .map_err(|e| Error::Connect(format!("cannot spawn sqlite worker: {e}")))?;
        }

        Ok(Self { tx })
    }
}

impl std::fmt::Debug for SqliteDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteDb").finish_non_exhaustive()
    }
}

#[async_trait]
impl Database for SqliteDb {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    async fn query_raw(&self, sql: &str) -> Result<Vec<Row>> {
        let (reply, response) = oneshot::channel();
        self.tx
            .send(Job {
                sql: sql.to_string(),
                reply,
            })
            .map_err(|_| Error::Query("sqlite worker pool has shut down".to_string()))?;
        response
            .await
            .map_err(|_| Error::Query("sqlite worker dropped the reply".to_string()))?
    }
}

fn open_connection(path: &str) -> Result<Connection> {
    let conn = if path == ":memory:" {
        Connection::open_in_memory()
    } else {
        Connection::open(path)
    }
    .map_err(|e| Error::Connect(format!("cannot open sqlite database {path:?}: {e}")))?;

    register_functions(&conn).map_err(|e| Error::Connect(format!("sqlite setup failed: {e}")))?;
    Ok(conn)
}

fn register_functions(conn: &Connection) -> rusqlite::Result<()> {
    let flags = FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC;

    conn.create_scalar_function("md5_int", 1, flags, |ctx| {
        match ctx.get_raw(0) {
            ValueRef::Null => Ok(None),
            value => {
                let text = value.as_str().map_err(|_| {
                    rusqlite::Error::UserFunctionError("md5_int expects text".into())
                })?;
                Ok(Some(fold_md5(text.as_bytes()) as i64))
            }
        }
    })?;

    // `mod()` is a compile-time option in SQLite; registering our own makes
    // checkpoint selection independent of how the library was built.
    conn.create_scalar_function("mod", 2, flags, |ctx| {
        let a = ctx.get::<i64>(0)?;
        let b = ctx.get::<i64>(1)?;
        if b == 0 {
            return Err(rusqlite::Error::UserFunctionError("mod by zero".into()));
        }
        Ok(a % b)
    })?;

    conn.create_aggregate_function("sum", 1, flags, WideSum)?;
    Ok(())
}

/// The low 60 bits of `md5(data)`, identical to what the SQL dialects
/// compute with substring folds.
pub(crate) fn fold_md5(data: &[u8]) -> u64 {
    let digest = Md5::digest(data);
    let mut tail = [0u8; 8];
    tail.copy_from_slice(&digest[8..16]);
    u64::from_be_bytes(tail) & CHECKSUM_MASK
}

/// Replacement `sum()` accumulating in 128 bits and returning decimal text.
struct WideSum;

impl Aggregate<(i128, bool), Option<String>> for WideSum {
    fn init(&self, _ctx: &mut Context<'_>) -> rusqlite::Result<(i128, bool)> {
        Ok((0, false))
    }

    fn step(&self, ctx: &mut Context<'_>, acc: &mut (i128, bool)) -> rusqlite::Result<()> {
        match ctx.get_raw(0) {
            ValueRef::Null => Ok(()),
            ValueRef::Integer(n) => {
                acc.0 += i128::from(n);
                acc.1 = true;
                Ok(())
            }
            _ => Err(rusqlite::Error::UserFunctionError(
                "sum expects integers".into(),
            )),
        }
    }

    fn finalize(
        &self,
        _ctx: &mut Context<'_>,
        acc: Option<(i128, bool)>,
    ) -> rusqlite::Result<Option<String>> {
        Ok(match acc {
            Some((total, true)) => Some(total.to_string()),
            _ => None,
        })
    }
}

fn worker_loop(conn: Connection, rx: Arc<Mutex<mpsc::UnboundedReceiver<Job>>>) {
    loop {
        let job = {
            let mut rx = rx.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            rx.blocking_recv()
        };
        let Some(job) = job else {
            break;
        };
        let result = run_query(&conn, &job.sql);
        // A dropped receiver means the diff was cancelled mid-query.
        let _ = job.reply.send(result);
    }
}

fn run_query(conn: &Connection, sql: &str) -> Result<Vec<Row>> {
    let mut stmt = conn
        .prepare(sql)
        .map_err(|e| Error::Query(format!("sqlite: {e}")))?;
    let columns = stmt.column_count();

    let mut rows = stmt
        .query([])
        .map_err(|e| Error::Query(format!("sqlite: {e}")))?;

    let mut out = Vec::new();
    while let Some(row) = rows.next().map_err(|e| Error::Query(format!("sqlite: {e}")))? {
        let mut cells = Vec::with_capacity(columns);
        for i in 0..columns {
            let value = row
                .get_ref(i)
                .map_err(|e| Error::Query(format!("sqlite: {e}")))?;
            cells.push(value_ref_to_text(value));
        }
        out.push(cells);
    }
    Ok(out)
}

fn value_ref_to_text(value: ValueRef<'_>) -> Option<String> {
    match value {
        ValueRef::Null => None,
        ValueRef::Integer(n) => Some(n.to_string()),
        ValueRef::Real(f) => Some(f.to_string()),
        ValueRef::Text(t) | ValueRef::Blob(t) => Some(String::from_utf8_lossy(t).into_owned()),
    }
}
