//! Connection URI dispatch.
//!
//! Maps a `scheme://...` descriptor to a live gateway. The thread count
//! bounds driver-side parallelism for drivers that need it: the SQLite
//! worker pool and the MySQL connection pool. The PostgreSQL client
//! pipelines concurrent queries over one connection on its own.

use std::sync::Arc;

use url::Url;

use super::{Database, MySqlDb, PostgresDb, SqliteDb};
use crate::error::{Error, Result};
use crate::sql::Dialect;

/// Connect to a database URI.
///
/// Supported schemes: `postgres://` / `postgresql://`, `redshift://`,
/// `mysql://`, and `sqlite://<path>` (with `:memory:` as a path).
pub async fn connect_to_uri(uri: &str, thread_count: usize) -> Result<Arc<dyn Database>> {
    if let Some(path) = uri.strip_prefix("sqlite://") {
        return Ok(Arc::new(SqliteDb::open(path, thread_count)?));
    }

    let parsed =
        Url::parse(uri).map_err(|e| Error::Config(format!("invalid database uri {uri:?}: {e}")))?;

    match parsed.scheme() {
        "postgres" | "postgresql" => {
            let config = parse_pg_config(uri)?;
            Ok(Arc::new(PostgresDb::connect(config, Dialect::Postgres).await?))
        }
        "redshift" => {
            // Redshift speaks the PostgreSQL wire protocol.
            let rewritten = format!("postgresql{}", &uri["redshift".len()..]);
            let config = parse_pg_config(&rewritten)?;
            Ok(Arc::new(PostgresDb::connect(config, Dialect::Redshift).await?))
        }
        "mysql" => Ok(Arc::new(MySqlDb::connect(uri, thread_count).await?)),
        scheme => Err(Error::Config(format!(
            "unsupported database scheme {scheme:?}"
        ))),
    }
}

fn parse_pg_config(uri: &str) -> Result<tokio_postgres::Config> {
    uri.parse()
        .map_err(|e| Error::Config(format!("invalid postgres uri: {e}")))
}
