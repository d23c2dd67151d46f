//! PostgreSQL gateway.
//!
//! Built on `tokio-postgres` using the simple-query protocol, which
//! returns every cell as text - the normalization the engine wants anyway.
//! One client serves all tasks; the driver pipelines concurrent queries
//! over the single connection. The Redshift dialect rides the same wire
//! protocol, so this gateway serves both.

use async_trait::async_trait;
use tokio_postgres::{Config, NoTls, SimpleQueryMessage};

use super::{Database, Row};
use crate::error::{Error, Result};
use crate::sql::Dialect;

/// PostgreSQL (or Redshift) gateway.
pub struct PostgresDb {
    client: tokio_postgres::Client,
    dialect: Dialect,
}

impl PostgresDb {
    /// Connect and spawn the connection driver task.
    pub async fn connect(config: Config, dialect: Dialect) -> Result<Self> {
        let (client, connection) = config
            .connect(NoTls)
            .await
            .map_err(|e| Error::Connect(format_pg_error(&e)))?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::warn!(error = %e, "postgres connection task ended");
            }
        });

        Ok(Self { client, dialect })
    }
}

impl std::fmt::Debug for PostgresDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresDb")
            .field("dialect", &self.dialect)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Database for PostgresDb {
    fn dialect(&self) -> Dialect {
        self.dialect
    }

    async fn query_raw(&self, sql: &str) -> Result<Vec<Row>> {
        let messages = self
            .client
            .simple_query(sql)
            .await
            .map_err(|e| Error::Query(format_pg_error(&e)))?;

        let mut rows = Vec::new();
        for message in messages {
            if let SimpleQueryMessage::Row(row) = message {
                rows.push(
                    (0..row.len())
                        .map(|i| row.get(i).map(str::to_string))
                        .collect(),
                );
            }
        }
        Ok(rows)
    }
}

fn format_pg_error(error: &tokio_postgres::Error) -> String {
    match error.as_db_error() {
        Some(db_error) => format!("{} (code: {})", db_error.message(), db_error.code().code()),
        None => error.to_string(),
    }
}
