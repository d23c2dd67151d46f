//! Table segments.
//!
//! A [`TableSegment`] is a half-open key range `[start, end)` over one
//! remote table, with on-demand `count` and `checksum`. Segments are
//! immutable: narrowing the range builds new segments via
//! [`TableSegment::with_range`], and the caches never carry over.
//!
//! `count` and `checksum` memoize into write-once cells, so concurrent
//! callers coalesce onto a single in-flight query and later callers read
//! the cached value.

use std::sync::Arc;

use tokio::sync::OnceCell;

use crate::db::{Database, Row};
use crate::error::{Error, Result};
use crate::sql::{CmpOp, DbKey, DbPath, Expr};

/// A half-open key range on a remote table.
#[derive(Debug)]
pub struct TableSegment {
    database: Arc<dyn Database>,
    table_path: DbPath,
    key_column: String,
    extra_columns: Vec<String>,
    start: Option<DbKey>,
    end: Option<DbKey>,
    count_cache: OnceCell<u64>,
    checksum_cache: OnceCell<u128>,
}

impl TableSegment {
    /// A segment covering the whole table.
    ///
    /// `extra_columns` order is significant: it fixes the concatenation
    /// order inside the checksum, so it must match on both sides of a diff.
    pub fn new(
        database: Arc<dyn Database>,
        table_path: DbPath,
        key_column: &str,
        extra_columns: &[String],
    ) -> Self {
        Self {
            database,
            table_path,
            key_column: key_column.to_string(),
            extra_columns: extra_columns.to_vec(),
            start: None,
            end: None,
            count_cache: OnceCell::new(),
            checksum_cache: OnceCell::new(),
        }
    }

    /// A structural copy with new bounds and cleared caches.
    ///
    /// `None` on either side leaves that side unbounded.
    pub fn with_range(&self, start: Option<DbKey>, end: Option<DbKey>) -> Result<Self> {
        if let (Some(s), Some(e)) = (&start, &end) {
            if s >= e {
                return Err(Error::Config(format!(
                    "segment start {s} does not precede end {e}"
                )));
            }
        }
        Ok(Self {
            database: Arc::clone(&self.database),
            table_path: self.table_path.clone(),
            key_column: self.key_column.clone(),
            extra_columns: self.extra_columns.clone(),
            start,
            end,
            count_cache: OnceCell::new(),
            checksum_cache: OnceCell::new(),
        })
    }

    pub fn start(&self) -> Option<&DbKey> {
        self.start.as_ref()
    }

    pub fn end(&self) -> Option<&DbKey> {
        self.end.as_ref()
    }

    pub fn key_column(&self) -> &str {
        &self.key_column
    }

    /// Key column first, then the extra columns in their fixed order.
    fn relevant_columns(&self) -> Vec<Expr> {
        std::iter::once(&self.key_column)
            .chain(self.extra_columns.iter())
            .map(Expr::raw)
            .collect()
    }

    /// `start <= key` and `key < end`, each side omitted when unbounded.
    fn range_predicates(&self) -> Vec<Expr> {
        let mut predicates = Vec::new();
        if let Some(start) = &self.start {
            predicates.push(Expr::compare(
                CmpOp::Le,
                Expr::Value(start.to_value()),
                Expr::raw(&self.key_column),
            ));
        }
        if let Some(end) = &self.end {
            predicates.push(Expr::compare(
                CmpOp::Lt,
                Expr::raw(&self.key_column),
                Expr::Value(end.to_value()),
            ));
        }
        predicates
    }

    fn make_select(
        &self,
        table: Option<Expr>,
        columns: Option<Vec<Expr>>,
        extra_where: Option<Expr>,
    ) -> Expr {
        let mut where_clauses = self.range_predicates();
        where_clauses.extend(extra_where);
        Expr::Select {
            columns: columns.unwrap_or_else(|| vec![Expr::raw(&self.key_column)]),
            table: Some(Box::new(
                table.unwrap_or_else(|| Expr::TableName(self.table_path.clone())),
            )),
            where_clauses,
            group_by: Vec::new(),
            order_by: Vec::new(),
        }
    }

    /// Number of rows in the segment (memoized).
    pub async fn count(&self) -> Result<u64> {
        self.count_cache
            .get_or_try_init(|| async {
                let select = self.make_select(None, Some(vec![Expr::Count(None)]), None);
                let count = self
                    .database
                    .query_one_int(&select)
                    .await?
                    .ok_or_else(|| Error::Query("count(*) returned NULL".to_string()))?;
                u64::try_from(count)
                    .map_err(|_| Error::Query(format!("count(*) out of range: {count}")))
            })
            .await
            .copied()
    }

    /// Folded-MD5 checksum over the relevant columns of every row in the
    /// segment (memoized). An empty segment checksums to 0.
    pub async fn checksum(&self) -> Result<u128> {
        self.checksum_cache
            .get_or_try_init(|| async {
                let select =
                    self.make_select(None, Some(vec![Expr::Checksum(self.relevant_columns())]), None);
                Ok(self.database.query_one_int(&select).await?.unwrap_or(0))
            })
            .await
            .copied()
    }

    /// Download every relevant-column row in the segment.
    pub async fn get_values(&self) -> Result<Vec<Row>> {
        let select = self.make_select(None, Some(self.relevant_columns()), None);
        self.database.query_rows(&select).await
    }

    /// Suggest `count` roughly evenly-spaced key values from the segment,
    /// in key order.
    pub async fn choose_checkpoints(&self, count: usize) -> Result<Vec<DbKey>> {
        let total = self.count().await?;
        let ratio = total / count as u64;
        if ratio <= 1 {
            return Err(Error::Consistency(format!(
                "segment of {total} rows cannot supply {count} checkpoints"
            )));
        }

        let enumerated = Expr::Enum {
            table: self.table_path.clone(),
            order_by: Box::new(Expr::raw(&self.key_column)),
        };
        let skip = Expr::raw(format!("mod(idx, {ratio}) = 0"));
        let select = self.make_select(Some(enumerated), None, Some(skip));
        self.database.query_keys(&select).await
    }

    /// Filter candidate checkpoints down to the keys that actually exist
    /// inside this segment.
    pub async fn find_checkpoints(&self, candidates: &[DbKey]) -> Result<Vec<DbKey>> {
        let list = candidates.iter().map(|k| Expr::Value(k.to_value())).collect();
        let filter = Expr::in_list(Expr::raw(&self.key_column), list);
        let select = self.make_select(None, None, Some(filter));
        self.database.query_keys(&select).await
    }

    /// Split the segment at the given checkpoints.
    ///
    /// Checkpoints are assumed to fall strictly inside `(start, end)` when
    /// both bounds are set. The first child inherits this segment's `start`
    /// and the last its `end`, so the children exactly tile the parent.
    pub fn segment_by_checkpoints(&self, checkpoints: &[DbKey]) -> Result<Vec<TableSegment>> {
        let mut sorted = checkpoints.to_vec();
        sorted.sort();

        if let (Some(start), Some(end)) = (&self.start, &self.end) {
            debug_assert!(
                sorted.iter().all(|c| start < c && c < end),
                "checkpoints must fall strictly inside the segment"
            );
        }

        let mut positions: Vec<Option<DbKey>> = Vec::with_capacity(sorted.len() + 2);
        positions.push(self.start.clone());
        positions.extend(sorted.into_iter().map(Some));
        positions.push(self.end.clone());

        positions
            .windows(2)
            .map(|pair| self.with_range(pair[0].clone(), pair[1].clone()))
            .collect()
    }
}
