//! The bisecting table differ.
//!
//! Compares two [`TableSegment`]s by checksum and recursively bisects over
//! mutually confirmed checkpoint keys until both sides of a differing
//! range fall below the bisection threshold, at which point the rows are
//! downloaded and set-diffed locally.
//!
//! Identical checksums prune a subtree without descending; every level
//! issues its count/checksum probes for all sibling pairs concurrently,
//! and differing siblings recurse concurrently as well. The only
//! suspension points are the gateway queries themselves.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use futures::future::{try_join_all, BoxFuture, FutureExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::db::Row;
use crate::error::{Error, Result};
use crate::segment::TableSegment;
use crate::sql::DbKey;

const DIFF_CHANNEL_CAPACITY: usize = 256;

/// Which side of the diff a row belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Sign {
    /// Present in side 1 only.
    Plus,
    /// Present in side 2 only.
    Minus,
}

impl std::fmt::Display for Sign {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Sign::Plus => write!(f, "+"),
            Sign::Minus => write!(f, "-"),
        }
    }
}

/// One diff item: the sign and the relevant-column row tuple.
pub type DiffEntry = (Sign, Row);

/// A lazily produced sequence of diff entries.
///
/// Backed by a channel fed from a spawned engine task. The first error
/// item terminates the sequence; dropping the stream cancels the engine
/// task and its outstanding queries best-effort.
#[derive(Debug)]
pub struct DiffStream {
    rx: mpsc::Receiver<Result<DiffEntry>>,
    task: Option<JoinHandle<()>>,
}

impl DiffStream {
    fn empty() -> Self {
        let (_, rx) = mpsc::channel(1);
        Self { rx, task: None }
    }

    /// The next diff entry, or `None` when the diff is complete.
    pub async fn next(&mut self) -> Option<Result<DiffEntry>> {
        self.rx.recv().await
    }

    /// Drain the stream into a vector, propagating the first error.
    pub async fn collect(mut self) -> Result<Vec<DiffEntry>> {
        let mut entries = Vec::new();
        while let Some(item) = self.next().await {
            entries.push(item?);
        }
        Ok(entries)
    }
}

impl Drop for DiffStream {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Finds the diff between two tables.
///
/// Checksums decide quickly whether a key range differs at all; bisection
/// over mutual checkpoints narrows differing ranges until they are small
/// enough to compare locally. Works best when the tables are mostly the
/// same, with a small fraction of discrepancies.
#[derive(Debug, Clone)]
pub struct TableDiffer {
    /// Target number of child segments per split level.
    pub bisection_factor: usize,
    /// Row count below which both sides are downloaded and compared
    /// locally.
    pub bisection_threshold: u64,
    /// Verify at every level that child counts sum to the parent count.
    /// Costs an extra count query per child.
    pub debug: bool,
}

impl Default for TableDiffer {
    fn default() -> Self {
        Self {
            bisection_factor: 32,
            bisection_threshold: 1024 * 1024,
            debug: false,
        }
    }
}

impl TableDiffer {
    /// Diff two segments, streaming `(sign, row)` pairs.
    ///
    /// `(Sign::Plus, row)` means the row is present in `table1` only,
    /// `(Sign::Minus, row)` present in `table2` only. An updated row
    /// surfaces as one of each: same key, different tuples.
    pub async fn diff_tables(
        &self,
        table1: Arc<TableSegment>,
        table2: Arc<TableSegment>,
    ) -> Result<DiffStream> {
        if self.bisection_factor as u64 >= self.bisection_threshold {
            return Err(Error::Config(
                "bisection factor must be below the bisection threshold".to_string(),
            ));
        }
        if self.bisection_factor < 2 {
            return Err(Error::Config(
                "bisection requires at least two segments per level".to_string(),
            ));
        }

        let (count1, count2) = tokio::try_join!(table1.count(), table2.count())?;
        info!(
            rows1 = count1,
            rows2 = count2,
            factor = self.bisection_factor,
            threshold = self.bisection_threshold,
            "diffing tables"
        );

        let (checksum1, checksum2) = tokio::try_join!(table1.checksum(), table2.checksum())?;
        if checksum1 == checksum2 {
            return Ok(DiffStream::empty());
        }

        let differ = self.clone();
        let (tx, rx) = mpsc::channel(DIFF_CHANNEL_CAPACITY);
        let task = tokio::spawn(async move {
            if let Err(error) = differ.diff_segments(table1, table2, 0, &tx).await {
                let _ = tx.send(Err(error)).await;
            }
        });

        Ok(DiffStream {
            rx,
            task: Some(task),
        })
    }

    fn diff_segments<'a>(
        &'a self,
        table1: Arc<TableSegment>,
        table2: Arc<TableSegment>,
        level: usize,
        tx: &'a mpsc::Sender<Result<DiffEntry>>,
    ) -> BoxFuture<'a, Result<()>> {
        async move {
            let (count1, count2) = tokio::try_join!(table1.count(), table2.count())?;

            // Below the threshold, bisection is slower than just comparing
            // the rows locally.
            if count1 < self.bisection_threshold && count2 < self.bisection_threshold {
                let (rows1, rows2) = tokio::try_join!(table1.get_values(), table2.get_values())?;
                let diff = diff_sets(rows1, rows2);
                info!(level, rows = diff.len(), "compared segment pair locally");
                for entry in diff {
                    if tx.send(Ok(entry)).await.is_err() {
                        // Receiver is gone; the consumer stopped early.
                        return Ok(());
                    }
                }
                return Ok(());
            }

            let candidates = table1.choose_checkpoints(self.bisection_factor - 1).await?;
            if candidates.is_empty() {
                return Err(Error::Consistency(
                    "checkpoint selection returned no keys".to_string(),
                ));
            }

            let confirmed = table2.find_checkpoints(&candidates).await?;
            // Duplicates and a checkpoint equal to the segment's own start
            // would both produce empty child ranges.
            let mutual: Vec<DbKey> = confirmed
                .into_iter()
                .collect::<BTreeSet<_>>()
                .into_iter()
                .filter(|key| table1.start() != Some(key))
                .collect();
            debug!(
                level,
                proposed = candidates.len(),
                mutual = mutual.len(),
                "confirmed mutual checkpoints"
            );
            if mutual.is_empty() {
                return Err(Error::Divergence);
            }

            let segments1: Vec<Arc<TableSegment>> = table1
                .segment_by_checkpoints(&mutual)?
                .into_iter()
                .map(Arc::new)
                .collect();
            let segments2: Vec<Arc<TableSegment>> = table2
                .segment_by_checkpoints(&mutual)?
                .into_iter()
                .map(Arc::new)
                .collect();
            debug_assert_eq!(segments1.len(), segments2.len());

            if self.debug {
                self.check_additivity(&segments1, count1, 1).await?;
                self.check_additivity(&segments2, count2, 2).await?;
            }

            let pairs: Vec<_> = segments1.into_iter().zip(segments2).collect();
            let checksums = try_join_all(pairs.iter().map(|(seg1, seg2)| async move {
                tokio::try_join!(seg1.checksum(), seg2.checksum())
            }))
            .await?;

            let differing: Vec<_> = pairs
                .into_iter()
                .zip(checksums)
                .filter(|(_, (c1, c2))| c1 != c2)
                .map(|(pair, _)| pair)
                .collect();
            info!(level, differing = differing.len(), "descending into differing segments");

            try_join_all(
                differing
                    .into_iter()
                    .map(|(seg1, seg2)| self.diff_segments(seg1, seg2, level + 1, tx)),
            )
            .await?;
            Ok(())
        }
        .boxed()
    }

    async fn check_additivity(
        &self,
        children: &[Arc<TableSegment>],
        parent_count: u64,
        side: usize,
    ) -> Result<()> {
        let counts = try_join_all(children.iter().map(|child| child.count())).await?;
        let total: u64 = counts.iter().sum();
        if total != parent_count {
            return Err(Error::Consistency(format!(
                "side {side}: child segments sum to {total} rows, parent has {parent_count}"
            )));
        }
        Ok(())
    }
}

/// Symmetric difference over two row sets. Duplicate rows within one side
/// collapse; output order is unspecified.
fn diff_sets(rows1: Vec<Row>, rows2: Vec<Row>) -> Vec<DiffEntry> {
    let set1: HashSet<Row> = rows1.into_iter().collect();
    let set2: HashSet<Row> = rows2.into_iter().collect();

    let mut diff = Vec::new();
    for row in set1.difference(&set2) {
        diff.push((Sign::Plus, row.clone()));
    }
    for row in set2.difference(&set1) {
        diff.push((Sign::Minus, row.clone()));
    }
    diff
}
