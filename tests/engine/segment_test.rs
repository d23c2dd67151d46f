//! Segment behavior against a real (embedded) database.

use std::sync::Arc;

use rowdiff::db::SqliteDb;
use rowdiff::{Database, DbKey, Error, TableSegment};

async fn open_db() -> Arc<dyn Database> {
    Arc::new(SqliteDb::open(":memory:", 1).unwrap())
}

async fn exec(db: &Arc<dyn Database>, sql: &str) {
    db.query_raw(sql).await.unwrap();
}

/// Create table `t (id, value)` and fill it with ids `1..=rows`,
/// `value = "v<id>"`.
async fn seed(db: &Arc<dyn Database>, rows: i64) {
    exec(db, "CREATE TABLE t (id INTEGER PRIMARY KEY, value TEXT)").await;
    let mut id = 1;
    while id <= rows {
        let chunk_end = (id + 399).min(rows);
        let tuples: Vec<String> = (id..=chunk_end).map(|i| format!("({i}, 'v{i}')")).collect();
        exec(db, &format!("INSERT INTO t VALUES {}", tuples.join(", "))).await;
        id = chunk_end + 1;
    }
}

fn segment(db: &Arc<dyn Database>) -> TableSegment {
    TableSegment::new(
        Arc::clone(db),
        vec!["t".to_string()],
        "id",
        &["value".to_string()],
    )
}

#[tokio::test]
async fn count_covers_the_whole_table_without_bounds() {
    let db = open_db().await;
    seed(&db, 10).await;
    assert_eq!(segment(&db).count().await.unwrap(), 10);
}

#[tokio::test]
async fn count_respects_the_half_open_range() {
    let db = open_db().await;
    seed(&db, 10).await;
    let root = segment(&db);

    let mid = root
        .with_range(Some(DbKey::Int(3)), Some(DbKey::Int(7)))
        .unwrap();
    assert_eq!(mid.count().await.unwrap(), 4); // 3, 4, 5, 6

    let head = root.with_range(None, Some(DbKey::Int(4))).unwrap();
    assert_eq!(head.count().await.unwrap(), 3); // 1, 2, 3

    let tail = root.with_range(Some(DbKey::Int(8)), None).unwrap();
    assert_eq!(tail.count().await.unwrap(), 3); // 8, 9, 10
}

#[tokio::test]
async fn with_range_rejects_inverted_and_empty_ranges() {
    let db = open_db().await;
    seed(&db, 10).await;
    let root = segment(&db);

    let err = root
        .with_range(Some(DbKey::Int(7)), Some(DbKey::Int(3)))
        .unwrap_err();
    assert!(matches!(err, Error::Config(_)), "{err}");
    assert!(root
        .with_range(Some(DbKey::Int(3)), Some(DbKey::Int(3)))
        .is_err());
}

#[tokio::test]
async fn checksum_is_stable_across_calls_and_instances() {
    let db = open_db().await;
    seed(&db, 50).await;

    let seg = segment(&db);
    let first = seg.checksum().await.unwrap();
    let second = seg.checksum().await.unwrap();
    assert_eq!(first, second);

    // A fresh segment over the same rows recomputes to the same value.
    let again = segment(&db).checksum().await.unwrap();
    assert_eq!(first, again);
}

#[tokio::test]
async fn checksum_matches_across_databases_with_identical_rows() {
    let db1 = open_db().await;
    let db2 = open_db().await;
    seed(&db1, 80).await;
    seed(&db2, 80).await;

    let c1 = segment(&db1).checksum().await.unwrap();
    let c2 = segment(&db2).checksum().await.unwrap();
    assert_eq!(c1, c2);

    exec(&db2, "UPDATE t SET value = 'vX' WHERE id = 40").await;
    let changed = segment(&db2).checksum().await.unwrap();
    assert_ne!(c1, changed);
}

#[tokio::test]
async fn empty_table_counts_and_checksums_to_zero() {
    let db = open_db().await;
    exec(&db, "CREATE TABLE t (id INTEGER PRIMARY KEY, value TEXT)").await;

    let seg = segment(&db);
    assert_eq!(seg.count().await.unwrap(), 0);
    assert_eq!(seg.checksum().await.unwrap(), 0);
}

#[tokio::test]
async fn counts_and_checksums_are_additive_over_a_partition() {
    let db = open_db().await;
    seed(&db, 50).await;
    let root = segment(&db);

    let children = root
        .segment_by_checkpoints(&[DbKey::Int(20), DbKey::Int(40)])
        .unwrap();
    assert_eq!(children.len(), 3);

    let mut count_sum = 0;
    let mut checksum_sum: u128 = 0;
    for child in &children {
        count_sum += child.count().await.unwrap();
        checksum_sum += child.checksum().await.unwrap();
    }
    assert_eq!(count_sum, root.count().await.unwrap());
    assert_eq!(checksum_sum, root.checksum().await.unwrap());
}

#[tokio::test]
async fn segment_by_checkpoints_inherits_the_parent_bounds() {
    let db = open_db().await;
    seed(&db, 100).await;
    let root = segment(&db);

    let children = root
        .segment_by_checkpoints(&[DbKey::Int(40), DbKey::Int(10)])
        .unwrap();
    // Checkpoints are sorted before splitting.
    assert_eq!(children[0].start(), None);
    assert_eq!(children[0].end(), Some(&DbKey::Int(10)));
    assert_eq!(children[1].start(), Some(&DbKey::Int(10)));
    assert_eq!(children[1].end(), Some(&DbKey::Int(40)));
    assert_eq!(children[2].start(), Some(&DbKey::Int(40)));
    assert_eq!(children[2].end(), None);

    let bounded = root
        .with_range(Some(DbKey::Int(10)), Some(DbKey::Int(90)))
        .unwrap();
    let children = bounded
        .segment_by_checkpoints(&[DbKey::Int(30), DbKey::Int(60)])
        .unwrap();
    assert_eq!(children[0].start(), Some(&DbKey::Int(10)));
    assert_eq!(children[2].end(), Some(&DbKey::Int(90)));
}

#[tokio::test]
async fn choose_checkpoints_are_evenly_spaced() {
    let db = open_db().await;
    seed(&db, 100).await;

    // ratio = 100 / 4 = 25; ids are consecutive so keys land on multiples.
    let checkpoints = segment(&db).choose_checkpoints(4).await.unwrap();
    assert_eq!(
        checkpoints,
        vec![
            DbKey::Int(25),
            DbKey::Int(50),
            DbKey::Int(75),
            DbKey::Int(100)
        ]
    );
}

#[tokio::test]
async fn choose_checkpoints_within_a_bounded_segment() {
    let db = open_db().await;
    seed(&db, 100).await;

    let bounded = segment(&db)
        .with_range(Some(DbKey::Int(11)), Some(DbKey::Int(61)))
        .unwrap();
    assert_eq!(bounded.count().await.unwrap(), 50);

    // ratio = 50 / 4 = 12; the enumeration spans the whole table and the
    // range predicate filters it, so every key is a multiple of 12 that
    // falls inside [11, 61).
    let checkpoints = bounded.choose_checkpoints(4).await.unwrap();
    assert_eq!(
        checkpoints,
        vec![
            DbKey::Int(12),
            DbKey::Int(24),
            DbKey::Int(36),
            DbKey::Int(48),
            DbKey::Int(60)
        ]
    );
}

#[tokio::test]
async fn choose_checkpoints_needs_enough_rows() {
    let db = open_db().await;
    seed(&db, 5).await;

    let err = segment(&db).choose_checkpoints(4).await.unwrap_err();
    assert!(matches!(err, Error::Consistency(_)), "{err}");
}

#[tokio::test]
async fn find_checkpoints_keeps_only_existing_keys() {
    let db = open_db().await;
    seed(&db, 60).await;
    let root = segment(&db);

    let candidates = vec![DbKey::Int(5), DbKey::Int(50), DbKey::Int(999)];
    assert_eq!(
        root.find_checkpoints(&candidates).await.unwrap(),
        vec![DbKey::Int(5), DbKey::Int(50)]
    );

    // The segment's own range applies on top of the IN filter.
    let bounded = root.with_range(Some(DbKey::Int(10)), None).unwrap();
    assert_eq!(
        bounded.find_checkpoints(&candidates).await.unwrap(),
        vec![DbKey::Int(50)]
    );
}

#[tokio::test]
async fn rebuilding_a_segment_resets_caches_but_not_values() {
    let db = open_db().await;
    seed(&db, 30).await;
    let root = segment(&db);

    let seg = root
        .with_range(Some(DbKey::Int(5)), Some(DbKey::Int(25)))
        .unwrap();
    let count = seg.count().await.unwrap();
    let checksum = seg.checksum().await.unwrap();

    // A structurally identical rebuild must re-derive the same values.
    let rebuilt = root
        .with_range(Some(DbKey::Int(5)), Some(DbKey::Int(25)))
        .unwrap();
    assert_eq!(rebuilt.count().await.unwrap(), count);
    assert_eq!(rebuilt.checksum().await.unwrap(), checksum);
}

#[tokio::test]
async fn get_values_returns_relevant_columns_in_order() {
    let db = open_db().await;
    seed(&db, 3).await;

    let rows = segment(&db).get_values().await.unwrap();
    assert_eq!(rows.len(), 3);
    assert!(rows.contains(&vec![Some("1".to_string()), Some("v1".to_string())]));
    assert!(rows.contains(&vec![Some("3".to_string()), Some("v3".to_string())]));
}

#[tokio::test]
async fn null_cells_survive_the_round_trip() {
    let db = open_db().await;
    exec(&db, "CREATE TABLE t (id INTEGER PRIMARY KEY, value TEXT)").await;
    exec(&db, "INSERT INTO t VALUES (1, NULL), (2, 'x')").await;

    let rows = segment(&db).get_values().await.unwrap();
    assert!(rows.contains(&vec![Some("1".to_string()), None]));
}
