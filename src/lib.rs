//! # rowdiff
//!
//! Efficiently find the row-level differences between two tables, possibly
//! on different database servers.
//!
//! Downloading both tables is infeasible at scale and per-row probing is
//! too slow, so the engine pushes checksum aggregates into each database
//! and bisects over the primary-key domain:
//!
//! ```text
//!  TableDiffer ──── drives ────▶ TableSegment (side 1)   TableSegment (side 2)
//!                                     │                        │
//!                                     ▼ [sql::ast]             ▼
//!                                expression tree          expression tree
//!                                     │                        │
//!                                     ▼ [sql::dialect]         ▼
//!                                SQL string               SQL string
//!                                     │                        │
//!                                     ▼ [db]                   ▼
//!                                gateway ◀──── results ──▶ gateway
//! ```
//!
//! Matching checksums prune a key range without downloading anything;
//! ranges that still differ below the bisection threshold are materialized
//! and set-diffed locally. Correctness rests on every dialect folding MD5
//! to the same 60 bits, so identical rows sum identically everywhere.

pub mod config;
pub mod db;
pub mod differ;
pub mod error;
pub mod segment;
pub mod sql;

pub use db::{connect_to_uri, Database, Row};
pub use differ::{DiffEntry, DiffStream, Sign, TableDiffer};
pub use error::{Error, Result};
pub use segment::TableSegment;
pub use sql::{Compiler, DbDialect, DbKey, DbPath, Dialect, Expr};
