//! Expression AST and compiler.
//!
//! A small, closed set of relational expressions that lower to a SQL string
//! for a chosen [`Dialect`]. Every variant must be handled in
//! [`Compiler::compile`] - the compiler enforces this.
//!
//! [`Expr::Raw`] is the splice escape hatch: it is emitted verbatim, so it
//! must only ever carry known-safe material (validated column names,
//! numeric fragments). User-supplied values go through [`Expr::Value`].

use super::dialect::{DbDialect, Dialect};
use super::dialect::helpers;

/// A dotted identifier path addressing a remote table, e.g.
/// `["analytics", "events"]`.
///
/// The path is joined with `.` and quoted as a whole; components are not
/// quoted individually.
pub type DbPath = Vec<String>;

/// A primary-key scalar.
///
/// Keys must order identically on both databases. Integer keys are the
/// common case; text keys work as long as both sides collate `<`/`<=` the
/// same way. Each kind knows how it renders inside a range predicate:
/// integers as bare decimals, text single-quoted.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DbKey {
    Int(i64),
    Text(String),
}

impl DbKey {
    /// Parse a key scalar as it comes back from a gateway.
    pub fn parse(text: &str) -> DbKey {
        match text.trim().parse::<i64>() {
            Ok(n) => DbKey::Int(n),
            Err(_) => DbKey::Text(text.to_string()),
        }
    }

    /// The literal form of this key for embedding in a predicate.
    pub fn to_value(&self) -> Value {
        match self {
            DbKey::Int(n) => Value::Int(*n),
            DbKey::Text(s) => Value::Text(s.clone()),
        }
    }
}

impl From<i64> for DbKey {
    fn from(n: i64) -> Self {
        DbKey::Int(n)
    }
}

impl std::fmt::Display for DbKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DbKey::Int(n) => write!(f, "{n}"),
            DbKey::Text(s) => write!(f, "{s}"),
        }
    }
}

/// A literal scalar value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Text(String),
    Bytes(Vec<u8>),
}

/// Comparison operators used in range predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Lt,
    Le,
}

impl CmpOp {
    pub fn as_str(self) -> &'static str {
        match self {
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
        }
    }
}

/// A SQL expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A table reference: the dotted path, quoted as a whole.
    TableName(DbPath),

    /// A literal scalar.
    Value(Value),

    /// `SELECT <columns> [FROM <table>] [WHERE ...] [GROUP BY ...]
    /// [ORDER BY ...]`; parenthesized when it appears inside another
    /// select.
    Select {
        columns: Vec<Expr>,
        table: Option<Box<Expr>>,
        where_clauses: Vec<Expr>,
        group_by: Vec<Expr>,
        order_by: Vec<Expr>,
    },

    /// A derived table labelling each row of `table` with a 1-based
    /// sequential `idx` under the given ordering.
    Enum { table: DbPath, order_by: Box<Expr> },

    /// The folded-MD5 row checksum summed over a row set: the expressions
    /// are cast to text, concatenated in order, hashed, folded to 60 bits
    /// and summed. Expression order is significant.
    Checksum(Vec<Expr>),

    /// A parenthesized binary comparison.
    Compare {
        op: CmpOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },

    /// `(<expr> IN (<list>))`.
    In { expr: Box<Expr>, list: Vec<Expr> },

    /// `count(<column>)`, or `count(*)` when no column is given.
    Count(Option<String>),

    /// Raw SQL emitted verbatim. Known-safe material only.
    Raw(String),
}

impl Expr {
    pub fn raw(s: impl Into<String>) -> Expr {
        Expr::Raw(s.into())
    }

    pub fn int(n: i64) -> Expr {
        Expr::Value(Value::Int(n))
    }

    pub fn compare(op: CmpOp, lhs: Expr, rhs: Expr) -> Expr {
        Expr::Compare {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    pub fn in_list(expr: Expr, list: Vec<Expr>) -> Expr {
        Expr::In {
            expr: Box::new(expr),
            list,
        }
    }
}

/// Lowers an [`Expr`] tree to a SQL string for one dialect.
///
/// The only state is the `in_select` flag: a select compiled while another
/// select is being rendered wraps itself in parentheses. Children of a
/// select are compiled through a nested compiler with the flag raised; the
/// *parent's* flag decides the wrapping.
#[derive(Debug, Clone, Copy)]
pub struct Compiler {
    dialect: Dialect,
    in_select: bool,
}

impl Compiler {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            in_select: false,
        }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    fn nested(&self) -> Self {
        Self {
            dialect: self.dialect,
            in_select: true,
        }
    }

    pub fn compile(&self, expr: &Expr) -> String {
        match expr {
            Expr::Raw(s) => s.clone(),

            Expr::Value(v) => self.compile_value(v),

            Expr::TableName(path) => self.dialect.quote(&path.join(".")),

            Expr::Select {
                columns,
                table,
                where_clauses,
                group_by,
                order_by,
            } => {
                let c = self.nested();
                let columns: Vec<String> = columns.iter().map(|e| c.compile(e)).collect();
                let mut sql = format!("SELECT {}", columns.join(", "));

                if let Some(table) = table {
                    sql.push_str(" FROM ");
                    sql.push_str(&c.compile(table));
                }

                if !where_clauses.is_empty() {
                    let preds: Vec<String> = where_clauses.iter().map(|e| c.compile(e)).collect();
                    sql.push_str(" WHERE ");
                    sql.push_str(&preds.join(" AND "));
                }

                if !group_by.is_empty() {
                    let keys: Vec<String> = group_by.iter().map(|e| c.compile(e)).collect();
                    sql.push_str(" GROUP BY ");
                    sql.push_str(&keys.join(", "));
                }

                if !order_by.is_empty() {
                    let keys: Vec<String> = order_by.iter().map(|e| c.compile(e)).collect();
                    sql.push_str(" ORDER BY ");
                    sql.push_str(&keys.join(", "));
                }

                if self.in_select {
                    format!("({sql})")
                } else {
                    sql
                }
            }

            Expr::Enum { table, order_by } => {
                let table = self.dialect.quote(&table.join("."));
                let order = self.compile(order_by);
                format!(
                    "(SELECT *, (row_number() over (ORDER BY {order})) as idx \
                     FROM {table} ORDER BY {order}) tmp"
                )
            }

            Expr::Checksum(exprs) => {
                let parts: Vec<String> = exprs
                    .iter()
                    .map(|e| self.dialect.to_text(&self.compile(e)))
                    .collect();
                let concatenated = format!("concat({})", parts.join(", "));
                format!("sum({})", self.dialect.md5_to_int(&concatenated))
            }

            Expr::Compare { op, lhs, rhs } => {
                format!(
                    "({} {} {})",
                    self.compile(lhs),
                    op.as_str(),
                    self.compile(rhs)
                )
            }

            Expr::In { expr, list } => {
                let elems: Vec<String> = list.iter().map(|e| self.compile(e)).collect();
                format!("({} IN ({}))", self.compile(expr), elems.join(", "))
            }

            Expr::Count(column) => match column {
                Some(column) => format!("count({column})"),
                None => "count(*)".to_string(),
            },
        }
    }

    fn compile_value(&self, value: &Value) -> String {
        match value {
            Value::Int(n) => n.to_string(),
            Value::Text(s) => helpers::quote_string_single(s),
            Value::Bytes(b) => format!("b'{}'", String::from_utf8_lossy(b)),
        }
    }
}
