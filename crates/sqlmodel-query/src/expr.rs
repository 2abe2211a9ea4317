//! SQL expressions and dialect-specific rendering.

use serde::{Deserialize, Serialize};
use sqlmodel_core::Value;

/// SQL dialect, controlling placeholders and identifier quoting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// PostgreSQL: `$1`, `"ident"`.
    #[default]
    Postgres,
    /// SQLite: `?1`, `"ident"`.
    Sqlite,
    /// MySQL: `?`, `` `ident` ``.
    Mysql,
}

impl Dialect {
    /// Placeholder for the 1-based parameter `idx`.
    #[must_use]
    pub fn placeholder(self, idx: usize) -> String {
        match self {
            Dialect::Postgres => format!("${idx}"),
            Dialect::Sqlite => format!("?{idx}"),
            Dialect::Mysql => "?".to_string(),
        }
    }

    /// Quote an identifier.
    #[must_use]
    pub fn quote_ident(self, name: &str) -> String {
        match self {
            Dialect::Postgres | Dialect::Sqlite => format!("\"{}\"", name.replace('"', "\"\"")),
            Dialect::Mysql => format!("`{}`", name.replace('`', "``")),
        }
    }

    /// Render `table.column` with only the column quoted, or just the quoted
    /// column when `table` is `None`.
    #[must_use]
    pub fn column_ref(self, table: Option<&str>, column: &str) -> String {
        match table {
            Some(t) => format!("{t}.{}", self.quote_ident(column)),
            None => self.quote_ident(column),
        }
    }
}

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    /// `=`
    Eq,
    /// `<>`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
}

impl BinaryOp {
    const fn as_sql(self) -> &'static str {
        match self {
            BinaryOp::Eq => "=",
            BinaryOp::Ne => "<>",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
        }
    }
}

/// A WHERE-clause expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Column reference, optionally `table.column`.
    Column {
        /// Qualifying table.
        table: Option<String>,
        /// Column name.
        name: String,
    },
    /// Bound parameter.
    Value(Value),
    /// `left op right`.
    Binary {
        /// Left operand.
        left: Box<Expr>,
        /// Operator.
        op: BinaryOp,
        /// Right operand.
        right: Box<Expr>,
    },
    /// `expr IN (...)`.
    In {
        /// Tested expression.
        expr: Box<Expr>,
        /// Candidate values.
        values: Vec<Value>,
    },
    /// `expr IS NULL`.
    IsNull(Box<Expr>),
    /// Conjunction.
    And(Vec<Expr>),
}

impl Expr {
    /// Column reference. `"books.id"` qualifies the column with a table.
    pub fn col(name: impl Into<String>) -> Self {
        let name = name.into();
        match name.split_once('.') {
            Some((table, column)) => Expr::Column {
                table: Some(table.to_string()),
                name: column.to_string(),
            },
            None => Expr::Column { table: None, name },
        }
    }

    /// Bound value.
    pub fn val(value: impl Into<Value>) -> Self {
        Expr::Value(value.into())
    }

    fn binary(self, op: BinaryOp, right: impl Into<Value>) -> Self {
        Expr::Binary {
            left: Box::new(self),
            op,
            right: Box::new(Expr::Value(right.into())),
        }
    }

    /// `self = value`
    pub fn eq(self, value: impl Into<Value>) -> Self {
        self.binary(BinaryOp::Eq, value)
    }

    /// `self <> value`
    pub fn ne(self, value: impl Into<Value>) -> Self {
        self.binary(BinaryOp::Ne, value)
    }

    /// `self < value`
    pub fn lt(self, value: impl Into<Value>) -> Self {
        self.binary(BinaryOp::Lt, value)
    }

    /// `self <= value`
    pub fn le(self, value: impl Into<Value>) -> Self {
        self.binary(BinaryOp::Le, value)
    }

    /// `self > value`
    pub fn gt(self, value: impl Into<Value>) -> Self {
        self.binary(BinaryOp::Gt, value)
    }

    /// `self >= value`
    pub fn ge(self, value: impl Into<Value>) -> Self {
        self.binary(BinaryOp::Ge, value)
    }

    /// `self IN (values...)`
    pub fn in_list(self, values: impl IntoIterator<Item = Value>) -> Self {
        Expr::In {
            expr: Box::new(self),
            values: values.into_iter().collect(),
        }
    }

    /// `self IS NULL`
    pub fn is_null(self) -> Self {
        Expr::IsNull(Box::new(self))
    }

    /// `self AND other`, flattening nested conjunctions.
    pub fn and(self, other: Expr) -> Self {
        let mut parts = match self {
            Expr::And(parts) => parts,
            e => vec![e],
        };
        match other {
            Expr::And(more) => parts.extend(more),
            e => parts.push(e),
        }
        Expr::And(parts)
    }

    /// Render the expression, appending bound values to `params`.
    pub fn build(&self, dialect: Dialect, params: &mut Vec<Value>) -> String {
        match self {
            Expr::Column { table, name } => dialect.column_ref(table.as_deref(), name),
            Expr::Value(v) => {
                params.push(v.clone());
                dialect.placeholder(params.len())
            }
            Expr::Binary { left, op, right } => {
                let l = left.build(dialect, params);
                let r = right.build(dialect, params);
                format!("{l} {} {r}", op.as_sql())
            }
            Expr::In { expr, values } => {
                if values.is_empty() {
                    return "1 = 0".to_string();
                }
                let lhs = expr.build(dialect, params);
                let placeholders: Vec<String> = values
                    .iter()
                    .map(|v| {
                        params.push(v.clone());
                        dialect.placeholder(params.len())
                    })
                    .collect();
                format!("{lhs} IN ({})", placeholders.join(", "))
            }
            Expr::IsNull(expr) => format!("{} IS NULL", expr.build(dialect, params)),
            Expr::And(parts) => {
                let rendered: Vec<String> = parts
                    .iter()
                    .map(|p| match p {
                        Expr::And(_) => format!("({})", p.build(dialect, params)),
                        _ => p.build(dialect, params),
                    })
                    .collect();
                rendered.join(" AND ")
            }
        }
    }
}
