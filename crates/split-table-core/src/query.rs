//! Minimal SELECT builder.
//!
//! A [`Query`] reads from a *source expression*: either a quoted table name
//! or a parenthesized sub-select such as the union a split table produces.
//! Filters are bound as parameters; only identifiers are interpolated.

use std::sync::Arc;

use crate::{
    engine::{Engine, EngineResult},
    record::Row,
    value::{SqlValue, quote_identifier},
};

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    /// Ascending.
    Asc,
    /// Descending.
    Desc,
}

#[derive(Debug, Clone)]
enum Condition {
    Compare {
        column: String,
        op: &'static str,
        value: SqlValue,
    },
    IsNull(String),
    IsNotNull(String),
}

/// A SELECT over a table or sub-select.
#[derive(Clone)]
pub struct Query {
    engine: Arc<dyn Engine>,
    source: String,
    projection: Vec<String>,
    conditions: Vec<Condition>,
    order_by: Vec<(String, Order)>,
    limit: Option<u64>,
    offset: Option<u64>,
}

impl std::fmt::Debug for Query {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Query")
            .field("sql", &self.to_sql().0)
            .finish_non_exhaustive()
    }
}

impl Query {
    /// Select every column from `source` (already quoted or parenthesized).
    pub fn new(engine: Arc<dyn Engine>, source: impl Into<String>) -> Self {
        Self {
            engine,
            source: source.into(),
            projection: Vec::new(),
            conditions: Vec::new(),
            order_by: Vec::new(),
            limit: None,
            offset: None,
        }
    }

    /// Replace the projection with raw expressions (`MAX("id") AS max_id`).
    pub fn select<S: AsRef<str>>(mut self, exprs: &[S]) -> Self {
        self.projection = exprs.iter().map(|e| e.as_ref().to_string()).collect();
        self
    }

    fn compare(mut self, column: &str, op: &'static str, value: impl Into<SqlValue>) -> Self {
        self.conditions.push(Condition::Compare {
            column: column.to_string(),
            op,
            value: value.into(),
        });
        self
    }

    /// `column = value`
    pub fn equals(self, column: &str, value: impl Into<SqlValue>) -> Self {
        self.compare(column, "=", value)
    }

    /// `column >= value`
    pub fn ge(self, column: &str, value: impl Into<SqlValue>) -> Self {
        self.compare(column, ">=", value)
    }

    /// `column <= value`
    pub fn le(self, column: &str, value: impl Into<SqlValue>) -> Self {
        self.compare(column, "<=", value)
    }

    /// `column > value`
    pub fn gt(self, column: &str, value: impl Into<SqlValue>) -> Self {
        self.compare(column, ">", value)
    }

    /// `column < value`
    pub fn lt(self, column: &str, value: impl Into<SqlValue>) -> Self {
        self.compare(column, "<", value)
    }

    /// `column IS NULL`
    pub fn is_null(mut self, column: &str) -> Self {
        self.conditions.push(Condition::IsNull(column.to_string()));
        self
    }

    /// `column IS NOT NULL`
    pub fn is_not_null(mut self, column: &str) -> Self {
        self.conditions.push(Condition::IsNotNull(column.to_string()));
        self
    }

    /// Append an ascending sort key.
    pub fn asc(mut self, column: &str) -> Self {
        self.order_by.push((column.to_string(), Order::Asc));
        self
    }

    /// Append a descending sort key.
    pub fn desc(mut self, column: &str) -> Self {
        self.order_by.push((column.to_string(), Order::Desc));
        self
    }

    /// Cap the number of rows.
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Skip rows.
    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Source expression this query reads from.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// SQL text and bound parameters.
    pub fn to_sql(&self) -> (String, Vec<SqlValue>) {
        let projection = if self.projection.is_empty() {
            "*".to_string()
        } else {
            self.projection.join(", ")
        };
        let mut sql = format!("SELECT {projection} FROM {}", self.source);
        if self.source.starts_with('(') {
            sql.push_str(" AS \"u\"");
        }

        let mut params = Vec::new();
        if !self.conditions.is_empty() {
            let clauses: Vec<String> = self
                .conditions
                .iter()
                .map(|cond| match cond {
                    Condition::Compare { column, op, value } => {
                        params.push(value.clone());
                        format!("{} {op} ?", quote_identifier(column))
                    }
                    Condition::IsNull(column) => format!("{} IS NULL", quote_identifier(column)),
                    Condition::IsNotNull(column) => {
                        format!("{} IS NOT NULL", quote_identifier(column))
                    }
                })
                .collect();
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }

        if !self.order_by.is_empty() {
            let keys: Vec<String> = self
                .order_by
                .iter()
                .map(|(column, order)| {
                    let dir = match order {
                        Order::Asc => "ASC",
                        Order::Desc => "DESC",
                    };
                    format!("{} {dir}", quote_identifier(column))
                })
                .collect();
            sql.push_str(" ORDER BY ");
            sql.push_str(&keys.join(", "));
        }

        match (self.limit, self.offset) {
            (Some(limit), Some(offset)) => sql.push_str(&format!(" LIMIT {limit} OFFSET {offset}")),
            (Some(limit), None) => sql.push_str(&format!(" LIMIT {limit}")),
            // SQLite needs a LIMIT before OFFSET; -1 means unbounded.
            (None, Some(offset)) => sql.push_str(&format!(" LIMIT -1 OFFSET {offset}")),
            (None, None) => {}
        }

        (sql, params)
    }

    /// All matching rows.
    pub async fn all(&self) -> EngineResult<Vec<Row>> {
        let (sql, params) = self.to_sql();
        self.engine.query(&sql, &params).await
    }

    /// First matching row.
    pub async fn first(&self) -> EngineResult<Option<Row>> {
        let limited = self.clone().limit(1);
        Ok(limited.all().await?.into_iter().next())
    }

    /// Number of matching rows.
    pub async fn count(&self) -> EngineResult<i64> {
        let (inner, params) = self.to_sql();
        let sql = format!("SELECT COUNT(*) AS \"count\" FROM ({inner})");
        let value = self.engine.query_scalar(&sql, &params).await?;
        Ok(value.as_i64().unwrap_or_default())
    }
}
