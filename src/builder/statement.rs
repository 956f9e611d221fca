use std::fmt::Write;

use crate::compiled::{CompiledQuery, QueryNode, StatementKind};
use crate::error::BridgeError;
use crate::results::{CustomDbRow, QueryResult};
use crate::types::RowValues;

use super::{QueryBuilder, QueryStream};

/// Anything that compiles to a [`CompiledQuery`]. Compilation is pure: the same statement
/// always yields the same SQL and parameters.
pub trait Compilable {
    fn compile(&self) -> CompiledQuery;
}

/// Comparison operators usable in `where` filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Like,
}

impl Comparison {
    fn as_sql(self) -> &'static str {
        match self {
            Comparison::Eq => "=",
            Comparison::NotEq => "<>",
            Comparison::Lt => "<",
            Comparison::LtEq => "<=",
            Comparison::Gt => ">",
            Comparison::GtEq => ">=",
            Comparison::Like => "like",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

#[derive(Debug, Clone)]
struct Filter {
    column: String,
    op: Comparison,
    value: RowValues,
}

#[derive(Debug, Clone, Default)]
enum Returning {
    #[default]
    Nothing,
    All,
    Columns(Vec<String>),
}

impl Returning {
    fn is_set(&self) -> bool {
        !matches!(self, Returning::Nothing)
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn write_columns(sql: &mut String, columns: &[String]) {
    let quoted: Vec<String> = columns.iter().map(|c| quote_ident(c)).collect();
    sql.push_str(&quoted.join(", "));
}

fn write_filters(sql: &mut String, params: &mut Vec<RowValues>, filters: &[Filter]) {
    for (idx, filter) in filters.iter().enumerate() {
        sql.push_str(if idx == 0 { " where " } else { " and " });
        let column = quote_ident(&filter.column);
        match (&filter.value, filter.op) {
            (RowValues::Null, Comparison::Eq) => {
                let _ = write!(sql, "{column} is null");
            }
            (RowValues::Null, Comparison::NotEq) => {
                let _ = write!(sql, "{column} is not null");
            }
            (value, op) => {
                let _ = write!(sql, "{column} {} ?", op.as_sql());
                params.push(value.clone());
            }
        }
    }
}

fn write_returning(sql: &mut String, returning: &Returning) {
    match returning {
        Returning::Nothing => {}
        Returning::All => sql.push_str(" returning *"),
        Returning::Columns(columns) => {
            sql.push_str(" returning ");
            write_columns(sql, columns);
        }
    }
}

/// `select ... from table`
#[derive(Debug, Clone)]
pub struct SelectQuery<'a> {
    qb: &'a QueryBuilder,
    table: String,
    columns: Vec<String>,
    filters: Vec<Filter>,
    order_by: Vec<(String, SortOrder)>,
    limit: Option<i64>,
}

impl<'a> SelectQuery<'a> {
    pub(super) fn new(qb: &'a QueryBuilder, table: &str) -> Self {
        Self {
            qb,
            table: table.to_owned(),
            columns: Vec::new(),
            filters: Vec::new(),
            order_by: Vec::new(),
            limit: None,
        }
    }

    /// Select every column (the default).
    #[must_use]
    pub fn select_all(mut self) -> Self {
        self.columns.clear();
        self
    }

    #[must_use]
    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn where_eq(self, column: &str, value: impl Into<RowValues>) -> Self {
        self.where_cmp(column, Comparison::Eq, value)
    }

    #[must_use]
    pub fn where_cmp(mut self, column: &str, op: Comparison, value: impl Into<RowValues>) -> Self {
        self.filters.push(Filter {
            column: column.to_owned(),
            op,
            value: value.into(),
        });
        self
    }

    #[must_use]
    pub fn order_by(mut self, column: &str, order: SortOrder) -> Self {
        self.order_by.push((column.to_owned(), order));
        self
    }

    #[must_use]
    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// # Errors
    /// Propagates the driver's execution failure.
    pub async fn execute(&self) -> Result<Vec<CustomDbRow>, BridgeError> {
        let result = self.qb.execute_query(&self.compile()).await?;
        Ok(result.into_rows())
    }

    /// # Errors
    /// Propagates the driver's execution failure.
    pub async fn execute_take_first(&self) -> Result<Option<CustomDbRow>, BridgeError> {
        Ok(self.execute().await?.into_iter().next())
    }

    /// # Errors
    /// Propagates the driver's refusal to stream.
    pub async fn stream(&self, chunk_size: usize) -> Result<QueryStream, BridgeError> {
        self.qb.stream(&self.compile(), chunk_size).await
    }
}

impl Compilable for SelectQuery<'_> {
    fn compile(&self) -> CompiledQuery {
        let mut sql = String::from("select ");
        let mut params = Vec::new();
        if self.columns.is_empty() {
            sql.push('*');
        } else {
            write_columns(&mut sql, &self.columns);
        }
        let _ = write!(sql, " from {}", quote_ident(&self.table));
        write_filters(&mut sql, &mut params, &self.filters);
        for (idx, (column, order)) in self.order_by.iter().enumerate() {
            sql.push_str(if idx == 0 { " order by " } else { ", " });
            let dir = match order {
                SortOrder::Asc => "asc",
                SortOrder::Desc => "desc",
            };
            let _ = write!(sql, "{} {dir}", quote_ident(column));
        }
        if let Some(limit) = self.limit {
            sql.push_str(" limit ?");
            params.push(RowValues::Int(limit));
        }
        CompiledQuery::new(sql, params, QueryNode::new(StatementKind::Select))
    }
}

/// `insert into table (...) values (...)`
#[derive(Debug, Clone)]
pub struct InsertQuery<'a> {
    qb: &'a QueryBuilder,
    table: String,
    values: Vec<(String, RowValues)>,
    returning: Returning,
}

impl<'a> InsertQuery<'a> {
    pub(super) fn new(qb: &'a QueryBuilder, table: &str) -> Self {
        Self {
            qb,
            table: table.to_owned(),
            values: Vec::new(),
            returning: Returning::Nothing,
        }
    }

    #[must_use]
    pub fn value(mut self, column: &str, value: impl Into<RowValues>) -> Self {
        self.values.push((column.to_owned(), value.into()));
        self
    }

    #[must_use]
    pub fn returning_all(mut self) -> Self {
        self.returning = Returning::All;
        self
    }

    #[must_use]
    pub fn returning<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.returning = Returning::Columns(columns.into_iter().map(Into::into).collect());
        self
    }

    /// # Errors
    /// Propagates the driver's execution failure.
    pub async fn execute(&self) -> Result<QueryResult, BridgeError> {
        self.qb.execute_query(&self.compile()).await
    }
}

impl Compilable for InsertQuery<'_> {
    fn compile(&self) -> CompiledQuery {
        let mut sql = format!("insert into {}", quote_ident(&self.table));
        let mut params = Vec::with_capacity(self.values.len());
        if self.values.is_empty() {
            sql.push_str(" default values");
        } else {
            let columns: Vec<String> = self.values.iter().map(|(c, _)| c.clone()).collect();
            sql.push_str(" (");
            write_columns(&mut sql, &columns);
            sql.push_str(") values (");
            sql.push_str(&vec!["?"; self.values.len()].join(", "));
            sql.push(')');
            params.extend(self.values.iter().map(|(_, v)| v.clone()));
        }
        write_returning(&mut sql, &self.returning);
        CompiledQuery::new(
            sql,
            params,
            QueryNode::new(StatementKind::Insert).with_returning(self.returning.is_set()),
        )
    }
}

/// `update table set ...`
#[derive(Debug, Clone)]
pub struct UpdateQuery<'a> {
    qb: &'a QueryBuilder,
    table: String,
    sets: Vec<(String, RowValues)>,
    filters: Vec<Filter>,
    returning: Returning,
}

impl<'a> UpdateQuery<'a> {
    pub(super) fn new(qb: &'a QueryBuilder, table: &str) -> Self {
        Self {
            qb,
            table: table.to_owned(),
            sets: Vec::new(),
            filters: Vec::new(),
            returning: Returning::Nothing,
        }
    }

    #[must_use]
    pub fn set(mut self, column: &str, value: impl Into<RowValues>) -> Self {
        self.sets.push((column.to_owned(), value.into()));
        self
    }

    #[must_use]
    pub fn where_eq(self, column: &str, value: impl Into<RowValues>) -> Self {
        self.where_cmp(column, Comparison::Eq, value)
    }

    #[must_use]
    pub fn where_cmp(mut self, column: &str, op: Comparison, value: impl Into<RowValues>) -> Self {
        self.filters.push(Filter {
            column: column.to_owned(),
            op,
            value: value.into(),
        });
        self
    }

    #[must_use]
    pub fn returning_all(mut self) -> Self {
        self.returning = Returning::All;
        self
    }

    #[must_use]
    pub fn returning<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.returning = Returning::Columns(columns.into_iter().map(Into::into).collect());
        self
    }

    /// # Errors
    /// Returns `BridgeError::ConfigError` without a `set` clause, otherwise propagates the
    /// driver's execution failure.
    pub async fn execute(&self) -> Result<QueryResult, BridgeError> {
        if self.sets.is_empty() {
            return Err(BridgeError::ConfigError(format!(
                "update of {} has no set clause",
                self.table
            )));
        }
        self.qb.execute_query(&self.compile()).await
    }
}

impl Compilable for UpdateQuery<'_> {
    fn compile(&self) -> CompiledQuery {
        let mut sql = format!("update {} set ", quote_ident(&self.table));
        let mut params = Vec::with_capacity(self.sets.len() + self.filters.len());
        let assignments: Vec<String> = self
            .sets
            .iter()
            .map(|(column, _)| format!("{} = ?", quote_ident(column)))
            .collect();
        sql.push_str(&assignments.join(", "));
        params.extend(self.sets.iter().map(|(_, v)| v.clone()));
        write_filters(&mut sql, &mut params, &self.filters);
        write_returning(&mut sql, &self.returning);
        CompiledQuery::new(
            sql,
            params,
            QueryNode::new(StatementKind::Update).with_returning(self.returning.is_set()),
        )
    }
}

/// `delete from table`
#[derive(Debug, Clone)]
pub struct DeleteQuery<'a> {
    qb: &'a QueryBuilder,
    table: String,
    filters: Vec<Filter>,
    returning: Returning,
}

impl<'a> DeleteQuery<'a> {
    pub(super) fn new(qb: &'a QueryBuilder, table: &str) -> Self {
        Self {
            qb,
            table: table.to_owned(),
            filters: Vec::new(),
            returning: Returning::Nothing,
        }
    }

    #[must_use]
    pub fn where_eq(self, column: &str, value: impl Into<RowValues>) -> Self {
        self.where_cmp(column, Comparison::Eq, value)
    }

    #[must_use]
    pub fn where_cmp(mut self, column: &str, op: Comparison, value: impl Into<RowValues>) -> Self {
        self.filters.push(Filter {
            column: column.to_owned(),
            op,
            value: value.into(),
        });
        self
    }

    #[must_use]
    pub fn returning_all(mut self) -> Self {
        self.returning = Returning::All;
        self
    }

    #[must_use]
    pub fn returning<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.returning = Returning::Columns(columns.into_iter().map(Into::into).collect());
        self
    }

    /// # Errors
    /// Propagates the driver's execution failure.
    pub async fn execute(&self) -> Result<QueryResult, BridgeError> {
        self.qb.execute_query(&self.compile()).await
    }
}

impl Compilable for DeleteQuery<'_> {
    fn compile(&self) -> CompiledQuery {
        let mut sql = format!("delete from {}", quote_ident(&self.table));
        let mut params = Vec::with_capacity(self.filters.len());
        write_filters(&mut sql, &mut params, &self.filters);
        write_returning(&mut sql, &self.returning);
        CompiledQuery::new(
            sql,
            params,
            QueryNode::new(StatementKind::Delete).with_returning(self.returning.is_set()),
        )
    }
}

/// Hand-written SQL.
#[derive(Debug, Clone)]
pub struct RawQuery<'a> {
    qb: &'a QueryBuilder,
    sql: String,
    params: Vec<RowValues>,
}

impl<'a> RawQuery<'a> {
    pub(super) fn new(qb: &'a QueryBuilder, sql: &str, params: Vec<RowValues>) -> Self {
        Self {
            qb,
            sql: sql.to_owned(),
            params,
        }
    }

    /// # Errors
    /// Propagates the driver's execution failure.
    pub async fn execute(&self) -> Result<QueryResult, BridgeError> {
        self.qb.execute_query(&self.compile()).await
    }
}

impl Compilable for RawQuery<'_> {
    fn compile(&self) -> CompiledQuery {
        CompiledQuery::raw(self.sql.clone(), self.params.clone())
    }
}
