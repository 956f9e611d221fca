use crate::types::RowValues;

/// Statement kind decided by the query builder when it compiles a statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
    /// Hand-written SQL. Always treated as row-returning.
    Raw,
}

/// Compile-time metadata about a statement: its kind and whether it carries a returning clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QueryNode {
    pub kind: StatementKind,
    pub has_returning: bool,
}

impl QueryNode {
    #[must_use]
    pub fn new(kind: StatementKind) -> Self {
        Self {
            kind,
            has_returning: false,
        }
    }

    #[must_use]
    pub fn with_returning(mut self, has_returning: bool) -> Self {
        self.has_returning = has_returning;
        self
    }

    /// Delete, update and insert may carry a returning clause.
    #[must_use]
    pub fn supports_returning(&self) -> bool {
        matches!(
            self.kind,
            StatementKind::Delete | StatementKind::Update | StatementKind::Insert
        )
    }

    /// Mutations without a returning clause report an affected-row count instead of rows.
    #[must_use]
    pub fn should_return_affected_rows(&self) -> bool {
        self.supports_returning() && !self.has_returning
    }

    /// Mutations with a returning clause must observe their own writes.
    #[must_use]
    pub fn is_returning_mutation(&self) -> bool {
        self.supports_returning() && self.has_returning
    }

    /// Only builder-made selects may go to a read replica. Raw SQL may write.
    #[must_use]
    pub fn is_replica_safe(&self) -> bool {
        self.kind == StatementKind::Select
    }
}

/// SQL text, positional parameters and statement metadata, ready for a connection.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    pub sql: String,
    pub parameters: Vec<RowValues>,
    pub query: QueryNode,
}

impl CompiledQuery {
    pub fn new(sql: impl Into<String>, parameters: Vec<RowValues>, query: QueryNode) -> Self {
        Self {
            sql: sql.into(),
            parameters,
            query,
        }
    }

    /// Wrap hand-written SQL.
    pub fn raw(sql: impl Into<String>, parameters: Vec<RowValues>) -> Self {
        Self::new(sql, parameters, QueryNode::new(StatementKind::Raw))
    }
}
