//! Statement syntax tree.

use crate::types::{Column, Value};

/// A parsed statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// `SELECT ...`
    Select(Select),
    /// `INSERT INTO ...`
    Insert(Insert),
    /// `UPDATE ...`
    Update(Update),
    /// `DELETE FROM ...`
    Delete(Delete),
    /// `CREATE TABLE ...`
    CreateTable(CreateTable),
    /// `DROP TABLE ...`
    DropTable(DropTable),
    /// `CREATE [UNIQUE] INDEX ...`
    CreateIndex(CreateIndex),
    /// `DROP INDEX ...`
    DropIndex(DropIndex),
}

impl Statement {
    /// Returns true if executing the statement can change the database.
    #[must_use]
    pub fn is_mutating(&self) -> bool {
        !matches!(self, Statement::Select(_))
    }
}

/// Columns returned by a SELECT.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Projection {
    /// `*`
    All,
    /// An explicit column list.
    Columns(Vec<String>),
}

/// One `ORDER BY` key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderKey {
    /// Column to sort on.
    pub column: String,
    /// `DESC` was given.
    pub descending: bool,
}

/// `SELECT <cols> FROM <table> [WHERE ..] [ORDER BY ..] [LIMIT n]`
#[derive(Debug, Clone, PartialEq)]
pub struct Select {
    /// Requested columns.
    pub projection: Projection,
    /// Source table.
    pub table: String,
    /// Row filter.
    pub filter: Option<Predicate>,
    /// Sort keys, most significant first.
    pub order_by: Vec<OrderKey>,
    /// Maximum number of rows.
    pub limit: Option<usize>,
}

/// `INSERT INTO <table> [(<cols>)] VALUES (<vals>)`
#[derive(Debug, Clone, PartialEq)]
pub struct Insert {
    /// Target table.
    pub table: String,
    /// Explicit column list; `None` means every column in declared order.
    pub columns: Option<Vec<String>>,
    /// Literal values, uncoerced.
    pub values: Vec<Value>,
}

/// `col = value` in an UPDATE.
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    /// Column being set.
    pub column: String,
    /// Literal value, uncoerced.
    pub value: Value,
}

/// `UPDATE <table> SET <assignments> [WHERE ..]`
#[derive(Debug, Clone, PartialEq)]
pub struct Update {
    /// Target table.
    pub table: String,
    /// Assignments in source order.
    pub assignments: Vec<Assignment>,
    /// Row filter.
    pub filter: Option<Predicate>,
}

/// `DELETE FROM <table> [WHERE ..]`
#[derive(Debug, Clone, PartialEq)]
pub struct Delete {
    /// Target table.
    pub table: String,
    /// Row filter.
    pub filter: Option<Predicate>,
}

/// `CREATE TABLE [IF NOT EXISTS] <name> (<defs>)`
#[derive(Debug, Clone, PartialEq)]
pub struct CreateTable {
    /// Table name.
    pub name: String,
    /// `IF NOT EXISTS` was given.
    pub if_not_exists: bool,
    /// Column definitions with primary-key flags resolved.
    pub columns: Vec<Column>,
    /// Primary-key columns: the column-level flags, or the table-level
    /// `PRIMARY KEY (..)` list.
    pub primary_key: Vec<String>,
}

/// `DROP TABLE [IF EXISTS] <name>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DropTable {
    /// Table name.
    pub name: String,
    /// `IF EXISTS` was given.
    pub if_exists: bool,
}

/// `CREATE [UNIQUE] INDEX [IF NOT EXISTS] <name> ON <table> (<cols>)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateIndex {
    /// Index name.
    pub name: String,
    /// Indexed table.
    pub table: String,
    /// Indexed columns.
    pub columns: Vec<String>,
    /// `UNIQUE` was given.
    pub unique: bool,
    /// `IF NOT EXISTS` was given.
    pub if_not_exists: bool,
}

/// `DROP INDEX [IF EXISTS] <name>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DropIndex {
    /// Index name.
    pub name: String,
    /// `IF EXISTS` was given.
    pub if_exists: bool,
}

/// A WHERE clause in disjunctive form.
///
/// A row matches if any branch matches, and a branch matches if all of its
/// conditions hold. There is no grouping: `a OR b AND c` reads as
/// `a OR (b AND c)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    /// OR-branches, each a list of AND-ed conditions.
    pub branches: Vec<Vec<Condition>>,
}

/// A single `column <op> operand` test.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    /// Column under test.
    pub column: String,
    /// Operator and operand.
    pub test: Comparison,
}

/// Operator and operand of a [`Condition`].
#[derive(Debug, Clone, PartialEq)]
pub enum Comparison {
    /// `=`
    Eq(Value),
    /// `!=` / `<>`
    NotEq(Value),
    /// `>`
    Gt(Value),
    /// `>=`
    Ge(Value),
    /// `<`
    Lt(Value),
    /// `<=`
    Le(Value),
    /// `LIKE 'pattern'`
    Like(String),
    /// `IN (a, b, ..)`
    In(Vec<Value>),
    /// `IS NULL`
    IsNull,
    /// `IS NOT NULL`
    IsNotNull,
}
