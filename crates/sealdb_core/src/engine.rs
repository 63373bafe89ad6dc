//! Statement engine.
//!
//! Owns the in-memory copy of every resident database and executes parsed
//! statements against it. Row-level work is delegated to [`crate::runner`];
//! the engine handles names, schema changes and dispatch. Nothing here
//! touches the filesystem.

use std::collections::BTreeMap;

use tracing::debug;

use crate::error::{CoreError, CoreResult};
use crate::runner;
use crate::sql::{self, CreateIndex, CreateTable, DropIndex, DropTable, Statement};
use crate::types::{Column, Database, IndexDef, QueryResult, Table, Value};

/// Longest accepted database name.
pub const MAX_NAME_LEN: usize = 64;

/// Checks that `name` can be used as a database name.
///
/// Database names become file names, so only ASCII letters, digits, `_`
/// and `-` are accepted.
pub fn validate_database_name(name: &str) -> CoreResult<()> {
    if name.is_empty() || name.len() > MAX_NAME_LEN {
        return Err(CoreError::validation(format!(
            "database name must be 1 to {MAX_NAME_LEN} characters"
        )));
    }
    if !name
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
    {
        return Err(CoreError::validation(format!(
            "database name {name:?} may only contain letters, digits, '_' and '-'"
        )));
    }
    Ok(())
}

/// In-memory databases and statement dispatch.
#[derive(Debug, Default)]
pub struct Engine {
    databases: BTreeMap<String, Database>,
}

impl Engine {
    /// Creates an engine with nothing resident.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if `name` is resident.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.databases.contains_key(name)
    }

    /// Returns a resident database.
    #[must_use]
    pub fn database(&self, name: &str) -> Option<&Database> {
        self.databases.get(name)
    }

    /// Names of resident databases, sorted.
    #[must_use]
    pub fn database_names(&self) -> Vec<String> {
        self.databases.keys().cloned().collect()
    }

    /// Makes a loaded database resident, replacing any previous copy.
    pub fn install(&mut self, database: Database) {
        self.databases.insert(database.name.clone(), database);
    }

    /// Drops the resident copy of `name`, if any.
    pub fn evict(&mut self, name: &str) -> Option<Database> {
        self.databases.remove(name)
    }

    /// Creates an empty resident database.
    ///
    /// # Errors
    ///
    /// - [`CoreError::Validation`] if the name is not usable
    /// - [`CoreError::Conflict`] if the name is already resident
    pub fn create_database(&mut self, name: &str) -> CoreResult<&Database> {
        validate_database_name(name)?;
        if self.databases.contains_key(name) {
            return Err(CoreError::conflict("database", name));
        }
        debug!(database = name, "created database");
        Ok(self
            .databases
            .entry(name.to_string())
            .or_insert_with(|| Database::new(name)))
    }

    /// Removes a resident database and returns it.
    pub fn delete_database(&mut self, name: &str) -> CoreResult<Database> {
        let database = self
            .databases
            .remove(name)
            .ok_or_else(|| CoreError::not_found("database", name))?;
        debug!(database = name, "deleted database");
        Ok(database)
    }

    /// Parses and runs a `CREATE TABLE` statement.
    ///
    /// # Errors
    ///
    /// - [`CoreError::Syntax`] if `sql` is not a CREATE TABLE statement
    /// - [`CoreError::Conflict`] if the table exists and `IF NOT EXISTS`
    ///   was not given
    pub fn create_table(&mut self, db_name: &str, sql: &str) -> CoreResult<QueryResult> {
        match sql::parse(sql)? {
            Statement::CreateTable(stmt) => {
                let database = self.database_mut(db_name)?;
                create_table(database, stmt)
            }
            _ => Err(CoreError::syntax("expected CREATE TABLE", 0)),
        }
    }

    /// Creates a table from column definitions, bypassing SQL.
    pub fn create_table_from_columns(
        &mut self,
        db_name: &str,
        table: &str,
        columns: Vec<Column>,
    ) -> CoreResult<QueryResult> {
        let primary_key = columns
            .iter()
            .filter(|c| c.primary_key)
            .map(|c| c.name.clone())
            .collect();
        let stmt = CreateTable {
            name: table.to_string(),
            if_not_exists: false,
            columns,
            primary_key,
        };
        let database = self.database_mut(db_name)?;
        create_table(database, stmt)
    }

    /// Drops a table.
    pub fn drop_table(&mut self, db_name: &str, table: &str) -> CoreResult<QueryResult> {
        let database = self.database_mut(db_name)?;
        drop_table(
            database,
            DropTable {
                name: table.to_string(),
                if_exists: false,
            },
        )
    }

    /// Inserts one row from `(column, value)` pairs, bypassing SQL.
    pub fn insert_row(
        &mut self,
        db_name: &str,
        table: &str,
        values: Vec<(String, Value)>,
    ) -> CoreResult<QueryResult> {
        let database = self.database_mut(db_name)?;
        let result = runner::insert_row(table_mut(database, table)?, values)?;
        database.touch();
        Ok(result)
    }

    /// Parses and executes one statement.
    ///
    /// # Errors
    ///
    /// - [`CoreError::UnsupportedStatement`] for keywords other than
    ///   SELECT, INSERT, UPDATE, DELETE, CREATE and DROP
    /// - [`CoreError::Syntax`] if the statement cannot be parsed
    /// - [`CoreError::NotFound`] if the database or table does not exist
    pub fn execute_statement(&mut self, db_name: &str, sql: &str) -> CoreResult<QueryResult> {
        let statement = sql::parse(sql)?;
        self.execute(db_name, statement)
    }

    /// Executes an already parsed statement.
    pub fn execute(&mut self, db_name: &str, statement: Statement) -> CoreResult<QueryResult> {
        let database = self.database_mut(db_name)?;
        let mutating = statement.is_mutating();

        let result = match statement {
            Statement::Select(stmt) => runner::select(table(database, &stmt.table)?, &stmt),
            Statement::Insert(stmt) => runner::insert(table_mut(database, &stmt.table)?, &stmt),
            Statement::Update(stmt) => runner::update(table_mut(database, &stmt.table)?, &stmt),
            Statement::Delete(stmt) => runner::delete(table_mut(database, &stmt.table)?, &stmt),
            Statement::CreateTable(stmt) => create_table(database, stmt),
            Statement::DropTable(stmt) => drop_table(database, stmt),
            Statement::CreateIndex(stmt) => create_index(database, stmt),
            Statement::DropIndex(stmt) => drop_index(database, stmt),
        }?;

        if mutating {
            database.touch();
        }
        Ok(result)
    }

    fn database_mut(&mut self, name: &str) -> CoreResult<&mut Database> {
        self.databases
            .get_mut(name)
            .ok_or_else(|| CoreError::not_found("database", name))
    }
}

fn table<'a>(database: &'a Database, name: &str) -> CoreResult<&'a Table> {
    database
        .tables
        .get(name)
        .ok_or_else(|| CoreError::not_found("table", name))
}

fn table_mut<'a>(database: &'a mut Database, name: &str) -> CoreResult<&'a mut Table> {
    database
        .tables
        .get_mut(name)
        .ok_or_else(|| CoreError::not_found("table", name))
}

fn create_table(database: &mut Database, stmt: CreateTable) -> CoreResult<QueryResult> {
    if database.tables.contains_key(&stmt.name) {
        if stmt.if_not_exists {
            return Ok(QueryResult::affected(0));
        }
        return Err(CoreError::conflict("table", stmt.name));
    }
    if stmt.columns.is_empty() {
        return Err(CoreError::schema(format!("table {} has no columns", stmt.name)));
    }

    let mut columns = stmt.columns;
    for (i, column) in columns.iter().enumerate() {
        if columns[..i].iter().any(|c| c.name == column.name) {
            return Err(CoreError::schema(format!(
                "column {} declared twice in table {}",
                column.name, stmt.name
            )));
        }
    }
    for key in &stmt.primary_key {
        match columns.iter_mut().find(|c| &c.name == key) {
            Some(column) => column.primary_key = true,
            None => {
                return Err(CoreError::schema(format!(
                    "primary key column {key} is not defined"
                )))
            }
        }
    }
    for column in &mut columns {
        if let Some(default) = column.default.take() {
            column.default = Some(runner::coerce(default, column)?);
        }
    }

    debug!(table = %stmt.name, columns = columns.len(), "created table");
    database
        .tables
        .insert(stmt.name.clone(), Table::new(stmt.name, columns));
    Ok(QueryResult::affected(0))
}

fn drop_table(database: &mut Database, stmt: DropTable) -> CoreResult<QueryResult> {
    match database.tables.remove(&stmt.name) {
        Some(table) => {
            debug!(table = %stmt.name, rows = table.rows.len(), "dropped table");
            Ok(QueryResult::affected(0))
        }
        None if stmt.if_exists => Ok(QueryResult::affected(0)),
        None => Err(CoreError::not_found("table", stmt.name)),
    }
}

fn create_index(database: &mut Database, stmt: CreateIndex) -> CoreResult<QueryResult> {
    if database.index_owner(&stmt.name).is_some() {
        if stmt.if_not_exists {
            return Ok(QueryResult::affected(0));
        }
        return Err(CoreError::conflict("index", stmt.name));
    }

    let table = table_mut(database, &stmt.table)?;
    if let Some(missing) = stmt.columns.iter().find(|c| table.column(c).is_none()) {
        return Err(CoreError::schema(format!(
            "table {} has no column {missing}",
            table.name
        )));
    }

    table.indexes.push(IndexDef {
        name: stmt.name,
        columns: stmt.columns,
        unique: stmt.unique,
    });
    Ok(QueryResult::affected(0))
}

fn drop_index(database: &mut Database, stmt: DropIndex) -> CoreResult<QueryResult> {
    let Some(owner) = database.index_owner(&stmt.name).map(str::to_string) else {
        if stmt.if_exists {
            return Ok(QueryResult::affected(0));
        }
        return Err(CoreError::not_found("index", stmt.name));
    };
    let table = table_mut(database, &owner)?;
    table.indexes.retain(|i| i.name != stmt.name);
    Ok(QueryResult::affected(0))
}
