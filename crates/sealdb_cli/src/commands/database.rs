//! Database management commands.

use sealdb_core::{Config, Database, Store};
use serde::Serialize;
use tracing::info;

use super::format_timestamp;

/// Summary of one table.
#[derive(Debug, Serialize)]
pub struct TableInfo {
    /// Table name.
    pub name: String,
    /// Column names with their declared types.
    pub columns: Vec<String>,
    /// Primary-key columns.
    pub primary_key: Vec<String>,
    /// Number of rows.
    pub row_count: usize,
    /// Index names.
    pub indexes: Vec<String>,
}

/// Database inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Database name.
    pub name: String,
    /// Creation time (Unix ms).
    pub created_at: u64,
    /// Last modification time (Unix ms).
    pub updated_at: u64,
    /// Tables in name order.
    pub tables: Vec<TableInfo>,
}

impl From<&Database> for InspectResult {
    fn from(database: &Database) -> Self {
        Self {
            name: database.name.clone(),
            created_at: database.created_at,
            updated_at: database.updated_at,
            tables: database
                .tables
                .values()
                .map(|t| TableInfo {
                    name: t.name.clone(),
                    columns: t
                        .columns
                        .iter()
                        .map(|c| format!("{} {}", c.name, c.column_type))
                        .collect(),
                    primary_key: t.primary_key().into_iter().map(str::to_string).collect(),
                    row_count: t.rows.len(),
                    indexes: t.indexes.iter().map(|i| i.name.clone()).collect(),
                })
                .collect(),
        }
    }
}

/// Creates an empty database.
pub fn create(config: Config, name: &str) -> Result<(), Box<dyn std::error::Error>> {
    let store = Store::open(config)?;
    store.create_database(name)?;
    info!("Created database {}", name);
    println!("✓ Database {name} created");
    Ok(())
}

/// Deletes a database.
pub fn delete(config: Config, name: &str) -> Result<(), Box<dyn std::error::Error>> {
    let store = Store::open(config)?;
    store.delete_database(name)?;
    println!("✓ Database {name} deleted");
    Ok(())
}

/// Lists databases on disk.
pub fn list(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let store = Store::open(config)?;
    let names = store.list_databases_on_disk()?;
    if names.is_empty() {
        println!("No databases in {:?}", store.config().data_dir);
    }
    for name in names {
        println!("{name}");
    }
    Ok(())
}

/// Shows the tables of a database.
pub fn inspect(
    config: Config,
    name: &str,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = Store::open(config)?;
    let result = InspectResult::from(&store.database(name)?);

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    println!("Database {}", result.name);
    println!("  Created: {}", format_timestamp(result.created_at));
    println!("  Updated: {}", format_timestamp(result.updated_at));
    for table in &result.tables {
        println!();
        println!("  Table {} ({} rows)", table.name, table.row_count);
        for column in &table.columns {
            println!("    {column}");
        }
        if !table.primary_key.is_empty() {
            println!("    Primary key: {}", table.primary_key.join(", "));
        }
        if !table.indexes.is_empty() {
            println!("    Indexes: {}", table.indexes.join(", "));
        }
    }
    Ok(())
}
