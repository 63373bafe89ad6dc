//! SealDB CLI
//!
//! Command-line tools for a SealDB data directory.
//!
//! # Commands
//!
//! - `exec` - Run one statement against a database
//! - `create-db` / `drop-db` - Create or delete a database
//! - `list` - List databases in the data directory
//! - `inspect` - Show the tables of a database
//! - `backup` - Create, restore and list backups

mod commands;

use clap::{Parser, Subcommand};
use sealdb_core::{Config, DEFAULT_MAX_BACKUPS, DEFAULT_MAX_DATABASE_SIZE};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// SealDB command-line tools.
#[derive(Parser)]
#[command(name = "sealdb")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the data directory
    #[arg(global = true, short, long, env = "SEALDB_DATA_DIR", default_value = "data")]
    data_dir: PathBuf,

    /// Passphrase the data directory is sealed under
    #[arg(global = true, long, env = "SEALDB_SECRET", hide_env_values = true)]
    secret: Option<String>,

    /// Number of backups to retain
    #[arg(global = true, long, default_value_t = DEFAULT_MAX_BACKUPS)]
    max_backups: usize,

    /// Largest serialized database, in bytes
    #[arg(global = true, long, default_value_t = DEFAULT_MAX_DATABASE_SIZE)]
    max_size: u64,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one statement against a database
    Exec {
        /// Database name
        database: String,

        /// Statement text
        sql: String,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Create an empty database
    CreateDb {
        /// Database name
        name: String,
    },

    /// Delete a database and its file
    DropDb {
        /// Database name
        name: String,
    },

    /// List databases in the data directory
    List,

    /// Show the tables of a database
    Inspect {
        /// Database name
        database: String,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Backup management
    #[command(subcommand)]
    Backup(BackupCommands),

    /// Show version information
    Version,
}

#[derive(Subcommand)]
enum BackupCommands {
    /// Archive every database
    Create,

    /// Restore from a retained backup or an archive file
    Restore {
        /// Identifier of a retained backup
        #[arg(long, conflicts_with = "file", required_unless_present = "file")]
        id: Option<String>,

        /// Path to an archive file
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// List retained backups
    List,

    /// Check (and consume) a backup's one-time password
    VerifyPassword {
        /// Backup identifier
        id: String,

        /// The password shown when the backup was created
        password: String,
    },
}

impl Cli {
    fn config(&self) -> Result<Config, Box<dyn std::error::Error>> {
        let secret = self
            .secret
            .clone()
            .ok_or("Passphrase required: pass --secret or set SEALDB_SECRET")?;
        Ok(Config::new(&self.data_dir)
            .secret(secret)
            .max_backups(self.max_backups)
            .max_database_size(self.max_size))
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match &cli.command {
        Commands::Exec {
            database,
            sql,
            format,
        } => commands::exec::run(cli.config()?, database, sql, format)?,
        Commands::CreateDb { name } => commands::database::create(cli.config()?, name)?,
        Commands::DropDb { name } => commands::database::delete(cli.config()?, name)?,
        Commands::List => commands::database::list(cli.config()?)?,
        Commands::Inspect { database, format } => {
            commands::database::inspect(cli.config()?, database, format)?;
        }
        Commands::Backup(command) => {
            let config = cli.config()?;
            match command {
                BackupCommands::Create => commands::backup::create(config)?,
                BackupCommands::Restore { id, file } => {
                    commands::backup::restore(config, id.as_deref(), file.as_deref())?;
                }
                BackupCommands::List => commands::backup::list(config)?,
                BackupCommands::VerifyPassword { id, password } => {
                    commands::backup::verify_password(config, id, password)?;
                }
            }
        }
        Commands::Version => {
            println!("SealDB CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("SealDB Core v{}", sealdb_core::VERSION);
        }
    }

    Ok(())
}
