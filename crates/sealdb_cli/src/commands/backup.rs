//! Backup and restore commands.
//!
//! Backups cover every database in the data directory. Each backup gets a
//! one-time password, printed once at creation and never again.

use sealdb_core::{BackupStatus, Config, RestorationReport, Store};
use std::fs;
use std::path::Path;
use tracing::info;

use super::format_timestamp;

/// Creates a backup of every database.
pub fn create(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let store = Store::open(config)?;
    let backup = store.create_backup()?;

    println!("✓ Backup created successfully");
    println!("  Id: {}", backup.backup_id);
    println!("  Path: {:?}", backup.archive_path);
    println!("  Files: {}", backup.manifest.total_files);
    println!("  Size: {} bytes", backup.manifest.total_size);
    println!("  Password: {}", backup.password);
    println!("  (the password is shown only once)");
    for evicted in &backup.evicted {
        println!("  Evicted: {evicted}");
    }
    Ok(())
}

/// Restores from a retained backup id or an archive file.
pub fn restore(
    config: Config,
    id: Option<&str>,
    file: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = Store::open(config)?;
    let report = match (id, file) {
        (Some(id), _) => store.restore_backup_by_id(id)?,
        (None, Some(file)) => {
            info!("Restoring from {:?}", file);
            store.restore_backup(&fs::read(file)?)?
        }
        (None, None) => return Err("Either --id or --file is required".into()),
    };

    print_report(&report);
    match report.status {
        BackupStatus::Success => Ok(()),
        BackupStatus::Partial => Err("Restore completed with failures".into()),
        BackupStatus::Failed => Err("Restore failed".into()),
    }
}

/// Lists retained backups, oldest first.
pub fn list(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let store = Store::open(config)?;
    let backups = store.list_backups();
    if backups.is_empty() {
        println!("No backups");
        return Ok(());
    }
    for backup in backups {
        println!("{}", backup.backup_id);
        println!("  Created: {}", format_timestamp(backup.created_at));
        println!("  Files: {}", backup.file_count);
        println!("  Size: {} bytes", backup.total_size);
        println!(
            "  Password: {}",
            if backup.password_used { "used" } else { "unused" }
        );
    }
    Ok(())
}

/// Checks a one-time password.
pub fn verify_password(
    config: Config,
    id: &str,
    password: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = Store::open(config)?;
    if store.verify_backup_password(id, password)? {
        println!("✓ Password accepted");
        Ok(())
    } else {
        println!("✗ Password rejected");
        Err("Password verification failed".into())
    }
}

fn print_report(report: &RestorationReport) {
    let mark = match report.status {
        BackupStatus::Success => "✓",
        BackupStatus::Partial => "!",
        BackupStatus::Failed => "✗",
    };
    println!("{mark} Restoration {:?}", report.status);
    println!("  Backup: {}", report.backup_id);
    for name in &report.restored {
        println!("  Restored: {name}");
    }
    for failure in &report.failures {
        println!("  Failed: {} ({})", failure.file, failure.reason);
    }
}
