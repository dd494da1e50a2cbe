//! Backups command implementation.

use super::format_timestamp;
use super::inspect::list_backups;
use std::path::Path;

/// Lists periodic backups, oldest first.
pub fn run(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let backups = list_backups(path)?;
    if backups.is_empty() {
        println!("No backups in {:?}", path);
        return Ok(());
    }

    println!("{} backup(s) in {:?}", backups.len(), path);
    for backup in &backups {
        println!();
        println!("  Path: {:?}", backup.path);
        println!("  Created: {}", format_timestamp(backup.timestamp));
        println!("  Records: {}", backup.record_count);
        println!("  Size: {} bytes", backup.size);
    }

    Ok(())
}
