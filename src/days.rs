//! Overview of the local report cache.
//!
//! Used by `crashd days` to show what has been downloaded so far without
//! touching the network.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use std::path::Path;

use crate::config::Config;

/// Cached reports for one day.
#[derive(Debug, PartialEq, Eq)]
pub struct DayStats {
    pub day: String,
    pub files: u64,
    pub bytes: u64,
}

/// Scan `<data_dir>/<YYYY-MM-DD>/` directories, newest first.
pub fn scan_cache(data_dir: &Path) -> Result<Vec<DayStats>> {
    let mut days = Vec::new();
    if !data_dir.exists() {
        return Ok(days);
    }

    let entries = std::fs::read_dir(data_dir)
        .with_context(|| format!("Failed to read {}", data_dir.display()))?;
    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.len() != 10 || NaiveDate::parse_from_str(&name, "%Y-%m-%d").is_err() {
            continue;
        }

        let mut stats = DayStats {
            day: name,
            files: 0,
            bytes: 0,
        };
        for file in std::fs::read_dir(entry.path())? {
            let file = file?;
            let meta = file.metadata()?;
            if meta.is_file() {
                stats.files += 1;
                stats.bytes += meta.len();
            }
        }
        days.push(stats);
    }

    days.sort_by(|a, b| b.day.cmp(&a.day));
    Ok(days)
}

/// Run the `days` command.
pub fn run_days(config: &Config) -> Result<()> {
    let days = scan_cache(&config.paths.data_dir)?;

    println!("Cached reports in {}", config.paths.data_dir.display());
    println!();
    println!("  {:<12} {:>8} {:>10}", "DAY", "FILES", "SIZE");
    println!("  {}", "-".repeat(32));
    let (mut files, mut bytes) = (0, 0);
    for d in &days {
        println!("  {:<12} {:>8} {:>10}", d.day, d.files, format_bytes(d.bytes));
        files += d.files;
        bytes += d.bytes;
    }
    println!("  {}", "-".repeat(32));
    println!("  {:<12} {:>8} {:>10}", "total", files, format_bytes(bytes));
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}
