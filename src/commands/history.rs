/// `bucketcam history` command implementation
///
/// Reads the storage logs and reports, per record, whether the stored image
/// is still on disk unchanged, was overwritten, or was evicted.
use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Serialize;
use tracing::warn;

use super::load_config;
use crate::cli::{HistoryArgs, OutputFormat};
use crate::storage::{list_log_files, LogReader, LogRecord, RecordStatus, StatusChecker};

#[derive(Debug, Serialize)]
struct HistoryEntry {
    #[serde(flatten)]
    record: LogRecord,
    status: RecordStatus,
}

#[derive(Debug, Default)]
struct Summary {
    exact: usize,
    replaced: usize,
    missing: usize,
    malformed: usize,
}

pub fn history(args: HistoryArgs) -> Result<()> {
    let config = load_config(&args.common)?;
    let root = config.storage.root();

    let date = args
        .date
        .as_deref()
        .map(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d"))
        .transpose()
        .context("Invalid --date, expected YYYY-MM-DD")?;

    let logs: Vec<_> = list_log_files(&root)?
        .into_iter()
        .filter(|(day, _)| date.is_none_or(|d| d == *day))
        .collect();

    let mut checker = StatusChecker::new(&root);
    let mut entries = Vec::new();
    let mut summary = Summary::default();

    for (_, path) in logs {
        let reader = LogReader::open(path)?;
        for result in reader.records()? {
            let record = match result {
                Ok(record) => record,
                Err(e) => {
                    warn!(
                        log = %reader.path().display(),
                        error = %e,
                        "Skipping malformed log line"
                    );
                    summary.malformed += 1;
                    continue;
                }
            };

            let status = checker.check(&record)?;
            match status {
                RecordStatus::Exact => summary.exact += 1,
                RecordStatus::Replaced => summary.replaced += 1,
                RecordStatus::Missing => summary.missing += 1,
            }
            entries.push(HistoryEntry { record, status });
        }
    }

    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&entries)?),
        OutputFormat::Text => {
            if entries.is_empty() {
                println!("No stored images logged.");
                return Ok(());
            }

            for entry in &entries {
                println!(
                    "{}  {:8}  {}",
                    entry.record.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    entry.status.as_str(),
                    entry.record.leaf_path.display()
                );
            }
            println!();
            println!(
                "{} records: {} exact, {} replaced, {} missing",
                entries.len(),
                summary.exact,
                summary.replaced,
                summary.missing
            );
            if summary.malformed > 0 {
                println!("{} malformed lines skipped", summary.malformed);
            }
        }
    }

    Ok(())
}
