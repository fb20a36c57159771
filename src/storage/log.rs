//! Storage log
//!
//! One append-only text file per UTC day, `storage_<YYYY-MM-DD>.log`, living
//! directly under the storage root. Each successful store appends one line:
//!
//! ```text
//! 2024-05-01T12:00:00.000000Z 9f86d081...0a08 5/1.jpg
//! ```
//!
//! Fields are separated by a single space: RFC 3339 timestamp, hex SHA-256 of
//! the leaf bytes at write time, and the leaf path relative to the root.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Lines, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use tracing::debug;

use crate::logging::operations;

const LOG_PREFIX: &str = "storage_";
const LOG_SUFFIX: &str = ".log";

#[derive(Error, Debug)]
pub enum LogParseError {
    #[error("Missing {0} field")]
    MissingField(&'static str),

    #[error("Invalid timestamp: {0}")]
    Timestamp(#[from] chrono::ParseError),

    #[error("Invalid content hash: {0}")]
    Hash(String),

    #[error("Line {line}: {source}")]
    Line {
        line: usize,
        source: Box<LogParseError>,
    },

    #[error("Failed to read line {line}: {source}")]
    Io { line: usize, source: std::io::Error },
}

/// One audit record per stored leaf
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogRecord {
    pub timestamp: DateTime<Utc>,
    pub content_hash: String,
    pub leaf_path: PathBuf,
}

impl LogRecord {
    pub fn new(content_hash: String, leaf_path: PathBuf) -> Self {
        Self {
            timestamp: Utc::now(),
            content_hash,
            leaf_path,
        }
    }

    /// UTC calendar day the record belongs to
    pub fn date(&self) -> NaiveDate {
        self.timestamp.date_naive()
    }
}

impl fmt::Display for LogRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}",
            self.timestamp.to_rfc3339_opts(SecondsFormat::Micros, true),
            self.content_hash,
            self.leaf_path.display()
        )
    }
}

impl FromStr for LogRecord {
    type Err = LogParseError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut fields = line.trim_end_matches(['\r', '\n']).splitn(3, ' ');

        let timestamp = fields
            .next()
            .filter(|f| !f.is_empty())
            .ok_or(LogParseError::MissingField("timestamp"))?;
        let content_hash = fields
            .next()
            .filter(|f| !f.is_empty())
            .ok_or(LogParseError::MissingField("hash"))?;
        let leaf_path = fields
            .next()
            .filter(|f| !f.is_empty())
            .ok_or(LogParseError::MissingField("path"))?;

        if hex::decode(content_hash).is_err() {
            return Err(LogParseError::Hash(content_hash.to_string()));
        }

        Ok(Self {
            timestamp: DateTime::parse_from_rfc3339(timestamp)?.with_timezone(&Utc),
            content_hash: content_hash.to_ascii_lowercase(),
            leaf_path: PathBuf::from(leaf_path),
        })
    }
}

/// Hex SHA-256 of a byte slice
pub fn hash_bytes(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Hex SHA-256 of a file's current content
pub fn hash_file(path: &Path) -> Result<String> {
    let data =
        fs::read(path).with_context(|| format!("Failed to read file: {}", path.display()))?;
    Ok(hash_bytes(&data))
}

/// File name of the log for a given day
pub fn log_file_name(date: NaiveDate) -> String {
    format!("{}{}{}", LOG_PREFIX, date.format("%Y-%m-%d"), LOG_SUFFIX)
}

/// Every storage log under `root`, oldest day first
pub fn list_log_files(root: &Path) -> Result<Vec<(NaiveDate, PathBuf)>> {
    let mut logs = Vec::new();

    if !root.exists() {
        return Ok(logs);
    }

    for entry in fs::read_dir(root)
        .with_context(|| format!("Failed to read storage directory: {}", root.display()))?
    {
        let entry = entry?;
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        let Some(date) = name
            .strip_prefix(LOG_PREFIX)
            .and_then(|rest| rest.strip_suffix(LOG_SUFFIX))
            .and_then(|date| NaiveDate::parse_from_str(date, "%Y-%m-%d").ok())
        else {
            continue;
        };
        if entry.file_type()?.is_file() {
            logs.push((date, entry.path()));
        }
    }

    logs.sort();
    Ok(logs)
}

/// Appends records to the day-partitioned log files
#[derive(Debug, Clone)]
pub struct StorageLog {
    root: PathBuf,
}

impl StorageLog {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path_for(&self, date: NaiveDate) -> PathBuf {
        self.root.join(log_file_name(date))
    }

    /// Append one record. The full line is formatted first and handed to a
    /// single `write_all` on an append-mode handle, so readers never observe
    /// a partial line from this writer.
    pub fn append(&self, record: &LogRecord) -> Result<PathBuf> {
        let path = self.path_for(record.date());
        let line = format!("{}\n", record);

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open storage log: {}", path.display()))?;
        file.write_all(line.as_bytes())
            .with_context(|| format!("Failed to append to storage log: {}", path.display()))?;
        file.flush()?;

        debug!(
            operation = operations::LOG_APPEND,
            path = %path.display(),
            leaf = %record.leaf_path.display(),
            "Storage record appended"
        );
        Ok(path)
    }
}

/// Read side of a single log file
#[derive(Debug, Clone)]
pub struct LogReader {
    path: PathBuf,
}

impl LogReader {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if !path.is_file() {
            anyhow::bail!("Storage log not found: {}", path.display());
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Lazily parse the file from the start. Call again to restart.
    pub fn records(&self) -> Result<LogRecords> {
        let file = File::open(&self.path)
            .with_context(|| format!("Failed to open storage log: {}", self.path.display()))?;
        Ok(LogRecords {
            lines: BufReader::new(file).lines(),
            line: 0,
        })
    }
}

/// Iterator over parsed records. Malformed lines come out as errors and do
/// not stop the iteration. Blank lines are skipped.
pub struct LogRecords {
    lines: Lines<BufReader<File>>,
    line: usize,
}

impl Iterator for LogRecords {
    type Item = Result<LogRecord, LogParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let next = self.lines.next()?;
            self.line += 1;
            let line = self.line;

            let text = match next {
                Ok(text) => text,
                Err(source) => return Some(Err(LogParseError::Io { line, source })),
            };
            if text.trim().is_empty() {
                continue;
            }

            return Some(text.parse().map_err(|e| LogParseError::Line {
                line,
                source: Box::new(e),
            }));
        }
    }
}

/// How a logged store compares with what is on disk now
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    /// The leaf still holds the logged content
    Exact,
    /// The leaf exists but was overwritten since
    Replaced,
    /// The leaf was evicted
    Missing,
}

impl RecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::Replaced => "replaced",
            Self::Missing => "missing",
        }
    }
}

/// Classifies records against the current tree, hashing each leaf at most once
#[derive(Debug)]
pub struct StatusChecker {
    root: PathBuf,
    hashes: HashMap<PathBuf, String>,
}

impl StatusChecker {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            hashes: HashMap::new(),
        }
    }

    pub fn check(&mut self, record: &LogRecord) -> Result<RecordStatus> {
        let leaf = self.root.join(&record.leaf_path);
        if !leaf.is_file() {
            return Ok(RecordStatus::Missing);
        }

        let current = match self.hashes.get(&leaf) {
            Some(hash) => hash.clone(),
            None => {
                let hash = hash_file(&leaf)?;
                self.hashes.insert(leaf, hash.clone());
                hash
            }
        };

        if current == record.content_hash {
            Ok(RecordStatus::Exact)
        } else {
            Ok(RecordStatus::Replaced)
        }
    }
}
