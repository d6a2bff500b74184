//! Parser for `git log --format='Commit: %H;%aI;%aE;%aN' --numstat` output.
//!
//! Lets the tool run over a captured log instead of a checkout.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset};
use thiserror::Error;

use crate::commit::{CommitRecord, FileStat};

/// `git log` format string understood by [`parse_log`].
pub const LOG_FORMAT: &str = "Commit: %H;%aI;%aE;%aN";

const HEADER_PREFIX: &str = "Commit: ";

/// Log text errors, with 1-based line numbers.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum LogParseError {
    /// A numstat line appeared before any commit header.
    #[error("line {line}: file statistics before the first commit header")]
    MissingHeader {
        /// Line number.
        line: usize,
    },

    /// A header does not have four `;`-separated fields.
    #[error("line {line}: malformed commit header: {text}")]
    MalformedHeader {
        /// Line number.
        line: usize,
        /// Offending text.
        text: String,
    },

    /// The author date is not ISO 8601.
    #[error("line {line}: invalid author date: {text}")]
    InvalidTimestamp {
        /// Line number.
        line: usize,
        /// Offending text.
        text: String,
    },

    /// A numstat line does not have three tab-separated fields.
    #[error("line {line}: malformed file statistics: {text}")]
    MalformedNumstat {
        /// Line number.
        line: usize,
        /// Offending text.
        text: String,
    },
}

struct PendingCommit {
    hash: String,
    timestamp: DateTime<FixedOffset>,
    email: String,
    name: String,
    files: Vec<FileStat>,
}

impl PendingCommit {
    fn finish(self) -> CommitRecord {
        CommitRecord::new(self.hash, self.name, &self.email, self.timestamp, &self.files)
    }
}

/// Parses log text into commit records, in input order.
pub fn parse_log(text: &str) -> Result<Vec<CommitRecord>, LogParseError> {
    let mut commits = Vec::new();
    let mut pending: Option<PendingCommit> = None;

    for (idx, raw) in text.lines().enumerate() {
        let line = idx + 1;
        let raw = raw.trim_end_matches('\r');
        if raw.trim().is_empty() {
            continue;
        }

        if let Some(header) = raw.strip_prefix(HEADER_PREFIX) {
            if let Some(done) = pending.take() {
                commits.push(done.finish());
            }
            pending = Some(parse_header(header, line)?);
            continue;
        }

        let current = pending
            .as_mut()
            .ok_or(LogParseError::MissingHeader { line })?;
        current.files.push(parse_numstat(raw, line)?);
    }

    if let Some(done) = pending {
        commits.push(done.finish());
    }
    Ok(commits)
}

/// Reads and parses a captured log file.
pub fn read_log_file(path: impl AsRef<Path>) -> Result<Vec<CommitRecord>> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read git log: {}", path.display()))?;
    parse_log(&text).with_context(|| format!("Failed to parse git log: {}", path.display()))
}

fn parse_header(header: &str, line: usize) -> Result<PendingCommit, LogParseError> {
    let malformed = || LogParseError::MalformedHeader {
        line,
        text: header.to_string(),
    };

    // the author name is last and may itself contain ';'
    let mut fields = header.splitn(4, ';');
    let (Some(hash), Some(date), Some(email), Some(name)) =
        (fields.next(), fields.next(), fields.next(), fields.next())
    else {
        return Err(malformed());
    };
    if hash.trim().is_empty() {
        return Err(malformed());
    }

    let timestamp =
        DateTime::parse_from_rfc3339(date.trim()).map_err(|_| LogParseError::InvalidTimestamp {
            line,
            text: date.to_string(),
        })?;

    Ok(PendingCommit {
        hash: hash.trim().to_string(),
        timestamp,
        email: email.trim().to_string(),
        name: name.trim().to_string(),
        files: Vec::new(),
    })
}

fn parse_numstat(raw: &str, line: usize) -> Result<FileStat, LogParseError> {
    let malformed = || LogParseError::MalformedNumstat {
        line,
        text: raw.to_string(),
    };

    let mut fields = raw.splitn(3, '\t');
    let (Some(added), Some(removed), Some(path)) = (fields.next(), fields.next(), fields.next())
    else {
        return Err(malformed());
    };
    if path.is_empty() {
        return Err(malformed());
    }

    // `-` marks binary content; the side simply has no count
    let count = |field: &str| -> Result<Option<u64>, LogParseError> {
        match field {
            "-" => Ok(None),
            n => n.parse().map(Some).map_err(|_| malformed()),
        }
    };

    Ok(FileStat {
        path: path.to_string(),
        added: count(added)?,
        removed: count(removed)?,
    })
}
