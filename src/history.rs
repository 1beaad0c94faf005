//! Flat-file latency history
//!
//! One file per UTC day (`YYYY-MM-DD.json`) holding one JSON object per
//! line. Every object carries an RFC 3339 `timestamp`. Lines that fail to
//! parse are skipped on read. Concurrent writers are not coordinated.

use chrono::{DateTime, NaiveDate, TimeDelta, Utc};
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::errors::{AppError, AppResult};

const FILE_EXTENSION: &str = "json";

/// Query window for history lookups
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    strum::EnumString,
    strum::Display,
    strum::AsRefStr,
)]
pub enum HistoryRange {
    #[strum(serialize = "1h")]
    OneHour,
    #[default]
    #[strum(serialize = "24h")]
    Day,
    #[strum(serialize = "7d")]
    Week,
    #[strum(serialize = "30d")]
    Month,
}

impl HistoryRange {
    pub fn window(&self) -> TimeDelta {
        match self {
            Self::OneHour => TimeDelta::hours(1),
            Self::Day => TimeDelta::hours(24),
            Self::Week => TimeDelta::days(7),
            Self::Month => TimeDelta::days(30),
        }
    }
}

/// Result of a history query
#[derive(Debug, Clone, Default)]
pub struct HistoryQuery {
    /// False when the history directory does not exist yet
    pub available: bool,
    /// Matching snapshots, oldest first
    pub entries: Vec<Value>,
}

#[derive(Debug, Clone)]
pub struct HistoryLog {
    dir: PathBuf,
}

impl HistoryLog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File holding snapshots taken on the UTC day of `timestamp`
    pub fn file_for(&self, timestamp: DateTime<Utc>) -> PathBuf {
        self.dir
            .join(format!("{}.{FILE_EXTENSION}", timestamp.format("%Y-%m-%d")))
    }

    /// Append one snapshot; it must serialize to an object with a valid `timestamp`
    pub async fn append<T: Serialize>(&self, snapshot: &T) -> AppResult<()> {
        let value = serde_json::to_value(snapshot)?;
        let timestamp = snapshot_timestamp(&value).ok_or_else(|| {
            AppError::validation("history snapshot must be an object with an RFC 3339 timestamp")
        })?;

        tokio::fs::create_dir_all(&self.dir).await?;

        let path = self.file_for(timestamp);
        let mut line = serde_json::to_vec(&value)?;
        line.push(b'\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        file.write_all(&line).await?;
        file.flush().await?;

        debug!(path = %path.display(), "Appended history snapshot");
        Ok(())
    }

    /// Snapshots no older than `range` relative to `now`.
    ///
    /// Future-dated snapshots have a negative age and are included.
    pub async fn query(&self, range: HistoryRange, now: DateTime<Utc>) -> AppResult<HistoryQuery> {
        let mut dir = match tokio::fs::read_dir(&self.dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(dir = %self.dir.display(), "History directory does not exist");
                return Ok(HistoryQuery::default());
            }
            Err(e) => return Err(e.into()),
        };

        let window = range.window();
        let oldest_day = (now - window).date_naive();

        let mut files = Vec::new();
        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(FILE_EXTENSION) {
                continue;
            }
            // Whole days before the window cannot hold matching snapshots
            if file_day(&path).is_some_and(|day| day < oldest_day) {
                continue;
            }
            files.push(path);
        }
        files.sort();

        let mut entries: Vec<(DateTime<Utc>, Value)> = Vec::new();
        for path in files {
            let contents = match tokio::fs::read_to_string(&path).await {
                Ok(contents) => contents,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping unreadable history file");
                    continue;
                }
            };

            let mut skipped = 0usize;
            for line in contents.lines().filter(|l| !l.trim().is_empty()) {
                let Ok(value) = serde_json::from_str::<Value>(line) else {
                    skipped += 1;
                    continue;
                };
                let Some(timestamp) = snapshot_timestamp(&value) else {
                    skipped += 1;
                    continue;
                };
                if now - timestamp <= window {
                    entries.push((timestamp, value));
                }
            }
            if skipped > 0 {
                debug!(path = %path.display(), skipped, "Skipped malformed history lines");
            }
        }

        entries.sort_by_key(|(timestamp, _)| *timestamp);
        Ok(HistoryQuery {
            available: true,
            entries: entries.into_iter().map(|(_, value)| value).collect(),
        })
    }
}

fn snapshot_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    let raw = value.as_object()?.get("timestamp")?.as_str()?;
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}

fn file_day(path: &Path) -> Option<NaiveDate> {
    let stem = path.file_stem()?.to_str()?;
    NaiveDate::parse_from_str(stem, "%Y-%m-%d").ok()
}
