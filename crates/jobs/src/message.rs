//! Job message log entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Severity of a job log message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    Info,
    Warning,
    Error,
}

/// One entry in a job's append-only message log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobMessage {
    pub level: Level,
    pub timestamp: DateTime<Utc>,
    pub text: String,
}

impl JobMessage {
    pub fn new(level: Level, text: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            level,
            timestamp,
            text: text.into(),
        }
    }

    pub fn info(text: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self::new(Level::Info, text, timestamp)
    }

    pub fn warning(text: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self::new(Level::Warning, text, timestamp)
    }

    pub fn error(text: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self::new(Level::Error, text, timestamp)
    }
}
