use serde::Serialize;
use thiserror::Error;
use tracing::warn;

/// Failures that abort a conversion run. `Interrupted` is the cooperative
/// cancellation signal and is never reported as an error.
#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("Structure error: {0}")]
    Structure(String),
    #[error("Format error: {0}")]
    Format(String),
    #[error("Schema error: {0}")]
    Schema(String),
    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Table read error: {0}")]
    Table(String),
    #[error("Interrupted")]
    Interrupted,
}

pub type Result<T> = std::result::Result<T, ConvertError>;

impl ConvertError {
    pub fn is_interrupt(&self) -> bool {
        matches!(self, ConvertError::Interrupted)
    }

    pub fn table(e: anyhow::Error) -> Self {
        Self::Table(format!("{e:#}"))
    }
}

/// A single-record failure. Recorded, never propagated.
#[derive(Debug, Clone, Serialize)]
pub struct RecordError {
    pub stage: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl std::fmt::Display for RecordError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

#[derive(Debug, Default)]
pub struct ErrorLog {
    entries: Vec<RecordError>,
}

impl ErrorLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(
        &mut self,
        stage: &str,
        message: impl Into<String>,
        details: Option<serde_json::Value>,
    ) {
        let message = message.into();
        warn!(stage, %message, "record skipped");
        self.entries.push(RecordError {
            stage: stage.to_string(),
            message,
            details,
        });
    }

    pub fn entries(&self) -> &[RecordError] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
