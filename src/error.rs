//! Error types for the log harvester.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for harvester operations.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O errors when reading log files or listing directories.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Storage errors from the SQLite layer.
    #[error("Storage error: {0}")]
    Storage(#[from] sqlx::Error),

    /// The watched log directory is missing or unreadable.
    #[error("Log directory unavailable: {path}")]
    DirectoryUnavailable { path: PathBuf },

    /// A stream's backing file is missing or unreadable this cycle.
    #[error("Log file unavailable: {path}")]
    FileUnavailable { path: PathBuf },

    /// A stored pattern failed to compile as a regex.
    #[error("Pattern '{name}' failed to compile: {source}")]
    PatternCompile {
        name: String,
        #[source]
        source: regex::Error,
    },

    /// The mandatory leading timestamp capture could not be parsed.
    #[error("Timestamp '{value}' did not parse: {source}")]
    TimestampParse {
        value: String,
        #[source]
        source: chrono::ParseError,
    },

    /// Pattern or field serialization errors.
    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Configuration file errors.
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl Error {
    /// Whether this error must terminate the main loop.
    ///
    /// Storage errors mean the persistence layer can no longer be trusted;
    /// everything else is contained within the current cycle.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Storage(_))
    }
}

/// A convenient Result type for harvester operations.
pub type Result<T> = std::result::Result<T, Error>;
