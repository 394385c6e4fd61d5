//! Error types for Castkeeper
//!
//! This module defines error types for all components of the application.
//! Errors are grouped by domain so that passes can decide which failures are
//! item-level (recorded and skipped) and which abort the run.

use std::path::PathBuf;
use thiserror::Error;

/// Feed document parsing errors
#[derive(Error, Debug)]
pub enum ParseError {
    /// Underlying XML reader failure
    #[error("XML parsing failed at byte {position}: {source}")]
    Xml {
        position: usize,
        #[source]
        source: quick_xml::Error,
    },

    /// Document has no RSS channel element
    #[error("Feed document has no <channel> element")]
    MissingChannel,

    /// The caller's strategy decided the feed has not advanced
    #[error("Parsing cancelled: {reason}")]
    Cancelled { reason: String },

    /// Enclosure or link URL could not be parsed
    #[error("Invalid URL: {url} - {reason}")]
    InvalidUrl { url: String, reason: String },

    /// Item carries no enclosure to download
    #[error("Item '{title}' has no enclosure")]
    MissingEnclosure { title: String },

    /// Stored identity hash is not valid base64url SHA-1
    #[error("Invalid identity hash: {hash}")]
    InvalidHash { hash: String },
}

impl ParseError {
    /// Whether this is the non-error cancellation condition
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ParseError::Cancelled { .. })
    }
}

/// Filename template errors
#[derive(Error, Debug)]
pub enum FilenameError {
    /// Every collision suffix letter is already in use
    #[error("Filename collision suffixes exhausted for {filename}")]
    SuffixExhausted { filename: String },

    /// The feed's title regex does not compile
    #[error("Invalid title regex '{pattern}': {source}")]
    InvalidRegex {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// Rendering produced nothing usable
    #[error("Filename template '{template}' rendered an empty name")]
    EmptyResult { template: String },

    /// Enclosure URL could not be used to derive a name
    #[error("Cannot derive filename from URL: {url}")]
    InvalidUrl { url: String },
}

/// Download and HTTP client errors
#[derive(Error, Debug)]
pub enum DownloadError {
    /// HTTP request error
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// I/O error during file operations
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid URL provided
    #[error("Invalid URL: {url} - {error}")]
    InvalidUrl { url: String, error: String },

    /// Server returned error status
    #[error("Server error: HTTP {status} for {url}")]
    ServerError { status: u16, url: String },

    /// Atomic file operation failed
    #[error("Atomic file operation failed: could not rename {temp_path} to {final_path}")]
    AtomicOperationFailed {
        temp_path: PathBuf,
        final_path: PathBuf,
    },
}

/// Persistence errors
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite driver failure
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Raw XML metadata could not be (de)serialized
    #[error("Metadata serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O failure preparing the database location
    #[error("Database I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored data violates an invariant
    #[error("Stored data is corrupt: {reason}")]
    Corrupt { reason: String },

    /// A schema migration did not apply
    #[error("Schema migration to version {version} failed: {reason}")]
    MigrationFailed { version: u32, reason: String },

    /// Record expected to exist was not found
    #[error("Record not found: {what}")]
    NotFound { what: String },
}

/// Archive pass errors
#[derive(Error, Debug)]
pub enum ArchiveError {
    /// An item marked downloaded has no file in the active directory
    #[error("Expected file is missing: {path}")]
    MissingFile { path: PathBuf },

    /// Relocating a file failed
    #[error("Failed to move {from} to {to}: {source}")]
    MoveFailed {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The per-year snapshot could not be written
    #[error("Failed to write archive snapshot {path}: {reason}")]
    SnapshotFailed { path: PathBuf, reason: String },
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    NotFound { path: PathBuf },

    /// Configuration file could not be read
    #[error("Failed to read configuration file {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Invalid configuration format
    #[error("Invalid configuration format: {0}")]
    InvalidFormat(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration value for {field}: {value}. {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    /// Configuration validation failed
    #[error("Configuration validation failed: {errors:?}")]
    ValidationFailed { errors: Vec<String> },
}

/// Top-level application error that can represent any error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Parse error
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// Filename error
    #[error(transparent)]
    Filename(#[from] FilenameError),

    /// Download error
    #[error(transparent)]
    Download(#[from] DownloadError),

    /// Store error
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Archive error
    #[error(transparent)]
    Archive(#[from] ArchiveError),

    /// Configuration error
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Generic I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Generic application error with context
    #[error("Application error: {message}")]
    Generic { message: String },
}

impl AppError {
    /// Create a generic application error with a message
    pub fn generic(message: impl Into<String>) -> Self {
        Self::Generic {
            message: message.into(),
        }
    }

    /// Check if the error only affects the current item or run and a
    /// later invocation may succeed
    pub fn is_recoverable(&self) -> bool {
        match self {
            AppError::Download(DownloadError::Http(_))
            | AppError::Download(DownloadError::ServerError { .. })
            | AppError::Download(DownloadError::Io(_))
            | AppError::Download(DownloadError::AtomicOperationFailed { .. })
            | AppError::Parse(ParseError::Cancelled { .. })
            | AppError::Parse(ParseError::Xml { .. })
            | AppError::Archive(ArchiveError::MoveFailed { .. }) => true,

            AppError::Config(_)
            | AppError::Store(StoreError::Corrupt { .. })
            | AppError::Store(StoreError::MigrationFailed { .. })
            | AppError::Filename(FilenameError::SuffixExhausted { .. }) => false,

            _ => false,
        }
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            AppError::Parse(_) => "parse",
            AppError::Filename(_) => "filename",
            AppError::Download(_) => "download",
            AppError::Store(_) => "store",
            AppError::Archive(_) => "archive",
            AppError::Config(_) => "config",
            AppError::Io(_) => "io",
            AppError::Generic { .. } => "generic",
        }
    }
}

/// Failure confined to one item, image or year of a pass
///
/// Passes collect these and keep going; the CLI reports them together.
#[derive(Error, Debug)]
#[error("{key}: {error}")]
pub struct ItemFailure {
    /// Item label, filename or year the failure belongs to
    pub key: String,
    #[source]
    pub error: AppError,
}

impl ItemFailure {
    pub fn new(key: impl Into<String>, error: impl Into<AppError>) -> Self {
        Self {
            key: key.into(),
            error: error.into(),
        }
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, AppError>;

/// Parse result type alias
pub type ParseResult<T> = std::result::Result<T, ParseError>;

/// Filename result type alias
pub type FilenameResult<T> = std::result::Result<T, FilenameError>;

/// Download result type alias
pub type DownloadResult<T> = std::result::Result<T, DownloadError>;

/// Store result type alias
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Archive result type alias
pub type ArchiveResult<T> = std::result::Result<T, ArchiveError>;

/// Configuration result type alias
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancellation_is_distinguished() {
        let cancelled = ParseError::Cancelled {
            reason: "build date unchanged".to_string(),
        };
        assert!(cancelled.is_cancelled());
        assert!(!ParseError::MissingChannel.is_cancelled());
    }

    #[test]
    fn test_error_categories() {
        let exhausted = AppError::Filename(FilenameError::SuffixExhausted {
            filename: "foo.mp3".to_string(),
        });
        assert_eq!(exhausted.category(), "filename");
        assert!(!exhausted.is_recoverable());

        let server = AppError::Download(DownloadError::ServerError {
            status: 502,
            url: "https://example.com/a.mp3".to_string(),
        });
        assert_eq!(server.category(), "download");
        assert!(server.is_recoverable());
    }

    #[test]
    fn test_item_failure_display() {
        let failure = ItemFailure::new(
            "Episode 1",
            DownloadError::ServerError {
                status: 404,
                url: "https://example.com/1.mp3".to_string(),
            },
        );
        assert_eq!(
            failure.to_string(),
            "Episode 1: Server error: HTTP 404 for https://example.com/1.mp3"
        );
        assert_eq!(failure.error.category(), "download");
    }

    #[test]
    fn test_generic_error_message() {
        let error = AppError::generic("feed not configured");
        assert_eq!(error.to_string(), "Application error: feed not configured");
    }
}
