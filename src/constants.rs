//! Application constants for Castkeeper
//!
//! This module centralizes all constants used throughout the application,
//! organized by functional domain for maintainability and clarity.

use std::time::Duration;

/// HTTP client configuration constants
pub mod http {
    use super::Duration;

    /// Default user agent for all HTTP requests
    pub const USER_AGENT: &str = "Castkeeper/0.1.0 (Podcast Archiver)";

    /// Default HTTP request timeout (enclosures can be large)
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

    /// Connection establishment timeout
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

    /// Connection pool idle timeout
    pub const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

    /// TCP keep-alive probe interval
    pub const TCP_KEEPALIVE: Duration = Duration::from_secs(30);

    /// Maximum number of redirects to follow
    pub const MAX_REDIRECTS: usize = 10;
}

/// File operation constants
pub mod files {
    /// Prefix for in-flight download temp files
    pub const TEMP_FILE_PREFIX: &str = ".castkeeper-";

    /// Temporary file suffix for atomic operations
    pub const TEMP_FILE_SUFFIX: &str = ".tmp";

    /// Hidden image directory inside active and archive directories
    pub const IMAGE_DIR: &str = ".images";

    /// Default XML cache subdirectory inside a feed directory
    pub const XML_DIR: &str = ".xml";

    /// Default archive subdirectory inside the media root
    pub const ARCHIVE_DIR: &str = "archive";

    /// Extension for cached feed documents
    pub const XML_EXTENSION: &str = "xml";

    /// Timestamp format embedded in cached feed document names
    pub const XML_TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%S";

    /// Extension used for image files when the URL carries none
    pub const DEFAULT_IMAGE_EXTENSION: &str = "jpg";
}

/// Filename template constants
pub mod filenames {
    /// Collision suffix letters, tried in order
    pub const COLLISION_SUFFIXES: [char; 12] =
        ['A', 'B', 'C', 'D', 'E', 'F', 'G', 'H', 'I', 'J', 'K', 'L'];

    /// Date format used for `#date#` and placeholder fallbacks
    pub const DATE_FORMAT: &str = "%Y%m%d";

    /// Rendering of the date when an item has no publication time
    pub const MISSING_DATE: &str = "00000000";

    /// Default replacement for characters not allowed in filenames
    pub const DEFAULT_REPLACEMENT: char = '_';

    /// Default maximum filename length in bytes
    pub const DEFAULT_MAX_LENGTH: usize = 200;

    /// Default zero-pad width for `#episode#` and `#count#`
    pub const DEFAULT_EPISODE_PAD: usize = 2;

    /// Extension used when neither the URL nor the MIME type names one
    pub const DEFAULT_EXTENSION: &str = "mp3";

    /// Number of hash characters used in placeholder filenames
    pub const PLACEHOLDER_HASH_CHARS: usize = 12;
}

/// Update pipeline constants
pub mod update {
    /// Consecutive already-seen items before the parser stops reading
    pub const DEFAULT_MAX_DUP_CHECKS: usize = 3;

    /// Raw feed documents kept per feed
    pub const DEFAULT_XML_FILES_RETAINED: usize = 5;
}

/// Persistence constants
pub mod store {
    /// Default database file name
    pub const DATABASE_FILE_NAME: &str = "castkeeper.db";

    /// Application directory name under the platform data/config dirs
    pub const APP_DIR_NAME: &str = "castkeeper";

    /// Default media directory name under the application data directory
    pub const MEDIA_DIR_NAME: &str = "media";
}

/// Logging and debugging constants
pub mod logging {
    /// Default log level
    pub const DEFAULT_LOG_LEVEL: &str = "warn";
}

// Re-export commonly used constants for convenience
pub use files::{IMAGE_DIR, TEMP_FILE_SUFFIX};
pub use filenames::COLLISION_SUFFIXES;
pub use http::{DEFAULT_TIMEOUT as HTTP_TIMEOUT, USER_AGENT};
pub use update::DEFAULT_MAX_DUP_CHECKS;
