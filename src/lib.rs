//! Castkeeper Library
//!
//! A Rust library for keeping a personal podcast archive: it polls RSS feeds,
//! tracks episode identity across runs, names and downloads enclosures, and
//! moves past years into per-year archives.

pub mod app;
pub mod cli;
pub mod config;
pub mod constants;
pub mod errors;
pub mod prelude;

// Re-export commonly used types for convenience
pub use errors::{AppError, Result};

#[cfg(test)]
mod tests {
    use super::*;
    use constants::*;

    #[test]
    fn test_constants_accessible() {
        assert_eq!(COLLISION_SUFFIXES.len(), 12);
        assert!(USER_AGENT.contains("Castkeeper"));
    }

    #[test]
    fn test_error_types() {
        let parse_error = errors::ParseError::MissingChannel;
        let app_error = AppError::Parse(parse_error);

        assert_eq!(app_error.category(), "parse");
        assert!(!app_error.is_recoverable());
    }
}
