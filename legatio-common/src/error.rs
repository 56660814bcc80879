//! Shared error type for the legatio crates
//!
//! Only failures that cross a crate boundary live here. Upload transfer and
//! portal backend failures have their own types in legatio-tracker.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// SQLite pool setup or flag query failed
    #[cfg(feature = "sqlx")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Reading the config file or creating the database directory failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Bad config value, or a queue limit out of range
    #[error("Configuration error: {0}")]
    Config(String),

    /// Unknown visa type, document type or flag name
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_converts() {
        fn read_missing() -> Result<String> {
            Ok(std::fs::read_to_string("/nonexistent/legatio/config.toml")?)
        }
        assert!(matches!(read_missing(), Err(Error::Io(_))));
    }
}
