// src/error.rs

//! Unified error handling for the railcodes library.

use std::fmt;

use thiserror::Error;

/// Result type alias for railcodes operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP client could not be built or a request failed outside the fetch path
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// TOML serialization failed
    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// Regular expression failed to compile
    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    /// CSS selector parsing failed
    #[error("Invalid selector '{selector}': {message}")]
    Selector { selector: String, message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// A table could not be turned into a grid
    #[error("Malformed table: {reason}")]
    MalformedTable { reason: String },

    /// Fetching a page failed or timed out
    #[error("Transport error for {url}: {message}")]
    Transport { url: String, message: String },

    /// No snapshot exists under the requested key
    #[error("No snapshot found for '{key}'")]
    NotFound { key: String },

    /// Neither a live collection nor a snapshot could serve the request
    #[error("Data for '{category}' is unavailable: {reason}")]
    Unavailable { category: String, reason: String },
}

impl AppError {
    /// Create a selector parsing error.
    pub fn selector(selector: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Selector {
            selector: selector.into(),
            message: message.to_string(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a malformed-table error.
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedTable {
            reason: reason.into(),
        }
    }

    /// Create a transport error for a URL.
    pub fn transport(url: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Transport {
            url: url.into(),
            message: message.to_string(),
        }
    }

    /// Create a not-found error for a snapshot key.
    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound { key: key.into() }
    }

    /// Create the terminal error raised when live and offline paths both fail.
    pub fn unavailable(category: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self::Unavailable {
            category: category.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether this error came from the network path.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::Http(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_errors_are_classified() {
        assert!(AppError::transport("http://x/", "timed out").is_transport());
        assert!(!AppError::malformed("no rows").is_transport());
        assert!(!AppError::not_found("elrs/A").is_transport());
    }

    #[test]
    fn messages_name_their_subject() {
        let err = AppError::unavailable("elrs", AppError::not_found("elrs/all"));
        assert_eq!(
            err.to_string(),
            "Data for 'elrs' is unavailable: No snapshot found for 'elrs/all'"
        );
    }
}
