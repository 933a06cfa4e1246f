//! Configuration validation framework

use crate::{ConfigError, ConfigResult};
use regex::Regex;

/// Get URL validation regex - returns None if regex compilation fails
fn get_url_regex() -> Option<&'static Regex> {
    static URL_REGEX: std::sync::OnceLock<Option<Regex>> = std::sync::OnceLock::new();
    URL_REGEX
        .get_or_init(|| Regex::new(r"^https?://[^\s/$.?#].[^\s]*$").ok())
        .as_ref()
}

/// Trait for validating configuration values
pub trait Validate {
    /// Validate this configuration object
    ///
    /// # Errors
    /// Returns validation errors if the configuration is invalid
    fn validate(&self) -> ConfigResult<()>;
}

/// Validate a URL string
///
/// # Errors
/// Returns `ConfigError::InvalidUrl` if the URL format is invalid
pub fn validate_url(url: &str, _field_name: &str) -> ConfigResult<()> {
    get_url_regex().map_or_else(
        || {
            // Regex compilation failed, fall back to scheme check
            if url.starts_with("http://") || url.starts_with("https://") {
                Ok(())
            } else {
                Err(ConfigError::InvalidUrl {
                    url: url.to_string(),
                })
            }
        },
        |regex| {
            if regex.is_match(url) {
                Ok(())
            } else {
                Err(ConfigError::InvalidUrl {
                    url: url.to_string(),
                })
            }
        },
    )
}

/// Validate a value is within a range
///
/// # Errors
/// Returns `ConfigError::OutOfRange` if value is outside the specified range
pub fn validate_range(value: u64, min: u64, max: u64, field_name: &str) -> ConfigResult<()> {
    if value < min || value > max {
        Err(ConfigError::OutOfRange {
            field: field_name.to_string(),
            value,
            min,
            max,
        })
    } else {
        Ok(())
    }
}

/// Validate a string is not empty
///
/// # Errors
/// Returns `ConfigError::MissingField` if the string is empty or whitespace-only
pub fn validate_non_empty(value: &str, field_name: &str) -> ConfigResult<()> {
    if value.trim().is_empty() {
        Err(ConfigError::MissingField {
            field: field_name.to_string(),
        })
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_validation() {
        assert!(validate_url("http://localhost:6334", "url").is_ok());
        assert!(validate_url("qdrant:6334", "url").is_err());
    }

    #[test]
    fn range_validation() {
        assert!(validate_range(5, 1, 10, "x").is_ok());
        assert!(validate_range(0, 1, 10, "x").is_err());
    }
}
