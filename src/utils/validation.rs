//! URL and input validation utilities

use crate::core::models::{AppError, AppResult};
use url::Url;

/// Validate a user supplied URL
pub fn validate_url(url: &str) -> AppResult<Url> {
    let trimmed = url.trim();
    if trimmed.is_empty() {
        return Err(AppError::Config("URL cannot be empty".to_string()));
    }
    Url::parse(trimmed).map_err(|e| AppError::Parse(format!("Invalid URL format: {}", e)))
}
