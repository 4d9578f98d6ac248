//! Validation of WordPress REST API parameters
//!
//! Everything here runs before a request is built; a failure never reaches
//! the network layer.

use dispatch_core::Error;
use serde_json::Value;

/// Maximum post/page title length (WordPress default column width)
pub const MAX_TITLE_LENGTH: usize = 255;

/// Maximum `per_page` accepted by the WordPress REST API
pub const MAX_PER_PAGE: u32 = 100;

/// Maximum search query length
pub const MAX_SEARCH_LENGTH: usize = 200;

/// Valid values for a post status field
pub const VALID_POST_STATUSES: [&str; 6] =
    ["publish", "draft", "pending", "private", "future", "trash"];

/// A resource id must be a positive integer.
pub fn validate_id(kind: &str, id: u64) -> Result<(), Error> {
    if id == 0 {
        return Err(Error::Validation(format!(
            "{kind} id must be a positive integer"
        )));
    }
    Ok(())
}

/// A title must be non-blank and fit the upstream column.
pub fn validate_title(title: &str) -> Result<(), Error> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return Err(Error::Validation("title must not be empty".to_string()));
    }
    if trimmed.chars().count() > MAX_TITLE_LENGTH {
        return Err(Error::Validation(format!(
            "title is too long (maximum {MAX_TITLE_LENGTH} characters)"
        )));
    }
    Ok(())
}

/// A status must be one of the enumerated post statuses.
pub fn validate_status(status: &str) -> Result<String, Error> {
    let normalized = status.trim().to_lowercase();
    if !VALID_POST_STATUSES.contains(&normalized.as_str()) {
        return Err(Error::Validation(format!(
            "invalid post status {status:?}; valid values: {}",
            VALID_POST_STATUSES.join(", ")
        )));
    }
    Ok(normalized)
}

/// `per_page` must be within 1..=[`MAX_PER_PAGE`].
pub fn validate_per_page(per_page: u32) -> Result<(), Error> {
    if per_page == 0 {
        return Err(Error::Validation(
            "per_page must be a positive integer".to_string(),
        ));
    }
    if per_page > MAX_PER_PAGE {
        return Err(Error::Validation(format!(
            "per_page must be at most {MAX_PER_PAGE}, got {per_page}"
        )));
    }
    Ok(())
}

/// Page numbers start at 1.
pub fn validate_page(page: u32) -> Result<(), Error> {
    if page == 0 {
        return Err(Error::Validation("page must be at least 1".to_string()));
    }
    Ok(())
}

/// Trim a search query; blank queries are dropped rather than sent.
pub fn validate_search(search: &str) -> Result<Option<String>, Error> {
    let trimmed = search.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    if trimmed.chars().count() > MAX_SEARCH_LENGTH {
        return Err(Error::Validation(format!(
            "search query is too long (maximum {MAX_SEARCH_LENGTH} characters)"
        )));
    }
    Ok(Some(trimmed.to_string()))
}

/// Normalize a category/tag id field into a list of positive ids.
///
/// Accepts a single number, a numeric string, or an array of either; this is
/// the shape callers hand through from tool parameters.
pub fn normalize_id_list(kind: &str, value: &Value) -> Result<Vec<u64>, Error> {
    fn single(kind: &str, value: &Value) -> Result<u64, Error> {
        let id = match value {
            Value::Number(number) => number.as_u64(),
            Value::String(text) => text.trim().parse::<u64>().ok(),
            _ => None,
        }
        .ok_or_else(|| Error::Validation(format!("{kind} id must be an integer: {value}")))?;

        if id == 0 {
            return Err(Error::Validation(format!(
                "{kind} id must be a positive integer"
            )));
        }
        Ok(id)
    }

    match value {
        Value::Null => Ok(Vec::new()),
        Value::Array(entries) => entries.iter().map(|entry| single(kind, entry)).collect(),
        other => Ok(vec![single(kind, other)?]),
    }
}
