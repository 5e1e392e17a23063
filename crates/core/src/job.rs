//! Pure validation rules for job submissions.
//!
//! Applied before any row is written: a submission that fails here is
//! rejected synchronously and never enqueued.

use serde_json::Value;

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Maximum length of an operation `group` or `name` identifier.
const MAX_OPERATION_LEN: usize = 64;

/// Maximum length of a callback URL.
const MAX_CALLBACK_URL_LEN: usize = 2048;

/// Maximum number of caller-supplied webhook headers.
const MAX_CALLBACK_HEADERS: usize = 16;

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate one operation identifier field (`group` or `name`).
///
/// Rules:
/// - Must not be empty.
/// - Must not exceed `MAX_OPERATION_LEN` characters.
/// - Must contain only alphanumeric, hyphen, underscore, or dot characters.
pub fn validate_operation_field(field: &'static str, value: &str) -> Result<(), CoreError> {
    if value.is_empty() {
        return Err(CoreError::Validation(format!(
            "Operation {field} must not be empty"
        )));
    }
    if value.len() > MAX_OPERATION_LEN {
        return Err(CoreError::Validation(format!(
            "Operation {field} must not exceed {MAX_OPERATION_LEN} characters"
        )));
    }
    if !value
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_' || c == '.')
    {
        return Err(CoreError::Validation(format!(
            "Operation {field} may only contain alphanumeric, hyphen, underscore, or dot characters"
        )));
    }
    Ok(())
}

/// Validate a callback URL.
///
/// Rules:
/// - Must use an `http://` or `https://` scheme.
/// - Must not exceed `MAX_CALLBACK_URL_LEN` characters.
pub fn validate_callback_url(url: &str) -> Result<(), CoreError> {
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(CoreError::Validation(
            "Callback URL must use an http:// or https:// scheme".to_string(),
        ));
    }
    if url.len() > MAX_CALLBACK_URL_LEN {
        return Err(CoreError::Validation(format!(
            "Callback URL must not exceed {MAX_CALLBACK_URL_LEN} characters"
        )));
    }
    Ok(())
}

/// Validate caller-supplied webhook headers.
///
/// Rules:
/// - Must be a JSON object.
/// - At most `MAX_CALLBACK_HEADERS` entries, every value a string.
pub fn validate_callback_headers(headers: &Value) -> Result<(), CoreError> {
    let map = headers.as_object().ok_or_else(|| {
        CoreError::Validation("Callback headers must be a JSON object".to_string())
    })?;
    if map.len() > MAX_CALLBACK_HEADERS {
        return Err(CoreError::Validation(format!(
            "At most {MAX_CALLBACK_HEADERS} callback headers are allowed"
        )));
    }
    for (name, value) in map {
        if !value.is_string() {
            return Err(CoreError::Validation(format!(
                "Callback header \"{name}\" must have a string value"
            )));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
