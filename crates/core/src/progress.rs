//! Progress percentage rules shared by the store and its callers.

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Highest legal progress percentage.
pub const MAX_PERCENT: u8 = 100;

/// Message written when a job's progress is marked complete.
pub const COMPLETE_MESSAGE: &str = "Complete";

/// Prefix prepended to the error message when progress is marked failed.
pub const FAILED_MESSAGE_PREFIX: &str = "Failed: ";

/// Metadata key set to `true` on failure snapshots.
///
/// A failed job is deliberately reset to percent 0 with this flag, which
/// keeps it distinct from a job that never started.
pub const FAILED_METADATA_KEY: &str = "failed";

// ---------------------------------------------------------------------------
// Percent arithmetic
// ---------------------------------------------------------------------------

/// Validate a raw percent value into the canonical `0..=100` range.
pub fn validate_percent(percent: i32) -> Result<u8, CoreError> {
    if !(0..=MAX_PERCENT as i32).contains(&percent) {
        return Err(CoreError::Validation(format!(
            "Progress percent must be between 0 and {MAX_PERCENT}, got {percent}"
        )));
    }
    Ok(percent as u8)
}

/// Add `amount` to `current`, clamped to `MAX_PERCENT`.
pub fn clamp_increment(current: u8, amount: u8) -> u8 {
    (current as u16 + amount as u16).min(MAX_PERCENT as u16) as u8
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    // -- validate_percent -----------------------------------------------------

    #[test]
    fn percent_accepts_bounds() {
        assert_eq!(validate_percent(0).unwrap(), 0);
        assert_eq!(validate_percent(100).unwrap(), 100);
        assert_eq!(validate_percent(42).unwrap(), 42);
    }

    #[test]
    fn percent_rejects_negative() {
        assert!(validate_percent(-1).is_err());
    }

    #[test]
    fn percent_rejects_above_max() {
        assert!(validate_percent(101).is_err());
    }

    // -- clamp_increment ------------------------------------------------------

    #[test]
    fn increment_adds_from_zero() {
        assert_eq!(clamp_increment(0, 30), 30);
    }

    #[test]
    fn increment_clamps_at_max() {
        assert_eq!(clamp_increment(60, 60), 100);
        assert_eq!(clamp_increment(100, 1), 100);
    }
}
