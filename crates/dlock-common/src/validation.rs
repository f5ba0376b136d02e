//! Lock argument validation
//!
//! Checks shared by every backend before any store round trip.

use std::time::Duration;

use crate::error::{DLockError, Result};

/// Maximum length of the name, lock_resource and host columns
pub const MAX_COLUMN_LENGTH: usize = 64;

/// Validate a lock key
///
/// A key must not be empty.
pub fn validate_lock_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(DLockError::IllegalArgument("lock key is null".to_string()));
    }
    Ok(())
}

/// Validate a ttl for backends that cannot express an unbounded lock
pub fn validate_ttl(ttl: Duration) -> Result<()> {
    if ttl.is_zero() {
        return Err(DLockError::IllegalArgument(
            "expiration must be positive".to_string(),
        ));
    }
    Ok(())
}

/// Validate that a value fits a lock table column
pub fn validate_column_width(field_name: &str, value: &str) -> Result<()> {
    let len = value.chars().count();
    if len > MAX_COLUMN_LENGTH {
        return Err(DLockError::IllegalArgument(format!(
            "{} is too long: {} > {}",
            field_name, len, MAX_COLUMN_LENGTH
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_validate_lock_key() {
        assert!(validate_lock_key("job_id").is_ok());
        let err = validate_lock_key("").unwrap_err();
        assert_eq!(err.to_string(), "caused: lock key is null");
    }

    #[test]
    fn test_validate_ttl() {
        assert!(validate_ttl(Duration::from_secs(300)).is_ok());
        assert!(validate_ttl(Duration::from_millis(1)).is_ok());
        assert!(validate_ttl(Duration::ZERO).is_err());
    }

    #[test]
    fn test_validate_column_width_boundary() {
        let exact = "a".repeat(MAX_COLUMN_LENGTH);
        assert!(validate_column_width("name", &exact).is_ok());

        let over = "a".repeat(MAX_COLUMN_LENGTH + 1);
        let err = validate_column_width("name", &over).unwrap_err();
        assert_eq!(err.to_string(), "caused: name is too long: 65 > 64");
    }

    #[test]
    fn test_validate_column_width_counts_chars() {
        // 64 multi-byte characters still fit a utf8mb4 varchar(64)
        let wide = "锁".repeat(MAX_COLUMN_LENGTH);
        assert!(validate_column_width("name", &wide).is_ok());
    }

    proptest! {
        #[test]
        fn non_empty_keys_are_accepted(key in "[a-zA-Z0-9_.:-]{1,128}") {
            prop_assert!(validate_lock_key(&key).is_ok());
        }

        #[test]
        fn width_check_matches_char_count(value in "\\PC{0,100}") {
            let fits = value.chars().count() <= MAX_COLUMN_LENGTH;
            prop_assert_eq!(validate_column_width("host", &value).is_ok(), fits);
        }
    }
}
