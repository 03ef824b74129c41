//! Field-level validation rules for accounts.

use std::sync::OnceLock;

use regex::Regex;

use crate::error::{Error, Result};

fn account_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new("^[0-9]{12}$").expect("static pattern"))
}

/// Checks that an account ID is a string of exactly 12 digits.
pub fn validate_account_id(id: &str) -> Result<()> {
    if account_id_pattern().is_match(id) {
        Ok(())
    } else {
        Err(Error::validation(
            "account",
            "id: must be a string with 12 digits",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_ids() {
        assert!(validate_account_id("123456789012").is_ok());
        assert!(validate_account_id("000000000000").is_ok());
    }

    #[test]
    fn test_invalid_ids() {
        for id in ["", "1234", "1234567890123", "12345678901a", " 23456789012"] {
            assert!(validate_account_id(id).is_err(), "{id:?}");
        }
    }
}
