use crate::error::{AppError, AppResult};
use regex::Regex;

/// Validates E.164 format: leading +, up to 15 digits.
pub fn validate_phone_number(phone_number: &str) -> AppResult<()> {
    let phone_regex = Regex::new(r"^\+[1-9]\d{7,14}$").unwrap();

    if !phone_regex.is_match(phone_number) {
        return Err(AppError::ValidationError(
            "Phone number must be in E.164 format (+15550001111)".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_phone_number() {
        assert!(validate_phone_number("+15550001111").is_ok());
        assert!(validate_phone_number("+4915112345678").is_ok());
        assert!(validate_phone_number("15550001111").is_err());
        assert!(validate_phone_number("+0550001111").is_err());
        assert!(validate_phone_number("+1555").is_err());
        assert!(validate_phone_number("+1555000111122223333").is_err());
        assert!(validate_phone_number("+1555000111a").is_err());
    }
}
