//! Input rules for account fields.

pub const MAX_PASSWORD_LEN: usize = 128;

pub fn validate_username(username: &str) -> Result<(), String> {
    let len = username.chars().count();
    if !(3..=32).contains(&len) {
        return Err("username must be 3-32 characters".to_string());
    }
    if !username.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err("username may only contain letters, digits and '_'".to_string());
    }
    Ok(())
}

pub fn validate_email(email: &str) -> Result<(), String> {
    let invalid = || Err("invalid email address".to_string());

    let mut parts = email.split('@');
    let (Some(local), Some(domain), None) = (parts.next(), parts.next(), parts.next()) else {
        return invalid();
    };
    if local.is_empty() || domain.is_empty() || email.chars().any(char::is_whitespace) {
        return invalid();
    }
    // Require a dot with something on both sides.
    match domain.rfind('.') {
        Some(i) if i > 0 && i < domain.len() - 1 => Ok(()),
        _ => invalid(),
    }
}

pub fn validate_password(password: &str, min_len: usize) -> Result<(), String> {
    if password.len() < min_len {
        return Err(format!("password must be at least {} characters", min_len));
    }
    if password.len() > MAX_PASSWORD_LEN {
        return Err(format!("password must be at most {} characters", MAX_PASSWORD_LEN));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usernames() {
        assert!(validate_username("abc").is_ok());
        assert!(validate_username("user_42").is_ok());
        assert!(validate_username("ab").is_err());
        assert!(validate_username(&"a".repeat(33)).is_err());
        assert!(validate_username("has space").is_err());
        assert!(validate_username("dash-name").is_err());
    }

    #[test]
    fn test_emails() {
        assert!(validate_email("a@b.co").is_ok());
        assert!(validate_email("first.last@mail.example.org").is_ok());
        assert!(validate_email("no-at-sign").is_err());
        assert!(validate_email("two@@example.com").is_err());
        assert!(validate_email("@example.com").is_err());
        assert!(validate_email("user@localhost").is_err());
        assert!(validate_email("user@.com").is_err());
        assert!(validate_email("user@example.").is_err());
    }

    #[test]
    fn test_passwords() {
        assert!(validate_password("12345678", 8).is_ok());
        assert!(validate_password("1234567", 8).is_err());
        assert!(validate_password(&"x".repeat(129), 8).is_err());
    }
}
