//! Authentication validator
//!
//! Username and password checks against the configured accounts.

use crate::error::AuthError;
use crate::server::config::UserCredential;

const MAX_INPUT_LENGTH: usize = 64;

/// Basic sanitation for malicious or malformed usernames/passwords.
fn is_valid_input(input: &str) -> bool {
    !input.trim().is_empty()
        && input.len() <= MAX_INPUT_LENGTH
        && !input.contains(['\r', '\n', '\0'])
}

/// Validates that `username` is a configured account.
pub fn validate_user(username: &str, users: &[UserCredential]) -> Result<(), AuthError> {
    if !is_valid_input(username) {
        return Err(AuthError::MalformedInput("Invalid username format".into()));
    }
    if username.contains(['@', '#', ',', '%']) || username.starts_with(char::is_numeric) {
        return Err(AuthError::InvalidUsername(username.to_string()));
    }

    if users.iter().any(|user| user.username == username) {
        Ok(())
    } else {
        Err(AuthError::UserNotFound(username.to_string()))
    }
}

/// Validates that `password` matches the configured password of `username`.
pub fn validate_password(
    username: &str,
    password: &str,
    users: &[UserCredential],
) -> Result<(), AuthError> {
    if !is_valid_input(password) {
        return Err(AuthError::MalformedInput("Invalid password format".into()));
    }

    match users.iter().find(|user| user.username == username) {
        Some(user) if user.password == password => Ok(()),
        Some(_) => Err(AuthError::InvalidPassword(username.to_string())),
        None => Err(AuthError::UserNotFound(username.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn users() -> Vec<UserCredential> {
        vec![UserCredential {
            username: "alice".into(),
            password: "alice123".into(),
        }]
    }

    #[test]
    fn test_validate_user() {
        assert!(validate_user("alice", &users()).is_ok());
        assert!(matches!(
            validate_user("mallory", &users()),
            Err(AuthError::UserNotFound(_))
        ));
        assert!(matches!(
            validate_user("a@b", &users()),
            Err(AuthError::InvalidUsername(_))
        ));
        assert!(matches!(
            validate_user("  ", &users()),
            Err(AuthError::MalformedInput(_))
        ));
    }

    #[test]
    fn test_validate_password() {
        assert!(validate_password("alice", "alice123", &users()).is_ok());
        assert!(matches!(
            validate_password("alice", "wrong", &users()),
            Err(AuthError::InvalidPassword(_))
        ));
        assert!(matches!(
            validate_password("alice", "bad\r\n", &users()),
            Err(AuthError::MalformedInput(_))
        ));
    }
}
