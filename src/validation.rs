//! Guard clauses run before any store mutation or auth call.
//!
//! Every check returns a [`ValidationError`] whose `Display` is the message
//! shown inline next to the offending field.

use once_cell::sync::Lazy;
use regex::Regex;

pub const MIN_PASSWORD_LEN: usize = 6;

static EMAIL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\w+([\.-]?\w+)*@\w+([\.-]?\w+)*(\.\w{2,3})+$")
        .expect("hardcoded email regex is invalid")
});

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Login is required")] LoginRequired,
    #[error("Email is required")] EmailRequired,
    #[error("Invalid email format")] EmailInvalid,
    #[error("Password is required")] PasswordRequired,
    #[error("Password should be at least {min} characters long")] PasswordTooShort { min: usize },
    #[error("Comment text is required")] EmptyComment,
}

pub fn validate_email(email: &str) -> Result<(), ValidationError> {
    if email.trim().is_empty() {
        return Err(ValidationError::EmailRequired);
    }
    if !EMAIL_REGEX.is_match(email) {
        return Err(ValidationError::EmailInvalid);
    }
    Ok(())
}

/// Registration policy: required and at least [`MIN_PASSWORD_LEN`] chars.
pub fn validate_new_password(password: &str) -> Result<(), ValidationError> {
    validate_login_password(password)?;
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ValidationError::PasswordTooShort { min: MIN_PASSWORD_LEN });
    }
    Ok(())
}

/// Sign-in only checks presence; length is the backend's business.
pub fn validate_login_password(password: &str) -> Result<(), ValidationError> {
    if password.trim().is_empty() {
        return Err(ValidationError::PasswordRequired);
    }
    Ok(())
}

pub fn validate_login_name(login: &str) -> Result<(), ValidationError> {
    if login.trim().is_empty() {
        return Err(ValidationError::LoginRequired);
    }
    Ok(())
}

/// Returns the trimmed comment text.
pub fn validate_comment(text: &str) -> Result<&str, ValidationError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyComment);
    }
    Ok(trimmed)
}
