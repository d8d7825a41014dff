//! Registration input checks: username shape, email shape, password
//! strength. Messages are surfaced verbatim to the caller.

use regex::Regex;
use std::sync::OnceLock;

pub const MIN_USERNAME_LEN: usize = 3;
pub const MIN_PASSWORD_LEN: usize = 8;
pub const MAX_PASSWORD_LEN: usize = 128;

const SPECIAL_CHARS: &str = "!@#$%^&*(),.?\":{}|<>";

/// Common weak substrings, rejected case-insensitively.
const WEAK_SUBSTRINGS: &[&str] = &[
    "password", "123456", "qwerty", "admin", "login", "welcome", "letmein", "monkey", "dragon",
    "master",
];

fn email_regex() -> &'static Regex {
    static EMAIL_RE: OnceLock<Regex> = OnceLock::new();
    EMAIL_RE.get_or_init(|| Regex::new(r"^[^@]+@[^@]+\.[^@]+$").expect("static email regex"))
}

pub fn validate_username(username: &str) -> Result<(), String> {
    if username.len() < MIN_USERNAME_LEN {
        return Err(format!(
            "Username must be at least {MIN_USERNAME_LEN} characters long"
        ));
    }

    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(
            "Username can only contain letters, numbers, underscore, and dash".to_string(),
        );
    }

    Ok(())
}

pub fn validate_email(email: &str) -> Result<(), String> {
    if email.is_empty() || !email_regex().is_match(email) {
        return Err("Please enter a valid email address".to_string());
    }

    Ok(())
}

pub fn validate_password_strength(password: &str) -> Result<(), String> {
    if password.len() < MIN_PASSWORD_LEN {
        return Err(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters long"
        ));
    }

    if password.len() > MAX_PASSWORD_LEN {
        return Err(format!(
            "Password must be at most {MAX_PASSWORD_LEN} characters"
        ));
    }

    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        return Err("Password must contain at least one uppercase letter".to_string());
    }

    if !password.chars().any(|c| c.is_ascii_lowercase()) {
        return Err("Password must contain at least one lowercase letter".to_string());
    }

    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err("Password must contain at least one number".to_string());
    }

    if !password.chars().any(|c| SPECIAL_CHARS.contains(c)) {
        return Err("Password must contain at least one special character".to_string());
    }

    let lowered = password.to_lowercase();
    for weak in WEAK_SUBSTRINGS {
        if lowered.contains(weak) {
            return Err(format!("Password cannot contain common words like '{weak}'"));
        }
    }

    Ok(())
}
