//! Client-side form checks. Run before any network call.

use std::sync::OnceLock;

use regex::Regex;

use crate::{domain::LoginCredentials, errors::Error, Result};

pub const MISSING_LOGIN_FIELDS: &str = "Please fill in all fields";
pub const MISSING_CODE: &str = "Please enter the verification code";
pub const MISSING_PASSWORD: &str = "Please enter your 2FA password";

/// E.164-ish: optional `+`, no leading zero, up to 15 digits.
fn phone_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\+?[1-9]\d{1,14}$").expect("valid phone regex"))
}

/// Trimmed copy of the login form, or the first problem found.
pub fn validate_login(creds: &LoginCredentials) -> Result<LoginCredentials> {
    let phone_number = creds.phone_number.trim();
    let api_id = creds.api_id.trim();
    let api_hash = creds.api_hash.trim();

    if phone_number.is_empty() || api_id.is_empty() || api_hash.is_empty() {
        return Err(Error::Validation(MISSING_LOGIN_FIELDS.to_string()));
    }

    validate_phone(phone_number)?;

    if !api_id.chars().all(|c| c.is_ascii_digit()) {
        return Err(Error::Validation("API ID must be numeric".to_string()));
    }

    Ok(LoginCredentials {
        phone_number: phone_number.to_string(),
        api_id: api_id.to_string(),
        api_hash: api_hash.to_string(),
    })
}

pub fn validate_phone(phone: &str) -> Result<()> {
    let len = phone.chars().count();
    if len < 10 {
        return Err(Error::Validation(
            "Phone number must be at least 10 digits".to_string(),
        ));
    }
    if len > 15 {
        return Err(Error::Validation(
            "Phone number must not exceed 15 digits".to_string(),
        ));
    }
    if !phone_re().is_match(phone) {
        return Err(Error::Validation("Invalid phone number format".to_string()));
    }
    Ok(())
}

pub fn validate_code(code: &str) -> Result<String> {
    let code = code.trim();
    if code.is_empty() {
        return Err(Error::Validation(MISSING_CODE.to_string()));
    }
    if !code.chars().all(|c| c.is_ascii_digit()) {
        return Err(Error::Validation(
            "Verification code must contain digits only".to_string(),
        ));
    }
    Ok(code.to_string())
}

/// Telegram cloud passwords are user-chosen; only emptiness is rejected.
pub fn validate_2fa_password(password: &str) -> Result<()> {
    if password.is_empty() {
        return Err(Error::Validation(MISSING_PASSWORD.to_string()));
    }
    Ok(())
}
