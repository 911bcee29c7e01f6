//! Input validators shared by every service.
//!
//! Each validator returns `Error::Validation` with a message that names the
//! offending value.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::{Error, Result};

#[allow(clippy::expect_used)]
static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9.!#$%&'*+/=?^_`{|}~-]+@[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?)+$")
        .expect("static regex is valid")
});

#[allow(clippy::expect_used)]
static PHONE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\+[1-9][0-9]{6,14}$").expect("static regex is valid"));

#[allow(clippy::expect_used)]
static COUNTRY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z]{2}$").expect("static regex is valid"));

#[allow(clippy::expect_used)]
static LANGUAGE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z]{2,3}$").expect("static regex is valid"));

#[allow(clippy::expect_used)]
static LABEL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9][a-z0-9-]{1,62}$").expect("static regex is valid"));

/// Minimum accepted password length, in characters.
pub const MIN_PASSWORD_LEN: usize = 8;

/// Longest accepted domain name.
const MAX_DOMAIN_LEN: usize = 253;

pub fn validate_email(email: &str) -> Result<()> {
    if email.len() > 254 || !EMAIL_RE.is_match(email) {
        return Err(Error::Validation(format!("invalid email (email = {email})")));
    }
    Ok(())
}

/// E.164: a leading `+` and up to 15 digits.
pub fn validate_phone_number(phone: &str) -> Result<()> {
    if !PHONE_RE.is_match(phone) {
        return Err(Error::Validation(format!(
            "invalid phone number (phone number = {phone})"
        )));
    }
    Ok(())
}

/// ISO 3166-1 alpha-2, upper case.
pub fn validate_country(country: &str) -> Result<()> {
    if !COUNTRY_RE.is_match(country) {
        return Err(Error::Validation(format!("invalid country code (country = {country})")));
    }
    Ok(())
}

/// ISO 639-1 or 639-2/3, lower case.
pub fn validate_language(language: &str) -> Result<()> {
    if !LANGUAGE_RE.is_match(language) {
        return Err(Error::Validation(format!(
            "invalid language code (language = {language})"
        )));
    }
    Ok(())
}

pub fn validate_password(password: &str) -> Result<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(Error::Validation(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

/// A node or warden label: lower-case alphanumerics and hyphens, 2 to 63
/// characters, no leading or trailing hyphen.
pub fn validate_label(label: &str) -> Result<()> {
    if !LABEL_RE.is_match(label) || label.ends_with('-') {
        return Err(Error::Validation(format!("invalid label (label = {label})")));
    }
    Ok(())
}

/// Dot-separated labels; at least two of them.
pub fn validate_domain_name(domain: &str) -> Result<()> {
    let invalid = || Error::Validation(format!("invalid domain name (domain name = {domain})"));
    if domain.len() > MAX_DOMAIN_LEN {
        return Err(invalid());
    }
    let parts: Vec<&str> = domain.split('.').collect();
    if parts.len() < 2 {
        return Err(invalid());
    }
    for part in parts {
        if part.is_empty()
            || part.len() > 63
            || part.starts_with('-')
            || part.ends_with('-')
            || !part
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        {
            return Err(invalid());
        }
    }
    Ok(())
}

/// Reject the first value that appears twice in `values`.
pub fn ensure_distinct<'a>(values: impl IntoIterator<Item = &'a str>, what: &str) -> Result<()> {
    let mut seen = std::collections::HashSet::new();
    for value in values {
        if !seen.insert(value) {
            return Err(Error::Validation(format!("duplicate {what} (value = {value})")));
        }
    }
    Ok(())
}
