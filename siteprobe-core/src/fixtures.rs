//! Email fixtures for exercising the lead form.

use regex::Regex;
use siteprobe_scanner::FormValidationOutcome;
use std::sync::LazyLock;

static EMAIL_SHAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap());

pub const VALID_EMAILS: &[&str] = &[
    "test@example.com",
    "user.name@domain.com",
    "user+label@domain.co.uk",
    "user@subdomain.domain.com",
];

pub const INVALID_EMAILS: &[&str] = &[
    "",
    "invalid-email",
    "@domain.com",
    "user@",
    "user@domain",
    "user@.com",
    "user@domain.",
    "user name@domain.com",
];

/// An address with a plus label and a dot in the local part.
pub const SPECIAL_CHARACTER_EMAIL: &str = "test.user+label@domain.com";

/// Loose client-side check used to classify fixture addresses.
pub fn validate_email(email: &str) -> FormValidationOutcome {
    if email.is_empty() {
        return FormValidationOutcome::invalid("Email is required");
    }
    if !EMAIL_SHAPE.is_match(email) {
        return FormValidationOutcome::invalid("Please enter a valid email address");
    }
    FormValidationOutcome::valid()
}

/// A unique address for submissions that must not collide with earlier runs.
pub fn generate_test_email() -> String {
    format!("test.user+{}@example.com", chrono::Utc::now().timestamp_millis())
}
