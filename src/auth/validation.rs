use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use thiserror::Error;

pub const PASSWORD_MIN_LEN: usize = 6;
pub const PASSWORD_MAX_LEN: usize = 20;
pub const TIMEOUT_RANGE: std::ops::RangeInclusive<i32> = 1..=30;
pub const NUM_TRIES_RANGE: std::ops::RangeInclusive<i32> = 1..=10;

/// Semantic validation failure tied to one form field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldError {
    RecaptchaFailure,
    RegisteredEmail,
    PasswordLength,
    PasswordMismatch,
    TimeoutRange,
    NumTriesRange,
}

impl FieldError {
    pub fn field(self) -> &'static str {
        match self {
            FieldError::RecaptchaFailure => "g-recaptcha-response",
            FieldError::RegisteredEmail => "email",
            FieldError::PasswordLength => "password",
            FieldError::PasswordMismatch => "confirm_password",
            FieldError::TimeoutRange => "timeout",
            FieldError::NumTriesRange => "num_tries",
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            FieldError::RecaptchaFailure => "The reCaptcha did not succeed, please try again.",
            FieldError::RegisteredEmail => "This e-mail is already registered.",
            FieldError::PasswordLength => "The password must be 6-20 characters long.",
            FieldError::PasswordMismatch => "The two password fields do not match.",
            FieldError::TimeoutRange => "Must be a number between 1-30 (time in seconds).",
            FieldError::NumTriesRange => "Must be a number between 1-10.",
        }
    }
}

/// Wire shape of a field error, used to re-render the submitted form.
#[derive(Debug, Serialize)]
pub struct FieldErrorBody {
    pub code: FieldError,
    pub field: &'static str,
    pub message: &'static str,
}

impl From<FieldError> for FieldErrorBody {
    fn from(e: FieldError) -> Self {
        Self {
            code: e,
            field: e.field(),
            message: e.message(),
        }
    }
}

/// Required field missing or malformed; reported before semantic checks.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("missing or malformed fields: {}", fields.join(", "))]
pub struct FormError {
    pub fields: Vec<&'static str>,
}

/// Collects structural problems over a set of named fields.
#[derive(Debug, Default)]
pub(crate) struct FormCheck {
    fields: Vec<&'static str>,
}

impl FormCheck {
    pub fn required(mut self, name: &'static str, value: &str) -> Self {
        if value.trim().is_empty() {
            self.fields.push(name);
        }
        self
    }

    pub fn email(mut self, name: &'static str, value: &str) -> Self {
        if !is_valid_email(value) && !self.fields.contains(&name) {
            self.fields.push(name);
        }
        self
    }

    pub fn finish(self) -> Result<(), FormError> {
        if self.fields.is_empty() {
            Ok(())
        } else {
            Err(FormError {
                fields: self.fields,
            })
        }
    }
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

/// Length is counted in characters, not bytes.
pub fn check_password_length(password: &str) -> Option<FieldError> {
    let len = password.chars().count();
    if (PASSWORD_MIN_LEN..=PASSWORD_MAX_LEN).contains(&len) {
        None
    } else {
        Some(FieldError::PasswordLength)
    }
}

/// Length first; the match check is meaningless for a rejected length.
pub fn check_new_password(password: &str, confirm: &str) -> Option<FieldError> {
    check_password_length(password).or_else(|| {
        if password == confirm {
            None
        } else {
            Some(FieldError::PasswordMismatch)
        }
    })
}

pub fn check_timeout(timeout: i32) -> Option<FieldError> {
    (!TIMEOUT_RANGE.contains(&timeout)).then_some(FieldError::TimeoutRange)
}

pub fn check_num_tries(num_tries: i32) -> Option<FieldError> {
    (!NUM_TRIES_RANGE.contains(&num_tries)).then_some(FieldError::NumTriesRange)
}
