//! Field-level validation primitives shared by the request schemas.
//!
//! Validators never short-circuit: every failing field is collected into a
//! [`FieldErrors`] map so a client gets the full picture in one 400 response.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap());
static URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^https?://[^\s/?#]+\.[^\s/?#]+(?:[/?#]\S*)?$").unwrap());

pub const MISSING: &str = "Missing data for required field.";

/// Per-field error messages, serialized as `{"field": ["message", ...]}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(|v| v.as_slice())
    }

    /// `Ok(value)` when nothing was recorded, otherwise the collected errors.
    pub fn into_result<T>(self, value: T) -> Result<T, FieldErrors> {
        if self.is_empty() { Ok(value) } else { Err(self) }
    }

    pub fn single(field: &str, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }
}

impl std::fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = self
            .0
            .iter()
            .map(|(field, msgs)| format!("{field}: {}", msgs.join(" ")))
            .collect();
        write!(f, "{}", parts.join("; "))
    }
}

/// Take a required field, recording a "missing" error when absent.
pub fn required<T>(errors: &mut FieldErrors, field: &str, value: Option<T>) -> Option<T> {
    if value.is_none() {
        errors.add(field, MISSING);
    }
    value
}

pub fn length(errors: &mut FieldErrors, field: &str, value: &str, min: usize, max: usize) {
    let len = value.chars().count();
    if len < min || len > max {
        if min == 0 {
            errors.add(field, format!("Longer than maximum length {max}."));
        } else if min == max {
            errors.add(field, format!("Length must be {min}."));
        } else {
            errors.add(field, format!("Length must be between {min} and {max}."));
        }
    }
}

pub fn max_length(errors: &mut FieldErrors, field: &str, value: &str, max: usize) {
    length(errors, field, value, 0, max);
}

pub fn pattern(errors: &mut FieldErrors, field: &str, value: &str, re: &Regex, message: &str) {
    if !re.is_match(value) {
        errors.add(field, message);
    }
}

pub fn range(errors: &mut FieldErrors, field: &str, value: i32, min: i32, max: i32) {
    if value < min || value > max {
        errors.add(
            field,
            format!("Must be greater than or equal to {min} and less than or equal to {max}."),
        );
    }
}

pub fn email(errors: &mut FieldErrors, field: &str, value: &str) {
    if !EMAIL_RE.is_match(value) {
        errors.add(field, "Not a valid email address.");
    }
}

pub fn url(errors: &mut FieldErrors, field: &str, value: &str) {
    if !URL_RE.is_match(value) {
        errors.add(field, "Not a valid URL.");
    }
}

pub fn one_of(errors: &mut FieldErrors, field: &str, value: &str, choices: &[&str]) {
    if !choices.contains(&value) {
        errors.add(field, format!("Must be one of: {}.", choices.join(", ")));
    }
}

/// Distinguishes an absent field (`None`) from an explicit `null` (`Some(None)`).
pub fn double_option<'de, T, D>(de: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(de).map(Some)
}
