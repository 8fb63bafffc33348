//! Phone number normalization.
//!
//! Stored phone values are E.164 strings (`+` followed by 7..=15 digits), so
//! the unique index compares one canonical spelling per number.

use once_cell::sync::Lazy;
use regex::Regex;
use std::error::Error;
use std::fmt::{Display, Formatter};

static E164_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\+[1-9][0-9]{6,14}$").expect("valid e164 regex"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhoneError {
    Empty,
    NotE164(String),
}

impl Display for PhoneError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "phone number is empty"),
            Self::NotE164(value) => {
                write!(f, "phone number `{value}` is not in international E.164 form")
            }
        }
    }
}

impl Error for PhoneError {}

/// Normalizes a human-entered phone number to E.164.
///
/// Separators (whitespace, `-`, `.`, `(`, `)`) are removed and an
/// international `00` prefix becomes `+`.
pub fn normalize_phone(raw: &str) -> Result<String, PhoneError> {
    let compact: String = raw
        .chars()
        .filter(|ch| !ch.is_whitespace() && !matches!(ch, '-' | '.' | '(' | ')'))
        .collect();
    if compact.is_empty() {
        return Err(PhoneError::Empty);
    }

    let normalized = match compact.strip_prefix("00") {
        Some(rest) => format!("+{rest}"),
        None => compact,
    };

    if E164_RE.is_match(&normalized) {
        Ok(normalized)
    } else {
        Err(PhoneError::NotE164(raw.trim().to_string()))
    }
}
