//! Identity label rules.
//!
//! Labels are opaque to recognition, but they double as directory names in the
//! sample store, so they are restricted to a filesystem-safe alphabet.

use thiserror::Error;

const MAX_LABEL_LEN: usize = 64;

#[derive(Error, Debug, PartialEq)]
pub enum LabelError {
    #[error("label is empty")]
    Empty,
    #[error("label exceeds {MAX_LABEL_LEN} characters")]
    TooLong,
    #[error("label '{0}' contains characters other than ASCII letters, digits, '-' and '_'")]
    InvalidCharacters(String),
}

pub fn validate_label(label: &str) -> Result<(), LabelError> {
    if label.is_empty() {
        return Err(LabelError::Empty);
    }
    if label.len() > MAX_LABEL_LEN {
        return Err(LabelError::TooLong);
    }
    if !label
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(LabelError::InvalidCharacters(label.to_string()));
    }
    Ok(())
}

/// Next sequential code for `prefix`, e.g. `FACULTY01`, `FACULTY02`, …
///
/// Labels that do not carry the prefix followed by digits are ignored.
/// Returns `None` once the numbering cannot go any higher.
pub fn next_sequential_label<'a>(
    prefix: &str,
    existing: impl IntoIterator<Item = &'a str>,
) -> Option<String> {
    let last = existing
        .into_iter()
        .filter_map(|label| label.strip_prefix(prefix))
        .filter(|rest| !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit()))
        .filter_map(|rest| rest.parse::<u64>().ok())
        .max()
        .unwrap_or(0);
    let next = last.checked_add(1)?;
    Some(format!("{prefix}{next:02}"))
}
