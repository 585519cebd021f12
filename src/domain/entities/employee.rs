use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::helper::error_chain_fmt;

const MAX_CODE_LENGTH: usize = 64;

/// Unique identifier of an employee, as printed on their badge.
///
/// Validated on parse so the rest of the engine only ever sees
/// well-formed codes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EmployeeCode(String);

impl EmployeeCode {
    pub fn parse(s: &str) -> Result<EmployeeCode, EmployeeCodeError> {
        let trimmed = s.trim();

        if trimmed.is_empty() {
            return Err(EmployeeCodeError::Empty);
        }
        if trimmed.len() > MAX_CODE_LENGTH {
            return Err(EmployeeCodeError::TooLong(trimmed.len()));
        }
        if !trimmed
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        {
            return Err(EmployeeCodeError::ForbiddenCharacters(trimmed.to_string()));
        }

        Ok(Self(trimmed.to_string()))
    }
}

impl AsRef<str> for EmployeeCode {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EmployeeCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(thiserror::Error)]
pub enum EmployeeCodeError {
    #[error("An employee code cannot be empty")]
    Empty,
    #[error("An employee code cannot be longer than {MAX_CODE_LENGTH} characters, got {0}")]
    TooLong(usize),
    #[error("{0} contains characters that are not allowed in an employee code")]
    ForbiddenCharacters(String),
}

impl std::fmt::Debug for EmployeeCodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

/// Listing row: an employee together with the number of reference
/// embeddings currently enrolled for them.
#[derive(Debug, Serialize)]
pub struct EmployeeOverview {
    pub code: String,
    pub display_name: String,
    pub sample_count: i64,
    pub enrolled_at: DateTime<Utc>,
}
