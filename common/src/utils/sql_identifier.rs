//! SQL identifier validator.
//!
//! Table and column names for the version marker lookup come from
//! configuration and are spliced into SQL text, so they are restricted to
//! plain identifiers.

use crate::errors::AppError;

/// Validates and quotes configured SQL identifiers.
pub struct SqlIdentifier;

/// Longest identifier PostgreSQL keeps without truncation.
const MAX_IDENTIFIER_LEN: usize = 63;

impl SqlIdentifier {
    /// Validates a bare identifier: ASCII letter or underscore first, then
    /// letters, digits or underscores. A single `schema.table` dot is allowed.
    ///
    /// # Errors
    /// Returns `AppError::Config` when the name is empty, too long or contains
    /// anything outside the allowed character set.
    pub fn validate(name: &str) -> Result<(), AppError> {
        let parts: Vec<&str> = name.split('.').collect();
        if parts.len() > 2 {
            return Err(AppError::Config(format!(
                "identifier `{}` has more than one qualifier",
                name
            )));
        }
        for part in parts {
            Self::validate_part(name, part)?;
        }
        Ok(())
    }

    /// Returns the identifier double-quoted per part, e.g. `"app"."schema_version"`.
    ///
    /// Callers must have validated the name first.
    pub fn quote(name: &str) -> String {
        name.split('.')
            .map(|part| format!("\"{}\"", part))
            .collect::<Vec<_>>()
            .join(".")
    }

    fn validate_part(full: &str, part: &str) -> Result<(), AppError> {
        let mut chars = part.chars();
        let valid_head = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_');
        let valid_tail = chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !valid_head || !valid_tail || part.len() > MAX_IDENTIFIER_LEN {
            return Err(AppError::Config(format!(
                "`{}` is not a valid SQL identifier",
                full
            )));
        }
        Ok(())
    }
}
