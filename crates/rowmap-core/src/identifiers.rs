//! SQL identifier validation.
//!
//! Table and column names are interpolated into generated SQL unquoted, so
//! every name must be a plain identifier: a letter or underscore followed by
//! letters, digits or underscores.

use std::sync::OnceLock;

use regex::Regex;

use crate::error::{ConfigErrorKind, Error, Result};

const IDENTIFIER_PATTERN: &str = r"^[A-Za-z_][A-Za-z0-9_]*$";

fn identifier_regex() -> Option<&'static Regex> {
    static REGEX: OnceLock<Option<Regex>> = OnceLock::new();
    REGEX
        .get_or_init(|| match Regex::new(IDENTIFIER_PATTERN) {
            Ok(re) => Some(re),
            Err(e) => {
                tracing::error!(pattern = IDENTIFIER_PATTERN, error = %e, "identifier regex failed to compile");
                None
            }
        })
        .as_ref()
}

/// Check whether `name` can be used unquoted as a table or column name.
///
/// # Examples
///
/// ```
/// use rowmap_core::is_valid_identifier;
///
/// assert!(is_valid_identifier("first_name"));
/// assert!(is_valid_identifier("_t2"));
/// assert!(!is_valid_identifier("2fast"));
/// assert!(!is_valid_identifier("users; DROP TABLE users"));
/// ```
pub fn is_valid_identifier(name: &str) -> bool {
    identifier_regex().is_some_and(|re| re.is_match(name))
}

/// Validate a table or column name belonging to `entity`.
///
/// Fails with an `InvalidIdentifier` configuration error.
#[allow(clippy::result_large_err)]
pub fn validate_identifier(entity: &'static str, what: &str, name: &str) -> Result<()> {
    if is_valid_identifier(name) {
        Ok(())
    } else {
        Err(Error::config(
            ConfigErrorKind::InvalidIdentifier,
            entity,
            format!("{} '{}' is not a valid SQL identifier", what, name),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_identifiers() {
        for name in ["persons", "person_id", "Person", "_x", "a1"] {
            assert!(is_valid_identifier(name), "{name}");
        }
    }

    #[test]
    fn rejects_everything_else() {
        for name in ["", "1a", "first name", "a-b", "\"quoted\"", "t;--", "é"] {
            assert!(!is_valid_identifier(name), "{name}");
        }
    }

    #[test]
    fn validate_reports_entity_and_kind() {
        let err = validate_identifier("Person", "column", "bad name").unwrap_err();
        match err {
            Error::Config(c) => {
                assert_eq!(c.kind, ConfigErrorKind::InvalidIdentifier);
                assert_eq!(c.entity, Some("Person"));
                assert!(c.message.contains("bad name"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(validate_identifier("Person", "table", "persons").is_ok());
    }
}
