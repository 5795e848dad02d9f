use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashSet;

use crate::error::{Error, Result};

lazy_static! {
    static ref SLUG: Regex = Regex::new(r"^[a-z0-9]+(?:[-_][a-z0-9]+)*$").unwrap();
}

const MAX_MACHINE_NAME_LEN: usize = 64;

/// Words that would shadow fixed routes of the surrounding application.
const DEFAULT_RESTRICTED: &[&str] = &[
    "add", "admin", "api", "delete", "edit", "new", "options", "results", "settings", "static",
    "vote",
];

/// Checks a proposed machine name before it is stored.
pub trait NameValidator {
    fn check(&self, field: &str, value: &str) -> Result<()>;
}

/// Slug syntax plus a list of reserved words.
#[derive(Debug, Clone)]
pub struct RestrictedWords {
    words: HashSet<String>,
}

impl Default for RestrictedWords {
    fn default() -> Self {
        Self::new(DEFAULT_RESTRICTED.iter().copied())
    }
}

impl RestrictedWords {
    pub fn new<'a>(words: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            words: words.into_iter().map(str::to_lowercase).collect(),
        }
    }

    pub fn is_restricted(&self, value: &str) -> bool {
        self.words.contains(&value.to_lowercase())
    }
}

impl NameValidator for RestrictedWords {
    fn check(&self, field: &str, value: &str) -> Result<()> {
        if value.is_empty() || value.len() > MAX_MACHINE_NAME_LEN {
            return Err(Error::validation(
                field,
                format!("must be between 1 and {MAX_MACHINE_NAME_LEN} characters"),
            ));
        }
        if !SLUG.is_match(value) {
            return Err(Error::validation(
                field,
                "may only contain lowercase letters, digits, '-' and '_'",
            ));
        }
        if self.is_restricted(value) {
            return Err(Error::validation(field, format!("{value:?} is a restricted word")));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_slugs() {
        let words = RestrictedWords::default();
        assert!(words.check("machine_name", "board-2024").is_ok());
        assert!(words.check("machine_name", "spring_ballot").is_ok());
    }

    #[test]
    fn rejects_restricted_words() {
        let words = RestrictedWords::default();
        let err = words.check("machine_name", "admin").unwrap_err();
        assert!(matches!(err, Error::Validation { ref field, .. } if field == "machine_name"));

        let custom = RestrictedWords::new(["Reserved"]);
        assert!(custom.check("machine_name", "reserved").is_err());
        assert!(custom.check("machine_name", "admin").is_ok());
    }

    #[test]
    fn rejects_malformed_names() {
        let words = RestrictedWords::default();
        for bad in ["", "Has Space", "UPPER", "-leading", "trailing_", "a/b"] {
            assert!(words.check("machine_name", bad).is_err(), "{bad:?} accepted");
        }
        assert!(words.check("machine_name", &"x".repeat(65)).is_err());
    }
}
