//! Ping routing key.
//!
//! The slug is embedded in the ping URL and doubles as its shared secret:
//! whoever holds the URL may ping the monitor. It is immutable once the
//! monitor exists.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::WatchError;

const MAX_SLUG_LENGTH: usize = 64;

/// A validated monitor slug: lowercase ASCII letters, digits and hyphens,
/// 1-64 characters, no leading or trailing hyphen.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Slug(String);

impl Slug {
    /// Validates and wraps a slug.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::InvalidRequest`] describing the first rule
    /// the input breaks.
    pub fn new(value: impl Into<String>) -> Result<Self, WatchError> {
        let value = value.into();
        if value.is_empty() {
            return Err(WatchError::InvalidRequest("slug must not be empty".to_string()));
        }
        if value.len() > MAX_SLUG_LENGTH {
            return Err(WatchError::InvalidRequest(format!(
                "slug length {} exceeds maximum of {MAX_SLUG_LENGTH}",
                value.len()
            )));
        }
        if !value
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        {
            return Err(WatchError::InvalidRequest(
                "slug must contain only lowercase letters, digits, and hyphens".to_string(),
            ));
        }
        if value.starts_with('-') || value.ends_with('-') {
            return Err(WatchError::InvalidRequest(
                "slug must not start or end with a hyphen".to_string(),
            ));
        }
        Ok(Self(value))
    }

    /// Generates an unguessable slug (32 lowercase hex characters).
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    /// Returns the slug as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Slug {
    type Err = WatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for Slug {
    type Error = WatchError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Slug> for String {
    fn from(slug: Slug) -> Self {
        slug.0
    }
}

impl AsRef<str> for Slug {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Slug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn accepts_valid_slugs() {
        assert!(Slug::new("nightly-backup").is_ok());
        assert!(Slug::new("a").is_ok());
        assert!(Slug::new("job-2").is_ok());
        assert!(Slug::new("a".repeat(64)).is_ok());
    }

    #[test]
    fn rejects_bad_slugs() {
        assert!(Slug::new("").is_err());
        assert!(Slug::new("a".repeat(65)).is_err());
        assert!(Slug::new("Nightly").is_err());
        assert!(Slug::new("my job").is_err());
        assert!(Slug::new("-job").is_err());
        assert!(Slug::new("job-").is_err());
    }

    #[test]
    fn generated_slug_is_valid() {
        let slug = Slug::generate();
        assert_eq!(slug.as_str().len(), 32);
        assert!(Slug::new(slug.as_str()).is_ok());
        assert_ne!(slug, Slug::generate());
    }

    #[test]
    fn deserialization_validates() {
        let bad: Result<Slug, _> = serde_json::from_str("\"Bad Slug\"");
        assert!(bad.is_err());
        let Ok(good) = serde_json::from_str::<Slug>("\"cron-1\"") else {
            panic!("valid slug rejected");
        };
        assert_eq!(good.to_string(), "cron-1");
    }
}
