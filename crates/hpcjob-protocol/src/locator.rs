//! Result locators.
//!
//! A result locator names where a job's output lives, as
//! `<scheme>://<identifier>`. The string must contain exactly one `://`
//! separator with a non-empty scheme and identifier on either side.

use std::fmt;
use std::str::FromStr;

/// Separator between scheme and identifier.
pub const SCHEME_SEPARATOR: &str = "://";

/// Storage backend a result locator points at.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResultScheme {
    /// Files held by the service, downloaded directly.
    Local,
    /// Files moved by a federated transfer the service arranges.
    Globus,
    /// A scheme this client does not know how to retrieve.
    Other(String),
}

impl ResultScheme {
    pub fn as_str(&self) -> &str {
        match self {
            ResultScheme::Local => "local",
            ResultScheme::Globus => "globus",
            ResultScheme::Other(s) => s,
        }
    }
}

impl From<&str> for ResultScheme {
    fn from(value: &str) -> Self {
        match value {
            "local" => ResultScheme::Local,
            "globus" => ResultScheme::Globus,
            other => ResultScheme::Other(other.to_string()),
        }
    }
}

impl fmt::Display for ResultScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Locator parse errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LocatorError {
    #[error("invalid result locator format: {0:?} (expected <scheme>://<identifier>)")]
    InvalidFormat(String),
}

/// A parsed `<scheme>://<identifier>` locator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultLocator {
    scheme: ResultScheme,
    identifier: String,
}

impl ResultLocator {
    /// Parse a locator string.
    pub fn parse(raw: &str) -> Result<Self, LocatorError> {
        let parts: Vec<&str> = raw.split(SCHEME_SEPARATOR).collect();
        match parts.as_slice() {
            [scheme, identifier] if !scheme.is_empty() && !identifier.is_empty() => Ok(Self {
                scheme: ResultScheme::from(*scheme),
                identifier: (*identifier).to_string(),
            }),
            _ => Err(LocatorError::InvalidFormat(raw.to_string())),
        }
    }

    pub fn scheme(&self) -> &ResultScheme {
        &self.scheme
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }
}

impl FromStr for ResultLocator {
    type Err = LocatorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ResultLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.scheme, SCHEME_SEPARATOR, self.identifier)
    }
}
