//! Instrument symbols and their resolved identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::MetadataError;

/// A normalized instrument identifier (trimmed, uppercased, non-empty).
///
/// Used as the primary key for every cache namespace and for job results.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Symbol(String);

impl Symbol {
    /// Normalize raw input into a symbol.
    pub fn parse(raw: impl AsRef<str>) -> Result<Self, MetadataError> {
        let normalized = raw.as_ref().trim().to_uppercase();
        if normalized.is_empty() {
            return Err(MetadataError::EmptySymbol);
        }
        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Symbol {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Identifiers needed to build per-symbol request URLs.
///
/// Immutable once resolved; cached without expiry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    /// Numeric key (`data-stock-pk`)
    pub pk: String,

    /// URL slug (`data-stockslugname`)
    pub slug: String,
}

impl Metadata {
    pub fn new(pk: impl Into<String>, slug: impl Into<String>) -> Self {
        Self {
            pk: pk.into(),
            slug: slug.into(),
        }
    }

    /// Both identifiers are present and non-blank.
    pub fn is_usable(&self) -> bool {
        !self.pk.trim().is_empty() && !self.slug.trim().is_empty()
    }
}
