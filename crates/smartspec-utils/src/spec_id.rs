//! Spec identifier parsing and validation.
//!
//! A spec id has the shape `spec-<category>-<nnn>-<slug>`:
//! - `category`: lowercase alphanumeric (`core`, `feat`, `infra`, ...)
//! - `nnn`: zero-padded three-digit ordinal
//! - `slug`: kebab-case summary

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

static SPEC_ID_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^spec-([a-z][a-z0-9]*)-(\d{3})-([a-z0-9]+(?:-[a-z0-9]+)*)$")
        .expect("spec id regex is valid")
});

/// Errors from spec id validation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SpecIdError {
    #[error(
        "Invalid spec id '{input}': expected spec-<category>-<nnn>-<slug> \
         (e.g. spec-core-001-auth-flow)"
    )]
    Malformed { input: String },
}

/// A validated spec identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SpecId {
    category: String,
    ordinal: u16,
    slug: String,
}

impl SpecId {
    /// Parse and validate a spec id string.
    ///
    /// # Errors
    /// [`SpecIdError::Malformed`] when the input does not match the grammar.
    pub fn parse(input: &str) -> Result<Self, SpecIdError> {
        let caps = SPEC_ID_RE.captures(input).ok_or_else(|| SpecIdError::Malformed {
            input: input.to_string(),
        })?;
        let ordinal = caps[2].parse::<u16>().map_err(|_| SpecIdError::Malformed {
            input: input.to_string(),
        })?;
        Ok(Self {
            category: caps[1].to_string(),
            ordinal,
            slug: caps[3].to_string(),
        })
    }

    #[must_use]
    pub fn category(&self) -> &str {
        &self.category
    }

    #[must_use]
    pub fn ordinal(&self) -> u16 {
        self.ordinal
    }

    #[must_use]
    pub fn slug(&self) -> &str {
        &self.slug
    }
}

impl fmt::Display for SpecId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "spec-{}-{:03}-{}",
            self.category, self.ordinal, self.slug
        )
    }
}

impl FromStr for SpecId {
    type Err = SpecIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for SpecId {
    type Error = SpecIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<SpecId> for String {
    fn from(id: SpecId) -> Self {
        id.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_ids_round_trip() {
        for input in [
            "spec-core-001-auth-flow",
            "spec-feat-042-credit-topup",
            "spec-infra-999-db",
        ] {
            let id = SpecId::parse(input).unwrap();
            assert_eq!(id.to_string(), input);
        }
    }

    #[test]
    fn components_are_extracted() {
        let id = SpecId::parse("spec-feat-042-credit-topup").unwrap();
        assert_eq!(id.category(), "feat");
        assert_eq!(id.ordinal(), 42);
        assert_eq!(id.slug(), "credit-topup");
    }

    #[test]
    fn malformed_ids_are_rejected() {
        for input in [
            "",
            "spec",
            "spec-core-1-auth",
            "spec-core-0001-auth",
            "spec-Core-001-auth",
            "spec-core-001-Auth",
            "spec-core-001-",
            "spec-core-001-auth_flow",
            "notspec-core-001-auth",
        ] {
            assert!(SpecId::parse(input).is_err(), "should reject {input:?}");
        }
    }
}
