//! URL handling module for Trace
//!
//! This module provides URL normalization, the [`NormalizedUrl`] identity type used
//! by the frontier, domain extraction, and allowed-domain filtering.

mod domain;
mod matcher;
mod normalize;

use crate::UrlError;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use url::Url;

pub use domain::{extract_domain, is_asset_url, DomainFilter};
pub use matcher::DomainPattern;
pub use normalize::{normalize_parsed, normalize_url};

/// An absolute http(s) URL in normalized form
///
/// Equality, hashing and ordering are defined on the normalized serialization,
/// so two URLs that differ only in fragment, trailing slash, host case or query
/// parameter order are the same `NormalizedUrl`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct NormalizedUrl(Url);

impl NormalizedUrl {
    pub fn parse(input: &str) -> Result<Self, UrlError> {
        normalize_url(input).map(Self)
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn as_url(&self) -> &Url {
        &self.0
    }

    /// Lowercase host, used as the rate-limit bucket key
    pub fn host(&self) -> &str {
        self.0.host_str().unwrap_or_default()
    }
}

impl TryFrom<Url> for NormalizedUrl {
    type Error = UrlError;

    fn try_from(url: Url) -> Result<Self, Self::Error> {
        normalize_parsed(url).map(Self)
    }
}

impl FromStr for NormalizedUrl {
    type Err = UrlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for NormalizedUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AsRef<str> for NormalizedUrl {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}
