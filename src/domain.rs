//! Normalisation of tab URLs into the domain used as the unit of tracking and blocking.

use std::{fmt::Display, ops::Deref, sync::Arc};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("not a valid url: {0}")]
    Malformed(#[from] url::ParseError),
    #[error("scheme {0:?} is not tracked")]
    UnsupportedScheme(String),
    #[error("url has no host")]
    MissingHost,
}

/// Lowercase hostname without a leading `www.`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Domain(Arc<str>);

impl Domain {
    /// Normalises a bare hostname such as a category map key. Does not validate it.
    pub fn from_host(host: &str) -> Self {
        let host = host.trim().trim_end_matches('.').to_ascii_lowercase();
        let host = host.strip_prefix("www.").unwrap_or(&host);
        Domain(host.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Deref for Domain {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Display for Domain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Domain {
    fn from(value: &str) -> Self {
        Domain::from_host(value)
    }
}

/// Extracts the tracked domain from a tab URL. Only `http` and `https` pages are tracked;
/// browser-internal pages, files and extension pages are rejected.
pub fn resolve_domain(url: &str) -> Result<Domain, DomainError> {
    let url = Url::parse(url)?;
    match url.scheme() {
        "http" | "https" => {}
        other => return Err(DomainError::UnsupportedScheme(other.to_owned())),
    }
    let host = url.host_str().ok_or(DomainError::MissingHost)?;
    let domain = Domain::from_host(host);
    if domain.is_empty() {
        return Err(DomainError::MissingHost);
    }
    Ok(domain)
}
