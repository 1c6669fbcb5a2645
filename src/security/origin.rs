//! Origin allow-list.
//!
//! # Responsibilities
//! - Parse origin patterns from configuration
//! - Decide whether a declared `Origin` may receive cross-origin headers
//!
//! # Design Decisions
//! - No regex: patterns are split into scheme, host and port rules up front
//! - Matching is anchored at both ends; the origin must be a bare origin
//! - Pure and total: anything unparseable is simply not allowed

use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use url::Url;

/// Origin patterns used when configuration does not provide any.
pub const DEFAULT_ALLOWED_ORIGINS: &[&str] = &[
    "https://*-toeverything.vercel.app",
    "https://*.affine.pro",
    "https://*.affine.fail",
    "http://localhost:*",
    "https://localhost:*",
];

/// Error produced when an origin pattern cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OriginPatternError {
    #[error("origin pattern `{0}` is missing a scheme")]
    MissingScheme(String),
    #[error("origin pattern `{0}` uses unsupported scheme (expected http or https)")]
    UnsupportedScheme(String),
    #[error("origin pattern `{0}` has an empty host")]
    EmptyHost(String),
    #[error("origin pattern `{0}` has an invalid port rule (only `:*` is supported)")]
    InvalidPort(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum HostRule {
    /// `localhost`
    Exact(String),
    /// `*.affine.pro` matches `affine.pro` and any subdomain of it.
    Subdomains(String),
    /// `*-toeverything.vercel.app` matches `<label>-toeverything.vercel.app`.
    LabelSuffix(String),
}

impl HostRule {
    fn matches(&self, host: &str) -> bool {
        match self {
            HostRule::Exact(expected) => host == expected,
            HostRule::Subdomains(suffix) => {
                host == suffix
                    || host
                        .strip_suffix(suffix.as_str())
                        .and_then(|rest| rest.strip_suffix('.'))
                        .is_some_and(|sub| !sub.is_empty())
            }
            HostRule::LabelSuffix(suffix) => host
                .strip_suffix(suffix.as_str())
                .is_some_and(|label| !label.is_empty() && !label.contains('.')),
        }
    }
}

/// A single allow-list entry, e.g. `https://*.affine.pro` or `http://localhost:*`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginPattern {
    source: String,
    scheme: String,
    host: HostRule,
    any_port: bool,
}

impl OriginPattern {
    /// Returns true if the parsed origin satisfies this pattern.
    fn matches(&self, origin: &Url) -> bool {
        if origin.scheme() != self.scheme {
            return false;
        }

        let Some(host) = origin.host_str() else {
            return false;
        };

        if origin.port().is_some() && !self.any_port {
            return false;
        }

        self.host.matches(host)
    }

    /// The pattern as it was written in configuration.
    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl FromStr for OriginPattern {
    type Err = OriginPatternError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (scheme, rest) = s
            .split_once("://")
            .ok_or_else(|| OriginPatternError::MissingScheme(s.to_string()))?;

        if scheme != "http" && scheme != "https" {
            return Err(OriginPatternError::UnsupportedScheme(s.to_string()));
        }

        let (host, any_port) = match rest.rsplit_once(':') {
            Some((host, "*")) => (host, true),
            Some(_) => return Err(OriginPatternError::InvalidPort(s.to_string())),
            None => (rest, false),
        };

        let host = host.to_ascii_lowercase();
        let rule = if let Some(suffix) = host.strip_prefix("*.") {
            HostRule::Subdomains(suffix.to_string())
        } else if let Some(suffix) = host.strip_prefix('*') {
            HostRule::LabelSuffix(suffix.to_string())
        } else {
            HostRule::Exact(host.clone())
        };

        let empty = match &rule {
            HostRule::Exact(h) | HostRule::Subdomains(h) | HostRule::LabelSuffix(h) => h.is_empty(),
        };
        if empty {
            return Err(OriginPatternError::EmptyHost(s.to_string()));
        }

        Ok(Self {
            source: s.to_string(),
            scheme: scheme.to_string(),
            host: rule,
            any_port,
        })
    }
}

impl fmt::Display for OriginPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Decides which origins receive cross-origin response headers.
#[derive(Debug, Clone)]
pub struct OriginPolicy {
    patterns: Vec<OriginPattern>,
}

impl OriginPolicy {
    pub fn new(patterns: Vec<OriginPattern>) -> Self {
        Self { patterns }
    }

    /// Build a policy from configured pattern strings.
    pub fn from_patterns<S: AsRef<str>>(patterns: &[S]) -> Result<Self, OriginPatternError> {
        let patterns = patterns
            .iter()
            .map(|p| p.as_ref().parse())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(patterns))
    }

    /// Returns true if `origin` is present and matches at least one pattern.
    pub fn is_allowed(&self, origin: Option<&str>) -> bool {
        let Some(origin) = origin else {
            return false;
        };

        let Ok(url) = Url::parse(origin) else {
            return false;
        };

        // A bare origin serializes with an empty path; anything more is not an origin.
        if url.path() != "/" || url.query().is_some() || url.fragment().is_some() {
            return false;
        }
        if origin.ends_with('/') || !url.username().is_empty() || url.password().is_some() {
            return false;
        }

        self.patterns.iter().any(|p| p.matches(&url))
    }

    pub fn patterns(&self) -> &[OriginPattern] {
        &self.patterns
    }
}

impl Default for OriginPolicy {
    fn default() -> Self {
        // The defaults are compile-time constants covered by tests.
        Self::from_patterns(DEFAULT_ALLOWED_ORIGINS).unwrap_or_else(|_| Self::new(Vec::new()))
    }
}
