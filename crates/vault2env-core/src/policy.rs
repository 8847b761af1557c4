//! Redaction policies
//!
//! A policy decides what a leaked secret is replaced with in child output.
//! The set of modes is closed:
//!
//!   - asterisk  -> "****"
//!   - hash      -> "sha256:<hex digest of the value>"
//!   - name      -> the secret's own name
//!   - none      -> no redaction at all
//!
//! Unknown mode strings resolve to `None` (pass-through) instead of failing.
//! Callers that care should compare against [`RedactionMode::parse_strict`]
//! and warn the operator.

use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// Literal mask used by [`RedactionMode::Asterisk`]
pub const ASTERISK_MASK: &str = "****";

/// How secrets are replaced in forwarded output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RedactionMode {
    #[default]
    Asterisk,
    Hash,
    Name,
    None,
}

impl RedactionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Asterisk => "asterisk",
            Self::Hash => "hash",
            Self::Name => "name",
            Self::None => "none",
        }
    }

    /// Resolve a mode name; anything unrecognized becomes pass-through
    pub fn parse_lossy(mode: &str) -> Self {
        Self::parse_strict(mode).unwrap_or(Self::None)
    }

    /// Resolve a mode name, returning `None` when it isn't one of the known modes
    pub fn parse_strict(mode: &str) -> Option<Self> {
        match mode.trim().to_ascii_lowercase().as_str() {
            "asterisk" => Some(Self::Asterisk),
            "hash" => Some(Self::Hash),
            "name" => Some(Self::Name),
            "none" => Some(Self::None),
            _ => None,
        }
    }

    /// True when this mode performs no redaction
    pub fn is_pass_through(&self) -> bool {
        matches!(self, Self::None)
    }

    /// Surrogate for a secret, or `None` in pass-through mode
    pub fn surrogate(&self, name: &str, value: &str) -> Option<String> {
        match self {
            Self::Asterisk => Some(ASTERISK_MASK.to_string()),
            Self::Hash => {
                let mut hasher = Sha256::new();
                hasher.update(value.as_bytes());
                Some(format!("sha256:{}", hex::encode(hasher.finalize())))
            }
            Self::Name => Some(name.to_string()),
            Self::None => None,
        }
    }
}

impl FromStr for RedactionMode {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse_lossy(s))
    }
}

impl fmt::Display for RedactionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
