//! Per-artifact isolation policy.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ArtifactError;

/// How much of an artifact is visible to other artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IsolationPolicy {
    /// The artifact's local scope joins the kernel-wide shared scope.
    None,
    /// Reserved. Currently identical to [`IsolationPolicy::Full`].
    Partial,
    /// The artifact's symbols stay private to it.
    #[default]
    Full,
}

impl IsolationPolicy {
    /// Whether the local scope is added to the shared scope.
    #[must_use]
    pub fn shares_scope(self) -> bool {
        matches!(self, Self::None)
    }

    /// Lowercase name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Partial => "partial",
            Self::Full => "full",
        }
    }
}

impl fmt::Display for IsolationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IsolationPolicy {
    type Err = ArtifactError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "partial" => Ok(Self::Partial),
            "full" => Ok(Self::Full),
            _ => Err(ArtifactError::InvalidIsolation {
                value: s.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_none_shares() {
        assert!(IsolationPolicy::None.shares_scope());
        assert!(!IsolationPolicy::Partial.shares_scope());
        assert!(!IsolationPolicy::Full.shares_scope());
    }

    #[test]
    fn test_parse() {
        assert_eq!("None".parse::<IsolationPolicy>().unwrap(), IsolationPolicy::None);
        assert_eq!(" full ".parse::<IsolationPolicy>().unwrap(), IsolationPolicy::Full);
        assert!(matches!(
            "sandbox".parse::<IsolationPolicy>(),
            Err(ArtifactError::InvalidIsolation { .. })
        ));
        assert_eq!(IsolationPolicy::default(), IsolationPolicy::Full);
        assert_eq!(IsolationPolicy::Partial.to_string(), "partial");
    }
}
