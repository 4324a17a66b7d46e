//! Artifact kinds known to the store

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Type tag of a persisted artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// Negotiation card describing system goals and requirements
    NegotiationCard,
    /// Declared test suite
    TestSuite,
    /// Evidence produced by a measurement
    Evidence,
    /// Validation outcomes for a test suite
    TestResults,
    /// Final report
    Report,
}

impl ArtifactKind {
    /// All kinds, in declaration order
    pub const ALL: [Self; 5] = [
        Self::NegotiationCard,
        Self::TestSuite,
        Self::Evidence,
        Self::TestResults,
        Self::Report,
    ];

    /// Path segment / tag used on disk and on the wire
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NegotiationCard => "negotiation_card",
            Self::TestSuite => "test_suite",
            Self::Evidence => "evidence",
            Self::TestResults => "test_results",
            Self::Report => "report",
        }
    }

    /// Identifier used when an artifact of this kind is saved without one
    #[must_use]
    pub fn default_identifier(self) -> String {
        format!("default.{}", self.as_str())
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArtifactKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| Error::Config(format!("unknown artifact kind: {s}")))
    }
}
