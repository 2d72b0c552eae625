//! Severity levels and threshold comparison.
//!
//! # Design Decisions
//! - Fixed six-member set, most severe first
//! - Rank is the position in that order (error = 0)
//! - An entry passes a threshold when its rank is not greater than the threshold's

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Log severity, ordered from most to least severe.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error = 0,
    #[default]
    Warn = 1,
    Info = 2,
    Verbose = 3,
    Debug = 4,
    Silly = 5,
}

/// Errors produced when parsing a severity.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SeverityError {
    #[error("invalid log level '{0}', expected one of error, warn, info, verbose, debug, silly")]
    InvalidLevel(String),
}

impl SeverityError {
    pub fn kind(&self) -> &'static str {
        "InvalidLevelError"
    }
}

impl Severity {
    /// All levels, most severe first.
    pub const ALL: [Severity; 6] = [
        Severity::Error,
        Severity::Warn,
        Severity::Info,
        Severity::Verbose,
        Severity::Debug,
        Severity::Silly,
    ];

    pub fn rank(self) -> u8 {
        self as u8
    }

    pub fn from_rank(rank: u8) -> Option<Self> {
        Self::ALL.get(rank as usize).copied()
    }

    /// True when an entry at `self` passes a sink thresholded at `threshold`.
    pub fn is_at_least(self, threshold: Severity) -> bool {
        self.rank() <= threshold.rank()
    }

    /// True when `candidate` names one of the six levels.
    pub fn is_valid(candidate: &str) -> bool {
        candidate.parse::<Severity>().is_ok()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Error => "error",
            Severity::Warn => "warn",
            Severity::Info => "info",
            Severity::Verbose => "verbose",
            Severity::Debug => "debug",
            Severity::Silly => "silly",
        }
    }
}

impl FromStr for Severity {
    type Err = SeverityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|level| level.as_str() == s)
            .ok_or_else(|| SeverityError::InvalidLevel(s.to_string()))
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rank_follows_fixed_order() {
        for (i, a) in Severity::ALL.iter().enumerate() {
            for (j, b) in Severity::ALL.iter().enumerate() {
                assert_eq!(a.rank() < b.rank(), i < j, "{a} vs {b}");
            }
        }
        assert_eq!(Severity::Error.rank(), 0);
        assert_eq!(Severity::Silly.rank(), 5);
    }

    #[test]
    fn test_threshold_filtering() {
        assert!(!Severity::Debug.is_at_least(Severity::Info));
        assert!(Severity::Debug.is_at_least(Severity::Debug));
        assert!(Severity::Debug.is_at_least(Severity::Silly));
        assert!(Severity::Error.is_at_least(Severity::Warn));
        assert!(!Severity::Info.is_at_least(Severity::Warn));
    }

    #[test]
    fn test_validation() {
        for level in Severity::ALL {
            assert!(Severity::is_valid(level.as_str()));
        }
        assert!(!Severity::is_valid("fatal"));
        assert!(!Severity::is_valid("WARN"));
        assert!(!Severity::is_valid(""));

        let err = "trace".parse::<Severity>().unwrap_err();
        assert_eq!(err, SeverityError::InvalidLevel("trace".into()));
        assert_eq!(err.kind(), "InvalidLevelError");
    }

    #[test]
    fn test_rank_round_trip_and_default() {
        assert_eq!(Severity::from_rank(3), Some(Severity::Verbose));
        assert_eq!(Severity::from_rank(6), None);
        assert_eq!(Severity::default(), Severity::Warn);
        assert_eq!(serde_json::to_string(&Severity::Verbose).unwrap(), "\"verbose\"");
    }
}
