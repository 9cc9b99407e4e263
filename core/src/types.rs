//! Shared primitive types used across the engine.

use serde::Serialize;
use std::fmt;

/// Stable unique key of a fraud case. Assigned at intake, never reassigned.
pub type CaseId = String;

/// The canonical run identifier.
pub type RunId = String;

/// A validated SIM identifier: non-empty after trimming, otherwise unusable
/// as a grouping key.
///
/// Equality is exact string match on the raw value — phone-number format
/// normalization is deliberately NOT performed, so "082 123" and "082123"
/// are different SIMs as far as duplicate detection is concerned.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct SimNumber(String);

impl SimNumber {
    /// Accepts any string with at least one non-whitespace character,
    /// preserved verbatim. Returns `None` for empty/blank input — such
    /// cases can never be duplicates and are excluded from grouping.
    pub fn parse(raw: &str) -> Option<Self> {
        if raw.trim().is_empty() {
            None
        } else {
            Some(Self(raw.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SimNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_and_blank() {
        assert!(SimNumber::parse("").is_none());
        assert!(SimNumber::parse("   ").is_none());
        assert!(SimNumber::parse("\t\n").is_none());
    }

    #[test]
    fn preserves_raw_value_exactly() {
        let sim = SimNumber::parse(" 082 123 ").expect("non-blank");
        assert_eq!(sim.as_str(), " 082 123 ");
        // No format normalization: spacing variants are distinct keys.
        assert_ne!(sim, SimNumber::parse("082123").expect("non-blank"));
    }
}
