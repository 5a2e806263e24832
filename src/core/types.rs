//! Core type definitions used throughout the codebase

use derive_more::Display;
use serde::{Deserialize, Serialize};

/// Simulation year
pub type Year = u32;

/// Unique identifier for production assets
///
/// Ids are allocated from a monotonic counter owned by the asset stack, so the
/// same inputs always produce the same ids.
#[derive(
    Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[display(fmt = "asset#{}", _0)]
#[serde(transparent)]
pub struct AssetId(pub u64);

impl AssetId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// The id following this one
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

/// Technology tag, e.g. "Dry kiln coal" or "Electrolyser + ASU"
///
/// Technologies are data: only names registered in the technology table are valid.
#[derive(Debug, Display, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Technology(pub String);

impl Technology {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::borrow::Borrow<str> for Technology {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Technology {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

/// Maturity class of a technology
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum TechnologyClass {
    Initial = 0,
    Transition = 1,
    EndState = 2,
}

impl TechnologyClass {
    /// Default advancement level used by the no-backsliding rule
    pub fn level(&self) -> u8 {
        *self as u8
    }

    /// Returns true if this class is more advanced than the other
    pub fn outranks(&self, other: &TechnologyClass) -> bool {
        self.level() > other.level()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_asset_id_ordering() {
        let a = AssetId(1);
        let b = AssetId(2);
        assert!(a < b);
        assert_eq!(a.next(), b);
    }

    #[test]
    fn test_asset_id_display() {
        assert_eq!(AssetId(7).to_string(), "asset#7");
    }

    #[test]
    fn test_technology_serializes_as_plain_string() {
        let tech = Technology::new("Dry kiln coal");
        let json = serde_json::to_string(&tech).unwrap();
        assert_eq!(json, "\"Dry kiln coal\"");
        assert_eq!(tech.to_string(), "Dry kiln coal");
    }

    #[test]
    fn test_technology_class_outranks() {
        assert!(TechnologyClass::EndState.outranks(&TechnologyClass::Transition));
        assert!(TechnologyClass::Transition.outranks(&TechnologyClass::Initial));
        assert!(!TechnologyClass::Initial.outranks(&TechnologyClass::EndState));
        assert!(!TechnologyClass::Transition.outranks(&TechnologyClass::Transition));
    }

    #[test]
    fn test_technology_class_snake_case() {
        let class: TechnologyClass = serde_json::from_str("\"end_state\"").unwrap();
        assert_eq!(class, TechnologyClass::EndState);
    }
}
