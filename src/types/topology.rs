//! Topology kinds served by the monitor.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which derived topology a query or operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TopologyKind {
    /// Every observed link, tombstones ignored.
    Underlay,
    /// Observed links minus tombstoned ones. The only adaptable kind.
    Logical,
}

impl TopologyKind {
    /// All kinds, in identifier order.
    pub const ALL: [TopologyKind; 2] = [TopologyKind::Underlay, TopologyKind::Logical];

    /// Stable identifier.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Underlay => "underlay",
            Self::Logical => "logical",
        }
    }

    /// Whether links of this topology can be enabled/disabled.
    pub fn is_adaptable(&self) -> bool {
        matches!(self, Self::Logical)
    }
}

impl fmt::Display for TopologyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned for an unrecognized topology identifier.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown topology identifier: {0}")]
pub struct UnknownTopology(pub String);

impl FromStr for TopologyKind {
    type Err = UnknownTopology;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "underlay" | "raw" => Ok(Self::Underlay),
            "logical" => Ok(Self::Logical),
            _ => Err(UnknownTopology(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_kinds() {
        assert_eq!("logical".parse::<TopologyKind>().unwrap(), TopologyKind::Logical);
        assert_eq!("Underlay".parse::<TopologyKind>().unwrap(), TopologyKind::Underlay);
        assert_eq!("raw".parse::<TopologyKind>().unwrap(), TopologyKind::Underlay);
    }

    #[test]
    fn test_parse_unknown_kind() {
        let err = "mesh".parse::<TopologyKind>().unwrap_err();
        assert_eq!(err, UnknownTopology("mesh".to_string()));
    }

    #[test]
    fn test_only_logical_is_adaptable() {
        assert!(TopologyKind::Logical.is_adaptable());
        assert!(!TopologyKind::Underlay.is_adaptable());
    }
}
