use serde::{Serialize, Serializer};
use std::fmt;

pub const UNRESOLVED_LABEL: &str = "-";
pub const PENDING_LABEL: &str = "Loading...";

/// A display-ready value for one row of the card.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DerivedMetric {
    /// Nothing has been mounted yet.
    Unresolved,
    /// Polling is enabled but the source has not resolved.
    Pending,
    Ready(String),
}

impl DerivedMetric {
    pub fn as_str(&self) -> &str {
        match self {
            DerivedMetric::Unresolved => UNRESOLVED_LABEL,
            DerivedMetric::Pending => PENDING_LABEL,
            DerivedMetric::Ready(value) => value,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, DerivedMetric::Ready(_))
    }
}

impl fmt::Display for DerivedMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for DerivedMetric {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}
