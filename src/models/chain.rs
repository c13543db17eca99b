use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChainId(pub u64);

impl ChainId {
    pub const ETHEREUM_MAINNET: ChainId = ChainId(1);
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The chain reported by the wallet connection, passed explicitly to the
/// aggregator instead of being read from ambient state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainContext {
    reported: Option<ChainId>,
    fallback: Option<ChainId>,
}

impl ChainContext {
    /// Falls back to Ethereum mainnet when no chain is reported.
    pub fn new(reported: Option<ChainId>) -> Self {
        Self {
            reported,
            fallback: Some(ChainId::ETHEREUM_MAINNET),
        }
    }

    /// Keeps an unreported chain unresolved, which leaves polling disabled.
    pub fn strict(reported: Option<ChainId>) -> Self {
        Self {
            reported,
            fallback: None,
        }
    }

    pub fn resolve(&self) -> Option<ChainId> {
        self.reported.or(self.fallback)
    }

    pub fn with_reported(self, reported: Option<ChainId>) -> Self {
        Self { reported, ..self }
    }
}
