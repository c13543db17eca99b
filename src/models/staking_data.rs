use serde::{Deserialize, Serialize};

/// Snapshot of the staking vault as served by the indexer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StakingData {
    #[serde(rename = "dailyAPR", alias = "dailyRatePercent")]
    pub daily_apr: String,
    #[serde(rename = "totalBalance")]
    pub total_balance: String,
}
