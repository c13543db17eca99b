use log::debug;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::models::{DistributionData, StakingData};
use crate::utils::{fixed_decimals, with_comma};

const COMPOUNDING_PERIODS_PER_YEAR: f64 = 365.0;
const DISPLAY_DECIMALS: usize = 2;
const PERCENT_SUFFIX: &str = " %";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StakingMetrics {
    pub staking_apy: String,
    pub total_staked: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DistributionMetrics {
    pub total_distributed: String,
}

/// Annualizes a daily rate with daily compounding.
pub fn compound_daily_rate(daily_rate: f64) -> f64 {
    (1.0 + daily_rate).powf(COMPOUNDING_PERIODS_PER_YEAR) - 1.0
}

pub fn derive_staking_metrics(data: &StakingData) -> Result<StakingMetrics> {
    let daily_rate = parse_amount("dailyAPR", &data.daily_apr)?;
    let total_balance = parse_amount("totalBalance", &data.total_balance)?;

    let apy = compound_daily_rate(daily_rate);
    if !apy.is_finite() {
        return Err(Error::NonFinite { field: "apy" });
    }
    debug!("Daily rate {} compounds to APY {}", daily_rate, apy);

    Ok(StakingMetrics {
        staking_apy: format!("{}{}", display_amount(apy * 100.0), PERCENT_SUFFIX),
        total_staked: display_amount(total_balance),
    })
}

pub fn derive_distribution_metrics(data: &DistributionData) -> Result<DistributionMetrics> {
    let distributed = parse_amount("distributed", &data.distributed)?;
    Ok(DistributionMetrics {
        total_distributed: display_amount(distributed),
    })
}

fn display_amount(value: f64) -> String {
    with_comma(&fixed_decimals(DISPLAY_DECIMALS)(value))
}

/// Parses an indexer amount. Anything that is not a finite number is
/// rejected instead of being rendered.
fn parse_amount(field: &'static str, raw: &str) -> Result<f64> {
    let malformed = || Error::MalformedData {
        field,
        value: raw.to_string(),
    };
    let value: f64 = raw.trim().parse().map_err(|_| malformed())?;
    if value.is_finite() {
        Ok(value)
    } else {
        Err(malformed())
    }
}
