use std::env;
use std::time::Duration;

use crate::aggregator::DEFAULT_TOKEN_SYMBOL;
use crate::error::{Error, Result};
use crate::models::ChainId;

#[derive(Debug)]
pub struct Config {
    pub chain_id: Option<ChainId>,
    pub staking_data_url: String,
    pub distribution_data_url: String,
    pub poll_interval: Duration,
    pub token_symbol: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let chain_id = match lookup("CHAIN_ID") {
            Some(raw) => Some(ChainId(parse_var("CHAIN_ID", &raw)?)),
            None => None,
        };
        let poll_interval_ms: u64 = parse_var(
            "POLL_INTERVAL_MS",
            &lookup("POLL_INTERVAL_MS").unwrap_or_else(|| "10000".to_string()),
        )?;
        if poll_interval_ms == 0 {
            return Err(Error::Config("POLL_INTERVAL_MS must be positive".to_string()));
        }

        Ok(Self {
            chain_id,
            staking_data_url: required(&lookup, "STAKING_DATA_URL")?,
            distribution_data_url: required(&lookup, "DISTRIBUTION_DATA_URL")?,
            poll_interval: Duration::from_millis(poll_interval_ms),
            token_symbol: lookup("TOKEN_SYMBOL")
                .unwrap_or_else(|| DEFAULT_TOKEN_SYMBOL.to_string()),
        })
    }
}

fn required(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<String> {
    lookup(key).ok_or_else(|| Error::Config(format!("{} must be set", key)))
}

fn parse_var<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| Error::Config(format!("{} has invalid value {:?}", key, raw)))
}
