use dotenv::dotenv;
use log::{error, info};
use std::sync::Arc;

use apy_card::models::{ChainContext, DistributionData, StakingData};
use apy_card::services::IndexerFetcher;
use apy_card::{Aggregator, Config};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    env_logger::init();

    info!("Starting APY card");
    let config = Config::from_env()?;
    info!(
        "Loaded config: chain {:?}, polling every {:?}",
        config.chain_id, config.poll_interval
    );

    info!("Connecting to indexer...");
    let client = reqwest::Client::new();
    let staking = IndexerFetcher::<StakingData>::new(client.clone(), &config.staking_data_url);
    let distribution =
        IndexerFetcher::<DistributionData>::new(client, &config.distribution_data_url);

    let mut aggregator = Aggregator::new(
        ChainContext::new(config.chain_id),
        Arc::new(staking),
        Arc::new(distribution),
    )
    .with_interval(config.poll_interval)
    .with_token_symbol(config.token_symbol.clone());
    aggregator.mount();
    info!("Mounted APY card on chain {:?}", aggregator.chain_id());

    let mut last_rendered = String::new();
    loop {
        let view = aggregator.render();
        let rendered = view.to_string();
        if rendered != last_rendered {
            println!("{}", rendered);
            last_rendered = rendered;
        }

        if let Some(fault) = view.fault() {
            error!("Giving up after fault at {}", fault.occurred_at);
            return Err(format!("APY card faulted: {}", fault.error).into());
        }

        tokio::select! {
            _ = aggregator.changed() => {}
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                aggregator.unmount();
                break;
            }
        }
    }

    info!("APY card stopped");
    Ok(())
}
