pub mod aggregator;
pub mod config;
pub mod error;
pub mod metrics;
pub mod models;
pub mod services;
pub mod utils;

pub use aggregator::Aggregator;
pub use config::Config;
pub use error::{Error, FetchError, Result};
