use thiserror::Error;

use crate::services::poller::CacheKey;

pub type Result<T> = std::result::Result<T, Error>;

/// Failure reported by a data fetcher.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected status {status} from {url}")]
    Status { status: u16, url: String },

    #[error("{0}")]
    Other(String),
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("fetch failed for {key}: {source}")]
    FetchFailure {
        key: CacheKey,
        #[source]
        source: FetchError,
    },

    #[error("{key} resolved without a dataset")]
    MissingData { key: CacheKey },

    #[error("malformed {field}: {value:?}")]
    MalformedData { field: &'static str, value: String },

    #[error("{field} is not a finite number")]
    NonFinite { field: &'static str },

    #[error("configuration error: {0}")]
    Config(String),
}
