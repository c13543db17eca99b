use async_trait::async_trait;
use log::info;
use serde::de::DeserializeOwned;
use std::marker::PhantomData;

use super::poller::DataFetcher;
use crate::error::FetchError;
use crate::models::ChainId;

pub const CHAIN_ID_PLACEHOLDER: &str = "{chain_id}";

/// Loads a JSON dataset from an indexer endpoint. `{chain_id}` in the URL
/// template is replaced with the chain being polled.
pub struct IndexerFetcher<T> {
    client: reqwest::Client,
    url_template: String,
    _dataset: PhantomData<fn() -> T>,
}

impl<T> IndexerFetcher<T> {
    pub fn new(client: reqwest::Client, url_template: impl Into<String>) -> Self {
        Self {
            client,
            url_template: url_template.into(),
            _dataset: PhantomData,
        }
    }

    pub fn url_for(&self, chain_id: ChainId) -> String {
        self.url_template
            .replace(CHAIN_ID_PLACEHOLDER, &chain_id.to_string())
    }
}

#[async_trait]
impl<T> DataFetcher<T> for IndexerFetcher<T>
where
    T: DeserializeOwned + Send + Sync,
{
    async fn fetch(&self, chain_id: ChainId) -> Result<Option<T>, FetchError> {
        let url = self.url_for(chain_id);
        info!("Fetching {}", url);

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url,
            });
        }

        // a JSON null body decodes to None
        Ok(response.json::<Option<T>>().await?)
    }
}
