pub mod indexer;
pub mod poller;

#[cfg(test)]
pub(crate) mod testing;

pub use indexer::IndexerFetcher;
pub use poller::{bind, CacheKey, DataFetcher, PollHandle, PollSnapshot, PollState};
