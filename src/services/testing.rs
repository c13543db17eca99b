use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use super::poller::DataFetcher;
use crate::error::FetchError;
use crate::models::ChainId;

type Produce<T> = Box<dyn Fn(ChainId, usize) -> T + Send + Sync>;

/// In-memory fetcher that plays back queued outcomes, then falls back to
/// producing a value from the chain and call number.
pub struct ScriptedFetcher<T> {
    calls: AtomicUsize,
    delay: Duration,
    script: Mutex<VecDeque<Result<Option<T>, FetchError>>>,
    produce: Produce<T>,
}

impl ScriptedFetcher<u32> {
    pub fn counting() -> Self {
        Self::new(|_, call| call as u32)
    }
}

impl<T> ScriptedFetcher<T> {
    pub fn new(produce: impl Fn(ChainId, usize) -> T + Send + Sync + 'static) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
            script: Mutex::new(VecDeque::new()),
            produce: Box::new(produce),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn then_err(self, error: FetchError) -> Self {
        self.script.lock().unwrap().push_back(Err(error));
        self
    }

    pub fn then_none(self) -> Self {
        self.script.lock().unwrap().push_back(Ok(None));
        self
    }

    pub fn then_value(self, value: T) -> Self {
        self.script.lock().unwrap().push_back(Ok(Some(value)));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<T: Send + Sync> DataFetcher<T> for ScriptedFetcher<T> {
    async fn fetch(&self, chain_id: ChainId) -> Result<Option<T>, FetchError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let scripted = self.script.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| Ok(Some((self.produce)(chain_id, call))))
    }
}
