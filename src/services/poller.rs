use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, FetchError};
use crate::models::ChainId;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Identity of one polled dataset. Every binding owns exactly one entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub source: &'static str,
    pub chain_id: ChainId,
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.source, self.chain_id)
    }
}

/// External collaborator that loads a dataset for a chain.
///
/// `Ok(None)` means the call went through but produced no dataset.
#[async_trait]
pub trait DataFetcher<T>: Send + Sync {
    async fn fetch(&self, chain_id: ChainId) -> Result<Option<T>, FetchError>;
}

#[derive(Debug)]
pub struct PollSnapshot<T> {
    pub data: Option<Arc<T>>,
    pub last_error: Option<Arc<Error>>,
    pub successes: u64,
    pub failures: u64,
    pub failing: bool,
    pub updated_at: Option<DateTime<Utc>>,
}

impl<T> Default for PollSnapshot<T> {
    fn default() -> Self {
        Self {
            data: None,
            last_error: None,
            successes: 0,
            failures: 0,
            failing: false,
            updated_at: None,
        }
    }
}

impl<T> Clone for PollSnapshot<T> {
    fn clone(&self) -> Self {
        Self {
            data: self.data.clone(),
            last_error: self.last_error.clone(),
            successes: self.successes,
            failures: self.failures,
            failing: self.failing,
            updated_at: self.updated_at,
        }
    }
}

#[derive(Debug)]
pub enum PollState<T> {
    Pending,
    Ready(Arc<T>),
    Failed(Arc<Error>),
}

impl<T> PollSnapshot<T> {
    /// State as of the most recent poll outcome.
    pub fn state(&self) -> PollState<T> {
        match (&self.last_error, &self.data) {
            (Some(error), _) if self.failing => PollState::Failed(Arc::clone(error)),
            (_, Some(data)) => PollState::Ready(Arc::clone(data)),
            _ => PollState::Pending,
        }
    }
}

struct PollBinding<T> {
    key: CacheKey,
    fetcher: Arc<dyn DataFetcher<T>>,
    interval: Duration,
    state: watch::Sender<PollSnapshot<T>>,
}

impl<T: Send + Sync + 'static> PollBinding<T> {
    async fn run(self, cancel: CancellationToken) {
        info!("Polling {} every {:?}", self.key, self.interval);
        loop {
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                outcome = self.fetcher.fetch(self.key.chain_id) => outcome,
            };
            self.publish(outcome);

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = sleep(self.interval) => {}
            }
        }
        info!("Stopped polling {}", self.key);
    }

    fn publish(&self, outcome: Result<Option<T>, FetchError>) {
        let key = self.key;
        let result = match outcome {
            Ok(Some(data)) => Ok(data),
            Ok(None) => Err(Error::MissingData { key }),
            Err(source) => Err(Error::FetchFailure { key, source }),
        };

        self.state.send_modify(|snapshot| {
            snapshot.updated_at = Some(Utc::now());
            match result {
                Ok(data) => {
                    debug!("Fetched {}", key);
                    snapshot.data = Some(Arc::new(data));
                    snapshot.successes += 1;
                    snapshot.failing = false;
                }
                Err(error) => {
                    warn!("Poll of {} failed: {}", key, error);
                    snapshot.last_error = Some(Arc::new(error));
                    snapshot.failures += 1;
                    snapshot.failing = true;
                }
            }
        });
    }
}

/// Starts polling `source` on `chain_id`.
///
/// With no chain the binding is disabled: nothing is fetched and the handle
/// stays pending. Otherwise the first fetch is issued immediately and each
/// later one starts `interval` after the previous one completed. Failures
/// are published on the handle and do not stop the loop.
pub fn bind<T>(
    source: &'static str,
    chain_id: Option<ChainId>,
    fetcher: Arc<dyn DataFetcher<T>>,
    interval: Duration,
) -> PollHandle<T>
where
    T: Send + Sync + 'static,
{
    let (sender, receiver) = watch::channel(PollSnapshot::default());
    let cancel = CancellationToken::new();

    let Some(chain_id) = chain_id else {
        info!("No chain resolved, {} stays disabled", source);
        return PollHandle {
            source,
            chain_id: None,
            receiver,
            idle: Some(sender),
            cancel,
            task: None,
        };
    };

    let binding = PollBinding {
        key: CacheKey { source, chain_id },
        fetcher,
        interval,
        state: sender,
    };
    let task = tokio::spawn(binding.run(cancel.clone()));

    PollHandle {
        source,
        chain_id: Some(chain_id),
        receiver,
        idle: None,
        cancel,
        task: Some(task),
    }
}

/// Read side of a binding. Dropping it cancels the poll loop.
pub struct PollHandle<T> {
    source: &'static str,
    chain_id: Option<ChainId>,
    receiver: watch::Receiver<PollSnapshot<T>>,
    // keeps a disabled handle's channel open so `changed` never resolves
    idle: Option<watch::Sender<PollSnapshot<T>>>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl<T> PollHandle<T> {
    pub fn key(&self) -> Option<CacheKey> {
        self.chain_id.map(|chain_id| CacheKey {
            source: self.source,
            chain_id,
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.chain_id.is_some()
    }

    pub fn snapshot(&self) -> PollSnapshot<T> {
        self.receiver.borrow().clone()
    }

    pub fn state(&self) -> PollState<T> {
        self.receiver.borrow().state()
    }

    /// Waits for the next publication. Never resolves once the binding is
    /// disabled or cancelled.
    pub async fn changed(&mut self) {
        if self.receiver.changed().await.is_err() {
            futures::future::pending::<()>().await;
        }
    }

    /// Stops the timer and aborts an in-flight fetch.
    pub fn cancel(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.idle = None;
    }
}

impl<T> Drop for PollHandle<T> {
    fn drop(&mut self) {
        self.cancel();
    }
}
