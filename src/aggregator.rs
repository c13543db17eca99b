//! The APY card: two independent poll bindings reduced into three labelled
//! metrics, with a single terminal fault state for any failure.

use chrono::Utc;
use log::{error, info};
use std::sync::Arc;
use std::time::Duration;

use crate::error::Error;
use crate::metrics::{derive_distribution_metrics, derive_staking_metrics};
use crate::models::{
    CardView, ChainContext, ChainId, DerivedMetric, DistributionData, Fault, MetricRow,
    StakingData,
};
use crate::services::poller::{bind, DataFetcher, PollHandle, PollSnapshot, DEFAULT_POLL_INTERVAL};

pub const STAKING_SOURCE: &str = "x-imx-data";
pub const DISTRIBUTION_SOURCE: &str = "reserves-distributor-data";
pub const DEFAULT_TOKEN_SYMBOL: &str = "IMX";
pub const STAKING_APY_LABEL: &str = "Staking APY";

struct Bindings {
    chain_id: Option<ChainId>,
    staking: PollHandle<StakingData>,
    distribution: PollHandle<DistributionData>,
}

pub struct Aggregator {
    context: ChainContext,
    staking_fetcher: Arc<dyn DataFetcher<StakingData>>,
    distribution_fetcher: Arc<dyn DataFetcher<DistributionData>>,
    interval: Duration,
    token_symbol: String,
    bindings: Option<Bindings>,
    fault: Option<Fault>,
}

impl Aggregator {
    pub fn new(
        context: ChainContext,
        staking_fetcher: Arc<dyn DataFetcher<StakingData>>,
        distribution_fetcher: Arc<dyn DataFetcher<DistributionData>>,
    ) -> Self {
        Self {
            context,
            staking_fetcher,
            distribution_fetcher,
            interval: DEFAULT_POLL_INTERVAL,
            token_symbol: DEFAULT_TOKEN_SYMBOL.to_string(),
            bindings: None,
            fault: None,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_token_symbol(mut self, token_symbol: impl Into<String>) -> Self {
        self.token_symbol = token_symbol.into();
        self
    }

    pub fn total_staked_label(&self) -> String {
        format!("Total {} Staked", self.token_symbol)
    }

    pub fn total_distributed_label(&self) -> String {
        format!("Total {} Distributed", self.token_symbol)
    }

    pub fn is_mounted(&self) -> bool {
        self.bindings.is_some()
    }

    /// Chain the current bindings poll, if mounted and resolved.
    pub fn chain_id(&self) -> Option<ChainId> {
        self.bindings.as_ref().and_then(|bindings| bindings.chain_id)
    }

    pub fn fault(&self) -> Option<&Fault> {
        self.fault.as_ref()
    }

    /// Starts both poll bindings for the resolved chain. A no-op when
    /// already mounted or faulted.
    pub fn mount(&mut self) {
        if self.bindings.is_some() || self.fault.is_some() {
            return;
        }

        let chain_id = self.context.resolve();
        info!("Mounting APY card for chain {:?}", chain_id);
        self.bindings = Some(Bindings {
            chain_id,
            staking: bind(
                STAKING_SOURCE,
                chain_id,
                Arc::clone(&self.staking_fetcher),
                self.interval,
            ),
            distribution: bind(
                DISTRIBUTION_SOURCE,
                chain_id,
                Arc::clone(&self.distribution_fetcher),
                self.interval,
            ),
        });
    }

    /// Cancels both bindings, including in-flight fetches, and drops all
    /// cached datasets.
    pub fn unmount(&mut self) {
        if self.bindings.take().is_some() {
            info!("Unmounted APY card");
        }
    }

    /// Applies a newly reported chain. When the resolved chain differs from
    /// the one being polled, both bindings restart from scratch.
    pub fn set_chain(&mut self, reported: Option<ChainId>) {
        self.context = self.context.with_reported(reported);
        let resolved = self.context.resolve();

        match &self.bindings {
            Some(bindings) if bindings.chain_id != resolved => {
                info!(
                    "Chain changed from {:?} to {:?}, restarting polls",
                    bindings.chain_id, resolved
                );
                self.unmount();
                self.mount();
            }
            _ => {}
        }
    }

    /// Recovery action offered by the fallback view: discards everything,
    /// including the fault, and mounts again.
    pub fn reload(&mut self) {
        info!("Reloading APY card");
        self.unmount();
        self.fault = None;
        self.mount();
    }

    /// Waits until either binding publishes a new outcome.
    pub async fn changed(&mut self) {
        match &mut self.bindings {
            Some(Bindings {
                staking,
                distribution,
                ..
            }) => {
                tokio::select! {
                    _ = staking.changed() => {}
                    _ = distribution.changed() => {}
                }
            }
            None => futures::future::pending::<()>().await,
        }
    }

    pub fn render(&mut self) -> CardView {
        if let Some(fault) = &self.fault {
            return CardView::Fallback {
                fault: fault.clone(),
            };
        }

        let Some(bindings) = &self.bindings else {
            return self.card(
                DerivedMetric::Unresolved,
                DerivedMetric::Unresolved,
                DerivedMetric::Unresolved,
            );
        };

        match compose(bindings) {
            Ok((apy, staked, distributed)) => self.card(apy, staked, distributed),
            Err(error) => self.fail(error),
        }
    }

    fn card(
        &self,
        apy: DerivedMetric,
        staked: DerivedMetric,
        distributed: DerivedMetric,
    ) -> CardView {
        CardView::Card {
            rows: vec![
                MetricRow {
                    label: STAKING_APY_LABEL.to_string(),
                    value: apy,
                },
                MetricRow {
                    label: self.total_staked_label(),
                    value: staked,
                },
                MetricRow {
                    label: self.total_distributed_label(),
                    value: distributed,
                },
            ],
        }
    }

    fn fail(&mut self, error: Arc<Error>) -> CardView {
        error!("APY card faulted: {}", error);
        self.unmount();
        let fault = Fault {
            error,
            occurred_at: Utc::now(),
        };
        self.fault = Some(fault.clone());
        CardView::Fallback { fault }
    }
}

type Labels = (DerivedMetric, DerivedMetric, DerivedMetric);

fn compose(bindings: &Bindings) -> Result<Labels, Arc<Error>> {
    let staking = bindings.staking.snapshot();
    let distribution = bindings.distribution.snapshot();
    check_failures(&staking)?;
    check_failures(&distribution)?;

    let (apy, staked) = match staking.data {
        Some(data) => {
            let metrics = derive_staking_metrics(&data).map_err(Arc::new)?;
            (
                DerivedMetric::Ready(metrics.staking_apy),
                DerivedMetric::Ready(metrics.total_staked),
            )
        }
        None => (DerivedMetric::Pending, DerivedMetric::Pending),
    };

    let distributed = match distribution.data {
        Some(data) => {
            let metrics = derive_distribution_metrics(&data).map_err(Arc::new)?;
            DerivedMetric::Ready(metrics.total_distributed)
        }
        None => DerivedMetric::Pending,
    };

    Ok((apy, staked, distributed))
}

/// Any failure a binding ever recorded is fatal, even if a later poll
/// succeeded before the view looked.
fn check_failures<T>(snapshot: &PollSnapshot<T>) -> Result<(), Arc<Error>> {
    match &snapshot.last_error {
        Some(error) if snapshot.failures > 0 => Err(Arc::clone(error)),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use crate::models::{PENDING_LABEL, UNRESOLVED_LABEL};
    use crate::services::testing::ScriptedFetcher;
    use tokio::time::{sleep, timeout};

    const STAKED: &str = "Total IMX Staked";
    const DISTRIBUTED: &str = "Total IMX Distributed";

    fn staking_fetcher() -> ScriptedFetcher<StakingData> {
        ScriptedFetcher::new(|chain_id, _| StakingData {
            daily_apr: "0.0003".to_string(),
            total_balance: format!("{}000", chain_id.0),
        })
    }

    fn distribution_fetcher() -> ScriptedFetcher<DistributionData> {
        ScriptedFetcher::new(|chain_id, _| DistributionData {
            distributed: format!("{}500.5", chain_id.0),
        })
    }

    fn aggregator(
        context: ChainContext,
        staking: ScriptedFetcher<StakingData>,
        distribution: ScriptedFetcher<DistributionData>,
    ) -> (
        Aggregator,
        Arc<ScriptedFetcher<StakingData>>,
        Arc<ScriptedFetcher<DistributionData>>,
    ) {
        let staking = Arc::new(staking);
        let distribution = Arc::new(distribution);
        let aggregator = Aggregator::new(context, staking.clone(), distribution.clone());
        (aggregator, staking, distribution)
    }

    fn label<'a>(view: &'a CardView, label: &str) -> &'a str {
        view.value_of(label).map(DerivedMetric::as_str).unwrap_or("<missing>")
    }

    async fn render_until(
        aggregator: &mut Aggregator,
        done: impl Fn(&CardView) -> bool,
    ) -> CardView {
        timeout(Duration::from_secs(120), async move {
            loop {
                let view = aggregator.render();
                if done(&view) {
                    return view;
                }
                aggregator.changed().await;
            }
        })
        .await
        .expect("view never reached the expected state")
    }

    fn all_ready(view: &CardView) -> bool {
        !view.rows().is_empty() && view.rows().iter().all(|row| row.value.is_ready())
    }

    #[tokio::test(start_paused = true)]
    async fn unmounted_card_is_unresolved() {
        let (mut aggregator, staking, _) = aggregator(
            ChainContext::new(None),
            staking_fetcher(),
            distribution_fetcher(),
        );

        let view = aggregator.render();
        assert_eq!(view.rows().len(), 3);
        assert!(view
            .rows()
            .iter()
            .all(|row| row.value.as_str() == UNRESOLVED_LABEL));
        assert_eq!(staking.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn mounted_card_loads_then_shows_metrics() {
        let (mut aggregator, _, _) = aggregator(
            ChainContext::new(None),
            staking_fetcher(),
            distribution_fetcher(),
        );
        aggregator.mount();
        assert_eq!(aggregator.chain_id(), Some(ChainId::ETHEREUM_MAINNET));

        let view = aggregator.render();
        assert_eq!(label(&view, STAKING_APY_LABEL), PENDING_LABEL);
        assert_eq!(label(&view, STAKED), PENDING_LABEL);
        assert_eq!(label(&view, DISTRIBUTED), PENDING_LABEL);

        let view = render_until(&mut aggregator, all_ready).await;
        assert_eq!(label(&view, STAKING_APY_LABEL), "11.57 %");
        assert_eq!(label(&view, STAKED), "1,000.00");
        assert_eq!(label(&view, DISTRIBUTED), "1,500.50");
    }

    #[tokio::test(start_paused = true)]
    async fn sources_resolve_independently() {
        let (mut aggregator, _, _) = aggregator(
            ChainContext::new(None),
            staking_fetcher(),
            distribution_fetcher().with_delay(Duration::from_secs(5)),
        );
        aggregator.mount();

        let view = render_until(&mut aggregator, |view| {
            view.value_of(STAKED).map_or(false, DerivedMetric::is_ready)
        })
        .await;
        assert_eq!(label(&view, STAKING_APY_LABEL), "11.57 %");
        assert_eq!(label(&view, DISTRIBUTED), PENDING_LABEL);

        let view = render_until(&mut aggregator, all_ready).await;
        assert_eq!(label(&view, DISTRIBUTED), "1,500.50");
    }

    #[tokio::test(start_paused = true)]
    async fn unresolved_chain_never_fetches() {
        let (mut aggregator, staking, distribution) = aggregator(
            ChainContext::strict(None),
            staking_fetcher(),
            distribution_fetcher(),
        );
        aggregator.mount();

        sleep(Duration::from_secs(60)).await;
        let view = aggregator.render();
        assert_eq!(staking.calls(), 0);
        assert_eq!(distribution.calls(), 0);
        assert!(view.rows().iter().all(|row| row.value.as_str() == PENDING_LABEL));
        assert_eq!(aggregator.chain_id(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn staking_failure_shows_fallback() {
        let (mut aggregator, _, _) = aggregator(
            ChainContext::new(None),
            staking_fetcher().then_err(FetchError::Other("subgraph down".into())),
            distribution_fetcher(),
        );
        aggregator.mount();

        let view = render_until(&mut aggregator, CardView::is_fallback).await;
        let fault = view.fault().unwrap();
        assert!(matches!(*fault.error, Error::FetchFailure { key, .. } if key.source == STAKING_SOURCE));
        assert!(view.rows().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn distribution_failure_shows_same_fallback() {
        let (mut aggregator, _, _) = aggregator(
            ChainContext::new(None),
            staking_fetcher(),
            distribution_fetcher().then_err(FetchError::Other("subgraph down".into())),
        );
        aggregator.mount();

        let view = render_until(&mut aggregator, CardView::is_fallback).await;
        assert!(matches!(view, CardView::Fallback { .. }));
        assert!(view.rows().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn missing_dataset_is_fatal() {
        let (mut aggregator, _, _) = aggregator(
            ChainContext::new(None),
            staking_fetcher(),
            distribution_fetcher().then_none(),
        );
        aggregator.mount();

        let view = render_until(&mut aggregator, CardView::is_fallback).await;
        assert!(matches!(*view.fault().unwrap().error, Error::MissingData { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_dataset_is_fatal() {
        let (mut aggregator, _, _) = aggregator(
            ChainContext::new(None),
            staking_fetcher().then_value(StakingData {
                daily_apr: "not-a-number".into(),
                total_balance: "1".into(),
            }),
            distribution_fetcher(),
        );
        aggregator.mount();

        let view = render_until(&mut aggregator, CardView::is_fallback).await;
        assert!(matches!(*view.fault().unwrap().error, Error::MalformedData { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn fault_is_terminal_until_reload() {
        let (mut aggregator, staking, _) = aggregator(
            ChainContext::new(None),
            staking_fetcher().then_err(FetchError::Other("boom".into())),
            distribution_fetcher(),
        );
        aggregator.mount();
        render_until(&mut aggregator, CardView::is_fallback).await;
        let calls_at_fault = staking.calls();

        sleep(Duration::from_secs(60)).await;
        assert!(aggregator.render().is_fallback());
        assert!(!aggregator.is_mounted());
        assert_eq!(staking.calls(), calls_at_fault);

        aggregator.mount();
        assert!(aggregator.render().is_fallback());

        aggregator.reload();
        assert!(aggregator.fault().is_none());
        let view = render_until(&mut aggregator, all_ready).await;
        assert_eq!(label(&view, STAKING_APY_LABEL), "11.57 %");
    }

    #[tokio::test(start_paused = true)]
    async fn failure_recovered_before_render_is_still_fatal() {
        let (mut aggregator, _, _) = aggregator(
            ChainContext::new(None),
            staking_fetcher().then_err(FetchError::Other("blip".into())),
            distribution_fetcher(),
        );
        aggregator.mount();

        // let the failed poll and the successful retry both land
        sleep(Duration::from_secs(15)).await;
        assert!(aggregator.render().is_fallback());
    }

    #[tokio::test(start_paused = true)]
    async fn chain_change_restarts_without_stale_data() {
        let (mut aggregator, staking, _) = aggregator(
            ChainContext::new(Some(ChainId(1))),
            staking_fetcher(),
            distribution_fetcher(),
        );
        aggregator.mount();
        let view = render_until(&mut aggregator, all_ready).await;
        assert_eq!(label(&view, STAKED), "1,000.00");

        aggregator.set_chain(Some(ChainId(4)));
        assert_eq!(aggregator.chain_id(), Some(ChainId(4)));
        let view = aggregator.render();
        assert!(view.rows().iter().all(|row| row.value.as_str() == PENDING_LABEL));

        let view = render_until(&mut aggregator, all_ready).await;
        assert_eq!(label(&view, STAKED), "4,000.00");
        assert_eq!(label(&view, DISTRIBUTED), "4,500.50");
        assert!(staking.calls() >= 2);
    }

    #[tokio::test(start_paused = true)]
    async fn chain_change_drops_in_flight_fetch() {
        let (mut aggregator, staking, _) = aggregator(
            ChainContext::new(Some(ChainId(1))),
            staking_fetcher().with_delay(Duration::from_secs(5)),
            distribution_fetcher().with_delay(Duration::from_secs(5)),
        );
        aggregator.mount();
        sleep(Duration::from_secs(1)).await;
        assert_eq!(staking.calls(), 1);

        aggregator.set_chain(Some(ChainId(4)));
        let view = render_until(&mut aggregator, all_ready).await;
        assert_eq!(label(&view, STAKED), "4,000.00");
        assert_eq!(label(&view, DISTRIBUTED), "4,500.50");
    }

    #[tokio::test(start_paused = true)]
    async fn same_chain_keeps_bindings() {
        let (mut aggregator, staking, _) = aggregator(
            ChainContext::new(None),
            staking_fetcher(),
            distribution_fetcher(),
        );
        aggregator.mount();
        render_until(&mut aggregator, all_ready).await;

        aggregator.set_chain(Some(ChainId::ETHEREUM_MAINNET));
        assert!(all_ready(&aggregator.render()));
        assert_eq!(staking.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn custom_token_symbol_changes_labels() {
        let (aggregator, _, _) = aggregator(
            ChainContext::new(None),
            staking_fetcher(),
            distribution_fetcher(),
        );
        let mut aggregator = aggregator.with_token_symbol("XYZ");
        let view = aggregator.render();
        assert!(view.value_of("Total XYZ Staked").is_some());
        assert!(view.value_of("Total XYZ Distributed").is_some());
    }
}
