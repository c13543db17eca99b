mod card_view;
mod chain;
mod distribution_data;
mod metric;
mod staking_data;

pub use card_view::{CardView, Fault, MetricRow};
pub use chain::{ChainContext, ChainId};
pub use distribution_data::DistributionData;
pub use metric::{DerivedMetric, PENDING_LABEL, UNRESOLVED_LABEL};
pub use staking_data::StakingData;
