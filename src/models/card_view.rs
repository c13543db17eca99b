use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

use super::DerivedMetric;
use crate::error::Error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricRow {
    pub label: String,
    pub value: DerivedMetric,
}

/// Terminal failure of the card. Only a full reload clears it.
#[derive(Debug, Clone, Serialize)]
pub struct Fault {
    #[serde(serialize_with = "serialize_error")]
    pub error: Arc<Error>,
    pub occurred_at: DateTime<Utc>,
}

fn serialize_error<S: serde::Serializer>(error: &Arc<Error>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(error)
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CardView {
    Card { rows: Vec<MetricRow> },
    Fallback { fault: Fault },
}

impl CardView {
    pub fn rows(&self) -> &[MetricRow] {
        match self {
            CardView::Card { rows } => rows,
            CardView::Fallback { .. } => &[],
        }
    }

    pub fn value_of(&self, label: &str) -> Option<&DerivedMetric> {
        self.rows().iter().find(|row| row.label == label).map(|row| &row.value)
    }

    pub fn fault(&self) -> Option<&Fault> {
        match self {
            CardView::Card { .. } => None,
            CardView::Fallback { fault } => Some(fault),
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.fault().is_some()
    }
}

impl fmt::Display for CardView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CardView::Card { rows } => {
                for row in rows {
                    writeln!(f, "{}: {}", row.label, row.value)?;
                }
                Ok(())
            }
            CardView::Fallback { fault } => {
                writeln!(f, "Something went wrong: {}", fault.error)?;
                writeln!(f, "Reload to try again.")
            }
        }
    }
}
