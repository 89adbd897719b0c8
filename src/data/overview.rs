//! Dashboard overview
//!
//! Recomputed from a cache snapshot on every call; nothing here is stored.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::model::{Element, ElementResult};

/// Latest qualifying result of every element.
///
/// With `hours_since` only results at or after `now - hours_since` qualify;
/// elements without a qualifying result are left out.
pub fn overview(
    elements: &[Element],
    hours_since: Option<u32>,
    now: DateTime<Utc>,
) -> Vec<ElementResult> {
    let cutoff = hours_since.map(|h| now - Duration::hours(i64::from(h)));

    elements
        .iter()
        .filter_map(|element| {
            element
                .results()
                .iter()
                .filter(|r| cutoff.map_or(true, |c| r.timestamp >= c))
                .max_by_key(|r| r.timestamp)
                .cloned()
        })
        .collect()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OverviewCounts {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
}

impl OverviewCounts {
    pub fn from_results(results: &[ElementResult]) -> Self {
        let total = results.len();
        let failed = results.iter().filter(|r| !r.is_ok()).count();
        Self { total, passed: total - failed, failed }
    }
}

/// One dashboard tile
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OverviewTile {
    pub counts: OverviewCounts,
    /// Elements whose qualifying result failed, in cache order
    pub failing_elements: Vec<String>,
}

impl OverviewTile {
    pub fn from_results(results: &[ElementResult]) -> Self {
        Self {
            counts: OverviewCounts::from_results(results),
            failing_elements: results
                .iter()
                .filter(|r| !r.is_ok())
                .map(|r| r.element_id.clone())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Dashboard {
    /// Latest result of every element
    pub active: OverviewTile,
    /// Latest result within the last 24 hours
    pub last_24h: OverviewTile,
}

impl Dashboard {
    pub fn compute(elements: &[Element], now: DateTime<Utc>) -> Self {
        Self {
            active: OverviewTile::from_results(&overview(elements, None, now)),
            last_24h: OverviewTile::from_results(&overview(elements, Some(24), now)),
        }
    }
}
