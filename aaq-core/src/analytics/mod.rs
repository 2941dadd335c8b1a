//! Dashboard aggregates over query traces.
//!
//! Three read surfaces: stats cards with previous-period deltas, time series
//! bucketed by a validated frequency, and top content; plus the topic
//! clustering job in [`topics`].

pub mod timeseries;
pub mod topics;

pub use timeseries::{PeriodBounds, StatsPeriod, TimeFrequency};
pub use topics::{InsightStatus, TopicCluster, TopicClusterer, TopicInsights, TopicService};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::storage::AnalyticsStore;
use crate::Result;

/// Raw totals inside one period, as produced by the store
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodTotals {
    pub query_count: i64,
    pub upvotes: i64,
    pub downvotes: i64,
    pub urgent_count: i64,
}

/// One dashboard stat with its change versus the previous equivalent period
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StatsCard {
    pub value: i64,
    pub previous_value: i64,
    /// Percentage change; 0.0 when the previous period was empty
    pub percent_change: f32,
}

impl StatsCard {
    #[must_use]
    pub fn new(value: i64, previous_value: i64) -> Self {
        let percent_change = if previous_value == 0 {
            0.0
        } else {
            ((value - previous_value) as f32 / previous_value as f32) * 100.0
        };
        Self {
            value,
            previous_value,
            percent_change,
        }
    }
}

/// Stats-card block of the overview dashboard
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverviewStats {
    pub queries: StatsCard,
    pub upvotes: StatsCard,
    pub downvotes: StatsCard,
    pub urgent_queries: StatsCard,
}

/// One bucket of the query-volume time series
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeSeriesPoint {
    pub bucket_start: DateTime<Utc>,
    pub count: i64,
}

/// One row of the top-content table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopContentRow {
    pub content_id: i64,
    /// Display title; archived rows carry the `[DELETED]` prefix
    pub title: String,
    pub query_count: i64,
    pub positive_votes: i32,
    pub negative_votes: i32,
}

/// Read-side dashboard service
pub struct DashboardService {
    store: Arc<dyn AnalyticsStore>,
}

impl DashboardService {
    #[must_use]
    pub fn new(store: Arc<dyn AnalyticsStore>) -> Self {
        Self { store }
    }

    /// Stats cards for a period, with deltas against the previous
    /// equivalent period
    pub async fn overview_stats(
        &self,
        workspace_id: i64,
        bounds: &PeriodBounds,
    ) -> Result<OverviewStats> {
        let current = self
            .store
            .period_totals(workspace_id, bounds.from, bounds.to)
            .await?;
        let previous = self
            .store
            .period_totals(workspace_id, bounds.previous_from, bounds.previous_to)
            .await?;

        Ok(OverviewStats {
            queries: StatsCard::new(current.query_count, previous.query_count),
            upvotes: StatsCard::new(current.upvotes, previous.upvotes),
            downvotes: StatsCard::new(current.downvotes, previous.downvotes),
            urgent_queries: StatsCard::new(current.urgent_count, previous.urgent_count),
        })
    }

    /// Query volume bucketed at `frequency`; the frequency must already be
    /// validated against the span via [`TimeFrequency::validate_span`]
    pub async fn timeseries(
        &self,
        workspace_id: i64,
        bounds: &PeriodBounds,
        frequency: TimeFrequency,
    ) -> Result<Vec<TimeSeriesPoint>> {
        frequency.validate_span(bounds.from, bounds.to)?;
        self.store
            .query_timeseries(workspace_id, bounds.from, bounds.to, frequency)
            .await
    }

    /// Most-referenced content in the period
    pub async fn top_content(
        &self,
        workspace_id: i64,
        bounds: &PeriodBounds,
        limit: usize,
    ) -> Result<Vec<TopContentRow>> {
        self.store
            .top_content(workspace_id, bounds.from, bounds.to, limit)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_card_percent_change() {
        let card = StatsCard::new(150, 100);
        assert!((card.percent_change - 50.0).abs() < 0.001);

        let drop = StatsCard::new(50, 100);
        assert!((drop.percent_change + 50.0).abs() < 0.001);

        let no_history = StatsCard::new(10, 0);
        assert_eq!(no_history.percent_change, 0.0);
    }
}
