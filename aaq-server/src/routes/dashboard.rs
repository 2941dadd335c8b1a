//! Dashboard handlers: overview stats, content performance, topic insights.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use aaq_core::analytics::{
    OverviewStats, TimeSeriesPoint, TopContentRow, TopicInsights,
};
use aaq_core::{PeriodBounds, StatsPeriod, TimeFrequency};

use crate::auth::AuthedUser;
use crate::error::ApiResult;
use crate::state::AppState;

const DEFAULT_TOP_CONTENT: usize = 10;

#[derive(Debug, Deserialize)]
pub struct PeriodQuery {
    #[serde(default = "default_period")]
    pub period: String,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub frequency: Option<String>,
    pub top_n: Option<usize>,
}

fn default_period() -> String {
    "week".to_string()
}

impl PeriodQuery {
    fn bounds(&self) -> Result<(StatsPeriod, PeriodBounds), aaq_core::Error> {
        let period: StatsPeriod = self.period.parse()?;
        let bounds = PeriodBounds::resolve(period, Utc::now(), self.start_date, self.end_date)?;
        Ok((period, bounds))
    }

    fn frequency(&self, period: StatsPeriod) -> Result<TimeFrequency, aaq_core::Error> {
        match &self.frequency {
            Some(raw) => raw.parse(),
            None => Ok(TimeFrequency::default_for(period)),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct OverviewResponse {
    pub stats_cards: OverviewStats,
    pub time_series: Vec<TimeSeriesPoint>,
}

pub async fn overview(
    State(state): State<AppState>,
    authed: AuthedUser,
    Query(query): Query<PeriodQuery>,
) -> ApiResult<Json<OverviewResponse>> {
    let (period, bounds) = query.bounds()?;
    let frequency = query.frequency(period)?;

    let stats_cards = state
        .dashboard
        .overview_stats(authed.workspace_id, &bounds)
        .await?;
    let time_series = state
        .dashboard
        .timeseries(authed.workspace_id, &bounds, frequency)
        .await?;

    Ok(Json(OverviewResponse {
        stats_cards,
        time_series,
    }))
}

#[derive(Debug, Serialize)]
pub struct PerformanceResponse {
    pub top_content: Vec<TopContentRow>,
}

pub async fn performance(
    State(state): State<AppState>,
    authed: AuthedUser,
    Query(query): Query<PeriodQuery>,
) -> ApiResult<Json<PerformanceResponse>> {
    let (_, bounds) = query.bounds()?;
    let top_content = state
        .dashboard
        .top_content(
            authed.workspace_id,
            &bounds,
            query.top_n.unwrap_or(DEFAULT_TOP_CONTENT),
        )
        .await?;
    Ok(Json(PerformanceResponse { top_content }))
}

pub async fn insights(
    State(state): State<AppState>,
    authed: AuthedUser,
) -> ApiResult<Json<TopicInsights>> {
    let insights = state.topics.current(authed.workspace_id).await?;
    Ok(Json(insights))
}

pub async fn refresh_insights(
    State(state): State<AppState>,
    authed: AuthedUser,
) -> ApiResult<(StatusCode, Json<serde_json::Value>)> {
    let started = state.topics.spawn_refresh(authed.workspace_id);
    let detail = if started {
        "refresh started"
    } else {
        "refresh already in progress"
    };
    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "detail": detail })),
    ))
}
