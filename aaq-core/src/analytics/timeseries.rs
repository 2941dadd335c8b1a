//! Period resolution and time-bucket frequency validation.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Dashboard reporting period
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatsPeriod {
    Day,
    Week,
    Month,
    Year,
    Custom,
}

impl std::str::FromStr for StatsPeriod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "day" => Ok(StatsPeriod::Day),
            "week" => Ok(StatsPeriod::Week),
            "month" => Ok(StatsPeriod::Month),
            "year" => Ok(StatsPeriod::Year),
            "custom" => Ok(StatsPeriod::Custom),
            other => Err(Error::Validation(format!("unknown period: {other}"))),
        }
    }
}

/// Bucket size of the query-volume time series
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeFrequency {
    Hour,
    Day,
    Week,
    Month,
}

impl std::str::FromStr for TimeFrequency {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "hour" => Ok(TimeFrequency::Hour),
            "day" => Ok(TimeFrequency::Day),
            "week" => Ok(TimeFrequency::Week),
            "month" => Ok(TimeFrequency::Month),
            other => Err(Error::Validation(format!("unknown frequency: {other}"))),
        }
    }
}

impl TimeFrequency {
    /// Maximum span each bucket size may cover
    #[must_use]
    pub fn max_span_days(&self) -> i64 {
        match self {
            TimeFrequency::Hour => 14,
            TimeFrequency::Day => 100,
            TimeFrequency::Week => 365,
            TimeFrequency::Month => 1825,
        }
    }

    /// Reject spans too wide for this bucket size
    pub fn validate_span(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<()> {
        if to <= from {
            return Err(Error::Validation(
                "end of period must be after its start".to_string(),
            ));
        }
        let span_days = (to - from).num_days();
        if span_days > self.max_span_days() {
            return Err(Error::Validation(format!(
                "{self:?} buckets allow spans up to {} days, got {span_days}",
                self.max_span_days()
            )));
        }
        Ok(())
    }

    /// Bucket size appropriate for a period when the caller does not choose
    #[must_use]
    pub fn default_for(period: StatsPeriod) -> Self {
        match period {
            StatsPeriod::Day => TimeFrequency::Hour,
            StatsPeriod::Week | StatsPeriod::Month => TimeFrequency::Day,
            StatsPeriod::Year | StatsPeriod::Custom => TimeFrequency::Week,
        }
    }
}

/// A resolved period plus its previous equivalent, for delta computation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeriodBounds {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub previous_from: DateTime<Utc>,
    pub previous_to: DateTime<Utc>,
}

impl PeriodBounds {
    /// Resolve a named period ending now, or a custom `[start, end)` range.
    ///
    /// The previous period has the same length and ends where this one
    /// starts.
    pub fn resolve(
        period: StatsPeriod,
        now: DateTime<Utc>,
        start_date: Option<DateTime<Utc>>,
        end_date: Option<DateTime<Utc>>,
    ) -> Result<Self> {
        let (from, to) = match period {
            StatsPeriod::Day => (now - Duration::days(1), now),
            StatsPeriod::Week => (now - Duration::weeks(1), now),
            StatsPeriod::Month => (now - Duration::days(30), now),
            StatsPeriod::Year => (now - Duration::days(365), now),
            StatsPeriod::Custom => {
                let from = start_date.ok_or_else(|| {
                    Error::Validation("custom period requires start_date".to_string())
                })?;
                let to = end_date.ok_or_else(|| {
                    Error::Validation("custom period requires end_date".to_string())
                })?;
                if to <= from {
                    return Err(Error::Validation(
                        "end_date must be after start_date".to_string(),
                    ));
                }
                (from, to)
            }
        };

        let length = to - from;
        Ok(Self {
            from,
            to,
            previous_from: from - length,
            previous_to: from,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    #[test]
    fn named_periods_end_now() {
        let now = at("2026-08-01T12:00:00Z");
        let bounds = PeriodBounds::resolve(StatsPeriod::Week, now, None, None).unwrap();
        assert_eq!(bounds.to, now);
        assert_eq!(bounds.from, now - Duration::weeks(1));
        assert_eq!(bounds.previous_to, bounds.from);
        assert_eq!(bounds.previous_from, bounds.from - Duration::weeks(1));
    }

    #[test]
    fn custom_period_requires_both_dates() {
        let now = at("2026-08-01T12:00:00Z");
        assert!(PeriodBounds::resolve(StatsPeriod::Custom, now, None, None).is_err());
        assert!(PeriodBounds::resolve(
            StatsPeriod::Custom,
            now,
            Some(at("2026-07-01T00:00:00Z")),
            Some(at("2026-06-01T00:00:00Z")),
        )
        .is_err());
    }

    #[test]
    fn frequency_span_caps() {
        let from = at("2026-01-01T00:00:00Z");

        // 20 days of hourly buckets is too wide
        assert!(TimeFrequency::Hour
            .validate_span(from, from + Duration::days(20))
            .is_err());
        assert!(TimeFrequency::Hour
            .validate_span(from, from + Duration::days(14))
            .is_ok());

        assert!(TimeFrequency::Day
            .validate_span(from, from + Duration::days(101))
            .is_err());
        assert!(TimeFrequency::Week
            .validate_span(from, from + Duration::days(365))
            .is_ok());
        assert!(TimeFrequency::Month
            .validate_span(from, from + Duration::days(1826))
            .is_err());
    }

    #[test]
    fn default_frequencies() {
        assert_eq!(TimeFrequency::default_for(StatsPeriod::Day), TimeFrequency::Hour);
        assert_eq!(TimeFrequency::default_for(StatsPeriod::Year), TimeFrequency::Week);
    }
}
