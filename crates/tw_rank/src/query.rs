use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tw_core::{Error, KeywordFilter, KeywordStorage, Result, TrendDirection, TrendingKeyword};

pub const DEFAULT_LIMIT: usize = 20;
pub const MAX_LIMIT: usize = 100;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeRange {
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "6h")]
    SixHours,
    #[default]
    #[serde(rename = "24h")]
    Day,
    #[serde(rename = "7d")]
    Week,
}

impl TimeRange {
    pub fn duration(&self) -> Duration {
        match self {
            TimeRange::OneHour => Duration::hours(1),
            TimeRange::SixHours => Duration::hours(6),
            TimeRange::Day => Duration::hours(24),
            TimeRange::Week => Duration::days(7),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TimeRange::OneHour => "1h",
            TimeRange::SixHours => "6h",
            TimeRange::Day => "24h",
            TimeRange::Week => "7d",
        }
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimeRange {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "1h" => Ok(TimeRange::OneHour),
            "6h" => Ok(TimeRange::SixHours),
            "24h" => Ok(TimeRange::Day),
            "7d" => Ok(TimeRange::Week),
            other => Err(Error::Validation(format!("unsupported time range: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HeatLevel {
    Extreme,
    High,
    Medium,
    Low,
}

impl HeatLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            HeatLevel::Extreme => "extreme",
            HeatLevel::High => "high",
            HeatLevel::Medium => "medium",
            HeatLevel::Low => "low",
        }
    }

    pub fn from_score(score: f64) -> Self {
        if score > 100.0 {
            HeatLevel::Extreme
        } else if score > 50.0 {
            HeatLevel::High
        } else if score > 20.0 {
            HeatLevel::Medium
        } else {
            HeatLevel::Low
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendingQuery {
    pub limit: usize,
    pub category: Option<String>,
    pub time_range: TimeRange,
}

impl Default for TrendingQuery {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            category: None,
            time_range: TimeRange::default(),
        }
    }
}

impl TrendingQuery {
    pub fn to_filter(&self, now: DateTime<Utc>) -> KeywordFilter {
        KeywordFilter {
            category: self
                .category
                .as_deref()
                .map(str::trim)
                .filter(|c| !c.is_empty() && *c != "all")
                .map(str::to_string),
            updated_since: Some(now - self.time_range.duration()),
            limit: self.limit.clamp(1, MAX_LIMIT),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedKeyword {
    pub keyword: String,
    pub category: String,
    pub hot_score: f64,
    pub trend_direction: TrendDirection,
    pub rank: usize,
    pub heat_level: HeatLevel,
    pub trend_icon: String,
}

/// Assigns 1-based ranks in the order given.
pub fn rank_keywords(keywords: Vec<TrendingKeyword>) -> Vec<RankedKeyword> {
    keywords
        .into_iter()
        .enumerate()
        .map(|(index, keyword)| RankedKeyword {
            rank: index + 1,
            heat_level: HeatLevel::from_score(keyword.hot_score),
            trend_icon: keyword.trend_direction.icon().to_string(),
            keyword: keyword.keyword,
            category: keyword.category,
            hot_score: keyword.hot_score,
            trend_direction: keyword.trend_direction,
        })
        .collect()
}

pub async fn trending(
    store: &dyn KeywordStorage,
    query: &TrendingQuery,
    now: DateTime<Utc>,
) -> Result<Vec<RankedKeyword>> {
    let keywords = store.list_keywords(&query.to_filter(now)).await?;
    Ok(rank_keywords(keywords))
}
