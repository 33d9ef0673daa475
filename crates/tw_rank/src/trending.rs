use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info};
use tw_core::{Article, Error, KeywordStorage, Result, TrendDirection, TrendingKeyword};

/// Keywords decay linearly over one week.
pub const DECAY_WINDOW_HOURS: f64 = 168.0;
pub const DECAY_FLOOR: f64 = 0.1;
pub const DEFAULT_CATEGORY: &str = "general";

const UP_RATIO: f64 = 1.2;
const DOWN_RATIO: f64 = 0.8;

/// Increments reported for a single keyword event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeywordDelta {
    pub search_count: u64,
    pub mention_count: u64,
}

impl KeywordDelta {
    pub fn mentions(count: u64) -> Self {
        Self { search_count: 0, mention_count: count }
    }
}

pub fn time_decay(hours_since_first_seen: f64) -> f64 {
    (1.0 - hours_since_first_seen / DECAY_WINDOW_HOURS).max(DECAY_FLOOR)
}

pub fn classify_trend(new_score: f64, old_score: f64) -> TrendDirection {
    if new_score > old_score * UP_RATIO {
        TrendDirection::Up
    } else if new_score < old_score * DOWN_RATIO {
        TrendDirection::Down
    } else {
        TrendDirection::Stable
    }
}

fn raw_heat(search_count: u64, mention_count: u64) -> f64 {
    search_count as f64 * 2.0 + mention_count as f64
}

/// Computes the next state of a keyword row. A keyword with no prior row is
/// created trending up; afterwards the direction comes only from the ratio of
/// the new score to the stored one.
pub fn apply_delta(
    existing: Option<&TrendingKeyword>,
    keyword: &str,
    category: Option<&str>,
    delta: KeywordDelta,
    now: DateTime<Utc>,
) -> TrendingKeyword {
    match existing {
        None => TrendingKeyword {
            keyword: keyword.to_string(),
            category: category.unwrap_or(DEFAULT_CATEGORY).to_string(),
            search_count: delta.search_count,
            mention_count: delta.mention_count,
            hot_score: raw_heat(delta.search_count, delta.mention_count),
            trend_direction: TrendDirection::Up,
            first_seen_at: now,
            last_updated_at: now,
        },
        Some(current) => {
            let search_count = current.search_count.saturating_add(delta.search_count);
            let mention_count = current.mention_count.saturating_add(delta.mention_count);
            let hours = (now - current.first_seen_at).num_milliseconds().max(0) as f64 / 3_600_000.0;
            let hot_score = raw_heat(search_count, mention_count) * time_decay(hours);
            TrendingKeyword {
                keyword: current.keyword.clone(),
                category: category.unwrap_or(&current.category).to_string(),
                search_count,
                mention_count,
                hot_score,
                trend_direction: classify_trend(hot_score, current.hot_score),
                first_seen_at: current.first_seen_at,
                last_updated_at: now,
            }
        }
    }
}

/// Maintains decaying keyword counters in a `KeywordStorage`.
pub struct TrendingAggregator {
    store: Arc<dyn KeywordStorage>,
}

impl TrendingAggregator {
    pub fn new(store: Arc<dyn KeywordStorage>) -> Self {
        Self { store }
    }

    pub async fn record(
        &self,
        keyword: &str,
        category: Option<&str>,
        delta: KeywordDelta,
        now: DateTime<Utc>,
    ) -> Result<TrendingKeyword> {
        let keyword = keyword.trim();
        if keyword.is_empty() {
            return Err(Error::Validation("keyword must not be empty".to_string()));
        }
        let category = category.map(str::trim).filter(|c| !c.is_empty());

        let existing = self.store.get_keyword(keyword).await?;
        let next = apply_delta(existing.as_ref(), keyword, category, delta, now);
        self.store.put_keyword(&next).await?;
        debug!(
            "🔥 {} -> {:.2} ({})",
            next.keyword,
            next.hot_score,
            next.trend_direction.as_str()
        );
        Ok(next)
    }

    /// Records one mention event per distinct tag across `articles`. The
    /// delta is the number of articles carrying the tag; the category is
    /// taken from the first such article.
    pub async fn record_articles(&self, articles: &[Article], now: DateTime<Utc>) -> Result<usize> {
        let mut counts: BTreeMap<&str, (u64, &str)> = BTreeMap::new();
        for article in articles {
            for tag in &article.tags {
                counts
                    .entry(tag.as_str())
                    .or_insert((0, article.category.as_str()))
                    .0 += 1;
            }
        }

        for (tag, (count, category)) in &counts {
            self.record(tag, Some(category), KeywordDelta::mentions(*count), now)
                .await?;
        }
        if !counts.is_empty() {
            info!("🔥 Updated {} trending keywords", counts.len());
        }
        Ok(counts.len())
    }
}
