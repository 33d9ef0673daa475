//! Bounded recency + engagement score used to rank articles.
//!
//! Recency contributes at most 30 points (a linear ramp losing one point per
//! day over 100 days, weighted 0.3); engagement contributes at most 70. Both
//! ceilings are part of the contract.

use chrono::{DateTime, Utc};
use tw_core::{Article, Engagement};

pub const MAX_SCORE: f64 = 100.0;
pub const MAX_ENGAGEMENT_CONTRIBUTION: f64 = 70.0;
const TIME_WEIGHT: f64 = 0.3;
const ENGAGEMENT_WEIGHT: f64 = 0.1;

/// likes x1, shares x2, comments x1.5, views x0.01
pub fn engagement_score(engagement: &Engagement) -> f64 {
    engagement.likes as f64
        + engagement.shares as f64 * 2.0
        + engagement.comments as f64 * 1.5
        + engagement.views as f64 * 0.01
}

/// Whole days elapsed since publication, never negative.
pub fn days_since(published_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (now - published_at).num_days().max(0)
}

pub fn hot_score(article: &Article, now: DateTime<Utc>) -> f64 {
    score_parts(article.published_at, &article.engagement, now)
}

pub fn score_parts(published_at: DateTime<Utc>, engagement: &Engagement, now: DateTime<Utc>) -> f64 {
    let time_score = (100.0 - days_since(published_at, now) as f64).max(0.0);
    let engagement_part =
        (engagement_score(engagement) * ENGAGEMENT_WEIGHT).min(MAX_ENGAGEMENT_CONTRIBUTION);
    (time_score * TIME_WEIGHT + engagement_part).clamp(0.0, MAX_SCORE)
}
