pub mod hot_score;
pub mod query;
pub mod trending;

pub use hot_score::{engagement_score, hot_score};
pub use query::{rank_keywords, trending, HeatLevel, RankedKeyword, TimeRange, TrendingQuery};
pub use trending::{apply_delta, classify_trend, time_decay, KeywordDelta, TrendingAggregator};

pub mod prelude {
    pub use super::query::{TimeRange, TrendingQuery};
    pub use super::trending::{KeywordDelta, TrendingAggregator};
    pub use tw_core::{Article, Error, Result, TrendingKeyword};
}
