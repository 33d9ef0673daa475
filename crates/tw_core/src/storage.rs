use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::types::{
    Article, ArticleStatus, Asset, CrawlerConfig, CrawlerConfigPatch, DownloadRecord,
    TrendingKeyword,
};
use crate::Result;

#[async_trait]
pub trait ArticleStorage: Send + Sync {
    /// Returns true when any article with this URL is stored, deleted ones included.
    async fn exists(&self, original_url: &str) -> Result<bool>;

    /// Stores the article unless its URL is already present. Returns false on skip.
    async fn insert_article(&self, article: &Article) -> Result<bool>;

    async fn get_article(&self, original_url: &str) -> Result<Option<Article>>;

    /// Get all articles from a specific platform
    async fn get_by_platform(&self, platform: &str) -> Result<Vec<Article>>;

    /// Moves an article through its status lifecycle.
    async fn set_status(&self, original_url: &str, status: ArticleStatus) -> Result<Article>;
}

/// Filter for the trending listing. Only keywords with a positive score are
/// returned, highest score first. A `limit` of zero means unbounded.
#[derive(Debug, Clone, Default)]
pub struct KeywordFilter {
    pub category: Option<String>,
    pub updated_since: Option<DateTime<Utc>>,
    pub limit: usize,
}

impl KeywordFilter {
    pub fn matches(&self, keyword: &TrendingKeyword) -> bool {
        keyword.hot_score > 0.0
            && self
                .category
                .as_deref()
                .map_or(true, |category| keyword.category == category)
            && self
                .updated_since
                .map_or(true, |since| keyword.last_updated_at >= since)
    }
}

#[async_trait]
pub trait KeywordStorage: Send + Sync {
    async fn get_keyword(&self, keyword: &str) -> Result<Option<TrendingKeyword>>;

    /// Insert or replace the row for `keyword.keyword`.
    async fn put_keyword(&self, keyword: &TrendingKeyword) -> Result<()>;

    async fn list_keywords(&self, filter: &KeywordFilter) -> Result<Vec<TrendingKeyword>>;
}

#[async_trait]
pub trait DownloadLog: Send + Sync {
    async fn record_download(&self, record: &DownloadRecord) -> Result<()>;

    async fn count_user_downloads(&self, user_id: &str, since: DateTime<Utc>) -> Result<u64>;

    async fn count_ip_downloads(&self, ip_address: &str, since: DateTime<Utc>) -> Result<u64>;
}

/// Per-source enable flags. Implementations must read through to their backing
/// store on every call.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    async fn get_config(&self, crawler_name: &str) -> Result<Option<CrawlerConfig>>;

    async fn list_configs(&self) -> Result<Vec<CrawlerConfig>>;

    /// Fails with `Error::NotFound` when no row exists for `crawler_name`.
    async fn set_config(&self, crawler_name: &str, patch: &CrawlerConfigPatch) -> Result<CrawlerConfig>;

    /// Creates a disabled row unless one exists already.
    async fn ensure_default(&self, crawler_name: &str) -> Result<()>;

    /// Flips `is_enabled` in one step. Fails with `Error::NotFound` when no row exists.
    async fn toggle(&self, crawler_name: &str) -> Result<CrawlerConfig>;

    /// Missing rows count as disabled.
    async fn is_enabled(&self, crawler_name: &str) -> Result<bool> {
        Ok(self
            .get_config(crawler_name)
            .await?
            .map_or(false, |config| config.is_enabled))
    }
}

#[async_trait]
pub trait AssetStorage: Send + Sync {
    async fn put_asset(&self, asset: &Asset) -> Result<()>;

    /// Returns the asset only while it is active.
    async fn get_active_asset(&self, id: Uuid) -> Result<Option<Asset>>;

    async fn increment_download_count(&self, id: Uuid) -> Result<()>;
}
