use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;
use tw_core::{
    Article, ArticleStatus, ArticleStorage, Asset, AssetStorage, ConfigStore, CrawlerConfig,
    CrawlerConfigPatch, DownloadLog, DownloadRecord, Error, KeywordFilter, KeywordStorage, Result,
    TrendingKeyword,
};
use uuid::Uuid;

use crate::StorageBackend;

#[derive(Default)]
struct MemoryStore {
    articles: HashMap<String, Article>,
    keywords: HashMap<String, TrendingKeyword>,
    downloads: Vec<DownloadRecord>,
    configs: BTreeMap<String, CrawlerConfig>,
    assets: HashMap<Uuid, Asset>,
}

/// Process-local backend. Every trait method takes the lock once, so
/// insert-if-absent and read-modify-write updates are atomic.
#[derive(Default)]
pub struct InMemoryStorage {
    store: RwLock<MemoryStore>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StorageBackend for InMemoryStorage {
    async fn open(_url: &str) -> Result<Self> {
        Ok(Self::new())
    }
}

#[async_trait]
impl ArticleStorage for InMemoryStorage {
    async fn exists(&self, original_url: &str) -> Result<bool> {
        Ok(self.store.read().await.articles.contains_key(original_url))
    }

    async fn insert_article(&self, article: &Article) -> Result<bool> {
        let mut store = self.store.write().await;
        if store.articles.contains_key(&article.original_url) {
            return Ok(false);
        }
        store
            .articles
            .insert(article.original_url.clone(), article.clone());
        Ok(true)
    }

    async fn get_article(&self, original_url: &str) -> Result<Option<Article>> {
        Ok(self.store.read().await.articles.get(original_url).cloned())
    }

    async fn get_by_platform(&self, platform: &str) -> Result<Vec<Article>> {
        let store = self.store.read().await;
        let mut articles: Vec<Article> = store
            .articles
            .values()
            .filter(|article| article.platform == platform)
            .cloned()
            .collect();
        articles.sort_by(|a, b| b.published_at.cmp(&a.published_at));
        Ok(articles)
    }

    async fn set_status(&self, original_url: &str, status: ArticleStatus) -> Result<Article> {
        let mut store = self.store.write().await;
        let article = store
            .articles
            .get_mut(original_url)
            .ok_or_else(|| Error::NotFound(format!("article {}", original_url)))?;
        article.status = article.status.transition(status)?;
        Ok(article.clone())
    }
}

#[async_trait]
impl KeywordStorage for InMemoryStorage {
    async fn get_keyword(&self, keyword: &str) -> Result<Option<TrendingKeyword>> {
        Ok(self.store.read().await.keywords.get(keyword).cloned())
    }

    async fn put_keyword(&self, keyword: &TrendingKeyword) -> Result<()> {
        self.store
            .write()
            .await
            .keywords
            .insert(keyword.keyword.clone(), keyword.clone());
        Ok(())
    }

    async fn list_keywords(&self, filter: &KeywordFilter) -> Result<Vec<TrendingKeyword>> {
        let store = self.store.read().await;
        let mut keywords: Vec<TrendingKeyword> = store
            .keywords
            .values()
            .filter(|keyword| filter.matches(keyword))
            .cloned()
            .collect();
        keywords.sort_by(|a, b| {
            b.hot_score
                .partial_cmp(&a.hot_score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.keyword.cmp(&b.keyword))
        });
        if filter.limit > 0 {
            keywords.truncate(filter.limit);
        }
        Ok(keywords)
    }
}

#[async_trait]
impl DownloadLog for InMemoryStorage {
    async fn record_download(&self, record: &DownloadRecord) -> Result<()> {
        self.store.write().await.downloads.push(record.clone());
        Ok(())
    }

    async fn count_user_downloads(&self, user_id: &str, since: DateTime<Utc>) -> Result<u64> {
        let store = self.store.read().await;
        Ok(store
            .downloads
            .iter()
            .filter(|record| record.user_id == user_id && record.timestamp >= since)
            .count() as u64)
    }

    async fn count_ip_downloads(&self, ip_address: &str, since: DateTime<Utc>) -> Result<u64> {
        let store = self.store.read().await;
        Ok(store
            .downloads
            .iter()
            .filter(|record| record.ip_address == ip_address && record.timestamp >= since)
            .count() as u64)
    }
}

#[async_trait]
impl ConfigStore for InMemoryStorage {
    async fn get_config(&self, crawler_name: &str) -> Result<Option<CrawlerConfig>> {
        Ok(self.store.read().await.configs.get(crawler_name).cloned())
    }

    async fn list_configs(&self) -> Result<Vec<CrawlerConfig>> {
        Ok(self.store.read().await.configs.values().cloned().collect())
    }

    async fn set_config(&self, crawler_name: &str, patch: &CrawlerConfigPatch) -> Result<CrawlerConfig> {
        let mut store = self.store.write().await;
        let config = store
            .configs
            .get_mut(crawler_name)
            .ok_or_else(|| Error::NotFound(format!("crawler config {}", crawler_name)))?;
        config.apply(patch, Utc::now());
        Ok(config.clone())
    }

    async fn ensure_default(&self, crawler_name: &str) -> Result<()> {
        self.store
            .write()
            .await
            .configs
            .entry(crawler_name.to_string())
            .or_insert_with(|| CrawlerConfig::disabled(crawler_name, Utc::now()));
        Ok(())
    }

    async fn toggle(&self, crawler_name: &str) -> Result<CrawlerConfig> {
        let mut store = self.store.write().await;
        let config = store
            .configs
            .get_mut(crawler_name)
            .ok_or_else(|| Error::NotFound(format!("crawler config {}", crawler_name)))?;
        config.is_enabled = !config.is_enabled;
        config.updated_at = Utc::now();
        Ok(config.clone())
    }
}

#[async_trait]
impl AssetStorage for InMemoryStorage {
    async fn put_asset(&self, asset: &Asset) -> Result<()> {
        self.store.write().await.assets.insert(asset.id, asset.clone());
        Ok(())
    }

    async fn get_active_asset(&self, id: Uuid) -> Result<Option<Asset>> {
        let store = self.store.read().await;
        Ok(store.assets.get(&id).filter(|asset| asset.is_active).cloned())
    }

    async fn increment_download_count(&self, id: Uuid) -> Result<()> {
        let mut store = self.store.write().await;
        let asset = store
            .assets
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("asset {}", id)))?;
        asset.download_count += 1;
        Ok(())
    }
}
