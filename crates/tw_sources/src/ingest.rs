use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info, warn};
use tw_core::{Article, ArticleStorage, ConfigStore, Error, KeywordStorage, RawItem, Result};
use tw_rank::{hot_score, TrendingAggregator};
use tw_storage::Storage;

use crate::adapters::{ParsedBatch, SourceType};
use crate::feeds::{FeedClient, DEFAULT_FEEDS};
use crate::normalize::{normalize, NormalizeContext, TITLE};
use crate::runner::CrawlerRunner;

const TITLE_FRAGMENT_CHARS: usize = 40;

/// `{ source: { type, data? }, items? }`. Top-level `items` wins over
/// `source.data`.
#[derive(Debug, Clone, Deserialize)]
pub struct IngestRequest {
    pub source: SourceSpec,
    #[serde(default)]
    pub items: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceSpec {
    #[serde(rename = "type")]
    pub source_type: SourceType,
    #[serde(default)]
    pub data: Option<Value>,
}

impl IngestRequest {
    pub fn payload(&self) -> Result<&Value> {
        self.items
            .as_ref()
            .or(self.source.data.as_ref())
            .ok_or_else(|| Error::Validation("request carries neither items nor source.data".to_string()))
    }
}

/// Outcome of one batch. `successfully_saved + duplicates + errors` always
/// equals `total_parsed`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub total_parsed: usize,
    pub successfully_saved: usize,
    pub duplicates: usize,
    pub errors: usize,
    pub source_type: SourceType,
    pub processed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlReport {
    pub articles_found: usize,
    pub articles_saved: usize,
    pub duration_secs: f64,
}

enum ItemOutcome {
    Saved(Article),
    Duplicate,
}

fn title_fragment(item: &RawItem) -> String {
    item.first_text(TITLE)
        .map(|title| title.chars().take(TITLE_FRAGMENT_CHARS).collect())
        .unwrap_or_else(|| "<untitled>".to_string())
}

pub struct IngestManager {
    articles: Arc<dyn ArticleStorage>,
    configs: Arc<dyn ConfigStore>,
    trending: TrendingAggregator,
}

impl IngestManager {
    pub fn new(
        articles: Arc<dyn ArticleStorage>,
        keywords: Arc<dyn KeywordStorage>,
        configs: Arc<dyn ConfigStore>,
    ) -> Self {
        Self {
            articles,
            configs,
            trending: TrendingAggregator::new(keywords),
        }
    }

    pub fn from_storage(storage: &Storage) -> Self {
        Self::new(
            storage.articles.clone(),
            storage.keywords.clone(),
            storage.configs.clone(),
        )
    }

    /// Reads the enable flag through to the config store on every call.
    pub async fn ensure_enabled(&self, source: SourceType) -> Result<()> {
        let Some(name) = source.crawler_name() else {
            return Ok(());
        };
        if self.configs.is_enabled(name).await? {
            Ok(())
        } else {
            warn!("⏸️ Source {} is disabled ({})", source, name);
            Err(Error::SourceDisabled(name.to_string()))
        }
    }

    pub async fn ingest_request(&self, request: &IngestRequest) -> Result<BatchReport> {
        self.ingest(request.source.source_type, request.payload()?).await
    }

    /// Gate, parse and store one payload. Only a disabled source or a payload
    /// of the wrong shape fails the call; item failures are counted.
    pub async fn ingest(&self, source: SourceType, payload: &Value) -> Result<BatchReport> {
        self.ensure_enabled(source).await?;
        let batch = source.adapter().parse(payload)?;
        Ok(self.ingest_items(source, batch, Utc::now()).await)
    }

    /// Items are handled strictly one after another so two items of the same
    /// batch never race past the existence check.
    pub async fn ingest_items(&self, source: SourceType, batch: ParsedBatch, now: DateTime<Utc>) -> BatchReport {
        let ctx = NormalizeContext {
            platform: source.default_platform(),
            status: source.initial_status(),
            now,
        };
        let mut report = BatchReport {
            total_parsed: batch.items.len() + batch.rejected,
            successfully_saved: 0,
            duplicates: 0,
            errors: batch.rejected,
            source_type: source,
            processed_at: now,
        };
        if batch.rejected > 0 {
            warn!("⚠️ {} {} rows had an unusable shape", batch.rejected, source);
        }

        info!("📰 Processing {} {} items", batch.items.len(), source);
        let mut saved = Vec::new();
        for item in &batch.items {
            match self.process_item(item, &ctx).await {
                Ok(ItemOutcome::Saved(article)) => saved.push(article),
                Ok(ItemOutcome::Duplicate) => report.duplicates += 1,
                Err(e) => {
                    report.errors += 1;
                    warn!("⚠️ Skipping {} item \"{}\": {}", source, title_fragment(item), e);
                }
            }
        }
        report.successfully_saved = saved.len();

        if let Err(e) = self.trending.record_articles(&saved, now).await {
            error!("🚨 Trending update after {} batch failed: {}", source, e);
        }

        info!(
            "✅ {}: {} saved, {} duplicates, {} errors of {}",
            source, report.successfully_saved, report.duplicates, report.errors, report.total_parsed
        );
        report
    }

    async fn process_item(&self, item: &RawItem, ctx: &NormalizeContext<'_>) -> Result<ItemOutcome> {
        let mut article = normalize(item, ctx)?;

        // a failed lookup fails the item rather than risking a duplicate row
        if self.articles.exists(&article.original_url).await? {
            return Ok(ItemOutcome::Duplicate);
        }

        article.hot_score = hot_score(&article, ctx.now);
        if !self.articles.insert_article(&article).await? {
            return Ok(ItemOutcome::Duplicate);
        }
        Ok(ItemOutcome::Saved(article))
    }

    /// Runs the crawler worker as one unit and ingests its artifact. A failed
    /// run stores nothing.
    pub async fn run_crawler(&self, runner: &dyn CrawlerRunner) -> Result<CrawlReport> {
        let source = SourceType::PythonCrawler;
        self.ensure_enabled(source).await?;

        let started = Instant::now();
        let output = runner.run().await.map_err(|e| {
            error!("❌ Crawler run failed ({}): {}", e.reason(), e);
            Error::from(e)
        })?;
        let batch = source.adapter().parse(&output)?;
        let report = self.ingest_items(source, batch, Utc::now()).await;

        let crawl = CrawlReport {
            articles_found: report.total_parsed,
            articles_saved: report.successfully_saved,
            duration_secs: started.elapsed().as_secs_f64(),
        };
        info!(
            "🕷️ Crawl done in {:.1}s: {} found, {} saved",
            crawl.duration_secs, crawl.articles_found, crawl.articles_saved
        );
        Ok(crawl)
    }

    /// Feed URLs come from the `feeds` key of the feed crawler's config,
    /// falling back to the built-in list.
    pub async fn feed_urls(&self) -> Result<Vec<String>> {
        let configured: Vec<String> = self
            .configs
            .get_config("feed_crawler")
            .await?
            .and_then(|config| config.config.get("feeds").cloned())
            .and_then(|feeds| match feeds {
                Value::Array(urls) => Some(
                    urls.iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect(),
                ),
                _ => None,
            })
            .unwrap_or_default();

        if configured.is_empty() {
            Ok(DEFAULT_FEEDS.iter().map(|url| url.to_string()).collect())
        } else {
            Ok(configured)
        }
    }

    pub async fn run_feeds(&self, client: &FeedClient) -> Result<BatchReport> {
        let source = SourceType::Feed;
        self.ensure_enabled(source).await?;
        let urls = self.feed_urls().await?;
        let payload = client.fetch_all(&urls).await;
        let batch = source.adapter().parse(&payload)?;
        Ok(self.ingest_items(source, batch, Utc::now()).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::CrawlerError;
    use async_trait::async_trait;
    use serde_json::json;
    use std::time::Duration;
    use tw_core::{ArticleStatus, CrawlerConfigPatch};
    use tw_storage::InMemoryStorage;

    fn manager(store: &Arc<InMemoryStorage>) -> IngestManager {
        IngestManager::new(store.clone(), store.clone(), store.clone())
    }

    async fn enable(store: &InMemoryStorage, name: &str) {
        store.ensure_default(name).await.unwrap();
        let patch = CrawlerConfigPatch { is_enabled: Some(true), config: None };
        store.set_config(name, &patch).await.unwrap();
    }

    fn webhook_items() -> Value {
        json!([
            {
                "title": "Labubu restock sells out",
                "content": "The labubu blind box restock sold out in minutes.",
                "originalUrl": "https://news.example/labubu-restock",
                "publishedAt": "2024-05-01T10:00:00Z",
                "engagement": { "likes": 10 }
            },
            {
                "title": "Lisa spotted with Labubu",
                "content": "lisa carried a labubu charm.",
                "originalUrl": "https://news.example/lisa-labubu",
                "tags": ["#Celebrity"]
            }
        ])
    }

    #[tokio::test]
    async fn test_second_ingest_saves_nothing() {
        let store = Arc::new(InMemoryStorage::new());
        let manager = manager(&store);

        let first = manager.ingest(SourceType::Webhook, &webhook_items()).await.unwrap();
        assert_eq!(first.total_parsed, 2);
        assert_eq!(first.successfully_saved, 2);

        let second = manager.ingest(SourceType::Webhook, &webhook_items()).await.unwrap();
        assert_eq!(second.successfully_saved, 0);
        assert_eq!(second.duplicates, 2);
        assert_eq!(store.get_by_platform("webhook").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_saved_articles_are_scored_and_trended() {
        let store = Arc::new(InMemoryStorage::new());
        manager(&store).ingest(SourceType::Webhook, &webhook_items()).await.unwrap();

        let article = store
            .get_article("https://news.example/lisa-labubu")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(article.status, ArticleStatus::Approved);
        assert!(article.hot_score > 0.0 && article.hot_score <= 100.0);
        assert!(article.tags.contains("celebrity"));

        let labubu = store.get_keyword("labubu").await.unwrap().unwrap();
        assert_eq!(labubu.mention_count, 2);
        assert_eq!(labubu.search_count, 0);
    }

    #[tokio::test]
    async fn test_bad_items_are_counted_not_fatal() {
        let store = Arc::new(InMemoryStorage::new());
        let payload = json!([
            { "title": "No url at all" },
            { "title": "Bad date", "originalUrl": "https://a.example/1", "publishedAt": "someday" },
            "not an object",
            { "title": "Fine", "originalUrl": "https://a.example/2" }
        ]);
        let report = manager(&store).ingest(SourceType::Webhook, &payload).await.unwrap();
        assert_eq!(report.total_parsed, 4);
        assert_eq!(report.errors, 3);
        assert_eq!(report.successfully_saved, 1);
    }

    #[tokio::test]
    async fn test_disabled_source_is_refused() {
        let store = Arc::new(InMemoryStorage::new());
        let manager = manager(&store);
        let payload = json!({ "results": [] });

        let result = manager.ingest(SourceType::Notion, &payload).await;
        assert!(matches!(result, Err(Error::SourceDisabled(name)) if name == "notion_import"));

        enable(&store, "notion_import").await;
        let report = manager.ingest(SourceType::Notion, &payload).await.unwrap();
        assert_eq!(report.total_parsed, 0);
    }

    #[tokio::test]
    async fn test_wrong_payload_shape_is_a_validation_error() {
        let store = Arc::new(InMemoryStorage::new());
        let result = manager(&store).ingest(SourceType::Webhook, &json!("nope")).await;
        assert!(matches!(result, Err(Error::Validation(_))));
    }

    struct FlakyArticles;

    #[async_trait]
    impl ArticleStorage for FlakyArticles {
        async fn exists(&self, _original_url: &str) -> Result<bool> {
            Err(Error::Storage("connection reset".to_string()))
        }

        async fn insert_article(&self, _article: &Article) -> Result<bool> {
            panic!("insert must not run after a failed existence check");
        }

        async fn get_article(&self, _original_url: &str) -> Result<Option<Article>> {
            Ok(None)
        }

        async fn get_by_platform(&self, _platform: &str) -> Result<Vec<Article>> {
            Ok(Vec::new())
        }

        async fn set_status(&self, original_url: &str, _status: ArticleStatus) -> Result<Article> {
            Err(Error::NotFound(original_url.to_string()))
        }
    }

    #[tokio::test]
    async fn test_failed_existence_check_fails_the_item() {
        let store = Arc::new(InMemoryStorage::new());
        let manager = IngestManager::new(Arc::new(FlakyArticles), store.clone(), store.clone());
        let report = manager.ingest(SourceType::Webhook, &webhook_items()).await.unwrap();
        assert_eq!(report.errors, 2);
        assert_eq!(report.successfully_saved, 0);
        assert_eq!(report.duplicates, 0);
    }

    struct FixedRunner(std::result::Result<Value, ()>);

    #[async_trait]
    impl CrawlerRunner for FixedRunner {
        async fn run(&self) -> std::result::Result<Value, CrawlerError> {
            self.0
                .clone()
                .map_err(|_| CrawlerError::Timeout(Duration::from_secs(1800)))
        }
    }

    #[tokio::test]
    async fn test_crawler_output_is_ingested() {
        let store = Arc::new(InMemoryStorage::new());
        enable(&store, "python_crawler").await;
        let runner = FixedRunner(Ok(json!({
            "metadata": { "platform": "reddit" },
            "articles": [{
                "title": "Hirono figure review",
                "content": "A review of the new figure",
                "originalUrl": "https://reddit.example/r/1",
                "platform": "reddit",
                "hotScore": 99,
                "engagementData": { "likes": 5, "comments": 2 }
            }]
        })));

        let report = manager(&store).run_crawler(&runner).await.unwrap();
        assert_eq!(report.articles_found, 1);
        assert_eq!(report.articles_saved, 1);

        let article = store.get_article("https://reddit.example/r/1").await.unwrap().unwrap();
        assert_eq!(article.status, ArticleStatus::Pending);
        assert_eq!(article.engagement.comments, 2);
        assert!(article.hot_score < 99.0);
    }

    #[tokio::test]
    async fn test_failed_crawl_stores_nothing() {
        let store = Arc::new(InMemoryStorage::new());
        enable(&store, "python_crawler").await;
        let result = manager(&store).run_crawler(&FixedRunner(Err(()))).await;
        assert!(matches!(result, Err(Error::Timeout(_))));
        assert!(store.get_by_platform("reddit").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_feed_urls_from_config() {
        let store = Arc::new(InMemoryStorage::new());
        let manager = manager(&store);
        assert_eq!(manager.feed_urls().await.unwrap().len(), DEFAULT_FEEDS.len());

        store.ensure_default("feed_crawler").await.unwrap();
        let mut config = serde_json::Map::new();
        config.insert("feeds".to_string(), json!(["https://feeds.example/rss"]));
        let patch = CrawlerConfigPatch { is_enabled: None, config: Some(config) };
        store.set_config("feed_crawler", &patch).await.unwrap();
        assert_eq!(manager.feed_urls().await.unwrap(), vec!["https://feeds.example/rss"]);
    }

    #[test]
    fn test_request_prefers_items() {
        let request: IngestRequest = serde_json::from_value(json!({
            "source": { "type": "webhook", "data": [1] },
            "items": [1, 2]
        }))
        .unwrap();
        assert_eq!(request.payload().unwrap().as_array().unwrap().len(), 2);

        let request: IngestRequest = serde_json::from_value(json!({ "source": { "type": "feed" } })).unwrap();
        assert!(request.payload().is_err());
    }
}
