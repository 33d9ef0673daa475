use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tw_core::{
    Article, ArticleStatus, ArticleStorage, Asset, AssetStorage, Category, ConfigStore,
    CrawlerConfig, CrawlerConfigPatch, DownloadLog, DownloadRecord, Engagement, Error,
    KeywordFilter, KeywordStorage, Result, TrendDirection, TrendingKeyword,
};
use uuid::Uuid;

use crate::StorageBackend;

const MIGRATIONS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS articles (
        original_url TEXT PRIMARY KEY,
        title TEXT NOT NULL,
        content TEXT NOT NULL,
        summary TEXT NOT NULL,
        author TEXT NOT NULL,
        platform TEXT NOT NULL,
        published_at TEXT NOT NULL,
        image_urls TEXT NOT NULL,
        tags TEXT NOT NULL,
        category TEXT NOT NULL,
        likes INTEGER NOT NULL DEFAULT 0,
        shares INTEGER NOT NULL DEFAULT 0,
        comments INTEGER NOT NULL DEFAULT 0,
        views INTEGER NOT NULL DEFAULT 0,
        hot_score REAL NOT NULL,
        status TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS trending_keywords (
        keyword TEXT PRIMARY KEY,
        category TEXT NOT NULL,
        search_count INTEGER NOT NULL,
        mention_count INTEGER NOT NULL,
        hot_score REAL NOT NULL,
        trend_direction TEXT NOT NULL,
        first_seen_at TEXT NOT NULL,
        last_updated_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS crawler_config (
        crawler_name TEXT PRIMARY KEY,
        is_enabled INTEGER NOT NULL,
        config TEXT NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS download_records (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        asset_id TEXT NOT NULL,
        user_id TEXT NOT NULL,
        ip_address TEXT NOT NULL,
        user_agent TEXT NOT NULL,
        timestamp TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_downloads_user ON download_records (user_id, timestamp)",
    "CREATE INDEX IF NOT EXISTS idx_downloads_ip ON download_records (ip_address, timestamp)",
    r#"
    CREATE TABLE IF NOT EXISTS assets (
        id TEXT PRIMARY KEY,
        title TEXT NOT NULL,
        image_url TEXT NOT NULL,
        original_filename TEXT,
        download_count INTEGER NOT NULL DEFAULT 0,
        is_active INTEGER NOT NULL DEFAULT 1
    )
    "#,
];

fn db_err(e: sqlx::Error) -> Error {
    Error::Database(e.to_string())
}

/// Fixed-width UTC timestamps so that text comparison orders them correctly.
fn ts(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| Error::Parse(format!("bad timestamp {}: {}", value, e)))
}

fn count(row: &SqliteRow, column: &str) -> Result<u64> {
    let value: i64 = row.try_get(column).map_err(db_err)?;
    Ok(value.max(0) as u64)
}

pub struct SQLiteStorage {
    pool: SqlitePool,
    db_path: PathBuf,
}

#[async_trait]
impl StorageBackend for SQLiteStorage {
    /// Accepts `sqlite:<path>`, `sqlite://<path>` or a bare path.
    async fn open(url: &str) -> Result<Self> {
        let path = url
            .strip_prefix("sqlite://")
            .or_else(|| url.strip_prefix("sqlite:"))
            .unwrap_or(url);
        Self::new_with_path(Path::new(path)).await
    }
}

impl SQLiteStorage {
    pub async fn new_with_path(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(db_err)?;

        for (i, migration) in MIGRATIONS.iter().enumerate() {
            sqlx::query(migration)
                .execute(&pool)
                .await
                .map_err(|e| Error::Database(format!("migration {} failed: {}", i, e)))?;
        }

        Ok(Self {
            pool,
            db_path: db_path.to_path_buf(),
        })
    }

    pub fn get_db_path(&self) -> &Path {
        &self.db_path
    }

    fn article_from_row(row: &SqliteRow) -> Result<Article> {
        let image_urls: String = row.try_get("image_urls").map_err(db_err)?;
        let tags: String = row.try_get("tags").map_err(db_err)?;
        let category: String = row.try_get("category").map_err(db_err)?;
        let status: String = row.try_get("status").map_err(db_err)?;
        let published_at: String = row.try_get("published_at").map_err(db_err)?;

        Ok(Article {
            title: row.try_get("title").map_err(db_err)?,
            content: row.try_get("content").map_err(db_err)?,
            summary: row.try_get("summary").map_err(db_err)?,
            author: row.try_get("author").map_err(db_err)?,
            platform: row.try_get("platform").map_err(db_err)?,
            original_url: row.try_get("original_url").map_err(db_err)?,
            published_at: parse_ts(&published_at)?,
            image_urls: serde_json::from_str::<Vec<String>>(&image_urls)?,
            tags: serde_json::from_str::<BTreeSet<String>>(&tags)?,
            category: Category::from_str(&category)?,
            engagement: Engagement {
                likes: count(row, "likes")?,
                shares: count(row, "shares")?,
                comments: count(row, "comments")?,
                views: count(row, "views")?,
            },
            hot_score: row.try_get("hot_score").map_err(db_err)?,
            status: ArticleStatus::from_str(&status)?,
        })
    }

    fn keyword_from_row(row: &SqliteRow) -> Result<TrendingKeyword> {
        let direction: String = row.try_get("trend_direction").map_err(db_err)?;
        let first_seen_at: String = row.try_get("first_seen_at").map_err(db_err)?;
        let last_updated_at: String = row.try_get("last_updated_at").map_err(db_err)?;
        Ok(TrendingKeyword {
            keyword: row.try_get("keyword").map_err(db_err)?,
            category: row.try_get("category").map_err(db_err)?,
            search_count: count(row, "search_count")?,
            mention_count: count(row, "mention_count")?,
            hot_score: row.try_get("hot_score").map_err(db_err)?,
            trend_direction: TrendDirection::from_str(&direction)?,
            first_seen_at: parse_ts(&first_seen_at)?,
            last_updated_at: parse_ts(&last_updated_at)?,
        })
    }

    fn config_from_row(row: &SqliteRow) -> Result<CrawlerConfig> {
        let config: String = row.try_get("config").map_err(db_err)?;
        let created_at: String = row.try_get("created_at").map_err(db_err)?;
        let updated_at: String = row.try_get("updated_at").map_err(db_err)?;
        Ok(CrawlerConfig {
            crawler_name: row.try_get("crawler_name").map_err(db_err)?,
            is_enabled: row.try_get("is_enabled").map_err(db_err)?,
            config: serde_json::from_str::<Map<String, Value>>(&config)?,
            created_at: parse_ts(&created_at)?,
            updated_at: parse_ts(&updated_at)?,
        })
    }

    fn asset_from_row(row: &SqliteRow) -> Result<Asset> {
        let id: String = row.try_get("id").map_err(db_err)?;
        Ok(Asset {
            id: Uuid::parse_str(&id).map_err(|e| Error::Parse(e.to_string()))?,
            title: row.try_get("title").map_err(db_err)?,
            image_url: row.try_get("image_url").map_err(db_err)?,
            original_filename: row.try_get("original_filename").map_err(db_err)?,
            download_count: count(row, "download_count")?,
            is_active: row.try_get("is_active").map_err(db_err)?,
        })
    }
}

#[async_trait]
impl ArticleStorage for SQLiteStorage {
    async fn exists(&self, original_url: &str) -> Result<bool> {
        let row = sqlx::query("SELECT 1 FROM articles WHERE original_url = ?")
            .bind(original_url)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(row.is_some())
    }

    async fn insert_article(&self, article: &Article) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO articles
            (original_url, title, content, summary, author, platform, published_at,
             image_urls, tags, category, likes, shares, comments, views, hot_score, status)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(original_url) DO NOTHING
            "#,
        )
        .bind(&article.original_url)
        .bind(&article.title)
        .bind(&article.content)
        .bind(&article.summary)
        .bind(&article.author)
        .bind(&article.platform)
        .bind(ts(article.published_at))
        .bind(serde_json::to_string(&article.image_urls)?)
        .bind(serde_json::to_string(&article.tags)?)
        .bind(article.category.as_str())
        .bind(article.engagement.likes as i64)
        .bind(article.engagement.shares as i64)
        .bind(article.engagement.comments as i64)
        .bind(article.engagement.views as i64)
        .bind(article.hot_score)
        .bind(article.status.as_str())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(result.rows_affected() == 1)
    }

    async fn get_article(&self, original_url: &str) -> Result<Option<Article>> {
        let row = sqlx::query("SELECT * FROM articles WHERE original_url = ?")
            .bind(original_url)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.as_ref().map(Self::article_from_row).transpose()
    }

    async fn get_by_platform(&self, platform: &str) -> Result<Vec<Article>> {
        let rows = sqlx::query("SELECT * FROM articles WHERE platform = ? ORDER BY published_at DESC")
            .bind(platform)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        rows.iter().map(Self::article_from_row).collect()
    }

    async fn set_status(&self, original_url: &str, status: ArticleStatus) -> Result<Article> {
        let mut article = self
            .get_article(original_url)
            .await?
            .ok_or_else(|| Error::NotFound(format!("article {}", original_url)))?;
        let next = article.status.transition(status)?;

        // compare-and-set on the status we validated against
        let result = sqlx::query("UPDATE articles SET status = ? WHERE original_url = ? AND status = ?")
            .bind(next.as_str())
            .bind(original_url)
            .bind(article.status.as_str())
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        if result.rows_affected() == 0 {
            return Err(Error::Storage(format!(
                "article {} changed status concurrently",
                original_url
            )));
        }

        article.status = next;
        Ok(article)
    }
}

#[async_trait]
impl KeywordStorage for SQLiteStorage {
    async fn get_keyword(&self, keyword: &str) -> Result<Option<TrendingKeyword>> {
        let row = sqlx::query("SELECT * FROM trending_keywords WHERE keyword = ?")
            .bind(keyword)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.as_ref().map(Self::keyword_from_row).transpose()
    }

    async fn put_keyword(&self, keyword: &TrendingKeyword) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO trending_keywords
            (keyword, category, search_count, mention_count, hot_score, trend_direction,
             first_seen_at, last_updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(keyword) DO UPDATE SET
                category = excluded.category,
                search_count = excluded.search_count,
                mention_count = excluded.mention_count,
                hot_score = excluded.hot_score,
                trend_direction = excluded.trend_direction,
                last_updated_at = excluded.last_updated_at
            "#,
        )
        .bind(&keyword.keyword)
        .bind(&keyword.category)
        .bind(keyword.search_count as i64)
        .bind(keyword.mention_count as i64)
        .bind(keyword.hot_score)
        .bind(keyword.trend_direction.as_str())
        .bind(ts(keyword.first_seen_at))
        .bind(ts(keyword.last_updated_at))
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn list_keywords(&self, filter: &KeywordFilter) -> Result<Vec<TrendingKeyword>> {
        // LIMIT -1 is unbounded in SQLite
        let limit = if filter.limit == 0 { -1 } else { filter.limit as i64 };
        let rows = sqlx::query(
            r#"
            SELECT * FROM trending_keywords
            WHERE hot_score > 0
              AND (?1 IS NULL OR category = ?1)
              AND (?2 IS NULL OR last_updated_at >= ?2)
            ORDER BY hot_score DESC, keyword ASC
            LIMIT ?3
            "#,
        )
        .bind(filter.category.as_deref())
        .bind(filter.updated_since.map(ts))
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.iter().map(Self::keyword_from_row).collect()
    }
}

#[async_trait]
impl DownloadLog for SQLiteStorage {
    async fn record_download(&self, record: &DownloadRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO download_records (asset_id, user_id, ip_address, user_agent, timestamp) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(record.asset_id.to_string())
        .bind(&record.user_id)
        .bind(&record.ip_address)
        .bind(&record.user_agent)
        .bind(ts(record.timestamp))
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn count_user_downloads(&self, user_id: &str, since: DateTime<Utc>) -> Result<u64> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS n FROM download_records WHERE user_id = ? AND timestamp >= ?",
        )
        .bind(user_id)
        .bind(ts(since))
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;
        count(&row, "n")
    }

    async fn count_ip_downloads(&self, ip_address: &str, since: DateTime<Utc>) -> Result<u64> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS n FROM download_records WHERE ip_address = ? AND timestamp >= ?",
        )
        .bind(ip_address)
        .bind(ts(since))
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;
        count(&row, "n")
    }
}

#[async_trait]
impl ConfigStore for SQLiteStorage {
    async fn get_config(&self, crawler_name: &str) -> Result<Option<CrawlerConfig>> {
        let row = sqlx::query("SELECT * FROM crawler_config WHERE crawler_name = ?")
            .bind(crawler_name)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.as_ref().map(Self::config_from_row).transpose()
    }

    async fn list_configs(&self) -> Result<Vec<CrawlerConfig>> {
        let rows = sqlx::query("SELECT * FROM crawler_config ORDER BY crawler_name")
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        rows.iter().map(Self::config_from_row).collect()
    }

    async fn set_config(&self, crawler_name: &str, patch: &CrawlerConfigPatch) -> Result<CrawlerConfig> {
        let mut config = self
            .get_config(crawler_name)
            .await?
            .ok_or_else(|| Error::NotFound(format!("crawler config {}", crawler_name)))?;
        config.apply(patch, Utc::now());

        sqlx::query("UPDATE crawler_config SET is_enabled = ?, config = ?, updated_at = ? WHERE crawler_name = ?")
            .bind(config.is_enabled)
            .bind(serde_json::to_string(&config.config)?)
            .bind(ts(config.updated_at))
            .bind(crawler_name)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(config)
    }

    async fn ensure_default(&self, crawler_name: &str) -> Result<()> {
        let now = ts(Utc::now());
        sqlx::query(
            r#"
            INSERT INTO crawler_config (crawler_name, is_enabled, config, created_at, updated_at)
            VALUES (?, 0, '{}', ?, ?)
            ON CONFLICT(crawler_name) DO NOTHING
            "#,
        )
        .bind(crawler_name)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn toggle(&self, crawler_name: &str) -> Result<CrawlerConfig> {
        let row = sqlx::query(
            r#"
            UPDATE crawler_config SET is_enabled = NOT is_enabled, updated_at = ?
            WHERE crawler_name = ?
            RETURNING *
            "#,
        )
        .bind(ts(Utc::now()))
        .bind(crawler_name)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?
        .ok_or_else(|| Error::NotFound(format!("crawler config {}", crawler_name)))?;
        Self::config_from_row(&row)
    }
}

#[async_trait]
impl AssetStorage for SQLiteStorage {
    async fn put_asset(&self, asset: &Asset) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO assets
            (id, title, image_url, original_filename, download_count, is_active)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(asset.id.to_string())
        .bind(&asset.title)
        .bind(&asset.image_url)
        .bind(asset.original_filename.as_deref())
        .bind(asset.download_count as i64)
        .bind(asset.is_active)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn get_active_asset(&self, id: Uuid) -> Result<Option<Asset>> {
        let row = sqlx::query("SELECT * FROM assets WHERE id = ? AND is_active = 1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.as_ref().map(Self::asset_from_row).transpose()
    }

    async fn increment_download_count(&self, id: Uuid) -> Result<()> {
        let result = sqlx::query("UPDATE assets SET download_count = download_count + 1 WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("asset {}", id)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::tempdir;

    fn article(url: &str) -> Article {
        Article {
            title: "泡泡玛特 新品".to_string(),
            content: "Labubu limited edition drop".to_string(),
            summary: "Labubu limited edition drop".to_string(),
            author: "Test Author".to_string(),
            platform: "xiaohongshu".to_string(),
            original_url: url.to_string(),
            published_at: Utc::now(),
            image_urls: vec!["https://cdn.example/a.jpg".to_string()],
            tags: ["labubu", "限量"].iter().map(|t| t.to_string()).collect(),
            category: Category::NewRelease,
            engagement: Engagement { likes: 10, shares: 2, comments: 1, views: 300 },
            hot_score: 33.0,
            status: ArticleStatus::Pending,
        }
    }

    #[tokio::test]
    async fn test_sqlite_article_lifecycle() {
        let temp_dir = tempdir().unwrap();
        let storage = SQLiteStorage::new_with_path(&temp_dir.path().join("test.db"))
            .await
            .unwrap();

        let first = article("https://example.com/1");
        assert!(storage.insert_article(&first).await.unwrap());
        assert!(!storage.insert_article(&first).await.unwrap());
        assert!(storage.exists("https://example.com/1").await.unwrap());

        let stored = storage.get_article("https://example.com/1").await.unwrap().unwrap();
        assert_eq!(stored.tags, first.tags);
        assert_eq!(stored.engagement, first.engagement);
        assert_eq!(stored.category, Category::NewRelease);

        let approved = storage
            .set_status("https://example.com/1", ArticleStatus::Approved)
            .await
            .unwrap();
        assert_eq!(approved.status, ArticleStatus::Approved);
        let back = storage
            .set_status("https://example.com/1", ArticleStatus::Pending)
            .await;
        assert!(matches!(back, Err(Error::InvalidTransition { .. })));
        assert_eq!(storage.get_by_platform("xiaohongshu").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_sqlite_keywords_and_downloads() {
        let temp_dir = tempdir().unwrap();
        let storage = SQLiteStorage::open(&format!(
            "sqlite:{}",
            temp_dir.path().join("kw.db").display()
        ))
        .await
        .unwrap();
        let now = Utc::now();

        for (name, score, updated) in [
            ("labubu", 50.0, now),
            ("lisa", 20.0, now - Duration::hours(3)),
            ("cold", 0.0, now),
        ] {
            storage
                .put_keyword(&TrendingKeyword {
                    keyword: name.to_string(),
                    category: "collecting".to_string(),
                    search_count: 1,
                    mention_count: 1,
                    hot_score: score,
                    trend_direction: TrendDirection::Up,
                    first_seen_at: updated,
                    last_updated_at: updated,
                })
                .await
                .unwrap();
        }
        let filter = KeywordFilter {
            category: Some("collecting".to_string()),
            updated_since: Some(now - Duration::hours(1)),
            limit: 10,
        };
        let listed = storage.list_keywords(&filter).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].keyword, "labubu");

        let asset_id = Uuid::new_v4();
        for minutes in [1, 61] {
            storage
                .record_download(&DownloadRecord {
                    asset_id,
                    user_id: "u1".to_string(),
                    ip_address: "1.2.3.4".to_string(),
                    user_agent: "Mozilla/5.0".to_string(),
                    timestamp: now - Duration::minutes(minutes),
                })
                .await
                .unwrap();
        }
        let hour_ago = now - Duration::hours(1);
        assert_eq!(storage.count_user_downloads("u1", hour_ago).await.unwrap(), 1);
        assert_eq!(storage.count_ip_downloads("1.2.3.4", hour_ago).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_sqlite_configs_and_assets() {
        let temp_dir = tempdir().unwrap();
        let storage = SQLiteStorage::new_with_path(&temp_dir.path().join("cfg.db"))
            .await
            .unwrap();

        storage.ensure_default("feed_crawler").await.unwrap();
        storage.ensure_default("feed_crawler").await.unwrap();
        assert_eq!(storage.list_configs().await.unwrap().len(), 1);
        assert!(!storage.is_enabled("feed_crawler").await.unwrap());
        assert!(storage.toggle("feed_crawler").await.unwrap().is_enabled);
        assert!(!storage.toggle("feed_crawler").await.unwrap().is_enabled);
        assert!(storage.toggle("feed_crawler").await.unwrap().is_enabled);
        assert!(matches!(storage.toggle("nope").await, Err(Error::NotFound(_))));

        let asset = Asset {
            id: Uuid::new_v4(),
            title: "Wallpaper".to_string(),
            image_url: "https://cdn.example/w.png".to_string(),
            original_filename: Some("w.png".to_string()),
            download_count: 0,
            is_active: true,
        };
        storage.put_asset(&asset).await.unwrap();
        storage.increment_download_count(asset.id).await.unwrap();
        let stored = storage.get_active_asset(asset.id).await.unwrap().unwrap();
        assert_eq!(stored.download_count, 1);
        assert!(storage.increment_download_count(Uuid::new_v4()).await.is_err());
    }
}
