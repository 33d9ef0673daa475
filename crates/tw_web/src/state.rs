use std::time::Duration;

use tw_core::Result;
use tw_guard::{DownloadGuard, RateLimits};
use tw_rank::TrendingAggregator;
use tw_sources::IngestManager;
use tw_storage::Storage;

pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

pub struct AppState {
    pub storage: Storage,
    pub ingest: IngestManager,
    pub trending: TrendingAggregator,
    pub guard: DownloadGuard,
    pub http: reqwest::Client,
}

impl AppState {
    /// `fetch_timeout` bounds every upstream asset fetch.
    pub fn new(storage: Storage, limits: RateLimits, fetch_timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(fetch_timeout).build()?;
        Ok(Self {
            ingest: IngestManager::from_storage(&storage),
            trending: TrendingAggregator::new(storage.keywords.clone()),
            guard: DownloadGuard::new(storage.downloads.clone(), limits),
            http,
            storage,
        })
    }
}
