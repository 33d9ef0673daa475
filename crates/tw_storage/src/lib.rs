use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tracing::info;
use tw_core::{ArticleStorage, AssetStorage, ConfigStore, DownloadLog, KeywordStorage, Result};

pub mod backends;

pub use backends::*;

#[async_trait]
pub trait StorageBackend: Send + Sync {
    async fn open(url: &str) -> Result<Self>
    where
        Self: Sized;
}

/// Everything the service persists, implemented by a single backend.
pub trait Backend: ArticleStorage + KeywordStorage + DownloadLog + ConfigStore + AssetStorage {}

impl<T> Backend for T where T: ArticleStorage + KeywordStorage + DownloadLog + ConfigStore + AssetStorage {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum StorageKind {
    #[default]
    Memory,
    Sqlite,
}

impl fmt::Display for StorageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageKind::Memory => f.write_str("memory"),
            StorageKind::Sqlite => f.write_str("sqlite"),
        }
    }
}

/// Per-concern handles onto one shared backend.
#[derive(Clone)]
pub struct Storage {
    pub articles: Arc<dyn ArticleStorage>,
    pub keywords: Arc<dyn KeywordStorage>,
    pub downloads: Arc<dyn DownloadLog>,
    pub configs: Arc<dyn ConfigStore>,
    pub assets: Arc<dyn AssetStorage>,
}

impl Storage {
    pub fn from_backend<B: Backend + 'static>(backend: Arc<B>) -> Self {
        Self {
            articles: backend.clone(),
            keywords: backend.clone(),
            downloads: backend.clone(),
            configs: backend.clone(),
            assets: backend,
        }
    }

    pub fn in_memory() -> Self {
        Self::from_backend(Arc::new(InMemoryStorage::new()))
    }
}

pub async fn create_storage(kind: StorageKind, url: &str) -> Result<Storage> {
    let storage = match kind {
        StorageKind::Memory => Storage::from_backend(Arc::new(InMemoryStorage::open(url).await?)),
        #[cfg(feature = "sqlite")]
        StorageKind::Sqlite => Storage::from_backend(Arc::new(SQLiteStorage::open(url).await?)),
        #[cfg(not(feature = "sqlite"))]
        StorageKind::Sqlite => {
            return Err(tw_core::Error::Storage(
                "built without the sqlite feature".to_string(),
            ))
        }
    };
    info!("💾 Using {} storage", kind);
    Ok(storage)
}

/// Creates a disabled config row for each name that has none yet.
pub async fn seed_configs(configs: &dyn ConfigStore, names: &[&str]) -> Result<()> {
    for name in names {
        configs.ensure_default(name).await?;
    }
    Ok(())
}

pub mod prelude {
    pub use super::backends::*;
    pub use super::{create_storage, Storage, StorageKind};
}
