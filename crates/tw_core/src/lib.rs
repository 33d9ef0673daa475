pub mod error;
pub mod storage;
pub mod types;

pub use error::Error;
pub use storage::{
    ArticleStorage, AssetStorage, ConfigStore, DownloadLog, KeywordFilter, KeywordStorage,
};
pub use types::{
    Article, ArticleStatus, Asset, Category, CrawlerConfig, CrawlerConfigPatch, DownloadRecord,
    Engagement, RawItem, TrendDirection, TrendingKeyword,
};

pub type Result<T> = std::result::Result<T, Error>;

pub mod prelude {
    pub use super::storage::*;
    pub use super::types::*;
    pub use super::{Error, Result};
}
