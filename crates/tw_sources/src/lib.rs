//! Content sources: per-source payload adapters, the normalizer that turns
//! their rows into articles, batch ingestion and the crawler worker boundary.

pub mod adapters;
pub mod cli;
pub mod feeds;
pub mod ingest;
pub mod normalize;
pub mod runner;

pub use adapters::{Adapter, ParsedBatch, SourceAdapter, SourceType, KNOWN_SOURCES};
pub use cli::{handle_command, CrawlArgs, SourceArgs, SourceCommands};
pub use feeds::FeedClient;
pub use ingest::{BatchReport, CrawlReport, IngestManager, IngestRequest};
pub use normalize::{normalize, NormalizeContext};
pub use runner::{CrawlerError, CrawlerRunner, ProcessCrawlerRunner};

pub mod prelude {
    pub use super::{IngestManager, SourceType};
    pub use tw_core::{Article, Error, Result};
}
