use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand};
use tw_core::Result;
use tw_storage::Storage;

use crate::adapters::SourceType;
use crate::feeds::FeedClient;
use crate::ingest::IngestManager;
use crate::runner::ProcessCrawlerRunner;

#[derive(Args, Debug)]
pub struct SourceArgs {
    #[command(subcommand)]
    pub command: SourceCommands,
}

#[derive(Subcommand, Debug)]
pub enum SourceCommands {
    /// Ingest a JSON payload file as one batch
    Ingest {
        /// Source type the payload comes from (e.g. google_sheets, notion, webhook)
        #[arg(value_enum)]
        source: SourceType,
        /// Path to the JSON payload
        file: PathBuf,
    },
    /// Fetch the configured RSS feeds and ingest relevant items
    Feeds {
        /// Per-request timeout in seconds
        #[arg(long, default_value_t = 30)]
        timeout_secs: u64,
    },
    /// Run the crawler worker once and ingest its output
    Crawl(CrawlArgs),
    /// List source types and whether they are enabled
    List,
}

#[derive(Args, Debug, Clone)]
pub struct CrawlArgs {
    /// Crawler executable
    #[arg(long, env = "TRENDWIRE_CRAWLER", default_value = "python3")]
    pub program: PathBuf,
    /// Arguments passed to the crawler
    #[arg(long = "arg", allow_hyphen_values = true)]
    pub args: Vec<String>,
    /// Directory the crawler writes its artifact into
    #[arg(long, env = "TRENDWIRE_CRAWLER_OUTPUT", default_value = "crawler_output")]
    pub output_dir: PathBuf,
    /// Hard limit on one crawler run, in seconds
    #[arg(long, default_value_t = 1800)]
    pub timeout_secs: u64,
}

impl CrawlArgs {
    pub fn runner(&self) -> ProcessCrawlerRunner {
        ProcessCrawlerRunner::new(&self.program, &self.output_dir)
            .with_args(self.args.clone())
            .with_timeout(Duration::from_secs(self.timeout_secs))
            .with_credentials_from_env()
    }
}

pub async fn handle_command(args: SourceArgs, storage: &Storage) -> Result<()> {
    let manager = IngestManager::from_storage(storage);
    match args.command {
        SourceCommands::Ingest { source, file } => {
            let raw = tokio::fs::read(&file).await?;
            let payload: serde_json::Value = serde_json::from_slice(&raw)?;
            let report = manager.ingest(source, &payload).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        SourceCommands::Feeds { timeout_secs } => {
            let client = FeedClient::new(Duration::from_secs(timeout_secs))?;
            let report = manager.run_feeds(&client).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        SourceCommands::Crawl(crawl) => {
            let report = manager.run_crawler(&crawl.runner()).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        SourceCommands::List => {
            println!("Available sources:");
            for source in SourceType::ALL {
                let state = match source.crawler_name() {
                    Some(name) => {
                        let enabled = storage.configs.is_enabled(name).await?;
                        format!("{} ({})", if enabled { "enabled" } else { "disabled" }, name)
                    }
                    None => "always on".to_string(),
                };
                println!("  {:<15} {}", source.as_str(), state);
            }
        }
    }
    Ok(())
}
