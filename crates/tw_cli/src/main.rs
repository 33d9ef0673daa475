use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use std::str::FromStr;
use std::time::Duration;
use tracing::{error, info};
use tw_core::{ConfigStore, CrawlerConfigPatch};
use tw_guard::RateLimits;
use tw_rank::{trending, TimeRange, TrendingQuery};
use tw_sources::{CrawlArgs, IngestManager, SourceArgs, KNOWN_SOURCES};
use tw_storage::{create_storage, seed_configs, Storage, StorageKind};
use tw_web::AppState;

mod logging;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct HumanDuration(Duration);

impl FromStr for HumanDuration {
    type Err = String;

    /// Accepts `90`, `45s`, `30m`, `1h30m`, `1d`. A bare number is seconds.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let mut total_seconds = 0u64;
        let mut current_number = String::new();
        let mut seen_number = false;

        for c in s.chars() {
            if c.is_ascii_digit() {
                current_number.push(c);
                continue;
            }
            if c.is_whitespace() {
                continue;
            }
            let num = current_number
                .parse::<u64>()
                .map_err(|_| format!("Unit without a number in duration: {}", s))?;
            let unit = match c {
                's' => 1,
                'm' => 60,
                'h' => 3600,
                'd' => 86400,
                _ => return Err(format!("Invalid duration unit: {}", c)),
            };
            total_seconds = num
                .checked_mul(unit)
                .and_then(|seconds| total_seconds.checked_add(seconds))
                .ok_or_else(|| format!("Duration too large: {}", s))?;
            current_number.clear();
            seen_number = true;
        }

        if !current_number.is_empty() {
            let num = current_number
                .parse::<u64>()
                .map_err(|_| "Invalid number in duration".to_string())?;
            total_seconds = total_seconds
                .checked_add(num)
                .ok_or_else(|| format!("Duration too large: {}", s))?;
            seen_number = true;
        }

        if !seen_number {
            return Err("Duration must include a number".to_string());
        }
        Ok(HumanDuration(Duration::from_secs(total_seconds)))
    }
}

#[derive(Parser, Debug)]
#[command(name = "trendwire", author, version, about, long_about = None)]
pub struct Cli {
    /// Storage backend
    #[arg(long, env = "TRENDWIRE_STORAGE", value_enum, default_value_t = StorageKind::Memory)]
    storage: StorageKind,
    /// Database location for the sqlite backend
    #[arg(long, env = "TRENDWIRE_DATABASE_URL", default_value = "sqlite://trendwire.db")]
    database_url: String,
    /// Log filter used when RUST_LOG is unset (e.g. info, debug, tw_sources=debug)
    #[arg(long, env = "TRENDWIRE_LOG_LEVEL", default_value = "info")]
    log_level: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug, Clone)]
struct LimitArgs {
    /// Downloads per user per hour
    #[arg(long, env = "TRENDWIRE_USER_HOURLY_LIMIT", default_value_t = 50)]
    user_hourly_limit: u64,
    /// Downloads per user per day
    #[arg(long, env = "TRENDWIRE_USER_DAILY_LIMIT", default_value_t = 200)]
    user_daily_limit: u64,
    /// Downloads per IP address per hour
    #[arg(long, env = "TRENDWIRE_IP_HOURLY_LIMIT", default_value_t = 20)]
    ip_hourly_limit: u64,
}

impl From<LimitArgs> for RateLimits {
    fn from(args: LimitArgs) -> Self {
        RateLimits {
            per_user_hourly: args.user_hourly_limit,
            per_user_daily: args.user_daily_limit,
            per_ip_hourly: args.ip_hourly_limit,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the HTTP API
    Serve {
        #[arg(long, env = "TRENDWIRE_BIND", default_value = "127.0.0.1:3000")]
        bind: String,
        #[command(flatten)]
        limits: LimitArgs,
        /// Upper bound on one upstream asset fetch (e.g. 30s, 1m)
        #[arg(long, default_value = "30s")]
        fetch_timeout: HumanDuration,
    },
    /// Ingest payloads, fetch feeds, run the crawler once or list sources
    Sources(SourceArgs),
    /// Run the crawler worker, optionally on a fixed interval
    Crawl {
        #[command(flatten)]
        crawl: CrawlArgs,
        /// Repeat with the given interval (e.g. 1h, 30m, 1h15m30s)
        #[arg(long)]
        interval: Option<HumanDuration>,
    },
    /// Print the trending keyword ranking
    Trending {
        #[arg(long, default_value_t = tw_rank::query::DEFAULT_LIMIT)]
        limit: usize,
        #[arg(long)]
        category: Option<String>,
        /// One of 1h, 6h, 24h, 7d
        #[arg(long, default_value = "24h")]
        time_range: String,
    },
    /// Inspect and switch per-source enable flags
    Crawlers {
        #[command(subcommand)]
        command: CrawlerCommands,
    },
}

#[derive(Subcommand, Debug)]
enum CrawlerCommands {
    List,
    Toggle { name: String },
    Enable { name: String },
    Disable { name: String },
}

async fn run_crawl(storage: &Storage, crawl: CrawlArgs, interval: Option<HumanDuration>) -> Result<()> {
    let manager = IngestManager::from_storage(storage);
    let runner = crawl.runner();

    let Some(interval) = interval else {
        let report = manager.run_crawler(&runner).await.context("crawler run failed")?;
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    };

    info!("⏱️ Running in periodic mode every {}s", interval.0.as_secs());
    loop {
        info!("🕷️ Starting crawl cycle");
        match manager.run_crawler(&runner).await {
            Ok(report) => info!(
                "✅ Cycle done: {} found, {} saved",
                report.articles_found, report.articles_saved
            ),
            Err(e) => error!("❌ Crawl cycle failed: {}", e),
        }
        info!("💤 Waiting {}s before next crawl", interval.0.as_secs());
        tokio::time::sleep(interval.0).await;
    }
}

async fn print_trending(storage: &Storage, limit: usize, category: Option<String>, time_range: &str) -> Result<()> {
    let query = TrendingQuery {
        limit,
        category,
        time_range: time_range.parse::<TimeRange>()?,
    };
    let ranked = trending(storage.keywords.as_ref(), &query, Utc::now()).await?;
    if ranked.is_empty() {
        println!("No trending keywords in the last {}", query.time_range);
    }
    for keyword in ranked {
        println!(
            "{:>3}. {} {:<24} {:>8.2}  {:<8} {}",
            keyword.rank,
            keyword.trend_icon,
            keyword.keyword,
            keyword.hot_score,
            keyword.heat_level.as_str(),
            keyword.category
        );
    }
    Ok(())
}

async fn handle_crawlers(configs: &dyn ConfigStore, command: CrawlerCommands) -> Result<()> {
    let set = |enabled: bool| CrawlerConfigPatch {
        is_enabled: Some(enabled),
        config: None,
    };
    let changed = match command {
        CrawlerCommands::List => {
            for config in configs.list_configs().await? {
                println!(
                    "{:<16} {:<8} updated {}",
                    config.crawler_name,
                    if config.is_enabled { "enabled" } else { "disabled" },
                    config.updated_at.format("%Y-%m-%d %H:%M:%S")
                );
            }
            return Ok(());
        }
        CrawlerCommands::Toggle { name } => configs.toggle(&name).await?,
        CrawlerCommands::Enable { name } => configs.set_config(&name, &set(true)).await?,
        CrawlerCommands::Disable { name } => configs.set_config(&name, &set(false)).await?,
    };
    println!(
        "{} is now {}",
        changed.crawler_name,
        if changed.is_enabled { "enabled" } else { "disabled" }
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_logging(&cli.log_level);

    let storage = create_storage(cli.storage, &cli.database_url)
        .await
        .with_context(|| format!("failed to open {} storage", cli.storage))?;
    seed_configs(storage.configs.as_ref(), KNOWN_SOURCES)
        .await
        .context("failed to seed crawler configs")?;
    info!("🦗 Known sources: {}", KNOWN_SOURCES.join(", "));

    match cli.command {
        Commands::Serve {
            bind,
            limits,
            fetch_timeout,
        } => {
            let state = AppState::new(storage, limits.into(), fetch_timeout.0)?;
            tw_web::serve(state, &bind).await.context("HTTP server failed")?;
        }
        Commands::Sources(args) => tw_sources::handle_command(args, &storage).await?,
        Commands::Crawl { crawl, interval } => run_crawl(&storage, crawl, interval).await?,
        Commands::Trending {
            limit,
            category,
            time_range,
        } => print_trending(&storage, limit, category, &time_range).await?,
        Commands::Crawlers { command } => handle_crawlers(storage.configs.as_ref(), command).await?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_human_duration() {
        assert_eq!("90".parse::<HumanDuration>().unwrap().0, Duration::from_secs(90));
        assert_eq!("1h30m".parse::<HumanDuration>().unwrap().0, Duration::from_secs(5400));
        assert_eq!("1d 2h".parse::<HumanDuration>().unwrap().0, Duration::from_secs(93600));
        assert!("h".parse::<HumanDuration>().is_err());
        assert!("5w".parse::<HumanDuration>().is_err());
        assert!("".parse::<HumanDuration>().is_err());
        assert!("99999999999999999999d".parse::<HumanDuration>().is_err());
        assert!("18446744073709551615d".parse::<HumanDuration>().is_err());
        assert!("18446744073709551615s 1s".parse::<HumanDuration>().is_err());
    }

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_limit_args_defaults() {
        let cli = Cli::try_parse_from(["trendwire", "serve"]).unwrap();
        match cli.command {
            Commands::Serve { limits, fetch_timeout, .. } => {
                assert_eq!(RateLimits::from(limits), RateLimits::default());
                assert_eq!(fetch_timeout.0, Duration::from_secs(30));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_crawler_toggle_command() {
        let storage = Storage::in_memory();
        seed_configs(storage.configs.as_ref(), KNOWN_SOURCES).await.unwrap();
        handle_crawlers(storage.configs.as_ref(), CrawlerCommands::Enable { name: "feed_crawler".to_string() })
            .await
            .unwrap();
        assert!(storage.configs.is_enabled("feed_crawler").await.unwrap());
        assert!(handle_crawlers(storage.configs.as_ref(), CrawlerCommands::Toggle { name: "nope".to_string() })
            .await
            .is_err());
    }
}
