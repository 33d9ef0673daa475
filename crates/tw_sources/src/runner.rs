use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

pub const DEFAULT_CRAWLER_TIMEOUT: Duration = Duration::from_secs(30 * 60);
pub const OUTPUT_PATH_ENV: &str = "CRAWLER_OUTPUT_PATH";
pub const CREDENTIAL_VARS: &[&str] = &["TWITTER_BEARER_TOKEN", "REDDIT_CLIENT_ID", "REDDIT_CLIENT_SECRET"];

const STDERR_TAIL_CHARS: usize = 2000;

#[derive(Error, Debug)]
pub enum CrawlerError {
    #[error("timeout after {0:?}")]
    Timeout(Duration),

    #[error("failed to start crawler: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("crawler exited with {code:?}: {stderr}")]
    NonZeroExit { code: Option<i32>, stderr: String },

    #[error("crawler wrote no output to {0}")]
    MissingOutput(PathBuf),

    #[error("crawler output is not valid JSON: {0}")]
    InvalidOutput(#[from] serde_json::Error),

    #[error("crawler I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

impl CrawlerError {
    /// Short machine-readable failure reason.
    pub fn reason(&self) -> &'static str {
        match self {
            CrawlerError::Timeout(_) => "timeout",
            CrawlerError::Spawn(_) => "spawn_failed",
            CrawlerError::NonZeroExit { .. } => "non_zero_exit",
            CrawlerError::MissingOutput(_) => "missing_output",
            CrawlerError::InvalidOutput(_) => "invalid_output",
            CrawlerError::Io(_) => "io",
        }
    }
}

impl From<CrawlerError> for tw_core::Error {
    fn from(e: CrawlerError) -> Self {
        match e {
            CrawlerError::Timeout(limit) => tw_core::Error::Timeout(format!("crawler ran longer than {:?}", limit)),
            other => tw_core::Error::External(anyhow::Error::new(other)),
        }
    }
}

/// Boundary around an external data-fetching worker. A run either yields the
/// worker's complete JSON artifact or fails as a whole.
#[async_trait]
pub trait CrawlerRunner: Send + Sync {
    async fn run(&self) -> Result<Value, CrawlerError>;
}

pub struct ProcessCrawlerRunner {
    program: PathBuf,
    args: Vec<String>,
    output_dir: PathBuf,
    timeout: Duration,
    env: Vec<(String, String)>,
}

impl ProcessCrawlerRunner {
    pub fn new(program: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            output_dir: output_dir.into(),
            timeout: DEFAULT_CRAWLER_TIMEOUT,
            env: Vec::new(),
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Forwards the crawler credentials present in this process's environment.
    pub fn with_credentials_from_env(mut self) -> Self {
        for name in CREDENTIAL_VARS {
            match std::env::var(name) {
                Ok(value) => self.env.push((name.to_string(), value)),
                Err(_) => debug!("🔑 {} not set, crawler runs without it", name),
            }
        }
        self
    }

    async fn discard(path: &Path) {
        if let Err(e) = tokio::fs::remove_file(path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("🧹 Could not remove crawler output {}: {}", path.display(), e);
            }
        }
    }
}

fn tail(text: &str, max_chars: usize) -> String {
    let count = text.chars().count();
    text.chars().skip(count.saturating_sub(max_chars)).collect()
}

#[async_trait]
impl CrawlerRunner for ProcessCrawlerRunner {
    async fn run(&self) -> Result<Value, CrawlerError> {
        tokio::fs::create_dir_all(&self.output_dir).await?;
        let output_path = self.output_dir.join(format!("crawl-{}.json", Uuid::new_v4()));

        info!("🚀 Starting crawler {}", self.program.display());
        let child = Command::new(&self.program)
            .args(&self.args)
            .envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .env(OUTPUT_PATH_ENV, &output_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(CrawlerError::Spawn)?;

        // dropping the child on timeout kills it
        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result?,
            Err(_) => {
                error!("⏰ Crawler timed out after {:?}", self.timeout);
                Self::discard(&output_path).await;
                return Err(CrawlerError::Timeout(self.timeout));
            }
        };

        for line in String::from_utf8_lossy(&output.stdout).lines() {
            debug!("🐍 {}", line);
        }

        if !output.status.success() {
            // partial artifacts are not trusted
            Self::discard(&output_path).await;
            let stderr = tail(String::from_utf8_lossy(&output.stderr).trim(), STDERR_TAIL_CHARS);
            error!("❌ Crawler exited with {:?}", output.status.code());
            return Err(CrawlerError::NonZeroExit {
                code: output.status.code(),
                stderr,
            });
        }

        let bytes = match tokio::fs::read(&output_path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(CrawlerError::MissingOutput(output_path));
            }
            Err(e) => return Err(CrawlerError::Io(e)),
        };
        Self::discard(&output_path).await;

        let value: Value = serde_json::from_slice(&bytes)?;
        info!("✅ Crawler finished, {} bytes of output", bytes.len());
        Ok(value)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn script(body: &str, dir: &Path) -> ProcessCrawlerRunner {
        ProcessCrawlerRunner::new("sh", dir).with_args(vec!["-c".to_string(), body.to_string()])
    }

    #[tokio::test]
    async fn test_reads_and_removes_artifact() {
        let dir = tempdir().unwrap();
        let runner = script(
            r#"printf '{"metadata":{},"articles":[{"title":"%s"}]}' "$CRAWLER_TOKEN" > "$CRAWLER_OUTPUT_PATH""#,
            dir.path(),
        )
        .with_env("CRAWLER_TOKEN", "labubu");

        let value = runner.run().await.unwrap();
        assert_eq!(value["articles"][0]["title"], "labubu");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_non_zero_exit_discards_partial_output() {
        let dir = tempdir().unwrap();
        let runner = script(
            r#"echo '{"articles":[]}' > "$CRAWLER_OUTPUT_PATH"; echo 'rate limited' >&2; exit 3"#,
            dir.path(),
        );

        let err = runner.run().await.unwrap_err();
        match &err {
            CrawlerError::NonZeroExit { code, stderr } => {
                assert_eq!(*code, Some(3));
                assert!(stderr.contains("rate limited"));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(err.reason(), "non_zero_exit");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_timeout_kills_the_worker() {
        let dir = tempdir().unwrap();
        let runner = script("sleep 5", dir.path()).with_timeout(Duration::from_millis(200));
        let err = runner.run().await.unwrap_err();
        assert_eq!(err.reason(), "timeout");
        assert!(matches!(tw_core::Error::from(err), tw_core::Error::Timeout(_)));
    }

    #[tokio::test]
    async fn test_missing_and_invalid_output() {
        let dir = tempdir().unwrap();
        let err = script("exit 0", dir.path()).run().await.unwrap_err();
        assert_eq!(err.reason(), "missing_output");

        let err = script(r#"echo 'not json' > "$CRAWLER_OUTPUT_PATH""#, dir.path())
            .run()
            .await
            .unwrap_err();
        assert_eq!(err.reason(), "invalid_output");
    }
}
