//! Abuse checks that run before an asset is streamed: a header heuristic for
//! scripted clients and sliding-window download quotas.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::warn;
use tw_core::{DownloadLog, DownloadRecord, Result};

pub mod bot;
pub mod rate_limit;

pub use bot::{detect_bot, BotReason, ClientInfo, AUTOMATION_MARKERS};
pub use rate_limit::{LimitWindow, RateDecision, RateLimiter, RateLimits};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    #[error("automated access detected, please use a browser")]
    Bot(BotReason),

    #[error("{window} ({limit})")]
    RateLimited { window: LimitWindow, limit: u64 },
}

impl Rejection {
    pub fn code(&self) -> &'static str {
        match self {
            Rejection::Bot(_) => "BOT_DETECTED",
            Rejection::RateLimited { .. } => "RATE_LIMIT_EXCEEDED",
        }
    }

    pub fn status(&self) -> u16 {
        match self {
            Rejection::Bot(_) => 403,
            Rejection::RateLimited { .. } => 429,
        }
    }

    /// Quota hint reported with the rejection; always zero once limited.
    pub fn remaining(&self) -> Option<u64> {
        match self {
            Rejection::Bot(_) => None,
            Rejection::RateLimited { .. } => Some(0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Allowed { remaining: u64 },
    Rejected(Rejection),
}

pub struct DownloadGuard {
    log: Arc<dyn DownloadLog>,
    limiter: RateLimiter,
}

impl DownloadGuard {
    pub fn new(log: Arc<dyn DownloadLog>, limits: RateLimits) -> Self {
        Self {
            limiter: RateLimiter::new(log.clone(), limits),
            log,
        }
    }

    /// Bot screening needs no identity, so callers run it before auth.
    pub fn screen(&self, client: &ClientInfo) -> std::result::Result<(), Rejection> {
        match detect_bot(client) {
            Some(reason) => {
                warn!("🚫 Bot detected: {}", reason);
                Err(Rejection::Bot(reason))
            }
            None => Ok(()),
        }
    }

    pub async fn check_quota(&self, user_id: &str, ip_address: &str, now: DateTime<Utc>) -> Result<Verdict> {
        Ok(match self.limiter.check(user_id, ip_address, now).await? {
            RateDecision::Allowed { remaining } => Verdict::Allowed { remaining },
            RateDecision::Limited { window, limit } => {
                warn!("🚫 Rate limit for user {} / {}: {}", user_id, ip_address, window);
                Verdict::Rejected(Rejection::RateLimited { window, limit })
            }
        })
    }

    /// Both checks in order. Storage failures surface as `Err`.
    pub async fn check(
        &self,
        client: &ClientInfo,
        user_id: &str,
        ip_address: &str,
        now: DateTime<Utc>,
    ) -> Result<Verdict> {
        if let Err(rejection) = self.screen(client) {
            return Ok(Verdict::Rejected(rejection));
        }
        self.check_quota(user_id, ip_address, now).await
    }

    pub async fn record(&self, record: &DownloadRecord) -> Result<()> {
        self.log.record_download(record).await
    }
}
