use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tw_core::{DownloadLog, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimits {
    pub per_user_hourly: u64,
    pub per_user_daily: u64,
    pub per_ip_hourly: u64,
}

impl Default for RateLimits {
    fn default() -> Self {
        Self {
            per_user_hourly: 50,
            per_user_daily: 200,
            per_ip_hourly: 20,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitWindow {
    UserHourly,
    UserDaily,
    IpHourly,
}

impl fmt::Display for LimitWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LimitWindow::UserHourly => f.write_str("hourly download limit reached"),
            LimitWindow::UserDaily => f.write_str("daily download limit reached"),
            LimitWindow::IpHourly => f.write_str("too many downloads from this address, try again later"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    /// `remaining` is the user's hourly quota left before this download.
    Allowed { remaining: u64 },
    Limited { window: LimitWindow, limit: u64 },
}

/// Sliding-window limiter over the download log.
///
/// Counting and recording are separate steps, so concurrent requests from the
/// same actor may both be admitted at the boundary. The overshoot is bounded by
/// the number of requests in flight.
pub struct RateLimiter {
    log: Arc<dyn DownloadLog>,
    limits: RateLimits,
}

impl RateLimiter {
    pub fn new(log: Arc<dyn DownloadLog>, limits: RateLimits) -> Self {
        Self { log, limits }
    }

    pub fn limits(&self) -> RateLimits {
        self.limits
    }

    /// Checks the user's hourly, then daily, then the address's hourly window.
    /// The first exceeded window decides. Storage errors propagate so callers
    /// fail closed.
    pub async fn check(&self, user_id: &str, ip_address: &str, now: DateTime<Utc>) -> Result<RateDecision> {
        let hour_ago = now - Duration::hours(1);
        let day_ago = now - Duration::days(1);

        let user_hourly = self.log.count_user_downloads(user_id, hour_ago).await?;
        if user_hourly >= self.limits.per_user_hourly {
            return Ok(RateDecision::Limited {
                window: LimitWindow::UserHourly,
                limit: self.limits.per_user_hourly,
            });
        }

        let user_daily = self.log.count_user_downloads(user_id, day_ago).await?;
        if user_daily >= self.limits.per_user_daily {
            return Ok(RateDecision::Limited {
                window: LimitWindow::UserDaily,
                limit: self.limits.per_user_daily,
            });
        }

        let ip_hourly = self.log.count_ip_downloads(ip_address, hour_ago).await?;
        if ip_hourly >= self.limits.per_ip_hourly {
            return Ok(RateDecision::Limited {
                window: LimitWindow::IpHourly,
                limit: self.limits.per_ip_hourly,
            });
        }

        Ok(RateDecision::Allowed {
            remaining: self.limits.per_user_hourly - user_hourly,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tw_core::DownloadRecord;
    use tw_storage::InMemoryStorage;
    use uuid::Uuid;

    async fn seed(store: &InMemoryStorage, user: &str, ip: &str, count: usize, at: DateTime<Utc>) {
        for _ in 0..count {
            store
                .record_download(&DownloadRecord {
                    asset_id: Uuid::new_v4(),
                    user_id: user.to_string(),
                    ip_address: ip.to_string(),
                    user_agent: "Mozilla/5.0".to_string(),
                    timestamp: at,
                })
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_fifty_first_download_is_limited() {
        let store = Arc::new(InMemoryStorage::new());
        let now = Utc::now();
        // spread across addresses so only the user window trips
        for i in 0..50 {
            seed(&store, "u1", &format!("10.0.0.{}", i), 1, now - Duration::minutes(10)).await;
        }
        let limiter = RateLimiter::new(store.clone(), RateLimits::default());
        let decision = limiter.check("u1", "10.0.1.1", now).await.unwrap();
        assert_eq!(
            decision,
            RateDecision::Limited { window: LimitWindow::UserHourly, limit: 50 }
        );
    }

    #[tokio::test]
    async fn test_remaining_counts_down() {
        let store = Arc::new(InMemoryStorage::new());
        let now = Utc::now();
        seed(&store, "u1", "10.0.0.1", 3, now - Duration::minutes(1)).await;
        let limiter = RateLimiter::new(store.clone(), RateLimits::default());
        assert_eq!(
            limiter.check("u1", "10.0.0.1", now).await.unwrap(),
            RateDecision::Allowed { remaining: 47 }
        );
    }

    #[tokio::test]
    async fn test_daily_window_counts_older_downloads() {
        let store = Arc::new(InMemoryStorage::new());
        let now = Utc::now();
        seed(&store, "u1", "10.0.0.1", 200, now - Duration::hours(5)).await;
        let limiter = RateLimiter::new(store.clone(), RateLimits::default());
        let decision = limiter.check("u1", "10.0.0.2", now).await.unwrap();
        assert_eq!(
            decision,
            RateDecision::Limited { window: LimitWindow::UserDaily, limit: 200 }
        );

        // a day later the window has slid past them
        let later = now + Duration::hours(20);
        assert!(matches!(
            limiter.check("u1", "10.0.0.2", later).await.unwrap(),
            RateDecision::Allowed { remaining: 50 }
        ));
    }

    #[tokio::test]
    async fn test_shared_address_is_limited() {
        let store = Arc::new(InMemoryStorage::new());
        let now = Utc::now();
        for i in 0..20 {
            seed(&store, &format!("user-{}", i), "203.0.113.9", 1, now - Duration::minutes(5)).await;
        }
        let limiter = RateLimiter::new(store.clone(), RateLimits::default());
        assert_eq!(
            limiter.check("fresh-user", "203.0.113.9", now).await.unwrap(),
            RateDecision::Limited { window: LimitWindow::IpHourly, limit: 20 }
        );
    }
}
