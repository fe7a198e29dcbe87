//! C11 API Metrics & Quota: per-(platform, connection,
//! UTC day) usage counter backed by Redis `INCRBY`+`EXPIRE`, falling back
//! to a process-local atomic counter when Redis is unavailable.

use chrono::Utc;
use dashmap::DashMap;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use shadowai_connectors::types::{ConnectionId, Platform};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::warn;

const TTL_SECONDS: i64 = 86_400;

fn default_limit(platform: Platform) -> u64 {
    match platform {
        Platform::Slack => 10_000,
        Platform::Google => 10_000,
        Platform::Microsoft => 15_000,
    }
}

fn key(platform: Platform, connection_id: ConnectionId) -> String {
    let today = Utc::now().format("%Y-%m-%d");
    format!("api_metrics:{platform}:{connection_id}:{today}")
}

/// Current usage snapshot returned by `QuotaTracker::get`.
#[derive(Debug, Clone, Copy)]
pub struct QuotaStatus {
    pub used: u64,
    pub limit: u64,
    pub remaining: u64,
}

/// Tracks per-(platform, connection, day) API call volume. Reset happens
/// naturally at UTC midnight because the Redis key (and the local
/// fallback key) is date-scoped.
pub struct QuotaTracker {
    redis: Option<ConnectionManager>,
    local_fallback: Arc<DashMap<String, AtomicU64>>,
}

impl QuotaTracker {
    pub fn new(redis: Option<ConnectionManager>) -> Self {
        Self {
            redis,
            local_fallback: Arc::new(DashMap::new()),
        }
    }

    /// Increments usage by `units`. On Redis unavailability, increments a
    /// process-local counter instead.
    pub async fn track(&self, platform: Platform, connection_id: ConnectionId, units: u64) {
        let redis_key = key(platform, connection_id);

        if let Some(redis) = &self.redis {
            let mut conn = redis.clone();
            let result: redis::RedisResult<i64> = conn.incr(&redis_key, units as i64).await;
            match result {
                Ok(_) => {
                    let _: redis::RedisResult<bool> = conn.expire(&redis_key, TTL_SECONDS).await;
                    return;
                }
                Err(error) => {
                    warn!(%error, "redis unavailable for quota tracking, using local fallback");
                }
            }
        }

        self.local_fallback
            .entry(redis_key)
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(units, Ordering::SeqCst);
    }

    /// Returns current usage and remaining budget for the day.
    pub async fn get(&self, platform: Platform, connection_id: ConnectionId) -> QuotaStatus {
        let redis_key = key(platform, connection_id);
        let limit = default_limit(platform);

        let used = if let Some(redis) = &self.redis {
            let mut conn = redis.clone();
            match conn.get::<_, Option<u64>>(&redis_key).await {
                Ok(Some(value)) => value,
                Ok(None) => 0,
                Err(error) => {
                    warn!(%error, "redis unavailable for quota read, using local fallback");
                    self.local_value(&redis_key)
                }
            }
        } else {
            self.local_value(&redis_key)
        };

        QuotaStatus {
            used,
            limit,
            remaining: limit.saturating_sub(used),
        }
    }

    fn local_value(&self, redis_key: &str) -> u64 {
        self.local_fallback
            .get(redis_key)
            .map(|c| c.load(Ordering::SeqCst))
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn local_fallback_tracks_and_reports_remaining() {
        let tracker = QuotaTracker::new(None);
        let connection_id = ConnectionId::new();

        tracker.track(Platform::Slack, connection_id, 3).await;
        tracker.track(Platform::Slack, connection_id, 4).await;

        let status = tracker.get(Platform::Slack, connection_id).await;
        assert_eq!(status.used, 7);
        assert_eq!(status.limit, 10_000);
        assert_eq!(status.remaining, 9_993);
    }

    #[tokio::test]
    async fn different_platforms_have_independent_counters() {
        let tracker = QuotaTracker::new(None);
        let connection_id = ConnectionId::new();

        tracker.track(Platform::Microsoft, connection_id, 5).await;
        let slack_status = tracker.get(Platform::Slack, connection_id).await;
        assert_eq!(slack_status.used, 0);
    }
}
