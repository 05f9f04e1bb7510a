use anyhow::Context;
use async_trait::async_trait;
use redis::{
    Script,
    aio::ConnectionManager,
};
use std::time::{
    SystemTime,
    UNIX_EPOCH,
};
use uuid::Uuid;

use crate::ratelimit::{RateLimitBackend, RateLimitDecision, SlidingWindowPolicy};

// Prunes, counts and records in one round trip so replicas sharing the key
// space cannot interleave between the count and the append.
const SLIDING_WINDOW_LUA: &str = r#"
local key = KEYS[1]
local now_ms = tonumber(ARGV[1])
local window_ms = tonumber(ARGV[2])
local max_requests = tonumber(ARGV[3])
local member = ARGV[4]
local ttl = tonumber(ARGV[5])

redis.call('ZREMRANGEBYSCORE', key, 0, now_ms - window_ms)
local count = redis.call('ZCARD', key)

if count < max_requests then
  redis.call('ZADD', key, now_ms, member)
  redis.call('EXPIRE', key, ttl)
  return {1, max_requests - (count + 1), 0}
else
  local oldest = redis.call('ZRANGE', key, 0, 0, 'WITHSCORES')
  local retry_after = 1
  if oldest[2] then
    local oldest_score = tonumber(oldest[2])
    retry_after = math.max(1, math.ceil((oldest_score + window_ms - now_ms) / 1000.0))
  end
  return {0, 0, retry_after}
end
"#;

/// Sliding windows stored as sorted sets, shared by every replica using the
/// same Redis and key prefix.
pub struct RedisRateLimitBackend {
    manager: ConnectionManager,
    key_prefix: String,
}

impl RedisRateLimitBackend {
    pub async fn new(url: String, key_prefix: String) -> anyhow::Result<Self> {
        let client = redis::Client::open(url).context("invalid REDIS_URL")?;
        let manager = client
            .get_connection_manager()
            .await
            .context("failed to connect to redis")?;
        Ok(Self {
            manager,
            key_prefix,
        })
    }

    fn key(&self, key: &str) -> String {
        redis_key(&self.key_prefix, key)
    }

    fn now_ms() -> anyhow::Result<i64> {
        let duration = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .context("system clock is before the unix epoch")?;
        Ok(duration.as_millis() as i64)
    }
}

fn redis_key(prefix: &str, key: &str) -> String {
    format!("{prefix}:{key}")
}

#[async_trait]
impl RateLimitBackend for RedisRateLimitBackend {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn check(
        &self,
        key: &str,
        policy: &SlidingWindowPolicy,
        request_id: &str,
    ) -> anyhow::Result<RateLimitDecision> {
        let mut conn = self.manager.clone();
        let full_key = self.key(key);
        let now_ms = Self::now_ms()?;
        let window_ms = policy.window.as_millis() as i64;
        let ttl = (policy.window.as_secs() as i64 + 1).max(1);
        // request ids come from clients and may repeat; the member must not
        let member = format!("{now_ms}-{request_id}-{}", Uuid::new_v4());

        let (allowed, remaining, retry_after): (i64, i64, i64) = Script::new(SLIDING_WINDOW_LUA)
            .key(&full_key)
            .arg(now_ms)
            .arg(window_ms)
            .arg(policy.max_requests as i64)
            .arg(member)
            .arg(ttl)
            .invoke_async(&mut conn)
            .await
            .context("sliding window script failed")?;

        if allowed == 1 {
            Ok(RateLimitDecision::allow(remaining.max(0) as u64))
        } else {
            Ok(RateLimitDecision::deny(retry_after.max(0) as u64))
        }
    }
}
