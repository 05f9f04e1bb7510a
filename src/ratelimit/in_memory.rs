use std::{
    collections::VecDeque,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use dashmap::DashMap;

use crate::ratelimit::{RateLimitBackend, RateLimitDecision, SlidingWindowPolicy, ceil_secs};

/// Process-local sliding windows keyed by client.
///
/// Each instance keeps its own table, so replicas behind a load balancer do
/// not share counts. Use the Redis backend when that matters.
pub struct InMemoryRateLimitBackend {
    state: DashMap<String, VecDeque<Instant>>,
}

impl InMemoryRateLimitBackend {
    pub fn new() -> Self {
        Self {
            state: DashMap::new(),
        }
    }

    pub fn check_at(
        &self,
        key: &str,
        policy: &SlidingWindowPolicy,
        now: Instant,
    ) -> RateLimitDecision {
        let window = policy.window;

        self.state.retain(|_, entries| {
            prune(entries, now, window);
            !entries.is_empty()
        });

        // The shard lock is held until `entries` drops, so the count and the
        // append below are atomic per client.
        let mut entries = self.state.entry(key.to_string()).or_default();
        prune(&mut entries, now, window);

        if (entries.len() as u64) < policy.max_requests {
            entries.push_back(now);
            return RateLimitDecision::allow(
                policy.max_requests.saturating_sub(entries.len() as u64),
            );
        }

        let retry = entries
            .front()
            .map(|oldest| ceil_secs(window.saturating_sub(now.duration_since(*oldest))))
            .unwrap_or(1);
        RateLimitDecision::deny(retry)
    }
}

impl Default for InMemoryRateLimitBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn prune(entries: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while let Some(front) = entries.front() {
        if now.duration_since(*front) >= window {
            entries.pop_front();
        } else {
            break;
        }
    }
}

#[async_trait]
impl RateLimitBackend for InMemoryRateLimitBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn check(
        &self,
        key: &str,
        policy: &SlidingWindowPolicy,
        _request_id: &str,
    ) -> anyhow::Result<RateLimitDecision> {
        Ok(self.check_at(key, policy, Instant::now()))
    }
}
