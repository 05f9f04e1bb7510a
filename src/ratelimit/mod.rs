pub mod in_memory;
pub mod redis_backend;

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlidingWindowPolicy {
    pub window: Duration,
    pub max_requests: u64,
}

impl Default for SlidingWindowPolicy {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(60),
            max_requests: 10,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub remaining: u64,
    pub retry_after_secs: u64,
}

impl RateLimitDecision {
    pub fn allow(remaining: u64) -> Self {
        Self {
            allowed: true,
            remaining,
            retry_after_secs: 0,
        }
    }

    pub fn deny(retry_after_secs: u64) -> Self {
        Self {
            allowed: false,
            remaining: 0,
            retry_after_secs: retry_after_secs.max(1),
        }
    }
}

/// Storage for per-client request windows.
///
/// A check both reads and records: an allowed request is counted against the
/// client's window before the call returns.
#[async_trait]
pub trait RateLimitBackend: Send + Sync {
    fn name(&self) -> &'static str;

    async fn check(
        &self,
        key: &str,
        policy: &SlidingWindowPolicy,
        request_id: &str,
    ) -> anyhow::Result<RateLimitDecision>;
}

#[derive(Clone)]
pub struct RateLimiter {
    backend: Arc<dyn RateLimitBackend>,
    policy: SlidingWindowPolicy,
}

impl RateLimiter {
    pub fn new(backend: Arc<dyn RateLimitBackend>, policy: SlidingWindowPolicy) -> Self {
        Self { backend, policy }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub async fn check(&self, key: &str, request_id: &str) -> anyhow::Result<RateLimitDecision> {
        self.backend.check(key, &self.policy, request_id).await
    }
}

/// Seconds until `remaining` has elapsed, rounded up.
pub(crate) fn ceil_secs(remaining: Duration) -> u64 {
    remaining.as_millis().div_ceil(1000) as u64
}
