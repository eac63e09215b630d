//! per-IP token-bucket rate limiting (spec.md §6 "Rate limiting"): the
//! relay-submission routes get a tighter bucket than the read-only query
//! routes, and loopback callers (the indexer's own health checks, local
//! tooling) are exempt from both.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use axum::extract::{ConnectInfo, State};
use axum::middleware::Next;
use axum::response::Response;

use crate::error::ApiError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Tier {
    Relay,
    ReadOnly,
}

impl Tier {
    fn capacity_per_minute(self) -> u32 {
        match self {
            Tier::Relay => 10,
            Tier::ReadOnly => 100,
        }
    }
}

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

impl Bucket {
    fn new(capacity: u32) -> Self {
        Self {
            tokens: capacity as f64,
            last_refill: Instant::now(),
        }
    }

    fn try_take(&mut self, capacity: u32, now: Instant) -> bool {
        let elapsed = now.saturating_duration_since(self.last_refill);
        let refill_rate = capacity as f64 / 60.0;
        self.tokens = (self.tokens + elapsed.as_secs_f64() * refill_rate).min(capacity as f64);
        self.last_refill = now;
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// independent buckets per IP per tier; loopback addresses never consume
/// or check a bucket.
pub struct RateLimiter {
    relay: Mutex<HashMap<IpAddr, Bucket>>,
    read_only: Mutex<HashMap<IpAddr, Bucket>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self {
            relay: Mutex::new(HashMap::new()),
            read_only: Mutex::new(HashMap::new()),
        }
    }

    pub fn check(&self, ip: IpAddr, tier: Tier) -> bool {
        if ip.is_loopback() {
            return true;
        }
        let capacity = tier.capacity_per_minute();
        let map = match tier {
            Tier::Relay => &self.relay,
            Tier::ReadOnly => &self.read_only,
        };
        let now = Instant::now();
        let mut map = map.lock().expect("rate limiter mutex poisoned");
        let bucket = map.entry(ip).or_insert_with(|| Bucket::new(capacity));
        bucket.try_take(capacity, now)
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

fn peer_ip(addr: &SocketAddr) -> IpAddr {
    addr.ip()
}

pub async fn relay_rate_limit<S>(
    State(ctx): State<std::sync::Arc<S>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: axum::extract::Request,
    next: Next,
) -> Result<Response, ApiError>
where
    S: AsRef<RateLimiter> + Send + Sync + 'static,
{
    if ctx.as_ref().as_ref().check(peer_ip(&addr), Tier::Relay) {
        Ok(next.run(request).await)
    } else {
        Err(ApiError::rate_limited())
    }
}

pub async fn read_only_rate_limit<S>(
    State(ctx): State<std::sync::Arc<S>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: axum::extract::Request,
    next: Next,
) -> Result<Response, ApiError>
where
    S: AsRef<RateLimiter> + Send + Sync + 'static,
{
    if ctx.as_ref().as_ref().check(peer_ip(&addr), Tier::ReadOnly) {
        Ok(next.run(request).await)
    } else {
        Err(ApiError::rate_limited())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exhausts_then_refills() {
        let limiter = RateLimiter::new();
        let ip: IpAddr = "203.0.113.7".parse().unwrap();
        for _ in 0..10 {
            assert!(limiter.check(ip, Tier::Relay));
        }
        assert!(!limiter.check(ip, Tier::Relay));
    }

    #[test]
    fn loopback_is_exempt() {
        let limiter = RateLimiter::new();
        let ip: IpAddr = "127.0.0.1".parse().unwrap();
        for _ in 0..1000 {
            assert!(limiter.check(ip, Tier::Relay));
        }
    }

    #[test]
    fn tiers_are_independent() {
        let limiter = RateLimiter::new();
        let ip: IpAddr = "203.0.113.8".parse().unwrap();
        for _ in 0..10 {
            assert!(limiter.check(ip, Tier::Relay));
        }
        assert!(!limiter.check(ip, Tier::Relay));
        assert!(limiter.check(ip, Tier::ReadOnly));
    }
}
