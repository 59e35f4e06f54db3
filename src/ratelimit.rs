// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Per-client-IP token bucket rate limiting.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tokio_util::sync::CancellationToken;

use crate::config::LimiterConfig;
use crate::error::ApiError;

/// Clients not seen for this long are forgotten.
pub const IDLE_CLIENT_TTL: Duration = Duration::from_secs(3 * 60);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed,
    Limited,
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_seen: Instant,
}

#[derive(Clone)]
pub struct RateLimiter {
    config: LimiterConfig,
    clients: Arc<Mutex<HashMap<IpAddr, Bucket>>>,
}

impl RateLimiter {
    pub fn new(config: LimiterConfig) -> Self {
        Self {
            config,
            clients: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn check(&self, ip: IpAddr) -> RateLimitDecision {
        self.check_at(ip, Instant::now())
    }

    pub fn check_at(&self, ip: IpAddr, now: Instant) -> RateLimitDecision {
        if !self.config.enabled {
            return RateLimitDecision::Allowed;
        }

        let capacity = f64::from(self.config.burst);
        let mut clients = match self.clients.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let bucket = clients.entry(ip).or_insert(Bucket {
            tokens: capacity,
            last_seen: now,
        });

        let elapsed = now.saturating_duration_since(bucket.last_seen).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.config.rps).min(capacity);
        bucket.last_seen = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            RateLimitDecision::Allowed
        } else {
            RateLimitDecision::Limited
        }
    }

    /// Drop clients idle for longer than [`IDLE_CLIENT_TTL`]. Returns how many
    /// were removed.
    pub fn prune_at(&self, now: Instant) -> usize {
        let mut clients = match self.clients.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let before = clients.len();
        clients.retain(|_, bucket| now.saturating_duration_since(bucket.last_seen) < IDLE_CLIENT_TTL);
        before - clients.len()
    }

    pub fn tracked_clients(&self) -> usize {
        self.clients.lock().map(|c| c.len()).unwrap_or(0)
    }

    /// Prune idle clients once a minute until cancelled.
    pub async fn run_pruner(self, shutdown: CancellationToken) {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(60)) => {
                    let removed = self.prune_at(Instant::now());
                    if removed > 0 {
                        tracing::debug!(removed, "pruned idle rate limit clients");
                    }
                }
                _ = shutdown.cancelled() => return,
            }
        }
    }
}

/// Reject requests from clients that exhausted their bucket with 429.
///
/// The client address comes from `ConnectInfo`; without it (in-process
/// tests) every request shares the unspecified address.
pub async fn rate_limit(State(limiter): State<RateLimiter>, request: Request, next: Next) -> Response {
    let ip = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));

    match limiter.check(ip) {
        RateLimitDecision::Allowed => next.run(request).await,
        RateLimitDecision::Limited => {
            tracing::debug!(client_ip = %ip, "rate limit exceeded");
            ApiError::too_many_requests("rate limit exceeded").into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(rps: f64, burst: u32) -> RateLimiter {
        RateLimiter::new(LimiterConfig {
            enabled: true,
            rps,
            burst,
        })
    }

    #[test]
    fn burst_then_limited_then_refilled() {
        let limiter = limiter(2.0, 4);
        let ip: IpAddr = "10.0.0.1".parse().unwrap();
        let start = Instant::now();

        for _ in 0..4 {
            assert_eq!(limiter.check_at(ip, start), RateLimitDecision::Allowed);
        }
        assert_eq!(limiter.check_at(ip, start), RateLimitDecision::Limited);

        // two tokens per second
        let later = start + Duration::from_millis(500);
        assert_eq!(limiter.check_at(ip, later), RateLimitDecision::Allowed);
        assert_eq!(limiter.check_at(ip, later), RateLimitDecision::Limited);
    }

    #[test]
    fn clients_are_independent() {
        let limiter = limiter(1.0, 1);
        let now = Instant::now();
        let a: IpAddr = "10.0.0.1".parse().unwrap();
        let b: IpAddr = "10.0.0.2".parse().unwrap();

        assert_eq!(limiter.check_at(a, now), RateLimitDecision::Allowed);
        assert_eq!(limiter.check_at(a, now), RateLimitDecision::Limited);
        assert_eq!(limiter.check_at(b, now), RateLimitDecision::Allowed);
    }

    #[test]
    fn disabled_always_allows() {
        let limiter = RateLimiter::new(LimiterConfig {
            enabled: false,
            rps: 1.0,
            burst: 1,
        });
        let ip: IpAddr = "10.0.0.1".parse().unwrap();
        for _ in 0..10 {
            assert_eq!(limiter.check(ip), RateLimitDecision::Allowed);
        }
        assert_eq!(limiter.tracked_clients(), 0);
    }

    #[test]
    fn idle_clients_are_pruned() {
        let limiter = limiter(2.0, 4);
        let start = Instant::now();
        limiter.check_at("10.0.0.1".parse().unwrap(), start);
        limiter.check_at("10.0.0.2".parse().unwrap(), start + Duration::from_secs(120));

        assert_eq!(limiter.prune_at(start + Duration::from_secs(200)), 1);
        assert_eq!(limiter.tracked_clients(), 1);
    }
}
