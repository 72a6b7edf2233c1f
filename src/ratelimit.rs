//! Login rate limiting.
//!
//! Tracks failed login attempts per client IP: five failures inside the
//! window lock the IP out for fifteen minutes; a successful login clears
//! both the counter and the lock. State lives in Redis when `REDIS_URL` is
//! configured, otherwise in a process-local map. The in-memory fallback
//! does not survive restarts and is not shared between instances — fine
//! for single-instance deployments only, which startup logs call out.
//! Limiter backend errors fail open: login availability beats strict
//! enforcement.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use redis::aio::ConnectionManager;
use tokio::sync::RwLock;

const FAIL_KEY_PREFIX: &str = "cp:login:fail:";
const LOCK_KEY_PREFIX: &str = "cp:login:lock:";

#[derive(Debug, Clone, Copy)]
pub struct RateLimitPolicy {
    pub max_failures: u32,
    pub lockout: Duration,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            max_failures: 5,
            lockout: Duration::from_secs(15 * 60),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed,
    /// Denied; the client may retry after the given duration.
    Locked { retry_after: Duration },
}

struct AttemptState {
    failures: u32,
    last_failure: Instant,
    locked_until: Option<Instant>,
}

enum LimiterBackend {
    Memory(RwLock<HashMap<String, AttemptState>>),
    Redis(ConnectionManager),
}

pub struct LoginRateLimiter {
    policy: RateLimitPolicy,
    backend: LimiterBackend,
}

impl LoginRateLimiter {
    pub fn in_memory() -> Self {
        Self::with_policy(RateLimitPolicy::default())
    }

    pub fn with_policy(policy: RateLimitPolicy) -> Self {
        Self {
            policy,
            backend: LimiterBackend::Memory(RwLock::new(HashMap::new())),
        }
    }

    pub fn redis(connection: ConnectionManager) -> Self {
        Self {
            policy: RateLimitPolicy::default(),
            backend: LimiterBackend::Redis(connection),
        }
    }

    /// Redis when `REDIS_URL` is set and reachable, memory otherwise.
    pub async fn from_env() -> Self {
        if let Ok(url) = std::env::var("REDIS_URL") {
            match redis::Client::open(url.as_str()) {
                Ok(client) => match client.get_connection_manager().await {
                    Ok(connection) => {
                        tracing::info!("login rate limiter: Redis");
                        return Self::redis(connection);
                    }
                    Err(e) => {
                        tracing::warn!(
                            "REDIS_URL set but connection failed ({}); \
                             using in-memory rate limiting",
                            e
                        );
                    }
                },
                Err(e) => {
                    tracing::warn!("invalid REDIS_URL ({}); using in-memory rate limiting", e);
                }
            }
        } else {
            tracing::info!(
                "login rate limiter: in-memory (single instance only; \
                 set REDIS_URL for multi-instance deployments)"
            );
        }
        Self::in_memory()
    }

    /// Is this IP currently allowed to attempt a login?
    pub async fn check(&self, ip: &str) -> RateLimitDecision {
        match &self.backend {
            LimiterBackend::Memory(map) => {
                let now = Instant::now();
                let mut entries = map.write().await;

                // Drop entries whose lock and failure window have both
                // expired so the map stays proportional to active IPs.
                let window = self.policy.lockout;
                entries.retain(|_, s| {
                    s.locked_until.map(|t| t > now).unwrap_or(false)
                        || now.duration_since(s.last_failure) < window
                });

                match entries.get(ip).and_then(|s| s.locked_until) {
                    Some(until) if until > now => RateLimitDecision::Locked {
                        retry_after: until - now,
                    },
                    _ => RateLimitDecision::Allowed,
                }
            }
            LimiterBackend::Redis(connection) => {
                let mut conn = connection.clone();
                let ttl_ms: i64 = match redis::cmd("PTTL")
                    .arg(format!("{}{}", LOCK_KEY_PREFIX, ip))
                    .query_async(&mut conn)
                    .await
                {
                    Ok(v) => v,
                    Err(e) => {
                        tracing::warn!("rate limit check failed, allowing: {}", e);
                        return RateLimitDecision::Allowed;
                    }
                };
                if ttl_ms > 0 {
                    RateLimitDecision::Locked {
                        retry_after: Duration::from_millis(ttl_ms as u64),
                    }
                } else {
                    RateLimitDecision::Allowed
                }
            }
        }
    }

    /// Record a failed attempt; locks the IP once the policy threshold is
    /// reached.
    pub async fn record_failure(&self, ip: &str) {
        match &self.backend {
            LimiterBackend::Memory(map) => {
                let now = Instant::now();
                let mut entries = map.write().await;
                let entry = entries.entry(ip.to_string()).or_insert(AttemptState {
                    failures: 0,
                    last_failure: now,
                    locked_until: None,
                });

                // Stale counters from a previous window start over.
                if now.duration_since(entry.last_failure) >= self.policy.lockout {
                    entry.failures = 0;
                    entry.locked_until = None;
                }

                entry.failures += 1;
                entry.last_failure = now;
                if entry.failures >= self.policy.max_failures {
                    entry.locked_until = Some(now + self.policy.lockout);
                    tracing::warn!(ip = %ip, "login lockout engaged");
                }
            }
            LimiterBackend::Redis(connection) => {
                let mut conn = connection.clone();
                let fail_key = format!("{}{}", FAIL_KEY_PREFIX, ip);
                let lockout_secs = self.policy.lockout.as_secs();

                let count: i64 = match redis::cmd("INCR")
                    .arg(&fail_key)
                    .query_async(&mut conn)
                    .await
                {
                    Ok(v) => v,
                    Err(e) => {
                        tracing::warn!("rate limit failure record failed: {}", e);
                        return;
                    }
                };
                let _: Result<(), _> = redis::cmd("EXPIRE")
                    .arg(&fail_key)
                    .arg(lockout_secs)
                    .query_async(&mut conn)
                    .await;

                if count >= self.policy.max_failures as i64 {
                    let lock_key = format!("{}{}", LOCK_KEY_PREFIX, ip);
                    let _: Result<(), _> = redis::cmd("SET")
                        .arg(&lock_key)
                        .arg(1)
                        .arg("EX")
                        .arg(lockout_secs)
                        .query_async(&mut conn)
                        .await;
                    let _: Result<(), _> =
                        redis::cmd("DEL").arg(&fail_key).query_async(&mut conn).await;
                    tracing::warn!(ip = %ip, "login lockout engaged");
                }
            }
        }
    }

    /// A successful login clears the counter and any lock.
    pub async fn clear(&self, ip: &str) {
        match &self.backend {
            LimiterBackend::Memory(map) => {
                map.write().await.remove(ip);
            }
            LimiterBackend::Redis(connection) => {
                let mut conn = connection.clone();
                let _: Result<(), _> = redis::cmd("DEL")
                    .arg(format!("{}{}", FAIL_KEY_PREFIX, ip))
                    .arg(format!("{}{}", LOCK_KEY_PREFIX, ip))
                    .query_async(&mut conn)
                    .await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_locks_after_max_failures() {
        let limiter = LoginRateLimiter::in_memory();
        let ip = "203.0.113.7";

        for _ in 0..4 {
            limiter.record_failure(ip).await;
            assert_eq!(limiter.check(ip).await, RateLimitDecision::Allowed);
        }
        limiter.record_failure(ip).await;

        match limiter.check(ip).await {
            RateLimitDecision::Locked { retry_after } => {
                assert!(retry_after <= Duration::from_secs(15 * 60));
                assert!(retry_after > Duration::from_secs(14 * 60));
            }
            RateLimitDecision::Allowed => panic!("expected lockout after 5 failures"),
        }
    }

    #[tokio::test]
    async fn test_other_ips_unaffected() {
        let limiter = LoginRateLimiter::in_memory();
        for _ in 0..5 {
            limiter.record_failure("203.0.113.7").await;
        }
        assert_eq!(
            limiter.check("198.51.100.1").await,
            RateLimitDecision::Allowed
        );
    }

    #[tokio::test]
    async fn test_success_clears_lock() {
        let limiter = LoginRateLimiter::in_memory();
        let ip = "203.0.113.7";
        for _ in 0..5 {
            limiter.record_failure(ip).await;
        }
        assert!(matches!(
            limiter.check(ip).await,
            RateLimitDecision::Locked { .. }
        ));

        limiter.clear(ip).await;
        assert_eq!(limiter.check(ip).await, RateLimitDecision::Allowed);
    }

    #[tokio::test]
    async fn test_lock_expires() {
        let limiter = LoginRateLimiter::with_policy(RateLimitPolicy {
            max_failures: 2,
            lockout: Duration::from_millis(50),
        });
        let ip = "203.0.113.7";
        limiter.record_failure(ip).await;
        limiter.record_failure(ip).await;
        assert!(matches!(
            limiter.check(ip).await,
            RateLimitDecision::Locked { .. }
        ));

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(limiter.check(ip).await, RateLimitDecision::Allowed);

        // And the stale counter does not carry into the next window.
        limiter.record_failure(ip).await;
        assert_eq!(limiter.check(ip).await, RateLimitDecision::Allowed);
    }
}
