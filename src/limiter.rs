//! Per-client token-bucket admission control
//!
//! Guards the public prediction/weather endpoints. Each client gets a budget
//! of tokens that refills continuously up to the bucket capacity; one token
//! is consumed per admitted request. Denials are surfaced, never silently
//! dropped, so the coordinator can answer with a distinct rate-limited
//! outcome.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::time::{Duration, Instant};
use tracing::{debug, warn};

/// Registry size above which idle budgets are swept on access
const SWEEP_THRESHOLD: usize = 256;

/// Token budget for a single client
///
/// Owned exclusively by the limiter and mutated only under its own lock, so
/// refill and consume are atomic with respect to concurrent callers. Tokens
/// never exceed the bucket capacity and never go negative.
struct ClientBudget {
    tokens: f64,
    last_refill: Instant,
}

/// Handle kept in the client registry; `last_seen` drives idle eviction
struct BudgetHandle {
    budget: Arc<Mutex<ClientBudget>>,
    last_seen: Instant,
}

/// Token-bucket rate limiter keyed by client identity
///
/// Budgets are created lazily on first request and evicted after prolonged
/// inactivity to bound memory. The registry lock is held only to look up a
/// budget handle; token accounting happens under the per-client lock.
pub struct RateLimiter {
    budgets: Mutex<HashMap<String, BudgetHandle>>,
    capacity: f64,
    refill_per_sec: f64,
    idle_timeout: Duration,
}

impl RateLimiter {
    /// Creates a limiter with the given bucket capacity, refill rate in
    /// tokens per second, and idle eviction window
    pub fn new(capacity: f64, refill_per_sec: f64, idle_timeout: std::time::Duration) -> Self {
        Self {
            budgets: Mutex::new(HashMap::new()),
            capacity: capacity.max(1.0),
            refill_per_sec: refill_per_sec.max(0.0),
            idle_timeout,
        }
    }

    /// Admits or denies a request for the given client
    ///
    /// Refills the client's bucket from elapsed time, then consumes one
    /// token if at least one is available. A new client starts with a full
    /// bucket.
    pub fn admit(&self, client_id: &str) -> bool {
        let budget = self.budget(client_id);
        let mut budget = budget.lock();

        let now = Instant::now();
        let elapsed = now.duration_since(budget.last_refill);
        budget.tokens =
            (budget.tokens + elapsed.as_secs_f64() * self.refill_per_sec).min(self.capacity);
        budget.last_refill = now;

        if budget.tokens >= 1.0 {
            budget.tokens -= 1.0;
            debug!(client = client_id, tokens_left = budget.tokens, "request admitted");
            true
        } else {
            warn!(client = client_id, "rate limit exceeded, denying request");
            false
        }
    }

    /// Looks up or lazily creates the budget for a client
    fn budget(&self, client_id: &str) -> Arc<Mutex<ClientBudget>> {
        let mut budgets = self.budgets.lock();
        let now = Instant::now();

        if budgets.len() > SWEEP_THRESHOLD {
            let idle_timeout = self.idle_timeout;
            budgets.retain(|_, handle| now.duration_since(handle.last_seen) <= idle_timeout);
        }

        if let Some(handle) = budgets.get_mut(client_id) {
            handle.last_seen = now;
            return Arc::clone(&handle.budget);
        }

        let budget = Arc::new(Mutex::new(ClientBudget {
            tokens: self.capacity,
            last_refill: now,
        }));
        budgets.insert(
            client_id.to_string(),
            BudgetHandle {
                budget: Arc::clone(&budget),
                last_seen: now,
            },
        );
        budget
    }

    /// Number of clients currently tracked
    pub fn tracked_clients(&self) -> usize {
        self.budgets.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_burst_up_to_capacity_then_denied() {
        let limiter = RateLimiter::new(5.0, 1.0, std::time::Duration::from_secs(900));

        for i in 0..5 {
            assert!(limiter.admit("client-a"), "request {} should be admitted", i);
        }
        assert!(!limiter.admit("client-a"), "sixth request should be denied");
    }

    #[tokio::test(start_paused = true)]
    async fn test_refill_restores_one_token_per_second() {
        let limiter = RateLimiter::new(5.0, 1.0, std::time::Duration::from_secs(900));

        for _ in 0..5 {
            assert!(limiter.admit("client-a"));
        }
        assert!(!limiter.admit("client-a"));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(limiter.admit("client-a"), "one token should have refilled");
        assert!(!limiter.admit("client-a"), "and only one");
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokens_capped_at_capacity() {
        let limiter = RateLimiter::new(5.0, 1.0, std::time::Duration::from_secs(900));

        // Drain, then wait far longer than capacity / refill rate
        for _ in 0..5 {
            assert!(limiter.admit("client-a"));
        }
        tokio::time::advance(Duration::from_secs(3600)).await;

        // The bucket refilled to capacity, not to one token per elapsed second
        for i in 0..5 {
            assert!(limiter.admit("client-a"), "request {} should be admitted", i);
        }
        assert!(!limiter.admit("client-a"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_clients_have_independent_budgets() {
        let limiter = RateLimiter::new(2.0, 1.0, std::time::Duration::from_secs(900));

        assert!(limiter.admit("client-a"));
        assert!(limiter.admit("client-a"));
        assert!(!limiter.admit("client-a"));

        // A different client is unaffected by the first one's exhaustion
        assert!(limiter.admit("client-b"));
        assert_eq!(limiter.tracked_clients(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fractional_refill_is_not_enough() {
        let limiter = RateLimiter::new(1.0, 1.0, std::time::Duration::from_secs(900));

        assert!(limiter.admit("client-a"));
        tokio::time::advance(Duration::from_millis(500)).await;
        assert!(
            !limiter.admit("client-a"),
            "half a token is not an admission"
        );
        tokio::time::advance(Duration::from_millis(500)).await;
        assert!(limiter.admit("client-a"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_clients_are_swept() {
        let limiter = RateLimiter::new(5.0, 1.0, std::time::Duration::from_secs(900));

        // Fill the registry past the sweep threshold
        for i in 0..=SWEEP_THRESHOLD {
            limiter.admit(&format!("client-{}", i));
        }
        let before = limiter.tracked_clients();
        assert!(before > SWEEP_THRESHOLD);

        // Everyone goes idle past the eviction window; the next newcomer
        // triggers a sweep
        tokio::time::advance(Duration::from_secs(1000)).await;
        limiter.admit("latecomer");

        assert!(
            limiter.tracked_clients() < before,
            "idle budgets should have been evicted"
        );
    }
}
