//! Per-connection action throttling.

use dashmap::DashMap;
use gambit_rooms::{ConnectionId, TimeSource};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::warn;

use crate::config::RateLimitConfig;

/// Sliding-window limiter keyed by connection.
///
/// Each connection keeps the timestamps of its recent actions; an action is
/// admitted while fewer than `max_actions` fall inside the window.
#[derive(Debug)]
pub struct RateLimiter {
    actions: DashMap<ConnectionId, VecDeque<u64>>,
    config: RateLimitConfig,
    time: Arc<dyn TimeSource>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig, time: Arc<dyn TimeSource>) -> Self {
        Self {
            actions: DashMap::new(),
            config,
            time,
        }
    }

    /// Records an action and reports whether it is allowed.
    pub fn check(&self, connection_id: ConnectionId) -> bool {
        if !self.config.enabled {
            return true;
        }

        let now = self.time.now_ms();
        let window_ms = self.config.window_secs.saturating_mul(1000);
        let mut entry = self.actions.entry(connection_id).or_default();

        while entry
            .front()
            .is_some_and(|at| now.saturating_sub(*at) >= window_ms)
        {
            entry.pop_front();
        }

        if entry.len() < self.config.max_actions as usize {
            entry.push_back(now);
            true
        } else {
            warn!(connection_id, limit = self.config.max_actions, "🚦 Rate limit exceeded");
            false
        }
    }

    /// Forgets a closed connection.
    pub fn forget(&self, connection_id: ConnectionId) {
        self.actions.remove(&connection_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gambit_rooms::ManualTimeSource;

    fn limiter(max_actions: u32) -> (RateLimiter, Arc<ManualTimeSource>) {
        let time = Arc::new(ManualTimeSource::new(0));
        let limiter = RateLimiter::new(
            RateLimitConfig {
                enabled: true,
                max_actions,
                window_secs: 1,
            },
            time.clone(),
        );
        (limiter, time)
    }

    #[test]
    fn window_slides() {
        let (limiter, time) = limiter(2);
        assert!(limiter.check(1));
        time.advance(500);
        assert!(limiter.check(1));
        assert!(!limiter.check(1));
        assert!(limiter.check(2));

        time.advance(500);
        assert!(limiter.check(1));
        assert!(!limiter.check(1));
    }

    #[test]
    fn disabled_admits_everything() {
        let limiter = RateLimiter::new(
            RateLimitConfig {
                enabled: false,
                max_actions: 0,
                window_secs: 1,
            },
            Arc::new(ManualTimeSource::new(0)),
        );
        assert!((0..100).all(|_| limiter.check(7)));
    }
}
