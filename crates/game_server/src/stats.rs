//! Runtime counters for the periodic health report.

use gambit_rooms::ErrorKind;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct ServerStats {
    pub connections_accepted: AtomicU64,
    pub rooms_created: AtomicU64,
    pub rooms_finished: AtomicU64,
    pub rooms_swept: AtomicU64,
    pub moves_played: AtomicU64,
    pub bets_placed: AtomicU64,
    pub settlements_confirmed: AtomicU64,
    pub settlements_failed: AtomicU64,
    errors_validation: AtomicU64,
    errors_not_found: AtomicU64,
    errors_state_conflict: AtomicU64,
    errors_authorization: AtomicU64,
    errors_external: AtomicU64,
    errors_rate_limit: AtomicU64,
    errors_internal: AtomicU64,
}

/// Point-in-time copy of [`ServerStats`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub connections_accepted: u64,
    pub rooms_created: u64,
    pub rooms_finished: u64,
    pub rooms_swept: u64,
    pub moves_played: u64,
    pub bets_placed: u64,
    pub settlements_confirmed: u64,
    pub settlements_failed: u64,
    pub errors: u64,
    pub rate_limited: u64,
}

impl ServerStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self, kind: ErrorKind) {
        Self::bump(self.error_counter(kind));
    }

    pub fn errors_of(&self, kind: ErrorKind) -> u64 {
        self.error_counter(kind).load(Ordering::Relaxed)
    }

    fn error_counter(&self, kind: ErrorKind) -> &AtomicU64 {
        match kind {
            ErrorKind::ValidationError => &self.errors_validation,
            ErrorKind::NotFoundError => &self.errors_not_found,
            ErrorKind::StateConflictError => &self.errors_state_conflict,
            ErrorKind::AuthorizationError => &self.errors_authorization,
            ErrorKind::ExternalServiceError => &self.errors_external,
            ErrorKind::RateLimitError => &self.errors_rate_limit,
            ErrorKind::InternalError => &self.errors_internal,
        }
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        let errors = [
            &self.errors_validation,
            &self.errors_not_found,
            &self.errors_state_conflict,
            &self.errors_authorization,
            &self.errors_external,
            &self.errors_rate_limit,
            &self.errors_internal,
        ]
        .into_iter()
        .map(load)
        .sum();
        StatsSnapshot {
            connections_accepted: load(&self.connections_accepted),
            rooms_created: load(&self.rooms_created),
            rooms_finished: load(&self.rooms_finished),
            rooms_swept: load(&self.rooms_swept),
            moves_played: load(&self.moves_played),
            bets_placed: load(&self.bets_placed),
            settlements_confirmed: load(&self.settlements_confirmed),
            settlements_failed: load(&self.settlements_failed),
            errors,
            rate_limited: load(&self.errors_rate_limit),
        }
    }
}
