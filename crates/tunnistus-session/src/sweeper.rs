//! Expiry sweep over the session store

use crate::session::Session;
use crate::store::SessionStore;
use crate::types::AuthMethod;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

/// Time-to-live pair applied by one sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepSettings {
    /// TTL of sessions that completed `build`
    pub active_ttl: Duration,
    /// TTL of sessions that never validated
    pub failed_ttl: Duration,
}

/// Evicts sessions older than a TTL that depends on their validation state.
///
/// Works from a snapshot and removes entries one at a time, so request
/// threads are never blocked for longer than a single removal. Each removal
/// re-checks the entry against the cutoff, so a session refreshed after the
/// snapshot survives.
#[derive(Debug, Clone)]
pub struct ExpirySweeper {
    store: Arc<SessionStore>,
}

#[derive(Debug, Clone, Copy)]
struct Cutoffs {
    active: DateTime<Utc>,
    failed: DateTime<Utc>,
}

impl Cutoffs {
    fn new(now: DateTime<Utc>, active_ttl: Duration, failed_ttl: Duration) -> Self {
        Self {
            active: now - active_ttl,
            failed: now - failed_ttl,
        }
    }

    /// Strictly before the cutoff for the session's state.
    fn expired(&self, session: &Session) -> bool {
        if session.validated {
            session.timestamp < self.active
        } else {
            session.timestamp < self.failed
        }
    }
}

impl ExpirySweeper {
    #[must_use]
    pub fn new(store: Arc<SessionStore>) -> Self {
        Self { store }
    }

    /// Sweep against the wall clock.
    pub fn sweep(&self, active_ttl: Duration, failed_ttl: Duration) -> usize {
        self.sweep_at(Utc::now(), active_ttl, failed_ttl)
    }

    pub fn sweep_with(&self, settings: SweepSettings) -> usize {
        self.sweep(settings.active_ttl, settings.failed_ttl)
    }

    /// Sweep as if the current instant were `now`.
    ///
    /// A session is evicted only when its timestamp is strictly before the
    /// cutoff for its state. Returns the number of sessions actually removed.
    pub fn sweep_at(&self, now: DateTime<Utc>, active_ttl: Duration, failed_ttl: Duration) -> usize {
        let cutoffs = Cutoffs::new(now, active_ttl, failed_ttl);
        let candidates = self.candidates(cutoffs);
        self.evict(&candidates, cutoffs)
    }

    fn candidates(&self, cutoffs: Cutoffs) -> Vec<(String, AuthMethod)> {
        self.store
            .snapshot_all()
            .into_iter()
            .flat_map(|(key, methods)| {
                methods
                    .into_iter()
                    .filter(|(_, session)| cutoffs.expired(session))
                    .map(move |(method, _)| (key.clone(), method))
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    fn evict(&self, candidates: &[(String, AuthMethod)], cutoffs: Cutoffs) -> usize {
        let evicted = candidates
            .iter()
            .filter(|(key, method)| {
                self.store
                    .remove_if(key, *method, |session| cutoffs.expired(session))
                    .is_some()
            })
            .count();

        if evicted > 0 {
            tracing::debug!(
                evicted,
                skipped = candidates.len() - evicted,
                remaining = self.store.len(),
                "Swept expired sessions"
            );
        }

        evicted
    }
}
