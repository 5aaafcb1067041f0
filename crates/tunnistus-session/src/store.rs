//! Concurrent session storage
//!
//! Sessions live under a two-level key: an outer handle (first a short-lived
//! handshake token, later the durable uid) and the authentication method.
//! The inner map is only ever created inside `insert`, under the shard lock
//! of the outer entry, so concurrent first inserts for one key cannot drop
//! each other's method.

use crate::session::Session;
use crate::types::AuthMethod;
use dashmap::DashMap;
use std::collections::HashMap;

/// All sessions stored under one outer key.
pub type MethodMap = HashMap<AuthMethod, Session>;

/// In-process session store backed by a sharded concurrent map.
///
/// Every operation returns owned copies and never holds a shard guard
/// across a call back into the map.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: DashMap<String, MethodMap>,
}

impl SessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Point read of one session.
    #[must_use]
    pub fn lookup(&self, key: &str, method: AuthMethod) -> Option<Session> {
        self.sessions
            .get(key)
            .and_then(|methods| methods.get(&method).cloned())
    }

    /// Every method stored under `key`.
    #[must_use]
    pub fn lookup_all(&self, key: &str) -> Option<MethodMap> {
        self.sessions.get(key).map(|methods| methods.clone())
    }

    /// Upsert `session` under (`key`, `method`), creating the inner map if needed.
    pub fn insert(&self, key: &str, method: AuthMethod, session: Session) {
        self.sessions
            .entry(key.to_string())
            .or_default()
            .insert(method, session);
    }

    /// Apply `f` to the stored session under (`key`, `method`).
    ///
    /// Nothing is written when the session is gone. `vtj_data_invalid` stays
    /// set if it was set before `f` ran. Returns a copy of the updated session.
    pub fn update<F>(&self, key: &str, method: AuthMethod, f: F) -> Option<Session>
    where
        F: FnOnce(&mut Session),
    {
        let mut methods = self.sessions.get_mut(key)?;
        let stored = methods.get_mut(&method)?;
        let poisoned = stored.vtj_data_invalid;
        f(stored);
        stored.vtj_data_invalid |= poisoned;
        Some(stored.clone())
    }

    /// Move a session from `old_key` to `new_key`.
    ///
    /// `old_key` is removed entirely before anything is written under
    /// `new_key`. Returns the removed entry; when `old_key` was already gone
    /// nothing is inserted and `None` comes back, which is how a caller that
    /// lost a promotion race finds out. A same-method session already under
    /// `new_key` passes its `vtj_data_invalid` flag on to its replacement.
    pub fn rekey(
        &self,
        old_key: &str,
        new_key: &str,
        method: AuthMethod,
        mut session: Session,
    ) -> Option<MethodMap> {
        let (_, removed) = self.sessions.remove(old_key)?;
        let mut methods = self.sessions.entry(new_key.to_string()).or_default();
        session.vtj_data_invalid |= methods.get(&method).is_some_and(|s| s.vtj_data_invalid);
        methods.insert(method, session);
        drop(methods);
        tracing::trace!(method = %method, "Session rekeyed");
        Some(removed)
    }

    /// Mark every sibling under `key` as carrying invalid registry data.
    ///
    /// Returns how many sessions were marked; an absent key marks nothing.
    pub fn invalidate_all(&self, key: &str) -> usize {
        match self.sessions.get_mut(key) {
            Some(mut methods) => {
                for session in methods.values_mut() {
                    session.vtj_data_invalid = true;
                }
                methods.len()
            }
            None => 0,
        }
    }

    #[must_use]
    pub fn has_invalid_siblings(&self, key: &str) -> bool {
        self.sessions
            .get(key)
            .is_some_and(|methods| methods.values().any(|s| s.vtj_data_invalid))
    }

    /// Remove one sibling, dropping the outer key once it is empty.
    ///
    /// Returns a default session when nothing was stored, so callers can read
    /// fields off the result without checking.
    pub fn remove(&self, key: &str, method: AuthMethod) -> Session {
        let removed = match self.sessions.get_mut(key) {
            Some(mut methods) => methods.remove(&method),
            None => None,
        };
        self.sessions.remove_if(key, |_, methods| methods.is_empty());
        removed.unwrap_or_default()
    }

    /// Remove one sibling only if `predicate` holds for it at removal time.
    ///
    /// The predicate runs under the entry's write guard, so a session
    /// rewritten after a caller last read it is judged on its current state.
    pub fn remove_if<P>(&self, key: &str, method: AuthMethod, predicate: P) -> Option<Session>
    where
        P: FnOnce(&Session) -> bool,
    {
        let removed = {
            let mut methods = self.sessions.get_mut(key)?;
            if methods.get(&method).is_some_and(predicate) {
                methods.remove(&method)
            } else {
                None
            }
        };
        self.sessions.remove_if(key, |_, methods| methods.is_empty());
        removed
    }

    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.sessions.contains_key(key)
    }

    /// Copy of the whole store, taken shard by shard.
    ///
    /// Not a single atomic snapshot: writes racing with the copy may or may
    /// not be included.
    #[must_use]
    pub fn snapshot_all(&self) -> HashMap<String, MethodMap> {
        self.sessions
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    /// Number of outer keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
