//! Response models for the broker transitions.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tunnistus_session::AuthMethod;

/// Result of a successful `initiate`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitiateResponse {
    /// Short-lived session token for the browser redirect
    pub token: String,
    /// Step token authorising `build` or `cancel`
    pub phase_id: String,
    pub requested_auth_methods: BTreeSet<AuthMethod>,
    pub level_of_assurance: String,
}

/// Result of a successful `build`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildResponse {
    /// Token the session was promoted to
    pub token: String,
    /// Step token authorising `finalise`
    pub phase_id: String,
}

/// Result of `finalise`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FinaliseOutcome {
    /// Session promoted to its durable uid
    Completed {
        conversation_key: String,
        uid: String,
        auth_method: AuthMethod,
    },
    /// Session exists but never validated; the caller treats this as a failed login
    NotValidated,
}

impl FinaliseOutcome {
    #[must_use]
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}

/// Attribute set released to a relying party.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionAttributes {
    pub uid: String,
    pub auth_method: AuthMethod,
    pub attributes: BTreeMap<String, String>,
}

/// Result of `cancel`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelResponse {
    /// Conversation key of the removed session; empty when nothing was stored
    pub conversation_key: String,
}
