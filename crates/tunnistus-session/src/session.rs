//! The session record carried through a login handshake

use crate::types::{AuthMethod, IdentifiedPerson, RegistryPerson, SessionProfile};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// `uid` value of a session that has never been promoted to a durable handle.
pub const UNASSIGNED_UID: &str = "0";

/// Server-side state of one login for one authentication method.
///
/// The store owns the canonical copy; callers check out clones, mutate them
/// and write them back with `insert` or `rekey`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Durable identifier, or [`UNASSIGNED_UID`] before the first promotion
    pub uid: String,
    /// Opaque value from the initiating authenticator, echoed back on finalise
    pub conversation_key: String,
    /// Set once `build` completed successfully
    pub validated: bool,
    pub vtj_verified: bool,
    pub vtj_verification_required: bool,
    /// Poisons this session and every sibling under the same outer key
    pub vtj_data_invalid: bool,
    /// Last write, used only for expiry
    pub timestamp: DateTime<Utc>,
    pub relying_party_entity_id: String,
    pub session_profile: Option<SessionProfile>,
    pub authentication_provider: Option<String>,
    pub legacy_version: Option<String>,
    pub requested_auth_methods: BTreeSet<AuthMethod>,
    pub identified_person: Option<IdentifiedPerson>,
    pub registry_person: Option<RegistryPerson>,
}

impl Session {
    /// Create the minimal record written by `initiate`.
    pub fn new(
        uid: impl Into<String>,
        conversation_key: impl Into<String>,
        relying_party_entity_id: impl Into<String>,
        session_profile: SessionProfile,
        requested_auth_methods: BTreeSet<AuthMethod>,
    ) -> Self {
        Self {
            uid: uid.into(),
            conversation_key: conversation_key.into(),
            relying_party_entity_id: relying_party_entity_id.into(),
            session_profile: Some(session_profile),
            requested_auth_methods,
            timestamp: Utc::now(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn has_assigned_uid(&self) -> bool {
        !self.uid.is_empty() && self.uid != UNASSIGNED_UID
    }

    pub fn touch(&mut self) {
        self.timestamp = Utc::now();
    }

    #[must_use]
    pub fn permits(&self, method: AuthMethod) -> bool {
        self.requested_auth_methods.contains(&method)
    }
}
