//! Request models, one per broker transition.
//!
//! Every request carries the caller's correlation `tag`, which ends up on
//! every log event of the transition.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Start a login for a relying party.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitiateRequest {
    pub relying_party_id: String,
    /// Durable uid from an earlier login, or `"0"`
    pub existing_uid: String,
    pub conversation_key: String,
    /// Semicolon-delimited subset of the relying party's permitted methods;
    /// `None` or blank requests all of them
    #[serde(default)]
    pub requested_auth_methods: Option<String>,
    pub tag: String,
}

/// Attach the authenticator's result to an initiated session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildRequest {
    pub token: String,
    pub phase_id: String,
    /// Raw attributes from the authenticator front
    #[serde(default)]
    pub attributes: HashMap<String, String>,
    pub tag: String,
}

/// Hand the built session back to the initiating authenticator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinaliseRequest {
    pub token: String,
    pub phase_id: String,
    pub tag: String,
}

/// Fetch the attribute set of a finalised session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeRequest {
    pub uid: String,
    /// OID-style method identifier
    pub auth_method_oid: String,
    pub relying_party_id: String,
    pub tag: String,
}

/// Abandon an initiated login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelRequest {
    pub token: String,
    pub phase_id: String,
    pub tag: String,
}
