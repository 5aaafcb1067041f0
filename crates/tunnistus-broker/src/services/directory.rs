//! Relying-party and authentication-provider directory
//!
//! The broker only reads the directory. [`InMemoryDirectory`] is the read
//! cache a metadata refresher populates.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;
use tunnistus_session::{AuthMethod, SessionProfile, VocabularyError};

/// Directory lookup errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DirectoryError {
    #[error("Directory entry not found: {0}")]
    NotFound(String),

    #[error("Directory unavailable: {0}")]
    Unavailable(String),
}

/// A relying party as registered in the directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceProvider {
    pub entity_id: String,
    /// Level-of-assurance profile returned to the relying party on initiate
    pub level_of_assurance: String,
    /// Semicolon-delimited list of permitted methods, e.g. `"TUPAS;HST"`
    pub permitted_auth_methods: String,
    pub session_profile: Option<SessionProfile>,
    /// Relying party demands a successful registry lookup
    pub vtj_verification_required: bool,
}

impl ServiceProvider {
    /// Parse the permitted-methods string.
    pub fn permitted_methods(&self) -> Result<BTreeSet<AuthMethod>, VocabularyError> {
        AuthMethod::parse_list(&self.permitted_auth_methods)
    }
}

/// An upstream authenticator, keyed by the authentication context it asserts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticationProvider {
    pub name: String,
    pub auth_context_url: String,
    pub auth_method: AuthMethod,
}

/// Read access to directory metadata
#[async_trait]
pub trait Directory: Send + Sync {
    async fn relying_party(&self, entity_id: &str) -> Result<ServiceProvider, DirectoryError>;

    async fn authentication_provider(
        &self,
        auth_context_url: &str,
    ) -> Result<AuthenticationProvider, DirectoryError>;
}

/// Concurrent in-memory directory cache
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    relying_parties: DashMap<String, ServiceProvider>,
    providers: DashMap<String, AuthenticationProvider>,
}

impl InMemoryDirectory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert_relying_party(&self, sp: ServiceProvider) {
        tracing::debug!(entity_id = %sp.entity_id, "Directory relying party refreshed");
        self.relying_parties.insert(sp.entity_id.clone(), sp);
    }

    pub fn upsert_authentication_provider(&self, provider: AuthenticationProvider) {
        tracing::debug!(
            auth_context_url = %provider.auth_context_url,
            auth_method = %provider.auth_method,
            "Directory authentication provider refreshed"
        );
        self.providers
            .insert(provider.auth_context_url.clone(), provider);
    }

    pub fn remove_relying_party(&self, entity_id: &str) -> Option<ServiceProvider> {
        self.relying_parties.remove(entity_id).map(|(_, sp)| sp)
    }

    pub fn remove_authentication_provider(
        &self,
        auth_context_url: &str,
    ) -> Option<AuthenticationProvider> {
        self.providers.remove(auth_context_url).map(|(_, p)| p)
    }
}

#[async_trait]
impl Directory for InMemoryDirectory {
    async fn relying_party(&self, entity_id: &str) -> Result<ServiceProvider, DirectoryError> {
        self.relying_parties
            .get(entity_id)
            .map(|sp| sp.clone())
            .ok_or_else(|| DirectoryError::NotFound(entity_id.to_string()))
    }

    async fn authentication_provider(
        &self,
        auth_context_url: &str,
    ) -> Result<AuthenticationProvider, DirectoryError> {
        self.providers
            .get(auth_context_url)
            .map(|p| p.clone())
            .ok_or_else(|| DirectoryError::NotFound(auth_context_url.to_string()))
    }
}
