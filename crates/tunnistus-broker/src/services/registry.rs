//! Population register lookup contract

use async_trait::async_trait;
use tunnistus_session::{IdentifiedPerson, RegistryPerson};

/// Result of one registry lookup.
///
/// The three outcomes drive different branches in the engine, so they are
/// values rather than errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryOutcome {
    /// Person found and passed the registry's own sanity checks
    Verified(RegistryPerson),
    /// Connectivity problem or empty response; may be retried by the user
    TransientFailure(String),
    /// Person found but failed validation (deceased, unverifiable national
    /// number, mismatched secondary identifier)
    InvalidData(String),
}

impl RegistryOutcome {
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Verified(_) => "verified",
            Self::TransientFailure(_) => "transient_failure",
            Self::InvalidData(_) => "invalid_data",
        }
    }
}

/// Remote population register
#[async_trait]
pub trait RegistryService: Send + Sync {
    /// Look up and validate `person`.
    ///
    /// `uid` is the durable session handle when one exists, for the
    /// registry's audit trail.
    async fn lookup(&self, person: &IdentifiedPerson, uid: Option<&str>) -> RegistryOutcome;
}
