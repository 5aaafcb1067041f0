//! Session state for the tunnistus authentication broker
//!
//! This crate holds everything about a login that outlives a single request:
//! - The session record and its authentication vocabulary
//! - A concurrent two-level session store (outer handle, method)
//! - The registry verification policy
//! - The expiry sweep

pub mod policy;
pub mod session;
pub mod store;
pub mod sweeper;
pub mod types;

pub use policy::{decide, VerificationRequirement};
pub use session::{Session, UNASSIGNED_UID};
pub use store::{MethodMap, SessionStore};
pub use sweeper::{ExpirySweeper, SweepSettings};
pub use types::{
    AuthMethod, IdentifiedPerson, IdentifierType, RegistryPerson, SessionProfile,
    VocabularyError,
};
