//! Collaborators the session engine delegates to.

pub mod attributes;
pub mod directory;
pub mod phase_id;
pub mod registry;

pub use attributes::{
    auth_context_url, AttributeMapper, DefaultAttributeMapper, MappingError, RawAttributes,
};
pub use directory::{
    AuthenticationProvider, Directory, DirectoryError, InMemoryDirectory, ServiceProvider,
};
pub use phase_id::{
    Clock, HandshakeStep, HmacPhaseIdService, InMemoryPhaseIdHistory, PhaseIdHistory,
    PhaseIdService, SystemClock,
};
pub use registry::{RegistryOutcome, RegistryService};
