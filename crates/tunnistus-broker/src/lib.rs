//! Authentication broker session lifecycle for tunnistus
//!
//! This crate provides:
//! - The [`SessionEngine`] driving initiate, build, finalise, attribute
//!   retrieval and cancel
//! - Collaborator contracts for the directory, step tokens, replay
//!   history, the population register and attribute mapping
//! - In-process implementations of those collaborators
//! - Configuration and JSON logging setup

pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod models;
pub mod services;

pub use config::{BrokerConfig, ConfigError};
pub use engine::SessionEngine;
pub use error::{BrokerError, BrokerResult, ErrorType};
pub use logging::{init_logging, init_test_logging, LoggingError};
pub use models::{
    AttributeRequest, BuildRequest, BuildResponse, CancelRequest, CancelResponse,
    FinaliseOutcome, FinaliseRequest, InitiateRequest, InitiateResponse, SessionAttributes,
};
pub use services::{
    AttributeMapper, AuthenticationProvider, DefaultAttributeMapper, Directory, DirectoryError,
    HandshakeStep, HmacPhaseIdService, InMemoryDirectory, InMemoryPhaseIdHistory, PhaseIdHistory,
    PhaseIdService, RegistryOutcome, RegistryService, ServiceProvider,
};
