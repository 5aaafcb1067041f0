//! Broker error types

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tunnistus_session::VocabularyError;

/// Result type for broker transitions
pub type BrokerResult<T> = Result<T, BrokerError>;

/// Error classification carried back to the transport layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorType {
    InitFailed,
    SessionInitFailed,
    BuildFailed,
    FinaliseFailed,
    PhaseIdFailed,
    VtjFailed,
    VtjInvalid,
    NotFound,
    InternalError,
}

impl ErrorType {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InitFailed => "init_failed",
            Self::SessionInitFailed => "session_init_failed",
            Self::BuildFailed => "build_failed",
            Self::FinaliseFailed => "finalise_failed",
            Self::PhaseIdFailed => "phase_id_failed",
            Self::VtjFailed => "vtj_failed",
            Self::VtjInvalid => "vtj_invalid",
            Self::NotFound => "not_found",
            Self::InternalError => "internal_error",
        }
    }

    /// Protocol status the transport should answer with.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::NotFound => 404,
            Self::VtjFailed => 503,
            Self::InitFailed
            | Self::BuildFailed
            | Self::FinaliseFailed
            | Self::PhaseIdFailed
            | Self::VtjInvalid => 400,
            Self::SessionInitFailed | Self::InternalError => 500,
        }
    }

    /// Whether the caller can recover by restarting the handshake.
    #[must_use]
    pub fn is_client_correctable(&self) -> bool {
        matches!(
            self,
            Self::InitFailed | Self::BuildFailed | Self::FinaliseFailed | Self::PhaseIdFailed
        )
    }
}

impl fmt::Display for ErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure of a broker transition
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BrokerError {
    /// Relying party could not start a login
    #[error("Session initialisation failed: {0}")]
    InitFailed(String),

    /// Relying party has no session profile configured
    #[error("Session profile missing: {0}")]
    SessionInitFailed(String),

    /// Handshake state rejected during build (replay, bad step token, unknown token)
    #[error("Session build failed: {0}")]
    BuildFailed(String),

    /// Token did not resolve to exactly one session during finalise
    #[error("Session finalise failed: {0}")]
    FinaliseFailed(String),

    /// Step token did not authorise the requested step
    #[error("Phase id validation failed: {0}")]
    PhaseIdFailed(String),

    /// Registry lookup failed and verification was mandatory
    #[error("Registry verification failed: {0}")]
    VtjFailed(String),

    /// Registry returned data that failed validation
    #[error("Registry data invalid: {0}")]
    VtjInvalid(String),

    /// Attribute request did not resolve to a session
    #[error("Session not found")]
    NotFound,

    /// Server-side or configuration fault
    #[error("Internal error: {0}")]
    Internal(String),
}

impl BrokerError {
    #[must_use]
    pub fn error_type(&self) -> ErrorType {
        match self {
            Self::InitFailed(_) => ErrorType::InitFailed,
            Self::SessionInitFailed(_) => ErrorType::SessionInitFailed,
            Self::BuildFailed(_) => ErrorType::BuildFailed,
            Self::FinaliseFailed(_) => ErrorType::FinaliseFailed,
            Self::PhaseIdFailed(_) => ErrorType::PhaseIdFailed,
            Self::VtjFailed(_) => ErrorType::VtjFailed,
            Self::VtjInvalid(_) => ErrorType::VtjInvalid,
            Self::NotFound => ErrorType::NotFound,
            Self::Internal(_) => ErrorType::InternalError,
        }
    }

    /// Caller-facing message; internal detail stays in the logs.
    #[must_use]
    pub fn public_message(&self) -> String {
        match self {
            Self::Internal(msg) => {
                tracing::error!("Broker internal error: {}", msg);
                "An internal error occurred".to_string()
            }
            Self::VtjFailed(_) => "Population register is unavailable".to_string(),
            Self::VtjInvalid(_) => "Population register data could not be verified".to_string(),
            _ => self.to_string(),
        }
    }
}

impl From<VocabularyError> for BrokerError {
    fn from(err: VocabularyError) -> Self {
        Self::Internal(err.to_string())
    }
}
