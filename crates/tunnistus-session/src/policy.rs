//! Registry verification policy

use crate::types::AuthMethod;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Whether a registry lookup is attempted and how its failure is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerificationRequirement {
    /// The lookup must not be attempted for this identity
    Forbidden,
    /// The lookup must succeed or the login fails
    MustSucceed,
    /// The lookup is attempted; transient failure is tolerated
    MayFail,
}

impl VerificationRequirement {
    #[must_use]
    pub fn requires_lookup(&self) -> bool {
        !matches!(self, Self::Forbidden)
    }
}

impl fmt::Display for VerificationRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Forbidden => f.write_str("FORBIDDEN"),
            Self::MustSucceed => f.write_str("MUST_SUCCEED"),
            Self::MayFail => f.write_str("MAY_FAIL"),
        }
    }
}

/// Decide the verification requirement for a login.
///
/// Legacy password/OTP, mobile and cross-border identities are never looked
/// up; the citizen certificate card always must be; everything else follows
/// the relying party's directory flag.
#[must_use]
pub fn decide(
    relying_party_requires_verification: bool,
    method: AuthMethod,
) -> VerificationRequirement {
    match method {
        AuthMethod::Katsopwd | AuthMethod::Katsootp | AuthMethod::Mobiili | AuthMethod::Eidas1 => {
            VerificationRequirement::Forbidden
        }
        AuthMethod::Hst => VerificationRequirement::MustSucceed,
        _ if relying_party_requires_verification => VerificationRequirement::MustSucceed,
        _ => VerificationRequirement::MayFail,
    }
}
