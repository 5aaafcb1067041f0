//! Authentication vocabulary shared by the session store and the broker
//!
//! Methods, session profiles and identifier types arrive from the directory
//! and from the authenticators as strings; everything here parses them into
//! closed enums so the rest of the code can match exhaustively.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Prefix shared by every authentication method OID.
pub const AUTH_METHOD_OID_PREFIX: &str = "urn:oid:1.2.246.517.3002.110.";

/// OID-style identifier of the INIT sentinel.
pub const INIT_METHOD_OID: &str = "0";

/// Errors raised while parsing directory or request vocabulary
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VocabularyError {
    #[error("Unknown authentication method: {0}")]
    UnknownAuthMethod(String),

    #[error("Unknown authentication method OID: {0}")]
    UnknownAuthMethodOid(String),

    #[error("Unknown session profile: {0}")]
    UnknownSessionProfile(String),

    #[error("Unknown identifier type: {0}")]
    UnknownIdentifierType(String),
}

/// Authentication mechanism used by the identity provider chain.
///
/// `Init` is the sentinel inner key a session carries between `initiate`
/// and the end of `build`, before any real method is known.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum AuthMethod {
    #[default]
    Init,
    Tupas,
    Hst,
    Mobiili,
    Katsopwd,
    Katsootp,
    Mpass1,
    Eidas1,
    Testi,
}

impl AuthMethod {
    /// Every real (non-sentinel) method.
    pub const ALL: [AuthMethod; 8] = [
        AuthMethod::Tupas,
        AuthMethod::Hst,
        AuthMethod::Mobiili,
        AuthMethod::Katsopwd,
        AuthMethod::Katsootp,
        AuthMethod::Mpass1,
        AuthMethod::Eidas1,
        AuthMethod::Testi,
    ];

    /// Canonical name as it appears in the directory's permitted-methods string.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Init => "INIT",
            Self::Tupas => "TUPAS",
            Self::Hst => "HST",
            Self::Mobiili => "MOBIILI",
            Self::Katsopwd => "KATSOPWD",
            Self::Katsootp => "KATSOOTP",
            Self::Mpass1 => "MPASS1",
            Self::Eidas1 => "EIDAS1",
            Self::Testi => "TESTI",
        }
    }

    fn oid_suffix(&self) -> Option<&'static str> {
        match self {
            Self::Init => None,
            Self::Tupas => Some("1"),
            Self::Hst => Some("2"),
            Self::Mobiili => Some("3"),
            Self::Katsopwd => Some("5"),
            Self::Katsootp => Some("6"),
            Self::Mpass1 => Some("7"),
            Self::Eidas1 => Some("8"),
            Self::Testi => Some("999"),
        }
    }

    /// OID-style identifier relying parties use when asking for attributes.
    #[must_use]
    pub fn oid(&self) -> String {
        match self.oid_suffix() {
            Some(suffix) => format!("{AUTH_METHOD_OID_PREFIX}{suffix}"),
            None => INIT_METHOD_OID.to_string(),
        }
    }

    /// Resolve a method from its OID-style identifier.
    pub fn from_oid(oid: &str) -> Result<Self, VocabularyError> {
        let oid = oid.trim();
        if oid == INIT_METHOD_OID {
            return Ok(Self::Init);
        }
        let suffix = oid
            .strip_prefix(AUTH_METHOD_OID_PREFIX)
            .ok_or_else(|| VocabularyError::UnknownAuthMethodOid(oid.to_string()))?;
        Self::ALL
            .into_iter()
            .find(|m| m.oid_suffix() == Some(suffix))
            .ok_or_else(|| VocabularyError::UnknownAuthMethodOid(oid.to_string()))
    }

    /// Parse a semicolon-delimited method list such as `"TUPAS;HST"`.
    ///
    /// Blank segments are skipped, so an empty or all-blank string yields an
    /// empty set; callers decide whether that is acceptable.
    pub fn parse_list(list: &str) -> Result<BTreeSet<Self>, VocabularyError> {
        list.split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::parse)
            .collect()
    }

    /// Render a set back into the semicolon-delimited form.
    #[must_use]
    pub fn join(methods: &BTreeSet<Self>) -> String {
        methods
            .iter()
            .map(AuthMethod::as_str)
            .collect::<Vec<_>>()
            .join(";")
    }
}

impl fmt::Display for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuthMethod {
    type Err = VocabularyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        if upper == "INIT" {
            return Ok(Self::Init);
        }
        Self::ALL
            .into_iter()
            .find(|m| m.as_str() == upper)
            .ok_or_else(|| VocabularyError::UnknownAuthMethod(s.to_string()))
    }
}

/// Relying-party session profile from the directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionProfile {
    #[serde(rename = "TUNNISTUSONLY")]
    TunnistusOnly,
    VetumaSaml2,
    VetumaLegacy,
    Eidas,
}

impl SessionProfile {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TunnistusOnly => "TUNNISTUSONLY",
            Self::VetumaSaml2 => "VETUMA_SAML2",
            Self::VetumaLegacy => "VETUMA_LEGACY",
            Self::Eidas => "EIDAS",
        }
    }

    /// Whether sessions under this profile carry legacy fields.
    #[must_use]
    pub fn is_legacy(&self) -> bool {
        matches!(self, Self::VetumaLegacy)
    }
}

impl fmt::Display for SessionProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionProfile {
    type Err = VocabularyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "TUNNISTUSONLY" | "TUNNISTUS_ONLY" => Ok(Self::TunnistusOnly),
            "VETUMA_SAML2" => Ok(Self::VetumaSaml2),
            "VETUMA_LEGACY" => Ok(Self::VetumaLegacy),
            "EIDAS" => Ok(Self::Eidas),
            _ => Err(VocabularyError::UnknownSessionProfile(s.to_string())),
        }
    }
}

/// Kind of identifier an authenticator vouched for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IdentifierType {
    Hetu,
    Satu,
    KidPersonId,
    EppnOid,
    EidasPersonIdentifier,
}

impl IdentifierType {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hetu => "HETU",
            Self::Satu => "SATU",
            Self::KidPersonId => "KID_PERSON_ID",
            Self::EppnOid => "EPPN_OID",
            Self::EidasPersonIdentifier => "EIDAS_PERSON_IDENTIFIER",
        }
    }
}

impl FromStr for IdentifierType {
    type Err = VocabularyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "HETU" => Ok(Self::Hetu),
            "SATU" => Ok(Self::Satu),
            "KID_PERSON_ID" => Ok(Self::KidPersonId),
            "EPPN_OID" => Ok(Self::EppnOid),
            "EIDAS_PERSON_IDENTIFIER" => Ok(Self::EidasPersonIdentifier),
            _ => Err(VocabularyError::UnknownIdentifierType(s.to_string())),
        }
    }
}

/// Identity produced by mapping an authenticator's raw attributes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifiedPerson {
    pub identifier: String,
    pub identifier_type: Option<IdentifierType>,
    pub common_name: Option<String>,
    pub given_name: Option<String>,
    pub surname: Option<String>,
    /// Remaining mapped attributes, passed through to relying parties as-is
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

/// Person record returned by a successful registry lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryPerson {
    pub national_identification_number: String,
    pub first_names: String,
    pub last_name: String,
    pub municipality: Option<String>,
    pub municipality_code: Option<String>,
    pub protection_order: bool,
    pub deceased: bool,
    /// Which registry backend produced the record
    pub data_source: Option<String>,
}
