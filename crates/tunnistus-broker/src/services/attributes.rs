//! Attribute mapping between authenticators, sessions and relying parties

use std::collections::{BTreeMap, HashMap};
use thiserror::Error;
use tunnistus_session::{AuthMethod, IdentifiedPerson, IdentifierType, Session};

/// Raw attributes as delivered by the authenticator front (header name → value).
pub type RawAttributes = HashMap<String, String>;

/// Primary authentication context header.
pub const AUTH_CONTEXT_CLASS_HEADER: &str = "AJP_Shib-AuthnContext-Class";
/// Fallback authentication context header.
pub const AUTH_CONTEXT_DECL_HEADER: &str = "AJP_Shib-AuthnContext-Decl";
/// Legacy protocol version, read only for the legacy session profile.
pub const LEGACY_VERSION_HEADER: &str = "AJP_legacyversion";

pub const HETU_HEADER: &str = "AJP_hetu";
pub const SATU_HEADER: &str = "AJP_satu";
pub const KID_HEADER: &str = "AJP_tfiKid";
pub const EPPN_HEADER: &str = "AJP_eppn";
pub const EIDAS_PERSON_IDENTIFIER_HEADER: &str = "AJP_eidasPersonIdentifier";
pub const CN_HEADER: &str = "AJP_cn";
pub const GIVEN_NAME_HEADER: &str = "AJP_givenName";
pub const SN_HEADER: &str = "AJP_sn";

const PASS_THROUGH_HEADERS: [(&str, &str); 4] = [
    ("AJP_mail", "mail"),
    ("AJP_eidasDateOfBirth", "dateOfBirth"),
    ("AJP_mpass_school", "school"),
    ("AJP_tfiPersonName", "personName"),
];

/// Authentication context the authenticator used; the class header wins.
#[must_use]
pub fn auth_context_url(raw: &RawAttributes) -> Option<&str> {
    [AUTH_CONTEXT_CLASS_HEADER, AUTH_CONTEXT_DECL_HEADER]
        .into_iter()
        .find_map(|header| raw.get(header).map(String::as_str))
}

/// Attribute mapping errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MappingError {
    #[error("Invalid attribute {name}: {reason}")]
    InvalidAttribute { name: String, reason: String },
}

/// Maps raw authenticator attributes to identities and identities to
/// relying-party attributes
pub trait AttributeMapper: Send + Sync {
    /// Map raw attributes into an identified person.
    ///
    /// An unrecognised identity is not an error: it comes back with no
    /// identifier type and the caller decides.
    fn identify(
        &self,
        raw: &RawAttributes,
        method: AuthMethod,
    ) -> Result<IdentifiedPerson, MappingError>;

    /// Attribute set a relying party receives for this session.
    fn collect(&self, session: &Session) -> BTreeMap<String, String>;
}

/// Default mapping of the Shibboleth-style headers
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultAttributeMapper;

impl DefaultAttributeMapper {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

fn non_empty<'a>(raw: &'a RawAttributes, header: &str) -> Option<&'a str> {
    raw.get(header)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
}

/// Shape check of a national identification number (DDMMYYCNNNT).
fn check_hetu(value: &str) -> Result<(), MappingError> {
    let bytes = value.as_bytes();
    let well_formed = bytes.len() == 11
        && bytes[..6].iter().all(u8::is_ascii_digit)
        && b"+-ABCDEFUVWXY".contains(&bytes[6])
        && bytes[7..10].iter().all(u8::is_ascii_digit)
        && bytes[10].is_ascii_alphanumeric();
    if well_formed {
        Ok(())
    } else {
        Err(MappingError::InvalidAttribute {
            name: HETU_HEADER.to_string(),
            reason: "not a national identification number".to_string(),
        })
    }
}

fn identifier_key(identifier_type: IdentifierType) -> &'static str {
    match identifier_type {
        IdentifierType::Hetu => "nationalIdentificationNumber",
        IdentifierType::Satu => "electronicIdentificationNumber",
        IdentifierType::KidPersonId => "kid",
        IdentifierType::EppnOid => "eppn",
        IdentifierType::EidasPersonIdentifier => "eidasPersonIdentifier",
    }
}

impl AttributeMapper for DefaultAttributeMapper {
    fn identify(
        &self,
        raw: &RawAttributes,
        method: AuthMethod,
    ) -> Result<IdentifiedPerson, MappingError> {
        let candidates: &[(&str, IdentifierType)] = match method {
            AuthMethod::Eidas1 => &[(
                EIDAS_PERSON_IDENTIFIER_HEADER,
                IdentifierType::EidasPersonIdentifier,
            )],
            AuthMethod::Katsopwd | AuthMethod::Katsootp => {
                &[(KID_HEADER, IdentifierType::KidPersonId)]
            }
            AuthMethod::Mpass1 => &[(EPPN_HEADER, IdentifierType::EppnOid)],
            _ => &[
                (HETU_HEADER, IdentifierType::Hetu),
                (SATU_HEADER, IdentifierType::Satu),
            ],
        };

        let found = candidates
            .iter()
            .find_map(|(header, kind)| non_empty(raw, header).map(|v| (v, *kind)));

        let (identifier, identifier_type) = match found {
            Some((value, IdentifierType::Hetu)) => {
                check_hetu(value)?;
                (value.to_ascii_uppercase(), Some(IdentifierType::Hetu))
            }
            Some((value, kind)) => (value.to_string(), Some(kind)),
            None => (String::new(), None),
        };

        let attributes = PASS_THROUGH_HEADERS
            .iter()
            .filter_map(|(header, name)| {
                non_empty(raw, header).map(|v| ((*name).to_string(), v.to_string()))
            })
            .collect();

        Ok(IdentifiedPerson {
            identifier,
            identifier_type,
            common_name: non_empty(raw, CN_HEADER).map(String::from),
            given_name: non_empty(raw, GIVEN_NAME_HEADER).map(String::from),
            surname: non_empty(raw, SN_HEADER).map(String::from),
            attributes,
        })
    }

    fn collect(&self, session: &Session) -> BTreeMap<String, String> {
        let mut attrs = BTreeMap::new();

        if let Some(person) = &session.identified_person {
            attrs.extend(
                person
                    .attributes
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone())),
            );
            if let Some(kind) = person.identifier_type {
                attrs.insert(identifier_key(kind).to_string(), person.identifier.clone());
            }
            if let Some(cn) = &person.common_name {
                attrs.insert("cn".to_string(), cn.clone());
            }
            if let Some(given_name) = &person.given_name {
                attrs.insert("givenName".to_string(), given_name.clone());
            }
            if let Some(sn) = &person.surname {
                attrs.insert("sn".to_string(), sn.clone());
            }
        }

        match (&session.registry_person, session.vtj_verified) {
            (Some(person), true) => {
                attrs.insert("vtjVerified".to_string(), "true".to_string());
                attrs.insert("firstNames".to_string(), person.first_names.clone());
                attrs.insert("lastName".to_string(), person.last_name.clone());
                if let Some(municipality) = &person.municipality {
                    attrs.insert("municipality".to_string(), municipality.clone());
                }
                if let Some(code) = &person.municipality_code {
                    attrs.insert("municipalityCode".to_string(), code.clone());
                }
                attrs.insert(
                    "protectionOrder".to_string(),
                    if person.protection_order { "1" } else { "0" }.to_string(),
                );
            }
            _ => {
                attrs.insert("vtjVerified".to_string(), "false".to_string());
            }
        }
        attrs.insert(
            "vtjRequired".to_string(),
            session.vtj_verification_required.to_string(),
        );

        if let Some(provider) = &session.authentication_provider {
            attrs.insert("authenticationProvider".to_string(), provider.clone());
        }

        if session.session_profile.is_some_and(|p| p.is_legacy()) {
            if let Some(version) = &session.legacy_version {
                attrs.insert("legacyVersion".to_string(), version.clone());
            }
        }

        attrs
    }
}
