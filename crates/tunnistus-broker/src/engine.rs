//! Session lifecycle engine.
//!
//! Drives one login through `initiate` → `build` → `finalise`, serves later
//! attribute requests against the durable uid, and handles `cancel`. The
//! engine holds no state of its own: sessions live in the [`SessionStore`]
//! and every collaborator is injected at construction.

use std::sync::Arc;

use tracing::{debug, error, info, instrument, warn};
use tunnistus_session::{
    decide, AuthMethod, ExpirySweeper, Session, SessionStore, SweepSettings,
    VerificationRequirement, UNASSIGNED_UID,
};

use crate::config::BrokerConfig;
use crate::error::{BrokerError, BrokerResult};
use crate::models::{
    AttributeRequest, BuildRequest, BuildResponse, CancelRequest, CancelResponse,
    FinaliseOutcome, FinaliseRequest, InitiateRequest, InitiateResponse, SessionAttributes,
};
use crate::services::attributes::LEGACY_VERSION_HEADER;
use crate::services::{
    auth_context_url, AttributeMapper, DefaultAttributeMapper, Directory, DirectoryError,
    HandshakeStep, HmacPhaseIdService, InMemoryPhaseIdHistory, PhaseIdHistory, PhaseIdService,
    RegistryOutcome, RegistryService, ServiceProvider,
};

/// Default bound on uid generation attempts.
pub const DEFAULT_UID_GENERATION_ATTEMPTS: usize = 16;

/// Login session lifecycle over a shared [`SessionStore`].
#[derive(Clone)]
pub struct SessionEngine {
    store: Arc<SessionStore>,
    directory: Arc<dyn Directory>,
    phase_ids: Arc<dyn PhaseIdService>,
    history: Arc<dyn PhaseIdHistory>,
    registry: Arc<dyn RegistryService>,
    mapper: Arc<dyn AttributeMapper>,
    uid_generation_attempts: usize,
}

impl SessionEngine {
    #[must_use]
    pub fn new(
        store: Arc<SessionStore>,
        directory: Arc<dyn Directory>,
        phase_ids: Arc<dyn PhaseIdService>,
        history: Arc<dyn PhaseIdHistory>,
        registry: Arc<dyn RegistryService>,
        mapper: Arc<dyn AttributeMapper>,
    ) -> Self {
        Self {
            store,
            directory,
            phase_ids,
            history,
            registry,
            mapper,
            uid_generation_attempts: DEFAULT_UID_GENERATION_ATTEMPTS,
        }
    }

    /// Engine with the shipped phase id, replay history and mapper
    /// implementations configured from `config`.
    #[must_use]
    pub fn from_config(
        config: &BrokerConfig,
        store: Arc<SessionStore>,
        directory: Arc<dyn Directory>,
        registry: Arc<dyn RegistryService>,
    ) -> Self {
        Self::new(
            store,
            directory,
            Arc::new(HmacPhaseIdService::from_config(config)),
            Arc::new(InMemoryPhaseIdHistory::from_config(config)),
            registry,
            Arc::new(DefaultAttributeMapper::new()),
        )
        .with_uid_generation_attempts(config.uid_generation_attempts)
    }

    #[must_use]
    pub fn with_uid_generation_attempts(mut self, attempts: usize) -> Self {
        self.uid_generation_attempts = attempts;
        self
    }

    #[must_use]
    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    /// Start a login: write an INIT session under a fresh token.
    #[instrument(skip_all, fields(tag = %request.tag, relying_party = %request.relying_party_id))]
    pub async fn initiate(&self, request: InitiateRequest) -> BrokerResult<InitiateResponse> {
        let sp = match self.directory.relying_party(&request.relying_party_id).await {
            Ok(sp) => sp,
            Err(DirectoryError::NotFound(_)) => {
                warn!("Unknown relying party");
                return Err(BrokerError::InitFailed(format!(
                    "unknown relying party {}",
                    request.relying_party_id
                )));
            }
            Err(e) => return Err(BrokerError::Internal(e.to_string())),
        };

        let token = self.phase_ids.next_id();
        let phase_id = self.phase_ids.issue(&token, HandshakeStep::Build);

        let permitted = match sp.permitted_methods() {
            Ok(methods) if !methods.is_empty() => methods,
            Ok(_) => {
                error!("Relying party has no permitted authentication methods");
                return Err(BrokerError::Internal(
                    "relying party has no permitted authentication methods".to_string(),
                ));
            }
            Err(e) => {
                error!(error = %e, "Relying party permitted methods are malformed");
                return Err(e.into());
            }
        };

        let requested = match request
            .requested_auth_methods
            .as_deref()
            .map(str::trim)
            .filter(|list| !list.is_empty())
        {
            None => permitted,
            Some(list) => {
                let requested = AuthMethod::parse_list(list).map_err(|e| {
                    warn!(error = %e, "Unparseable requested authentication methods");
                    BrokerError::InitFailed(e.to_string())
                })?;
                if !requested.is_subset(&permitted) {
                    warn!(
                        requested = %AuthMethod::join(&requested),
                        permitted = %AuthMethod::join(&permitted),
                        "Requested methods not permitted for relying party"
                    );
                    return Err(BrokerError::InitFailed(
                        "requested authentication methods not permitted".to_string(),
                    ));
                }
                requested
            }
        };

        let Some(profile) = sp.session_profile else {
            error!("Relying party has no session profile");
            return Err(BrokerError::SessionInitFailed(sp.entity_id));
        };

        let uid = if request.existing_uid.trim().is_empty() {
            UNASSIGNED_UID
        } else {
            request.existing_uid.as_str()
        };
        let session = Session::new(
            uid,
            request.conversation_key,
            sp.entity_id.as_str(),
            profile,
            requested.clone(),
        );
        self.store.insert(&token, AuthMethod::Init, session);

        info!(
            session_profile = %profile,
            requested = %AuthMethod::join(&requested),
            "Session initiated"
        );

        Ok(InitiateResponse {
            token,
            phase_id,
            requested_auth_methods: requested,
            level_of_assurance: sp.level_of_assurance,
        })
    }

    /// Attach the authenticator's result to the INIT session and promote it
    /// to a fresh token.
    ///
    /// Works on a checked-out copy; every early return leaves the INIT
    /// entry as it was.
    #[instrument(skip_all, fields(tag = %request.tag))]
    pub async fn build(&self, request: BuildRequest) -> BrokerResult<BuildResponse> {
        let BuildRequest {
            token,
            phase_id,
            attributes,
            ..
        } = request;

        if !self.history.try_consume(&token, &phase_id) {
            warn!("Replayed build phase id");
            return Err(BrokerError::BuildFailed("phase id already used".to_string()));
        }
        if !self.phase_ids.verify(&phase_id, &token, HandshakeStep::Build) {
            warn!("Build phase id rejected");
            return Err(BrokerError::BuildFailed("invalid phase id".to_string()));
        }

        let Some(mut session) = self.store.lookup(&token, AuthMethod::Init) else {
            warn!("No initiated session for token");
            return Err(BrokerError::BuildFailed("unknown session".to_string()));
        };

        let Some(context) = auth_context_url(&attributes) else {
            error!("Authenticator sent no authentication context");
            return Err(BrokerError::Internal(
                "missing authentication context".to_string(),
            ));
        };
        let provider = self
            .directory
            .authentication_provider(context)
            .await
            .map_err(|e| {
                error!(auth_context = %context, error = %e, "Authentication provider lookup failed");
                BrokerError::Internal(e.to_string())
            })?;
        let method = provider.auth_method;

        if !session.permits(method) {
            warn!(auth_method = %method, "Authentication method not requested for session");
            return Err(BrokerError::Internal(format!(
                "authentication method {method} not permitted"
            )));
        }

        let person = self.mapper.identify(&attributes, method).map_err(|e| {
            error!(error = %e, "Attribute mapping failed");
            BrokerError::Internal(e.to_string())
        })?;
        if person.identifier_type.is_none() {
            warn!(auth_method = %method, "Authenticator did not identify the person");
            return Err(BrokerError::BuildFailed(
                "person identifier missing".to_string(),
            ));
        }

        session.identified_person = Some(person);
        session.authentication_provider = Some(provider.name);
        if session.session_profile.is_some_and(|p| p.is_legacy()) {
            session.legacy_version = attributes.get(LEGACY_VERSION_HEADER).cloned();
        }

        let sp = self.session_relying_party(&session).await?;
        let requirement = decide(sp.vtj_verification_required, method);
        self.verify_with_registry(&mut session, requirement).await?;

        if !session.has_assigned_uid() {
            session.uid = self.generate_uid()?;
        }
        if self.store.has_invalid_siblings(&session.uid) {
            warn!("Identity already carries invalid registry data");
            return Err(BrokerError::VtjInvalid(
                "sibling session has invalid registry data".to_string(),
            ));
        }

        session.validated = true;
        session.touch();
        let next_token = self.phase_ids.next_id();
        if self
            .store
            .rekey(&token, &next_token, method, session)
            .is_none()
        {
            warn!("Session already promoted by a concurrent build");
            return Err(BrokerError::BuildFailed(
                "session already promoted".to_string(),
            ));
        }
        let phase_id = self.phase_ids.issue(&next_token, HandshakeStep::Retrieve);

        info!(auth_method = %method, requirement = %requirement, "Session built");
        Ok(BuildResponse {
            token: next_token,
            phase_id,
        })
    }

    /// Promote a built session to its durable uid.
    #[instrument(skip_all, fields(tag = %request.tag))]
    pub async fn finalise(&self, request: FinaliseRequest) -> BrokerResult<FinaliseOutcome> {
        let FinaliseRequest {
            token, phase_id, ..
        } = request;

        if !self
            .phase_ids
            .verify(&phase_id, &token, HandshakeStep::Retrieve)
        {
            warn!("Retrieve phase id rejected");
            return Err(BrokerError::PhaseIdFailed("invalid phase id".to_string()));
        }

        let methods = self.store.lookup_all(&token).unwrap_or_default();
        if methods.len() != 1 {
            warn!(entries = methods.len(), "Expected exactly one session under token");
            return Err(BrokerError::FinaliseFailed(format!(
                "{} sessions under token",
                methods.len()
            )));
        }
        let Some((method, session)) = methods.into_iter().next() else {
            return Err(BrokerError::FinaliseFailed("no session".to_string()));
        };

        if !session.validated {
            info!(auth_method = %method, "Finalised session was never validated");
            return Ok(FinaliseOutcome::NotValidated);
        }

        let uid = session.uid.clone();
        let conversation_key = session.conversation_key.clone();
        if self.store.has_invalid_siblings(&uid) {
            warn!(auth_method = %method, "Identity was invalidated before finalise");
            return Err(BrokerError::VtjInvalid(
                "identity has invalid registry data".to_string(),
            ));
        }
        if self.store.rekey(&token, &uid, method, session).is_none() {
            warn!("Session already finalised by a concurrent request");
            return Err(BrokerError::FinaliseFailed(
                "session already finalised".to_string(),
            ));
        }

        info!(auth_method = %method, "Session finalised");
        Ok(FinaliseOutcome::Completed {
            conversation_key,
            uid,
            auth_method: method,
        })
    }

    /// Release the attribute set of a finalised session to a relying party.
    ///
    /// Lookup failures of any kind are reported as [`BrokerError::NotFound`];
    /// only the registry outcomes keep their own classification.
    #[instrument(skip_all, fields(tag = %request.tag, relying_party = %request.relying_party_id))]
    pub async fn get_attributes(&self, request: AttributeRequest) -> BrokerResult<SessionAttributes> {
        let method = match AuthMethod::from_oid(&request.auth_method_oid) {
            Ok(method) if method != AuthMethod::Init => method,
            _ => {
                debug!(auth_method_oid = %request.auth_method_oid, "Unresolvable authentication method");
                return Err(BrokerError::NotFound);
            }
        };

        let sp = self
            .directory
            .relying_party(&request.relying_party_id)
            .await
            .map_err(|e| {
                debug!(error = %e, "Relying party lookup failed");
                BrokerError::NotFound
            })?;
        let permitted = sp.permitted_methods().map_err(|e| {
            error!(error = %e, "Relying party permitted methods are malformed");
            BrokerError::NotFound
        })?;
        if !permitted.contains(&method) {
            warn!(auth_method = %method, "Authentication method not permitted for relying party");
            return Err(BrokerError::NotFound);
        }

        let Some(mut session) = self.store.lookup(&request.uid, method) else {
            debug!(auth_method = %method, "No session for uid");
            return Err(BrokerError::NotFound);
        };

        session.relying_party_entity_id = sp.entity_id.clone();

        if !session.vtj_verified {
            let requirement = decide(sp.vtj_verification_required, method);
            match self.verify_with_registry(&mut session, requirement).await {
                Ok(()) => {}
                Err(e @ (BrokerError::VtjFailed(_) | BrokerError::VtjInvalid(_))) => return Err(e),
                Err(e) => {
                    error!(error = %e, "Registry re-query failed");
                    return Err(BrokerError::NotFound);
                }
            }
        }

        // The stored session may have been swept, cancelled or replaced while
        // the registry was queried; write onto whatever is there now.
        let checked = session;
        let Some(session) = self.store.update(&request.uid, method, |stored| {
            stored.relying_party_entity_id = checked.relying_party_entity_id;
            stored.vtj_verification_required = checked.vtj_verification_required;
            if checked.vtj_verified && !stored.vtj_verified {
                stored.vtj_verified = true;
                stored.registry_person = checked.registry_person;
            }
            stored.touch();
        }) else {
            debug!(auth_method = %method, "Session removed during attribute release");
            return Err(BrokerError::NotFound);
        };

        if session.vtj_data_invalid || self.store.has_invalid_siblings(&request.uid) {
            warn!("Identity carries invalid registry data");
            return Err(BrokerError::VtjInvalid(
                "identity has invalid registry data".to_string(),
            ));
        }

        let attributes = self.mapper.collect(&session);

        info!(auth_method = %method, released = attributes.len(), "Attributes released");
        Ok(SessionAttributes {
            uid: request.uid,
            auth_method: method,
            attributes,
        })
    }

    /// Abandon an initiated login.
    #[instrument(skip_all, fields(tag = %request.tag))]
    pub async fn cancel(&self, request: CancelRequest) -> BrokerResult<CancelResponse> {
        if !self
            .phase_ids
            .validate_structure(&request.token, &request.phase_id)
            || !self
                .phase_ids
                .verify(&request.phase_id, &request.token, HandshakeStep::Cancel)
        {
            warn!("Cancel phase id rejected");
            return Err(BrokerError::PhaseIdFailed("invalid phase id".to_string()));
        }

        let removed = self.store.remove(&request.token, AuthMethod::Init);
        info!("Session cancelled");
        Ok(CancelResponse {
            conversation_key: removed.conversation_key,
        })
    }

    /// Evict expired sessions and forget stale replay history.
    ///
    /// Returns the number of evicted sessions.
    pub fn sweep_expired(&self, settings: SweepSettings) -> usize {
        let evicted = ExpirySweeper::new(Arc::clone(&self.store)).sweep_with(settings);
        let purged = self.history.purge_expired();
        debug!(evicted = evicted, purged = purged, "Maintenance sweep finished");
        evicted
    }

    async fn session_relying_party(&self, session: &Session) -> BrokerResult<ServiceProvider> {
        self.directory
            .relying_party(&session.relying_party_entity_id)
            .await
            .map_err(|e| {
                error!(error = %e, "Relying party of session could not be resolved");
                BrokerError::Internal(e.to_string())
            })
    }

    /// Registry verification shared by `build` and `get_attributes`.
    ///
    /// Invalid data poisons every sibling under an assigned uid; transient
    /// failures are fatal only when the lookup must succeed.
    async fn verify_with_registry(
        &self,
        session: &mut Session,
        requirement: VerificationRequirement,
    ) -> BrokerResult<()> {
        session.vtj_verification_required = requirement == VerificationRequirement::MustSucceed;
        if !requirement.requires_lookup() {
            debug!("Registry lookup not allowed for method");
            return Ok(());
        }

        let Some(person) = session.identified_person.as_ref() else {
            return Err(BrokerError::Internal(
                "session has no identified person".to_string(),
            ));
        };
        let uid = session.has_assigned_uid().then(|| session.uid.clone());

        let outcome = self.registry.lookup(person, uid.as_deref()).await;
        debug!(outcome = outcome.label(), requirement = %requirement, "Registry lookup finished");

        match outcome {
            RegistryOutcome::Verified(registry_person) => {
                session.registry_person = Some(registry_person);
                session.vtj_verified = true;
                Ok(())
            }
            RegistryOutcome::InvalidData(reason) => {
                session.vtj_data_invalid = true;
                if let Some(uid) = uid.as_deref() {
                    let marked = self.store.invalidate_all(uid);
                    warn!(marked = marked, "Invalidated sibling sessions");
                }
                Err(BrokerError::VtjInvalid(reason))
            }
            RegistryOutcome::TransientFailure(reason) => match requirement {
                VerificationRequirement::MustSucceed => {
                    warn!("Mandatory registry lookup failed");
                    Err(BrokerError::VtjFailed(reason))
                }
                _ => {
                    warn!("Optional registry lookup failed, continuing without registry data");
                    Ok(())
                }
            },
        }
    }

    fn generate_uid(&self) -> BrokerResult<String> {
        for _ in 0..self.uid_generation_attempts {
            let candidate = self.phase_ids.next_id();
            if !self.store.contains_key(&candidate) {
                return Ok(candidate);
            }
        }
        error!(
            attempts = self.uid_generation_attempts,
            "Could not generate an unused uid"
        );
        Err(BrokerError::Internal("uid generation exhausted".to_string()))
    }
}
