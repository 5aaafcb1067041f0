//! Common test utilities for broker integration tests
//!
//! Provides directory fixtures, a scripted registry, raw attribute
//! builders and an engine harness.

#![allow(dead_code)]
#![allow(clippy::unwrap_used)]

use async_trait::async_trait;
use chrono::Duration;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tunnistus_broker::services::attributes::{
    AUTH_CONTEXT_CLASS_HEADER, CN_HEADER, GIVEN_NAME_HEADER, HETU_HEADER, KID_HEADER,
    LEGACY_VERSION_HEADER, SN_HEADER,
};
use tunnistus_broker::{
    AttributeRequest, AuthenticationProvider, BuildRequest, CancelRequest, DefaultAttributeMapper,
    FinaliseOutcome, FinaliseRequest, HandshakeStep, HmacPhaseIdService, InMemoryDirectory,
    InMemoryPhaseIdHistory, InitiateRequest, InitiateResponse, PhaseIdHistory, PhaseIdService,
    RegistryOutcome, RegistryService, ServiceProvider, SessionEngine,
};
use tunnistus_session::{AuthMethod, IdentifiedPerson, RegistryPerson, SessionProfile, SessionStore};

pub const SECRET: &[u8] = b"test-phase-id-secret-0123456789abcdef";

// ============================================================================
// Directory fixtures
// ============================================================================

/// Permits TUPAS, HST, KATSOPWD; registry lookup optional
pub const SP_OPTIONAL: &str = "https://optional.example.fi";
/// Permits TUPAS, HST; registry lookup mandatory
pub const SP_MANDATORY: &str = "https://mandatory.example.fi";
/// Permits HST only
pub const SP_HST_ONLY: &str = "https://hst-only.example.fi";
/// Legacy session profile
pub const SP_LEGACY: &str = "https://legacy.example.fi";
/// No session profile configured
pub const SP_NO_PROFILE: &str = "https://no-profile.example.fi";
/// Empty permitted-methods string
pub const SP_NO_METHODS: &str = "https://no-methods.example.fi";
pub const SP_UNKNOWN: &str = "https://unknown.example.fi";

pub const CTX_TUPAS: &str = "urn:oid:1.2.246.517.3002.110.1";
pub const CTX_HST: &str = "urn:oid:1.2.246.517.3002.110.2";
pub const CTX_KATSOPWD: &str = "urn:oid:1.2.246.517.3002.110.5";
pub const CTX_UNKNOWN: &str = "urn:ctx:unknown";

pub const LOA_SUBSTANTIAL: &str = "http://ftn.ficom.fi/loa/substantial";
pub const HETU: &str = "010101-123N";

fn sp(
    entity_id: &str,
    methods: &str,
    profile: Option<SessionProfile>,
    vtj_required: bool,
) -> ServiceProvider {
    ServiceProvider {
        entity_id: entity_id.to_string(),
        level_of_assurance: LOA_SUBSTANTIAL.to_string(),
        permitted_auth_methods: methods.to_string(),
        session_profile: profile,
        vtj_verification_required: vtj_required,
    }
}

pub fn directory() -> InMemoryDirectory {
    let directory = InMemoryDirectory::new();
    directory.upsert_relying_party(sp(
        SP_OPTIONAL,
        "TUPAS;HST;KATSOPWD",
        Some(SessionProfile::VetumaSaml2),
        false,
    ));
    directory.upsert_relying_party(sp(
        SP_MANDATORY,
        "TUPAS;HST",
        Some(SessionProfile::TunnistusOnly),
        true,
    ));
    directory.upsert_relying_party(sp(
        SP_HST_ONLY,
        "HST",
        Some(SessionProfile::TunnistusOnly),
        false,
    ));
    directory.upsert_relying_party(sp(
        SP_LEGACY,
        "TUPAS",
        Some(SessionProfile::VetumaLegacy),
        false,
    ));
    directory.upsert_relying_party(sp(SP_NO_PROFILE, "TUPAS", None, false));
    directory.upsert_relying_party(sp(
        SP_NO_METHODS,
        "",
        Some(SessionProfile::TunnistusOnly),
        false,
    ));

    for (name, ctx, method) in [
        ("Nordea", CTX_TUPAS, AuthMethod::Tupas),
        ("Certificate card", CTX_HST, AuthMethod::Hst),
        ("Katso", CTX_KATSOPWD, AuthMethod::Katsopwd),
    ] {
        directory.upsert_authentication_provider(AuthenticationProvider {
            name: name.to_string(),
            auth_context_url: ctx.to_string(),
            auth_method: method,
        });
    }
    directory
}

// ============================================================================
// Raw attributes
// ============================================================================

pub fn attributes_for(ctx: &str) -> HashMap<String, String> {
    HashMap::from([
        (AUTH_CONTEXT_CLASS_HEADER.to_string(), ctx.to_string()),
        (HETU_HEADER.to_string(), HETU.to_string()),
        (KID_HEADER.to_string(), "kid-0001".to_string()),
        (CN_HEADER.to_string(), "Testi Teppo".to_string()),
        (GIVEN_NAME_HEADER.to_string(), "Teppo".to_string()),
        (SN_HEADER.to_string(), "Testi".to_string()),
        (LEGACY_VERSION_HEADER.to_string(), "3.0".to_string()),
    ])
}

pub fn verified_person() -> RegistryPerson {
    RegistryPerson {
        national_identification_number: HETU.to_string(),
        first_names: "Teppo Tapani".to_string(),
        last_name: "Testi".to_string(),
        municipality: Some("Helsinki".to_string()),
        municipality_code: Some("091".to_string()),
        protection_order: false,
        deceased: false,
        data_source: Some("vtj".to_string()),
    }
}

// ============================================================================
// Collaborator fakes
// ============================================================================

type LookupHook = Box<dyn Fn(Option<&str>) + Send + Sync>;

/// Registry returning queued outcomes first, then a fixed fallback
pub struct ScriptedRegistry {
    queued: Mutex<VecDeque<RegistryOutcome>>,
    fallback: RegistryOutcome,
    calls: Mutex<Vec<Option<String>>>,
    hook: Mutex<Option<LookupHook>>,
}

impl ScriptedRegistry {
    pub fn new(fallback: RegistryOutcome) -> Self {
        Self {
            queued: Mutex::new(VecDeque::new()),
            fallback,
            calls: Mutex::new(Vec::new()),
            hook: Mutex::new(None),
        }
    }

    pub fn verifying() -> Self {
        Self::new(RegistryOutcome::Verified(verified_person()))
    }

    pub fn unavailable() -> Self {
        Self::new(RegistryOutcome::TransientFailure(
            "connection refused".to_string(),
        ))
    }

    pub fn then(self, outcome: RegistryOutcome) -> Self {
        self.queued.lock().unwrap().push_back(outcome);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Run `hook` with the passed uid while each lookup is in flight
    pub fn on_lookup(&self, hook: impl Fn(Option<&str>) + Send + Sync + 'static) {
        *self.hook.lock().unwrap() = Some(Box::new(hook));
    }

    /// uid passed on each call, in order
    pub fn uids_seen(&self) -> Vec<Option<String>> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl RegistryService for ScriptedRegistry {
    async fn lookup(&self, _person: &IdentifiedPerson, uid: Option<&str>) -> RegistryOutcome {
        self.calls.lock().unwrap().push(uid.map(String::from));
        if let Some(hook) = self.hook.lock().unwrap().as_ref() {
            hook(uid);
        }
        let queued = self.queued.lock().unwrap().pop_front();
        queued.unwrap_or_else(|| self.fallback.clone())
    }
}

/// History that never reports a replay
pub struct ForgetfulHistory;

impl PhaseIdHistory for ForgetfulHistory {
    fn try_consume(&self, _id: &str, _token: &str) -> bool {
        true
    }

    fn purge_expired(&self) -> usize {
        0
    }
}

// ============================================================================
// Engine harness
// ============================================================================

pub struct TestBroker {
    pub engine: SessionEngine,
    pub store: Arc<SessionStore>,
    pub registry: Arc<ScriptedRegistry>,
    pub directory: Arc<InMemoryDirectory>,
    pub phase_ids: Arc<HmacPhaseIdService>,
}

impl TestBroker {
    pub fn new(registry: ScriptedRegistry) -> Self {
        Self::with_history(
            registry,
            Arc::new(InMemoryPhaseIdHistory::new(Duration::seconds(300))),
        )
    }

    pub fn with_history(registry: ScriptedRegistry, history: Arc<dyn PhaseIdHistory>) -> Self {
        tunnistus_broker::init_test_logging();

        let store = Arc::new(SessionStore::new());
        let registry = Arc::new(registry);
        let directory = Arc::new(directory());
        let phase_ids = Arc::new(HmacPhaseIdService::new(
            SECRET,
            Duration::seconds(60),
            Duration::seconds(5),
        ));
        let engine = SessionEngine::new(
            Arc::clone(&store),
            directory.clone(),
            phase_ids.clone(),
            history,
            registry.clone(),
            Arc::new(DefaultAttributeMapper::new()),
        );
        Self {
            engine,
            store,
            registry,
            directory,
            phase_ids,
        }
    }

    pub fn phase_id(&self, token: &str, step: HandshakeStep) -> String {
        self.phase_ids.issue(token, step)
    }

    pub async fn initiate(&self, relying_party: &str, uid: &str) -> InitiateResponse {
        self.engine
            .initiate(initiate_request(relying_party, uid, None))
            .await
            .unwrap()
    }

    /// Run initiate, build and finalise; returns the durable uid.
    pub async fn login(&self, relying_party: &str, uid: &str, ctx: &str) -> String {
        let init = self.initiate(relying_party, uid).await;
        let built = self
            .engine
            .build(build_request(&init.token, &init.phase_id, attributes_for(ctx)))
            .await
            .unwrap();
        match self
            .engine
            .finalise(finalise_request(&built.token, &built.phase_id))
            .await
            .unwrap()
        {
            FinaliseOutcome::Completed { uid, .. } => uid,
            FinaliseOutcome::NotValidated => panic!("login did not validate"),
        }
    }
}

// ============================================================================
// Request builders
// ============================================================================

pub fn initiate_request(relying_party: &str, uid: &str, methods: Option<&str>) -> InitiateRequest {
    InitiateRequest {
        relying_party_id: relying_party.to_string(),
        existing_uid: uid.to_string(),
        conversation_key: "ckey".to_string(),
        requested_auth_methods: methods.map(String::from),
        tag: "test-tag".to_string(),
    }
}

pub fn build_request(
    token: &str,
    phase_id: &str,
    attributes: HashMap<String, String>,
) -> BuildRequest {
    BuildRequest {
        token: token.to_string(),
        phase_id: phase_id.to_string(),
        attributes,
        tag: "test-tag".to_string(),
    }
}

pub fn finalise_request(token: &str, phase_id: &str) -> FinaliseRequest {
    FinaliseRequest {
        token: token.to_string(),
        phase_id: phase_id.to_string(),
        tag: "test-tag".to_string(),
    }
}

pub fn cancel_request(token: &str, phase_id: &str) -> CancelRequest {
    CancelRequest {
        token: token.to_string(),
        phase_id: phase_id.to_string(),
        tag: "test-tag".to_string(),
    }
}

pub fn attribute_request(
    uid: &str,
    method: AuthMethod,
    relying_party: &str,
) -> AttributeRequest {
    AttributeRequest {
        uid: uid.to_string(),
        auth_method_oid: method.oid(),
        relying_party_id: relying_party.to_string(),
        tag: "test-tag".to_string(),
    }
}
