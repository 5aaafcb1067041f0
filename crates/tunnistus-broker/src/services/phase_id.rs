//! Step-bound anti-replay tokens ("phase ids")
//!
//! Every handshake transition must present a token proving the caller
//! continues a specific prior step. [`HmacPhaseIdService`] implements the
//! tokens with HMAC-SHA256:
//! - The token format is `{unix_timestamp}.{hex_signature}`
//! - The signature covers `{id}|{stage}|{timestamp}`
//! - Verification is constant-time and accepts only tokens inside the
//!   validity window
//!
//! [`PhaseIdHistory`] remembers consumed build-step pairs so a captured
//! redirect cannot be replayed inside the window.

use chrono::{DateTime, Duration, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::sync::Arc;

use crate::config::BrokerConfig;

type HmacSha256 = Hmac<Sha256>;

/// Longest accepted session token, in characters.
const MAX_ID_LEN: usize = 128;

/// Hex length of an HMAC-SHA256 signature.
const SIGNATURE_HEX_LEN: usize = 64;

/// Handshake step a token is presented for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandshakeStep {
    Build,
    Retrieve,
    Cancel,
}

impl HandshakeStep {
    /// Stage of the handshake the step continues from.
    ///
    /// Build and cancel both continue from the init stage, so the token
    /// issued by `initiate` authorises either one.
    fn stage(&self) -> &'static str {
        match self {
            Self::Build | Self::Cancel => "init",
            Self::Retrieve => "build",
        }
    }
}

/// Source of the current instant
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Issues and verifies step tokens
pub trait PhaseIdService: Send + Sync {
    /// Fresh random identifier, used for session tokens and uids.
    fn next_id(&self) -> String;

    /// Token authorising `step` for `id`.
    fn issue(&self, id: &str, step: HandshakeStep) -> String;

    /// Whether `token` authorises `step` for `id` right now.
    fn verify(&self, token: &str, id: &str, step: HandshakeStep) -> bool;

    /// Cheap shape check of an (id, token) pair before any verification.
    fn validate_structure(&self, id: &str, token: &str) -> bool;
}

/// HMAC-SHA256 implementation of [`PhaseIdService`]
pub struct HmacPhaseIdService {
    secret: Vec<u8>,
    ttl: Duration,
    clock_skew: Duration,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for HmacPhaseIdService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HmacPhaseIdService")
            .field("secret", &"[REDACTED]")
            .field("ttl", &self.ttl)
            .field("clock_skew", &self.clock_skew)
            .finish_non_exhaustive()
    }
}

impl HmacPhaseIdService {
    #[must_use]
    pub fn new(secret: impl Into<Vec<u8>>, ttl: Duration, clock_skew: Duration) -> Self {
        Self::with_clock(secret, ttl, clock_skew, Arc::new(SystemClock))
    }

    #[must_use]
    pub fn with_clock(
        secret: impl Into<Vec<u8>>,
        ttl: Duration,
        clock_skew: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            secret: secret.into(),
            ttl,
            clock_skew,
            clock,
        }
    }

    #[must_use]
    pub fn from_config(config: &BrokerConfig) -> Self {
        Self::new(
            config.phase_id_secret.clone(),
            Duration::seconds(config.phase_id_ttl_secs),
            Duration::seconds(config.phase_id_clock_skew_secs),
        )
    }

    fn sign(&self, id: &str, step: HandshakeStep, timestamp: i64) -> String {
        // HMAC accepts keys of any length, so this cannot fail.
        let mut mac = match HmacSha256::new_from_slice(&self.secret) {
            Ok(mac) => mac,
            Err(_) => return String::new(),
        };
        mac.update(id.as_bytes());
        mac.update(b"|");
        mac.update(step.stage().as_bytes());
        mac.update(b"|");
        mac.update(timestamp.to_string().as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }
}

fn split_token(token: &str) -> Option<(i64, &str)> {
    let (timestamp, signature) = token.split_once('.')?;
    if signature.len() != SIGNATURE_HEX_LEN || !signature.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    if timestamp.is_empty() || !timestamp.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some((timestamp.parse().ok()?, signature))
}

fn valid_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_ID_LEN
        && id.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

impl PhaseIdService for HmacPhaseIdService {
    fn next_id(&self) -> String {
        use rand::rngs::OsRng;
        use rand::RngCore;

        let mut bytes = [0u8; 16];
        OsRng.fill_bytes(&mut bytes);
        hex::encode(bytes)
    }

    fn issue(&self, id: &str, step: HandshakeStep) -> String {
        let timestamp = self.clock.now().timestamp();
        format!("{timestamp}.{}", self.sign(id, step, timestamp))
    }

    fn verify(&self, token: &str, id: &str, step: HandshakeStep) -> bool {
        if !self.validate_structure(id, token) {
            return false;
        }
        let Some((timestamp, signature)) = split_token(token) else {
            return false;
        };

        let expected = self.sign(id, step, timestamp);
        if !constant_time_eq(signature.as_bytes(), expected.as_bytes()) {
            return false;
        }

        let age = self.clock.now().timestamp() - timestamp;
        (-self.clock_skew.num_seconds()..=self.ttl.num_seconds()).contains(&age)
    }

    fn validate_structure(&self, id: &str, token: &str) -> bool {
        valid_id(id) && split_token(token).is_some()
    }
}

/// Constant-time byte comparison to prevent timing attacks.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    use subtle::ConstantTimeEq;
    a.ct_eq(b).into()
}

/// Record of build-step tokens that were already presented
pub trait PhaseIdHistory: Send + Sync {
    /// Atomically record (`id`, `token`). Returns `false` if the pair was
    /// already recorded.
    fn try_consume(&self, id: &str, token: &str) -> bool;

    /// Forget pairs older than the retention window; returns how many.
    fn purge_expired(&self) -> usize;
}

/// In-memory [`PhaseIdHistory`] with a retention window
pub struct InMemoryPhaseIdHistory {
    seen: DashMap<(String, String), DateTime<Utc>>,
    retention: Duration,
    clock: Arc<dyn Clock>,
}

impl InMemoryPhaseIdHistory {
    #[must_use]
    pub fn new(retention: Duration) -> Self {
        Self::with_clock(retention, Arc::new(SystemClock))
    }

    #[must_use]
    pub fn with_clock(retention: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            seen: DashMap::new(),
            retention,
            clock,
        }
    }

    #[must_use]
    pub fn from_config(config: &BrokerConfig) -> Self {
        Self::new(Duration::seconds(config.phase_id_history_retention_secs))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

impl PhaseIdHistory for InMemoryPhaseIdHistory {
    fn try_consume(&self, id: &str, token: &str) -> bool {
        match self.seen.entry((id.to_string(), token.to_string())) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(self.clock.now());
                true
            }
        }
    }

    fn purge_expired(&self) -> usize {
        let cutoff = self.clock.now() - self.retention;
        let before = self.seen.len();
        self.seen.retain(|_, consumed_at| *consumed_at >= cutoff);
        let purged = before.saturating_sub(self.seen.len());
        if purged > 0 {
            tracing::debug!(purged = purged, "Purged consumed phase ids");
        }
        purged
    }
}
