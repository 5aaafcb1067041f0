//! Broker configuration loaded from environment variables

use chrono::Duration;
use tunnistus_session::SweepSettings;

/// Shortest accepted phase id secret, in bytes.
pub const MIN_PHASE_ID_SECRET_LEN: usize = 32;

/// Configuration for the session lifecycle engine and its collaborators.
#[derive(Clone)]
pub struct BrokerConfig {
    /// HMAC secret for step tokens.
    pub phase_id_secret: Vec<u8>,

    /// How long a step token stays valid after issue.
    pub phase_id_ttl_secs: i64,

    /// Tolerated clock skew for step tokens issued slightly in the future.
    pub phase_id_clock_skew_secs: i64,

    /// How long consumed build-step tokens are remembered.
    pub phase_id_history_retention_secs: i64,

    /// Lifetime of a validated session since its last write.
    pub session_active_ttl_secs: i64,

    /// Lifetime of a session that never validated.
    pub session_failed_ttl_secs: i64,

    /// Attempts at drawing a free uid before `build` gives up.
    pub uid_generation_attempts: usize,

    /// Log filter directive used when `RUST_LOG` is unset.
    pub log_filter: String,
}

impl std::fmt::Debug for BrokerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrokerConfig")
            .field("phase_id_secret", &"[REDACTED]")
            .field("phase_id_ttl_secs", &self.phase_id_ttl_secs)
            .field("phase_id_clock_skew_secs", &self.phase_id_clock_skew_secs)
            .field(
                "phase_id_history_retention_secs",
                &self.phase_id_history_retention_secs,
            )
            .field("session_active_ttl_secs", &self.session_active_ttl_secs)
            .field("session_failed_ttl_secs", &self.session_failed_ttl_secs)
            .field("uid_generation_attempts", &self.uid_generation_attempts)
            .field("log_filter", &self.log_filter)
            .finish()
    }
}

impl BrokerConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_reader(|key| std::env::var(key))
    }

    /// Load configuration from a custom variable reader.
    ///
    /// This allows tests to supply variables without mutating process-global
    /// environment state.
    pub fn from_reader<F>(reader: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Result<String, std::env::VarError>,
    {
        let phase_id_secret = reader("PHASE_ID_SECRET")
            .map_err(|_| ConfigError::MissingVar("PHASE_ID_SECRET".into()))?
            .into_bytes();
        if phase_id_secret.len() < MIN_PHASE_ID_SECRET_LEN {
            return Err(ConfigError::InvalidValue(
                "PHASE_ID_SECRET".into(),
                format!("must be at least {MIN_PHASE_ID_SECRET_LEN} bytes"),
            ));
        }

        let phase_id_ttl_secs = positive_secs(&reader, "PHASE_ID_TTL_SECS", 60)?;
        let phase_id_clock_skew_secs = reader("PHASE_ID_CLOCK_SKEW_SECS")
            .unwrap_or_else(|_| "5".to_string())
            .parse::<i64>()
            .ok()
            .filter(|v| *v >= 0)
            .ok_or_else(|| {
                ConfigError::InvalidValue(
                    "PHASE_ID_CLOCK_SKEW_SECS".into(),
                    "must be a non-negative integer".into(),
                )
            })?;
        let phase_id_history_retention_secs =
            positive_secs(&reader, "PHASE_ID_HISTORY_RETENTION_SECS", 300)?;
        let session_active_ttl_secs = positive_secs(&reader, "SESSION_ACTIVE_TTL_SECS", 3600)?;
        let session_failed_ttl_secs = positive_secs(&reader, "SESSION_FAILED_TTL_SECS", 900)?;

        let uid_generation_attempts = reader("UID_GENERATION_ATTEMPTS")
            .unwrap_or_else(|_| "16".to_string())
            .parse::<usize>()
            .ok()
            .filter(|v| *v > 0)
            .ok_or_else(|| {
                ConfigError::InvalidValue(
                    "UID_GENERATION_ATTEMPTS".into(),
                    "must be a positive integer".into(),
                )
            })?;

        let log_filter =
            reader("LOG_FILTER").unwrap_or_else(|_| "info,tunnistus=debug".to_string());

        Ok(Self {
            phase_id_secret,
            phase_id_ttl_secs,
            phase_id_clock_skew_secs,
            phase_id_history_retention_secs,
            session_active_ttl_secs,
            session_failed_ttl_secs,
            uid_generation_attempts,
            log_filter,
        })
    }

    /// TTLs for the expiry sweep.
    #[must_use]
    pub fn sweep_settings(&self) -> SweepSettings {
        SweepSettings {
            active_ttl: Duration::seconds(self.session_active_ttl_secs),
            failed_ttl: Duration::seconds(self.session_failed_ttl_secs),
        }
    }
}

fn positive_secs<F>(reader: &F, var: &str, default: i64) -> Result<i64, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    match reader(var) {
        Err(_) => Ok(default),
        Ok(raw) => raw
            .trim()
            .parse::<i64>()
            .ok()
            .filter(|v| *v > 0)
            .ok_or_else(|| {
                ConfigError::InvalidValue(var.into(), format!("expected positive seconds, got {raw}"))
            }),
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingVar(String),

    #[error("invalid value for {0}: {1}")]
    InvalidValue(String, String),
}
