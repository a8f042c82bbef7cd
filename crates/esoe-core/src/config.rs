//! Configuration for enforcement and decision points.
//!
//! Configuration is read from a TOML file and overridden by environment
//! variables of the form `ESOE__SECTION__KEY`.
//!
//! # Example (TOML)
//!
//! ```toml
//! [spep]
//! spep_identifier = "https://spep.example.com"
//! authz_endpoint = "https://esoe.example.com/ws/services/esoe/policyDecisionPoint"
//! default_decision = "deny"
//!
//! [pdp]
//! esoe_identifier = "https://esoe.example.com"
//! allowed_time_skew = "5m"
//! retry_interval = "5m"
//! ```

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::decision::DefaultDecision;

/// Obligation identifier that carries cache population hints.
pub const DEFAULT_OBLIGATION_ID: &str = "lxacmlpdp:obligation:cachetargets";

/// Attribute identifier of the assignments holding group targets.
pub const DEFAULT_ATTRIBUTE_ID: &str = "lxacmlpdp:obligation:cachetargets:updateusercache";

/// Root configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct EsoeConfig {
    /// Enforcement point settings.
    pub spep: SpepConfig,

    /// Decision point settings.
    pub pdp: PdpConfig,

    /// Protocol validation and transport settings.
    pub protocol: ProtocolConfig,

    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Identifiers tagging cache hints inside obligations.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct ObligationConfig {
    /// Obligation identifier.
    pub obligation_id: String,

    /// Attribute assignment identifier.
    pub attribute_id: String,
}

impl Default for ObligationConfig {
    fn default() -> Self {
        Self {
            obligation_id: DEFAULT_OBLIGATION_ID.to_string(),
            attribute_id: DEFAULT_ATTRIBUTE_ID.to_string(),
        }
    }
}

/// Enforcement point configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SpepConfig {
    /// Entity identifier of this enforcement point.
    pub spep_identifier: String,

    /// Decision used when no cached target covers a request.
    pub default_decision: DefaultDecision,

    /// Endpoint of the decision point's authorization service.
    pub authz_endpoint: String,

    /// Cache hint identifiers.
    #[serde(flatten)]
    pub obligations: ObligationConfig,
}

impl Default for SpepConfig {
    fn default() -> Self {
        Self {
            spep_identifier: "http://localhost:8080/spep".to_string(),
            default_decision: DefaultDecision::Deny,
            authz_endpoint: "http://localhost:8081/ws/services/esoe/policyDecisionPoint"
                .to_string(),
            obligations: ObligationConfig::default(),
        }
    }
}

/// Decision point configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PdpConfig {
    /// Entity identifier of the identity provider.
    pub esoe_identifier: String,

    /// Decision used when no policy matches a request.
    pub default_decision: DefaultDecision,

    /// Lifetime of issued decision assertions.
    #[serde(with = "humantime_serde")]
    pub allowed_time_skew: Duration,

    /// Interval between retries of failed cache clear notifications.
    #[serde(with = "humantime_serde")]
    pub retry_interval: Duration,

    /// Failed notifications older than this are dropped.
    #[serde(with = "humantime_serde")]
    pub max_failure_age: Duration,

    /// Interval between checks of the policy source for changes.
    #[serde(with = "humantime_serde")]
    pub policy_poll_interval: Duration,

    /// Cache hint identifiers.
    #[serde(flatten)]
    pub obligations: ObligationConfig,
}

impl Default for PdpConfig {
    fn default() -> Self {
        Self {
            esoe_identifier: "http://localhost:8081/esoe".to_string(),
            default_decision: DefaultDecision::Deny,
            allowed_time_skew: Duration::from_secs(300),
            retry_interval: Duration::from_secs(300),
            max_failure_age: Duration::from_secs(24 * 3600),
            policy_poll_interval: Duration::from_secs(60),
            obligations: ObligationConfig::default(),
        }
    }
}

/// Protocol validation and transport configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProtocolConfig {
    /// Tolerated difference between a request's issue instant and now.
    #[serde(with = "humantime_serde")]
    pub allowed_clock_skew: Duration,

    /// Timeout of outgoing web-service calls.
    #[serde(with = "humantime_serde")]
    pub transport_timeout: Duration,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            allowed_clock_skew: Duration::from_secs(300),
            transport_timeout: Duration::from_secs(30),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset.
    pub level: String,

    /// Emit JSON lines instead of human readable output.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An invalid configuration value was provided.
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    /// A required configuration value is missing.
    #[error("Missing required configuration: {0}")]
    Missing(String),

    /// The configuration sources could not be read or deserialized.
    #[error("Failed to load configuration: {0}")]
    Load(String),
}

impl EsoeConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` if an identifier or endpoint is empty,
    /// and `ConfigError::InvalidValue` if an interval is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.spep.spep_identifier.is_empty() {
            return Err(ConfigError::Missing("spep.spep_identifier".to_string()));
        }

        if self.spep.authz_endpoint.is_empty() {
            return Err(ConfigError::Missing("spep.authz_endpoint".to_string()));
        }

        if self.pdp.esoe_identifier.is_empty() {
            return Err(ConfigError::Missing("pdp.esoe_identifier".to_string()));
        }

        for (section, obligations) in [
            ("spep", &self.spep.obligations),
            ("pdp", &self.pdp.obligations),
        ] {
            if obligations.obligation_id.is_empty() {
                return Err(ConfigError::Missing(format!("{section}.obligation_id")));
            }
            if obligations.attribute_id.is_empty() {
                return Err(ConfigError::Missing(format!("{section}.attribute_id")));
            }
        }

        for (name, value) in [
            ("pdp.allowed_time_skew", self.pdp.allowed_time_skew),
            ("pdp.retry_interval", self.pdp.retry_interval),
            ("pdp.max_failure_age", self.pdp.max_failure_age),
            ("pdp.policy_poll_interval", self.pdp.policy_poll_interval),
            ("protocol.transport_timeout", self.protocol.transport_timeout),
        ] {
            if value.is_zero() {
                return Err(ConfigError::InvalidValue(format!("{name} must be > 0")));
            }
        }

        Ok(())
    }
}

/// Load configuration from an optional TOML file plus environment overrides.
///
/// Environment variables use the `ESOE` prefix and `__` as separator, e.g.
/// `ESOE__SPEP__DEFAULT_DECISION=permit`.
pub fn load_config(path: Option<&Path>) -> Result<EsoeConfig, ConfigError> {
    let mut builder = Config::builder();
    if let Some(path) = path {
        if !path.exists() {
            return Err(ConfigError::Load(format!(
                "config file {} does not exist",
                path.display()
            )));
        }
        builder = builder.add_source(File::from(path));
    }

    builder = builder.add_source(
        Environment::with_prefix("ESOE")
            .try_parsing(true)
            .separator("__"),
    );

    let cfg = builder
        .build()
        .map_err(|e| ConfigError::Load(format!("config build error: {e}")))?;
    let merged: EsoeConfig = cfg
        .try_deserialize()
        .map_err(|e| ConfigError::Load(format!("config deserialize error: {e}")))?;

    merged.validate()?;
    Ok(merged)
}

/// Parse configuration from a TOML string without environment overrides.
pub fn parse_config(source: &str) -> Result<EsoeConfig, ConfigError> {
    let config: EsoeConfig =
        toml::from_str(source).map_err(|e| ConfigError::Load(e.to_string()))?;
    config.validate()?;
    Ok(config)
}
