//! Bridge configuration: endpoint, deadlines, and connect retry policy.
//!
//! Configuration is persisted as TOML. Every field has a default, so an empty
//! file (or no file at all) yields a bridge pointed at `localhost:50051`.
//! Environment variables override file values; CLI flags override both.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use miette::Diagnostic;
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from configuration loading and validation.
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("failed to read bridge config: {path}")]
    #[diagnostic(
        code(csri::config::read),
        help("Ensure the config file exists and is readable.")
    )]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse bridge config {path}: {message}")]
    #[diagnostic(
        code(csri::config::parse),
        help("Check the TOML syntax and field types in the config file.")
    )]
    Parse { path: String, message: String },

    #[error("invalid endpoint \"{endpoint}\": {reason}")]
    #[diagnostic(
        code(csri::config::endpoint),
        help("The host must be a bare hostname or IP address and the port must be non-zero.")
    )]
    InvalidEndpoint { endpoint: String, reason: String },

    #[error("invalid value for {var}: \"{value}\"")]
    #[diagnostic(
        code(csri::config::env),
        help("Unset the variable or give it a valid value.")
    )]
    InvalidEnv { var: String, value: String },
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 50051;

// ---------------------------------------------------------------------------
// Endpoint
// ---------------------------------------------------------------------------

/// A validated `host:port` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    /// Validate and build an endpoint.
    pub fn new(host: impl Into<String>, port: u16) -> ConfigResult<Self> {
        let host = host.into();
        let invalid = |reason: &str| ConfigError::InvalidEndpoint {
            endpoint: format!("{host}:{port}"),
            reason: reason.to_string(),
        };

        if host.trim().is_empty() {
            return Err(invalid("host is empty"));
        }
        if host.contains("://") || host.contains('/') {
            return Err(invalid("host must not include a scheme or path"));
        }
        if host.chars().any(char::is_whitespace) {
            return Err(invalid("host contains whitespace"));
        }
        if port == 0 {
            return Err(invalid("port must be non-zero"));
        }

        Ok(Self { host, port })
    }

    /// Base URL for HTTP requests.
    pub fn base_url(&self) -> String {
        let host = if self.host == "0.0.0.0" {
            "127.0.0.1"
        } else {
            &self.host
        };
        format!("http://{host}:{}", self.port)
    }
}

impl Default for Endpoint {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.into(),
            port: DEFAULT_PORT,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

// ---------------------------------------------------------------------------
// Retry policy
// ---------------------------------------------------------------------------

/// Bounded exponential backoff applied to connect attempts only.
///
/// Dispatch is never retried: observation submission is not guaranteed to be
/// idempotent at the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total connect attempts, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay after the first failed attempt.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Multiplier applied per subsequent attempt.
    #[serde(default = "default_factor")]
    pub factor: f64,
    /// Upper bound on any single delay.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Relative jitter in `[0, 1)`, applied symmetrically.
    #[serde(default = "default_jitter")]
    pub jitter: f64,
}

fn default_max_attempts() -> u32 {
    3
}
fn default_base_delay_ms() -> u64 {
    100
}
fn default_factor() -> f64 {
    2.0
}
fn default_max_delay_ms() -> u64 {
    2_000
}
fn default_jitter() -> f64 {
    0.2
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            factor: default_factor(),
            max_delay_ms: default_max_delay_ms(),
            jitter: default_jitter(),
        }
    }
}

impl RetryPolicy {
    /// A single attempt, no waiting.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Number of attempts actually made (at least one).
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Delay before retrying after the failed attempt `attempt` (0-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = i32::try_from(attempt).unwrap_or(i32::MAX);
        let base = (self.base_delay_ms as f64 * self.factor.max(1.0).powi(exp))
            .min(self.max_delay_ms as f64);

        let jitter = self.jitter.clamp(0.0, 0.99);
        let spread = base * jitter;
        let offset = if spread > 0.0 {
            rand::thread_rng().gen_range(-spread..=spread)
        } else {
            0.0
        };

        Duration::from_millis((base + offset).max(0.0) as u64)
    }
}

// ---------------------------------------------------------------------------
// Bridge config
// ---------------------------------------------------------------------------

/// Top-level bridge configuration, persisted as TOML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Reasoning service host.
    #[serde(default = "default_host")]
    pub host: String,
    /// Reasoning service port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Connect implicitly before the first request.
    #[serde(default = "default_auto_connect")]
    pub auto_connect: bool,
    /// Deadline for a single request round-trip, unless a call overrides it.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Deadline for a single connect attempt.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Connect retry policy.
    #[serde(default)]
    pub retry: RetryPolicy,
}

fn default_host() -> String {
    DEFAULT_HOST.into()
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_auto_connect() -> bool {
    true
}
fn default_request_timeout_ms() -> u64 {
    5_000
}
fn default_connect_timeout_ms() -> u64 {
    2_000
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            auto_connect: default_auto_connect(),
            request_timeout_ms: default_request_timeout_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            retry: RetryPolicy::default(),
        }
    }
}

impl BridgeConfig {
    /// Load a config file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_toml_str(&content, &path.display().to_string())
    }

    /// Parse TOML text. `origin` names the source in error messages.
    pub fn from_toml_str(content: &str, origin: &str) -> ConfigResult<Self> {
        toml::from_str(content).map_err(|e| ConfigError::Parse {
            path: origin.to_string(),
            message: e.to_string(),
        })
    }

    /// Serialize to TOML.
    pub fn to_toml(&self) -> ConfigResult<String> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse {
            path: "<memory>".into(),
            message: e.to_string(),
        })
    }

    /// Apply `CSRI_HOST`, `CSRI_PORT`, and `CSRI_TIMEOUT_MS` overrides.
    pub fn apply_env(self) -> ConfigResult<Self> {
        self.apply_env_from(|var| std::env::var(var).ok())
    }

    /// Apply overrides from an arbitrary variable source.
    pub fn apply_env_from(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> ConfigResult<Self> {
        if let Some(host) = lookup("CSRI_HOST") {
            self.host = host;
        }
        if let Some(port) = lookup("CSRI_PORT") {
            self.port = port.parse().map_err(|_| ConfigError::InvalidEnv {
                var: "CSRI_PORT".into(),
                value: port.clone(),
            })?;
        }
        if let Some(ms) = lookup("CSRI_TIMEOUT_MS") {
            self.request_timeout_ms = ms.parse().map_err(|_| ConfigError::InvalidEnv {
                var: "CSRI_TIMEOUT_MS".into(),
                value: ms.clone(),
            })?;
        }
        Ok(self)
    }

    /// Point the config at another endpoint.
    pub fn with_endpoint(mut self, host: impl Into<String>, port: u16) -> Self {
        self.host = host.into();
        self.port = port;
        self
    }

    /// Validated endpoint.
    pub fn endpoint(&self) -> ConfigResult<Endpoint> {
        Endpoint::new(self.host.clone(), self.port)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_yields_defaults() {
        let config = BridgeConfig::from_toml_str("", "<test>").unwrap();
        assert_eq!(config, BridgeConfig::default());
        assert_eq!(config.endpoint().unwrap().to_string(), "localhost:50051");
        assert_eq!(config.retry.max_attempts, 3);
    }

    #[test]
    fn partial_toml_keeps_remaining_defaults() {
        let config = BridgeConfig::from_toml_str(
            "host = \"reasoner.local\"\nport = 7000\n\n[retry]\nmax_attempts = 5\n",
            "<test>",
        )
        .unwrap();
        assert_eq!(config.host, "reasoner.local");
        assert_eq!(config.port, 7000);
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.base_delay_ms, 100);
        assert!(config.auto_connect);
    }

    #[test]
    fn bad_toml_is_parse_error() {
        let err = BridgeConfig::from_toml_str("port = \"not a number\"", "<test>").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("bridge.toml");
        std::fs::write(&path, "port = 6001\nauto_connect = false\n").unwrap();

        let config = BridgeConfig::load(&path).unwrap();
        assert_eq!(config.port, 6001);
        assert!(!config.auto_connect);

        let missing = BridgeConfig::load(&dir.path().join("nope.toml")).unwrap_err();
        assert!(matches!(missing, ConfigError::Read { .. }));
    }

    #[test]
    fn toml_round_trip_preserves_values() {
        let config = BridgeConfig::default().with_endpoint("10.0.0.7", 9000);
        let text = config.to_toml().unwrap();
        assert_eq!(BridgeConfig::from_toml_str(&text, "<test>").unwrap(), config);
    }

    #[test]
    fn env_overrides_apply() {
        let config = BridgeConfig::default()
            .apply_env_from(|var| match var {
                "CSRI_HOST" => Some("gnc-core".into()),
                "CSRI_PORT" => Some("6500".into()),
                _ => None,
            })
            .unwrap();
        assert_eq!(config.host, "gnc-core");
        assert_eq!(config.port, 6500);
        assert_eq!(config.request_timeout_ms, 5_000);
    }

    #[test]
    fn bad_env_value_is_reported() {
        let err = BridgeConfig::default()
            .apply_env_from(|var| (var == "CSRI_PORT").then(|| "http".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnv { ref var, .. } if var == "CSRI_PORT"));
    }

    #[test]
    fn endpoint_validation() {
        assert!(Endpoint::new("localhost", 50051).is_ok());
        assert!(Endpoint::new("", 50051).is_err());
        assert!(Endpoint::new("localhost", 0).is_err());
        assert!(Endpoint::new("http://localhost", 80).is_err());
        assert!(Endpoint::new("bad host", 80).is_err());
    }

    #[test]
    fn base_url_rewrites_wildcard_bind() {
        let ep = Endpoint::new("0.0.0.0", 8080).unwrap();
        assert_eq!(ep.base_url(), "http://127.0.0.1:8080");
    }

    #[test]
    fn backoff_grows_and_caps() {
        let policy = RetryPolicy {
            jitter: 0.0,
            ..RetryPolicy::default()
        };
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(2), Duration::from_millis(400));
        assert_eq!(policy.delay_for(10), Duration::from_millis(2_000));
    }

    #[test]
    fn backoff_jitter_stays_in_band() {
        let policy = RetryPolicy::default();
        for _ in 0..50 {
            let d = policy.delay_for(1).as_millis();
            assert!((160..=240).contains(&d), "delay {d} outside jitter band");
        }
    }

    #[test]
    fn attempts_never_zero() {
        let policy = RetryPolicy {
            max_attempts: 0,
            ..RetryPolicy::default()
        };
        assert_eq!(policy.attempts(), 1);
        assert_eq!(RetryPolicy::no_retry().attempts(), 1);
    }
}
