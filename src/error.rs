//! Rich diagnostic error types for the bridge.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]` derives,
//! providing error codes and help text. Ordinary request failures (not
//! connected, timeout, backend rejection) are folded into response values by
//! the request modules; the types here reach callers as `Err` only for
//! configuration problems and untyped observation input.

use miette::Diagnostic;
use thiserror::Error;

use crate::config::ConfigError;
use crate::link::LinkError;

/// Top-level error type for the bridge.
#[derive(Debug, Error, Diagnostic)]
pub enum BridgeError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Observation(#[from] ObservationError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Link(#[from] LinkError),
}

/// Result type alias for bridge construction and configuration.
pub type BridgeResult<T> = std::result::Result<T, BridgeError>;

// ---------------------------------------------------------------------------
// Transport errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Error, Diagnostic)]
pub enum TransportError {
    #[error("not connected to {endpoint}")]
    #[diagnostic(
        code(csri::transport::not_connected),
        help(
            "Call `connect()` before issuing requests, or set `auto_connect = true` \
             in the bridge configuration."
        )
    )]
    NotConnected { endpoint: String },

    #[error("request timed out after {timeout_ms} ms")]
    #[diagnostic(
        code(csri::transport::timeout),
        help(
            "The reasoning service did not answer in time. Raise `request_timeout_ms` \
             or pass a longer deadline for slow queries."
        )
    )]
    Timeout { timeout_ms: u64 },

    #[error("backend rejected request: {message}")]
    #[diagnostic(
        code(csri::transport::backend_rejected),
        help("The service returned an error or a payload that does not match the wire contract.")
    )]
    BackendRejected { message: String },

    #[error("invalid endpoint \"{endpoint}\": {reason}")]
    #[diagnostic(
        code(csri::transport::invalid_endpoint),
        help("Set a non-empty `host` and a non-zero `port` in the bridge configuration.")
    )]
    InvalidEndpoint { endpoint: String, reason: String },

    #[error("failed to connect to {endpoint} after {attempts} attempt(s): {message}")]
    #[diagnostic(
        code(csri::transport::connect_failed),
        help("Is the reasoning service running and reachable at this address?")
    )]
    ConnectFailed {
        endpoint: String,
        attempts: u32,
        message: String,
    },
}

impl TransportError {
    /// Whether the request never reached the service because no session
    /// could be established.
    pub fn is_connect_failure(&self) -> bool {
        matches!(
            self,
            Self::NotConnected { .. } | Self::ConnectFailed { .. } | Self::InvalidEndpoint { .. }
        )
    }

    /// Text carried in the `message` of a negative response.
    pub fn in_band_message(&self) -> String {
        match self {
            Self::NotConnected { .. } => self.to_string(),
            Self::ConnectFailed { .. } | Self::InvalidEndpoint { .. } => {
                format!("not connected: {self}")
            }
            Self::Timeout { .. } | Self::BackendRejected { .. } => self.to_string(),
        }
    }
}

pub type TransportResult<T> = std::result::Result<T, TransportError>;

// ---------------------------------------------------------------------------
// Observation errors
// ---------------------------------------------------------------------------

/// Failures decoding untyped observation input.
///
/// These indicate a programming error in the calling adapter, so they are
/// returned as `Err` instead of being folded into an acknowledgment.
#[derive(Debug, Error, Diagnostic)]
pub enum ObservationError {
    #[error("unsupported observation variant \"{tag}\"")]
    #[diagnostic(
        code(csri::observation::unsupported),
        help(
            "Supported variants are `loop_closure`, `appearance_match`, `gnc_event` \
             and `medical_finding`."
        )
    )]
    Unsupported { tag: String },

    #[error("fields do not match observation variant \"{tag}\": {message}")]
    #[diagnostic(
        code(csri::observation::malformed_fields),
        help("Check field names and value types against the variant's shape.")
    )]
    MalformedFields { tag: String, message: String },
}

pub type ObservationResult<T> = std::result::Result<T, ObservationError>;
