//! Link substrate underneath the [`Transport`](crate::transport::Transport).
//!
//! A `Link` moves one [`WireRequest`] to the reasoning service and hands back
//! the raw JSON reply. Connection state, retries, deadlines, and response
//! decoding all live in the transport; a link only knows how to open, call,
//! and close.
//!
//! Two links ship with the crate:
//! - [`http::HttpLink`]: HTTP+JSON against a running service.
//! - [`memory::MemoryLink`]: an in-process fake honoring the same contract.

pub mod http;
pub mod memory;

use std::future::Future;

use miette::Diagnostic;
use serde_json::Value;
use thiserror::Error;

use crate::config::Endpoint;
use crate::protocol::WireRequest;

#[derive(Debug, Clone, PartialEq, Error, Diagnostic)]
pub enum LinkError {
    #[error("endpoint unreachable: {message}")]
    #[diagnostic(
        code(csri::link::unreachable),
        help("Is the reasoning service running? Check host, port, and firewall rules.")
    )]
    Unreachable { message: String },

    #[error("link is not open")]
    #[diagnostic(
        code(csri::link::closed),
        help("The session was closed or never opened. Connect before dispatching.")
    )]
    Closed,

    #[error("backend error: {message}")]
    #[diagnostic(
        code(csri::link::backend),
        help("The service answered with an error status or an unreadable body.")
    )]
    Backend { message: String },

    #[error("link setup failed: {message}")]
    #[diagnostic(
        code(csri::link::setup),
        help("The client could not be constructed. Check TLS and proxy settings.")
    )]
    Setup { message: String },
}

impl LinkError {
    /// Whether a connect attempt that failed this way is worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unreachable { .. })
    }
}

pub type LinkResult<T> = std::result::Result<T, LinkError>;

/// A pluggable request/response channel to the reasoning service.
///
/// Implementations must tolerate concurrent `call`s; correlation of
/// in-flight requests is the link's (or the backend's) concern.
pub trait Link: Send + Sync + 'static {
    /// Establish a session with `endpoint`.
    fn open(&self, endpoint: &Endpoint) -> impl Future<Output = LinkResult<()>> + Send;

    /// Send one request and await its reply.
    fn call(&self, request: &WireRequest) -> impl Future<Output = LinkResult<Value>> + Send;

    /// Release the session. Never fails.
    fn close(&self) -> impl Future<Output = ()> + Send;

    /// Liveness check that leaves session state untouched.
    fn probe(&self, endpoint: &Endpoint) -> impl Future<Output = LinkResult<()>> + Send;
}
