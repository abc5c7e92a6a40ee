//! Session management and request dispatch over a [`Link`].
//!
//! The transport owns the one piece of shared mutable state in the bridge:
//! whether a session is open. Transitions happen behind an async mutex so
//! concurrent connects collapse into a single attempt; reads go through an
//! atomic flag and never wait.
//!
//! Connect attempts are retried with bounded backoff. Dispatch is never
//! retried: a request either completes once, fails, or times out, and on
//! timeout the in-flight call is dropped before anything else happens.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::config::{BridgeConfig, ConfigError, Endpoint};
use crate::error::{TransportError, TransportResult};
use crate::link::{Link, LinkError};
use crate::protocol::WireRequest;

/// Observable connection status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
        }
    }
}

/// Clears the `connecting` flag when an attempt ends, including when the
/// connecting future is dropped mid-attempt.
struct ConnectingGuard<'a>(&'a AtomicBool);

impl<'a> ConnectingGuard<'a> {
    fn raise(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for ConnectingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Outcome of the most recent finished connect attempt.
#[derive(Debug, Default)]
struct Session {
    last_failure: Option<TransportError>,
}

pub struct Transport<L: Link> {
    link: L,
    config: BridgeConfig,
    connected: AtomicBool,
    connecting: AtomicBool,
    /// Bumped under the session lock each time a connect attempt finishes.
    finished_attempts: AtomicU64,
    session: Mutex<Session>,
}

impl<L: Link> fmt::Debug for Transport<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transport")
            .field("endpoint", &self.endpoint_label())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl<L: Link> Transport<L> {
    pub fn new(link: L, config: BridgeConfig) -> Self {
        Self {
            link,
            config,
            connected: AtomicBool::new(false),
            connecting: AtomicBool::new(false),
            finished_attempts: AtomicU64::new(0),
            session: Mutex::new(Session::default()),
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> ConnectionState {
        if self.is_connected() {
            ConnectionState::Connected
        } else if self.connecting.load(Ordering::SeqCst) {
            ConnectionState::Connecting
        } else {
            ConnectionState::Disconnected
        }
    }

    /// `host:port` as configured, valid or not.
    pub fn endpoint_label(&self) -> String {
        format!("{}:{}", self.config.host, self.config.port)
    }

    fn endpoint(&self) -> TransportResult<Endpoint> {
        self.config.endpoint().map_err(|e| match e {
            ConfigError::InvalidEndpoint { endpoint, reason } => {
                TransportError::InvalidEndpoint { endpoint, reason }
            }
            other => TransportError::InvalidEndpoint {
                endpoint: self.endpoint_label(),
                reason: other.to_string(),
            },
        })
    }

    // -----------------------------------------------------------------------
    // Session lifecycle
    // -----------------------------------------------------------------------

    /// Open a session, retrying transient failures per the retry policy.
    ///
    /// No-op when already connected. Callers that arrive while another
    /// connect is in flight wait for it and share its outcome. Dropping the
    /// future mid-attempt leaves the transport disconnected, and the next
    /// caller starts over.
    pub async fn connect(&self) -> TransportResult<()> {
        if self.is_connected() {
            return Ok(());
        }

        let seen = self.finished_attempts.load(Ordering::SeqCst);
        let mut session = self.session.lock().await;

        if self.is_connected() {
            return Ok(());
        }
        if self.finished_attempts.load(Ordering::SeqCst) != seen {
            if let Some(failure) = &session.last_failure {
                return Err(failure.clone());
            }
        }

        let outcome = {
            let _connecting = ConnectingGuard::raise(&self.connecting);
            self.open_with_retry().await
        };

        match &outcome {
            Ok(()) => {
                self.connected.store(true, Ordering::SeqCst);
                session.last_failure = None;
            }
            Err(e) => session.last_failure = Some(e.clone()),
        }
        self.finished_attempts.fetch_add(1, Ordering::SeqCst);
        outcome
    }

    async fn open_with_retry(&self) -> TransportResult<()> {
        let endpoint = self.endpoint().inspect_err(|e| {
            tracing::warn!(error = %e, "refusing to connect");
        })?;
        let policy = &self.config.retry;
        let attempts = policy.attempts();
        let connect_timeout = self.config.connect_timeout();

        let mut last_error = String::new();
        for attempt in 0..attempts {
            if attempt > 0 {
                let delay = policy.delay_for(attempt - 1);
                tracing::debug!(%endpoint, attempt, delay_ms = delay.as_millis() as u64, "backing off");
                tokio::time::sleep(delay).await;
            }

            let result = match tokio::time::timeout(connect_timeout, self.link.open(&endpoint)).await
            {
                Ok(r) => r,
                Err(_) => Err(LinkError::Unreachable {
                    message: format!(
                        "connect attempt timed out after {} ms",
                        connect_timeout.as_millis()
                    ),
                }),
            };

            match result {
                Ok(()) => {
                    tracing::info!(%endpoint, attempt = attempt + 1, "connected");
                    return Ok(());
                }
                Err(e) if e.is_transient() => {
                    tracing::warn!(%endpoint, attempt = attempt + 1, error = %e, "connect attempt failed");
                    last_error = e.to_string();
                }
                Err(e) => {
                    tracing::warn!(%endpoint, error = %e, "connect failed, not retrying");
                    return Err(TransportError::ConnectFailed {
                        endpoint: endpoint.to_string(),
                        attempts: attempt + 1,
                        message: e.to_string(),
                    });
                }
            }
        }

        Err(TransportError::ConnectFailed {
            endpoint: endpoint.to_string(),
            attempts,
            message: last_error,
        })
    }

    /// Close the session. Always succeeds; no-op when not connected.
    pub async fn disconnect(&self) {
        let _session = self.session.lock().await;
        if self.connected.swap(false, Ordering::SeqCst) {
            self.link.close().await;
            tracing::info!(endpoint = %self.endpoint_label(), "disconnected");
        }
    }

    /// Connect if needed and allowed by `auto_connect`.
    pub async fn ensure_connected(&self) -> TransportResult<()> {
        if self.is_connected() {
            return Ok(());
        }
        if !self.config.auto_connect {
            return Err(TransportError::NotConnected {
                endpoint: self.endpoint_label(),
            });
        }
        tracing::debug!(endpoint = %self.endpoint_label(), "auto-connecting");
        self.connect().await
    }

    /// Probe service liveness without touching session state.
    pub async fn health(&self) -> TransportResult<()> {
        let endpoint = self.endpoint()?;
        let probe = tokio::time::timeout(self.config.connect_timeout(), self.link.probe(&endpoint));
        let message = match probe.await {
            Ok(Ok(())) => return Ok(()),
            Ok(Err(e)) => e.to_string(),
            Err(_) => "health probe timed out".to_string(),
        };
        Err(TransportError::ConnectFailed {
            endpoint: endpoint.to_string(),
            attempts: 1,
            message,
        })
    }

    // -----------------------------------------------------------------------
    // Dispatch
    // -----------------------------------------------------------------------

    /// Send one request and decode its reply as `R`.
    ///
    /// `deadline` overrides the configured request timeout for this call and
    /// bounds the whole exchange, including an implicit auto-connect.
    pub async fn dispatch<R: DeserializeOwned>(
        &self,
        request: &WireRequest,
        deadline: Option<Duration>,
    ) -> TransportResult<R> {
        let deadline = deadline.unwrap_or_else(|| self.config.request_timeout());
        let method = request.method();
        let started = Instant::now();

        let exchange = async {
            self.ensure_connected().await?;
            self.call(request).await
        };
        let reply = match tokio::time::timeout(deadline, exchange).await {
            Ok(reply) => reply?,
            Err(_) => {
                let timeout_ms = u64::try_from(deadline.as_millis()).unwrap_or(u64::MAX);
                tracing::warn!(
                    method,
                    timeout_ms,
                    connected = self.is_connected(),
                    "request timed out"
                );
                return Err(TransportError::Timeout { timeout_ms });
            }
        };

        tracing::debug!(
            method,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "request complete"
        );

        serde_json::from_value(reply).map_err(|e| TransportError::BackendRejected {
            message: format!("malformed response: {e}"),
        })
    }

    async fn call(&self, request: &WireRequest) -> TransportResult<Value> {
        let method = request.method();
        match self.link.call(request).await {
            Ok(value) => Ok(value),
            Err(LinkError::Closed | LinkError::Unreachable { .. }) => {
                self.connected.store(false, Ordering::SeqCst);
                tracing::warn!(method, endpoint = %self.endpoint_label(), "session lost");
                Err(TransportError::NotConnected {
                    endpoint: self.endpoint_label(),
                })
            }
            Err(LinkError::Backend { message } | LinkError::Setup { message }) => {
                tracing::warn!(method, %message, "backend error");
                Err(TransportError::BackendRejected { message })
            }
        }
    }
}
