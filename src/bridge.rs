//! The bridge facade: one handle for domain adapters.
//!
//! A [`Bridge`] is a cheap, cloneable handle onto one [`Transport`]. Request
//! operations never return `Err`: connection problems, timeouts, and backend
//! rejections come back as negative responses with a message. The only
//! hard failure is [`Bridge::submit_tagged`] with input that is not an
//! observation.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::beliefs;
use crate::config::BridgeConfig;
use crate::error::{BridgeResult, ObservationResult, TransportResult};
use crate::justification;
use crate::link::Link;
use crate::link::http::HttpLink;
use crate::link::memory::{MemoryBackend, MemoryLink};
use crate::observation::{AppearanceMatch, GncEvent, LoopClosure, MedicalFinding, Observation};
use crate::protocol::{
    BeliefQuery, BeliefQueryResult, JustificationQuery, JustificationResult, ObservationAck,
};
use crate::submit;
use crate::transport::{ConnectionState, Transport};

pub struct Bridge<L: Link = HttpLink> {
    transport: Arc<Transport<L>>,
}

impl<L: Link> Clone for Bridge<L> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
        }
    }
}

impl<L: Link> fmt::Debug for Bridge<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bridge")
            .field("transport", &self.transport)
            .finish()
    }
}

impl Bridge<HttpLink> {
    /// Bridge to a reasoning service over HTTP.
    pub fn remote(config: BridgeConfig) -> BridgeResult<Self> {
        let link = HttpLink::from_config(&config)?;
        Ok(Self::new(link, config))
    }
}

impl Bridge<MemoryLink> {
    /// Bridge to an in-process backend.
    pub fn in_memory(backend: &MemoryBackend, config: BridgeConfig) -> Self {
        Self::new(backend.link(), config)
    }
}

impl<L: Link> Bridge<L> {
    pub fn new(link: L, config: BridgeConfig) -> Self {
        Self {
            transport: Arc::new(Transport::new(link, config)),
        }
    }

    pub fn transport(&self) -> &Transport<L> {
        &self.transport
    }

    pub fn config(&self) -> &BridgeConfig {
        self.transport.config()
    }

    /// `host:port` this bridge talks to.
    pub fn endpoint(&self) -> String {
        self.transport.endpoint_label()
    }

    // -----------------------------------------------------------------------
    // Connection
    // -----------------------------------------------------------------------

    /// Open the session. `true` when connected afterwards.
    pub async fn connect(&self) -> bool {
        self.try_connect().await.is_ok()
    }

    /// Like [`connect`](Self::connect), keeping the failure.
    pub async fn try_connect(&self) -> TransportResult<()> {
        self.transport.connect().await
    }

    pub async fn disconnect(&self) {
        self.transport.disconnect().await;
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    pub fn state(&self) -> ConnectionState {
        self.transport.state()
    }

    /// Whether the service answers a liveness probe. Does not connect.
    pub async fn health(&self) -> bool {
        match self.transport.health().await {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!(error = %e, "health probe failed");
                false
            }
        }
    }

    // -----------------------------------------------------------------------
    // Observations
    // -----------------------------------------------------------------------

    pub async fn send_loop_closure(&self, observation: LoopClosure) -> ObservationAck {
        self.submit(observation.into()).await
    }

    pub async fn send_appearance_match(&self, observation: AppearanceMatch) -> ObservationAck {
        self.submit(observation.into()).await
    }

    pub async fn send_gnc_event(&self, observation: GncEvent) -> ObservationAck {
        self.submit(observation.into()).await
    }

    pub async fn send_medical_finding(&self, observation: MedicalFinding) -> ObservationAck {
        self.submit(observation.into()).await
    }

    pub async fn submit(&self, observation: Observation) -> ObservationAck {
        submit::submit(&self.transport, observation, None).await
    }

    /// Submit with a deadline overriding the configured request timeout.
    pub async fn submit_within(&self, observation: Observation, deadline: Duration) -> ObservationAck {
        submit::submit(&self.transport, observation, Some(deadline)).await
    }

    /// Submit untyped `(variant_tag, variant_fields)` input.
    ///
    /// Fails before any network activity if the tag is unknown or the
    /// fields do not fit it.
    pub async fn submit_tagged(&self, tag: &str, fields: Value) -> ObservationResult<ObservationAck> {
        submit::submit_tagged(&self.transport, tag, fields, None).await
    }

    pub async fn submit_tagged_within(
        &self,
        tag: &str,
        fields: Value,
        deadline: Duration,
    ) -> ObservationResult<ObservationAck> {
        submit::submit_tagged(&self.transport, tag, fields, Some(deadline)).await
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub async fn query_beliefs(&self, query: BeliefQuery) -> BeliefQueryResult {
        beliefs::query(&self.transport, query, None).await
    }

    pub async fn query_beliefs_within(&self, query: BeliefQuery, deadline: Duration) -> BeliefQueryResult {
        beliefs::query(&self.transport, query, Some(deadline)).await
    }

    /// Query every standard concept with the same `limit`.
    pub async fn query_all_concepts(&self, limit: u32) -> BTreeMap<String, BeliefQueryResult> {
        beliefs::query_all_concepts(&self.transport, limit, None).await
    }

    pub async fn get_justification(&self, query: JustificationQuery) -> JustificationResult {
        justification::resolve(&self.transport, query, None).await
    }

    pub async fn get_justification_within(
        &self,
        query: JustificationQuery,
        deadline: Duration,
    ) -> JustificationResult {
        justification::resolve(&self.transport, query, Some(deadline)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn bridges_are_thread_safe() {
        assert_send_sync::<Bridge>();
        assert_send_sync::<Bridge<MemoryLink>>();
    }

    #[tokio::test]
    async fn clones_share_the_session() {
        let backend = MemoryBackend::new();
        let a = Bridge::in_memory(&backend, BridgeConfig::default());
        let b = a.clone();

        assert!(a.connect().await);
        assert!(b.is_connected());
        b.disconnect().await;
        assert!(!a.is_connected());
        assert_eq!(backend.connect_count(), 1);
    }

    #[test]
    fn remote_bridge_builds_without_network() {
        let bridge = Bridge::remote(BridgeConfig::default().with_endpoint("10.0.0.7", 9000)).unwrap();
        assert_eq!(bridge.endpoint(), "10.0.0.7:9000");
        assert_eq!(bridge.state(), ConnectionState::Disconnected);
    }
}
