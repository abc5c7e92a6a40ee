//! In-process reasoning backend honoring the wire contract.
//!
//! [`MemoryBackend`] validates observations, runs them through a small rule
//! table, and answers belief and justification queries from its store. It
//! serves as the substrate for tests and the demo, and can sit behind an
//! HTTP router since [`MemoryBackend::handle`] maps a request to raw JSON.
//!
//! Fault injection knobs let tests exercise the transport: latency, failed
//! connects, an unreachable service, malformed replies, and a backend that
//! ignores the requested limit.

mod rules;
mod store;

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use serde_json::{Value, json};

use super::{Link, LinkError, LinkResult};
use crate::config::Endpoint;
use crate::observation::Observation;
use crate::protocol::{
    BeliefQuery, BeliefQueryResult, JustificationQuery, JustificationResult, ObservationAck,
    WireRequest,
};

use store::{BeliefStore, Concept};

#[derive(Default)]
struct Inner {
    store: Mutex<BeliefStore>,
    latency_ms: AtomicU64,
    failing_connects: AtomicU32,
    unreachable: AtomicBool,
    malformed: AtomicBool,
    ignore_limit: AtomicBool,
    connects: AtomicU64,
    calls: AtomicU64,
}

/// Shared handle to one in-memory backend. Clones see the same state.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for MemoryBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBackend")
            .field("connects", &self.connect_count())
            .field("calls", &self.call_count())
            .finish_non_exhaustive()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every connect and call by `latency`.
    pub fn with_latency(self, latency: Duration) -> Self {
        self.set_latency(latency);
        self
    }

    pub fn set_latency(&self, latency: Duration) {
        let ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
        self.inner.latency_ms.store(ms, Ordering::SeqCst);
    }

    /// Make the next `n` connect attempts fail with a transient error.
    pub fn fail_next_connects(&self, n: u32) {
        self.inner.failing_connects.store(n, Ordering::SeqCst);
    }

    /// While set, every connect fails and open sessions lose their calls.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.inner.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// While set, replies do not match any response shape.
    pub fn set_malformed(&self, malformed: bool) {
        self.inner.malformed.store(malformed, Ordering::SeqCst);
    }

    /// While set, belief queries return every match regardless of `limit`.
    pub fn set_ignore_limit(&self, ignore: bool) {
        self.inner.ignore_limit.store(ignore, Ordering::SeqCst);
    }

    /// Connect attempts seen so far, failed ones included.
    pub fn connect_count(&self) -> u64 {
        self.inner.connects.load(Ordering::SeqCst)
    }

    /// Calls seen so far, including ones that never reached the store.
    pub fn call_count(&self) -> u64 {
        self.inner.calls.load(Ordering::SeqCst)
    }

    /// A fresh link into this backend.
    pub fn link(&self) -> MemoryLink {
        MemoryLink {
            backend: self.clone(),
            open: AtomicBool::new(false),
        }
    }

    /// Answer one request with the raw JSON reply.
    pub fn handle(&self, request: &WireRequest) -> Value {
        if self.inner.malformed.load(Ordering::SeqCst) {
            return json!({ "status": "garbled" });
        }

        match request {
            WireRequest::SubmitObservation(obs) => reply(self.submit(obs)),
            WireRequest::QueryBeliefs(q) => reply(self.query(q)),
            WireRequest::GetJustification(q) => reply(self.justify(q)),
        }
    }

    fn store(&self) -> MutexGuard<'_, BeliefStore> {
        self.inner
            .store
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn submit(&self, observation: &Observation) -> ObservationAck {
        if let Err(message) = rules::validate(observation) {
            tracing::debug!(variant = observation.tag(), %message, "observation rejected");
            return ObservationAck::rejected(message);
        }

        let mut store = self.store();
        let obs_id = store.record_evidence(observation);
        let fired = rules::apply(&mut store, &obs_id, observation);
        tracing::debug!(
            variant = observation.tag(),
            observation_id = %obs_id,
            rules = ?fired,
            "observation recorded"
        );

        ObservationAck {
            accepted: true,
            message: format!("{} processed, {} rule(s) fired", observation.tag(), fired.len()),
            observation_id: Some(obs_id),
            triggered_rule_ids: fired.into_iter().map(String::from).collect(),
        }
    }

    fn query(&self, query: &BeliefQuery) -> BeliefQueryResult {
        let Some(concept) = Concept::parse(&query.concept) else {
            return BeliefQueryResult::rejected(format!("unknown concept: {}", query.concept));
        };
        if query.limit == 0 {
            return BeliefQueryResult::rejected("limit must be positive");
        }

        let store = self.store();
        let ignore_limit = self.inner.ignore_limit.load(Ordering::SeqCst);
        let limit = if ignore_limit {
            usize::MAX
        } else {
            query.limit as usize
        };

        let beliefs = store
            .beliefs_of(concept)
            .take(limit)
            .map(|record| {
                let mut record = record.clone();
                if query.include_justification {
                    let rules: Vec<&str> = store
                        .supports_for(&record.belief_id)
                        .iter()
                        .map(|s| s.rule_id)
                        .collect();
                    if let Value::Object(map) = &mut record.content {
                        map.insert("supported_by".into(), json!(rules));
                    }
                }
                record
            })
            .collect::<Vec<_>>();

        BeliefQueryResult {
            message: format!("{} belief(s) found", beliefs.len()),
            beliefs,
            accepted: true,
        }
    }

    fn justify(&self, query: &JustificationQuery) -> JustificationResult {
        if query.max_depth == 0 {
            return JustificationResult::rejected("max_depth must be positive");
        }
        match self.store().justify(&query.belief_id, query.max_depth) {
            Some(derivation) => JustificationResult {
                derivation,
                accepted: true,
                message: String::new(),
            },
            None => JustificationResult::rejected(format!("unknown belief: {}", query.belief_id)),
        }
    }

    async fn pause(&self) {
        let ms = self.inner.latency_ms.load(Ordering::SeqCst);
        if ms > 0 {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
    }

    fn reachable(&self) -> LinkResult<()> {
        if self.inner.unreachable.load(Ordering::SeqCst) {
            return Err(LinkError::Unreachable {
                message: "in-memory backend is offline".into(),
            });
        }
        Ok(())
    }
}

fn reply<T: Serialize>(response: T) -> Value {
    serde_json::to_value(response)
        .unwrap_or_else(|e| json!({ "accepted": false, "message": e.to_string() }))
}

// ---------------------------------------------------------------------------
// Link adapter
// ---------------------------------------------------------------------------

/// [`Link`] into a [`MemoryBackend`]. Each link has its own session flag.
#[derive(Debug)]
pub struct MemoryLink {
    backend: MemoryBackend,
    open: AtomicBool,
}

impl MemoryLink {
    pub fn backend(&self) -> &MemoryBackend {
        &self.backend
    }
}

impl Link for MemoryLink {
    async fn open(&self, endpoint: &Endpoint) -> LinkResult<()> {
        self.backend.inner.connects.fetch_add(1, Ordering::SeqCst);
        self.backend.pause().await;
        self.backend.reachable()?;

        let injected = self
            .backend
            .inner
            .failing_connects
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(LinkError::Unreachable {
                message: format!("connection to {endpoint} refused"),
            });
        }

        self.open.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn call(&self, request: &WireRequest) -> LinkResult<Value> {
        self.backend.inner.calls.fetch_add(1, Ordering::SeqCst);
        if !self.open.load(Ordering::SeqCst) {
            return Err(LinkError::Closed);
        }

        self.backend.pause().await;
        if let Err(e) = self.backend.reachable() {
            self.open.store(false, Ordering::SeqCst);
            return Err(e);
        }
        Ok(self.backend.handle(request))
    }

    async fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
    }

    async fn probe(&self, _endpoint: &Endpoint) -> LinkResult<()> {
        self.backend.reachable()
    }
}
