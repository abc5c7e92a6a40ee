//! Wire contract between the bridge and the reasoning service.
//!
//! Three request methods, each answered by exactly one response:
//!
//! - `SubmitObservation(variant_tag, variant_fields)` → [`ObservationAck`]
//! - `QueryBeliefs(concept, limit, include_justification)` → [`BeliefQueryResult`]
//! - `GetJustification(belief_id, max_depth)` → [`JustificationResult`]
//!
//! Responses are decoded straight into the public response types, then
//! checked against the invariants the contract promises.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{TransportError, TransportResult};
use crate::observation::Observation;

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Query for derived beliefs of one concept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeliefQuery {
    /// Concept name, e.g. `HighConfidenceLandmark`.
    pub concept: String,
    /// Upper bound on returned beliefs. Must be positive.
    #[serde(default = "default_limit")]
    pub limit: u32,
    /// Advisory: ask the backend to attach justification data.
    #[serde(default)]
    pub include_justification: bool,
}

fn default_limit() -> u32 {
    BeliefQuery::DEFAULT_LIMIT
}

impl BeliefQuery {
    pub const DEFAULT_LIMIT: u32 = 10;

    pub fn new(concept: impl Into<String>) -> Self {
        Self {
            concept: concept.into(),
            limit: Self::DEFAULT_LIMIT,
            include_justification: false,
        }
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_justification(mut self, include: bool) -> Self {
        self.include_justification = include;
        self
    }
}

/// Request for the derivation behind one belief.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JustificationQuery {
    pub belief_id: String,
    /// Upper bound on derivation steps the backend may return. Must be positive.
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,
}

fn default_max_depth() -> u32 {
    JustificationQuery::DEFAULT_MAX_DEPTH
}

impl JustificationQuery {
    pub const DEFAULT_MAX_DEPTH: u32 = 5;

    pub fn new(belief_id: impl Into<String>) -> Self {
        Self {
            belief_id: belief_id.into(),
            max_depth: Self::DEFAULT_MAX_DEPTH,
        }
    }

    pub fn with_max_depth(mut self, max_depth: u32) -> Self {
        self.max_depth = max_depth;
        self
    }
}

/// One request on the wire: `{"method": "...", "params": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", content = "params")]
pub enum WireRequest {
    SubmitObservation(Observation),
    QueryBeliefs(BeliefQuery),
    GetJustification(JustificationQuery),
}

impl WireRequest {
    /// Method name, as used in RPC routes.
    pub fn method(&self) -> &'static str {
        match self {
            Self::SubmitObservation(_) => "SubmitObservation",
            Self::QueryBeliefs(_) => "QueryBeliefs",
            Self::GetJustification(_) => "GetJustification",
        }
    }

    /// The params object alone, without the method envelope.
    pub fn params(&self) -> serde_json::Result<Value> {
        match self {
            Self::SubmitObservation(o) => serde_json::to_value(o),
            Self::QueryBeliefs(q) => serde_json::to_value(q),
            Self::GetJustification(q) => serde_json::to_value(q),
        }
    }

    /// Rebuild a request from a method name and its params.
    pub fn from_parts(method: &str, params: Value) -> serde_json::Result<Self> {
        serde_json::from_value(serde_json::json!({ "method": method, "params": params }))
    }
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

/// Acknowledgment of a submitted observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationAck {
    pub accepted: bool,
    #[serde(default)]
    pub message: String,
    /// Present iff `accepted`.
    #[serde(default)]
    pub observation_id: Option<String>,
    /// Rules the backend fired for this observation, in firing order.
    #[serde(default)]
    pub triggered_rule_ids: Vec<String>,
}

impl ObservationAck {
    /// A negative acknowledgment carrying `message`.
    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            accepted: false,
            message: message.into(),
            observation_id: None,
            triggered_rule_ids: Vec::new(),
        }
    }

    /// Enforce the id-iff-accepted invariant on a decoded reply.
    pub fn validated(mut self) -> TransportResult<Self> {
        if self.accepted {
            match self.observation_id.as_deref() {
                Some(id) if !id.is_empty() => Ok(self),
                _ => Err(TransportError::BackendRejected {
                    message: "accepted observation without an observation_id".into(),
                }),
            }
        } else {
            self.observation_id = None;
            self.triggered_rule_ids.clear();
            Ok(self)
        }
    }
}

/// One derived belief held by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeliefRecord {
    pub belief_id: String,
    pub belief_type: String,
    /// Opaque structured payload.
    #[serde(default)]
    pub content: Value,
    pub confidence: f64,
    pub created_at: DateTime<Utc>,
}

/// Beliefs matching a [`BeliefQuery`], in backend order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeliefQueryResult {
    #[serde(default)]
    pub beliefs: Vec<BeliefRecord>,
    pub accepted: bool,
    #[serde(default)]
    pub message: String,
}

impl BeliefQueryResult {
    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            beliefs: Vec::new(),
            accepted: false,
            message: message.into(),
        }
    }
}

/// Derivation explaining why a belief holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JustificationResult {
    /// Opaque payload: rule path, premises, confidence, depth.
    #[serde(default)]
    pub derivation: Value,
    pub accepted: bool,
    #[serde(default)]
    pub message: String,
}

impl JustificationResult {
    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            derivation: Value::Object(Default::default()),
            accepted: false,
            message: message.into(),
        }
    }

    /// Depth the derivation declares for itself, if any.
    pub fn declared_depth(&self) -> Option<u64> {
        self.derivation.get("depth").and_then(Value::as_u64)
    }
}
