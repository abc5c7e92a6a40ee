//! Belief store with truth-maintenance style support tracking.
//!
//! Every derived belief records one or more support sets (alternative
//! justifications). A belief's confidence is the maximum over its support
//! sets. Premises are either recorded observations (`obs-N`) or other
//! beliefs, so a justification is a walk from a belief down to evidence.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde_json::{Value, json};

use crate::observation::Observation;
use crate::protocol::BeliefRecord;

// ---------------------------------------------------------------------------
// Concepts
// ---------------------------------------------------------------------------

/// Concepts the store can derive beliefs for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Concept {
    HighConfidenceLandmark,
    Hypothesis,
    Recommendation,
}

impl Concept {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "HighConfidenceLandmark" => Some(Self::HighConfidenceLandmark),
            "Hypothesis" => Some(Self::Hypothesis),
            "Recommendation" => Some(Self::Recommendation),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::HighConfidenceLandmark => "HighConfidenceLandmark",
            Self::Hypothesis => "Hypothesis",
            Self::Recommendation => "Recommendation",
        }
    }

    fn id_prefix(self) -> &'static str {
        match self {
            Self::HighConfidenceLandmark => "landmark",
            Self::Hypothesis => "hypothesis",
            Self::Recommendation => "recommendation",
        }
    }
}

// ---------------------------------------------------------------------------
// Support set
// ---------------------------------------------------------------------------

/// Premises that justify a belief through one rule firing.
#[derive(Debug, Clone, PartialEq)]
pub struct SupportSet {
    pub rule_id: &'static str,
    /// Observation ids or belief ids.
    pub premises: Vec<String>,
    pub confidence: f64,
}

impl SupportSet {
    pub fn new(rule_id: &'static str, premises: Vec<String>, confidence: f64) -> Self {
        Self {
            rule_id,
            premises,
            confidence,
        }
    }
}

#[derive(Debug, Clone)]
struct StoredBelief {
    record: BeliefRecord,
    supports: Vec<SupportSet>,
}

#[derive(Debug, Clone)]
struct Evidence {
    variant: &'static str,
    subject: String,
    observed_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct BeliefStore {
    beliefs: HashMap<String, StoredBelief>,
    /// Belief ids in creation order.
    order: Vec<String>,
    evidence: HashMap<String, Evidence>,
    /// SLAM landmark id → belief id of its `HighConfidenceLandmark`.
    landmarks: HashMap<String, String>,
    next_observation: u64,
    next_belief: HashMap<Concept, u64>,
}

impl BeliefStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an accepted observation as evidence and return its id.
    pub fn record_evidence(&mut self, observation: &Observation) -> String {
        self.next_observation += 1;
        let id = format!("obs-{}", self.next_observation);
        self.evidence.insert(
            id.clone(),
            Evidence {
                variant: observation.tag(),
                subject: observation.subject().to_string(),
                observed_at: observation.observed_at(),
            },
        );
        id
    }

    /// Create a new belief of `concept` justified by `support`.
    pub fn derive(&mut self, concept: Concept, content: Value, support: SupportSet) -> String {
        let n = self.next_belief.entry(concept).or_insert(0);
        *n += 1;
        let id = format!("{}-{}", concept.id_prefix(), n);

        let record = BeliefRecord {
            belief_id: id.clone(),
            belief_type: concept.as_str().to_string(),
            content,
            confidence: support.confidence,
            created_at: Utc::now(),
        };
        self.beliefs.insert(
            id.clone(),
            StoredBelief {
                record,
                supports: vec![support],
            },
        );
        self.order.push(id.clone());
        id
    }

    /// Attach an alternative justification to an existing belief.
    ///
    /// Returns `false` if the belief does not exist.
    pub fn add_support(&mut self, belief_id: &str, support: SupportSet) -> bool {
        let Some(belief) = self.beliefs.get_mut(belief_id) else {
            return false;
        };
        belief.supports.push(support);
        belief.record.confidence = belief
            .supports
            .iter()
            .map(|s| s.confidence)
            .fold(0.0_f64, f64::max);
        true
    }

    pub fn landmark_belief(&self, landmark_id: &str) -> Option<&str> {
        self.landmarks.get(landmark_id).map(String::as_str)
    }

    pub fn bind_landmark(&mut self, landmark_id: &str, belief_id: &str) {
        self.landmarks
            .insert(landmark_id.to_string(), belief_id.to_string());
    }

    #[cfg(test)]
    pub fn get(&self, belief_id: &str) -> Option<&BeliefRecord> {
        self.beliefs.get(belief_id).map(|b| &b.record)
    }

    pub fn supports_for(&self, belief_id: &str) -> &[SupportSet] {
        self.beliefs
            .get(belief_id)
            .map(|b| b.supports.as_slice())
            .unwrap_or(&[])
    }

    /// Beliefs of one concept, oldest first.
    pub fn beliefs_of(&self, concept: Concept) -> impl Iterator<Item = &BeliefRecord> + '_ {
        let name = concept.as_str();
        self.order
            .iter()
            .filter_map(|id| self.beliefs.get(id))
            .map(|b| &b.record)
            .filter(move |r| r.belief_type == name)
    }

    /// Build the derivation tree for `belief_id`, expanding at most
    /// `max_depth` levels of beliefs. The root is level 1.
    pub fn justify(&self, belief_id: &str, max_depth: u32) -> Option<Value> {
        let belief = self.beliefs.get(belief_id)?;
        let max_depth = max_depth.max(1);

        let mut rule_path = Vec::new();
        let (supports, depth) = self.expand(belief, 1, max_depth, &mut rule_path);

        let mut premises: Vec<&str> = Vec::new();
        for p in belief.supports.iter().flat_map(|s| &s.premises) {
            if !premises.contains(&p.as_str()) {
                premises.push(p);
            }
        }

        Some(json!({
            "belief_id": belief.record.belief_id,
            "belief_type": belief.record.belief_type,
            "rule_path": rule_path,
            "premises": premises,
            "confidence": belief.record.confidence,
            "depth": depth,
            "supports": supports,
        }))
    }

    /// Expand every support set of `belief`. Rules are appended to
    /// `rule_path` after their premises, so the path reads evidence first.
    fn expand(
        &self,
        belief: &StoredBelief,
        level: u32,
        max_depth: u32,
        rule_path: &mut Vec<&'static str>,
    ) -> (Vec<Value>, u32) {
        let mut deepest = level;
        let mut supports = Vec::with_capacity(belief.supports.len());

        for support in &belief.supports {
            let mut premises = Vec::with_capacity(support.premises.len());
            for premise in &support.premises {
                premises.push(self.premise_node(premise, level, max_depth, rule_path, &mut deepest));
            }
            if !rule_path.contains(&support.rule_id) {
                rule_path.push(support.rule_id);
            }
            supports.push(json!({
                "rule_id": support.rule_id,
                "confidence": support.confidence,
                "premises": premises,
            }));
        }

        (supports, deepest)
    }

    fn premise_node(
        &self,
        premise: &str,
        level: u32,
        max_depth: u32,
        rule_path: &mut Vec<&'static str>,
        deepest: &mut u32,
    ) -> Value {
        if let Some(ev) = self.evidence.get(premise) {
            return json!({
                "observation_id": premise,
                "variant": ev.variant,
                "subject": ev.subject,
                "observed_at": ev.observed_at,
            });
        }

        let Some(child) = self.beliefs.get(premise) else {
            return json!({ "id": premise });
        };

        if level >= max_depth {
            return json!({
                "belief_id": child.record.belief_id,
                "belief_type": child.record.belief_type,
                "confidence": child.record.confidence,
                "truncated": true,
            });
        }

        let (supports, child_depth) = self.expand(child, level + 1, max_depth, rule_path);
        *deepest = (*deepest).max(child_depth);
        json!({
            "belief_id": child.record.belief_id,
            "belief_type": child.record.belief_type,
            "confidence": child.record.confidence,
            "supports": supports,
        })
    }
}
