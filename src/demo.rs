//! Canonical per-domain sequences used by the CLI.
//!
//! Each sequence submits a few observations and queries what the backend
//! derived from them. Every step is recorded; a failed step is logged with
//! the backend's message and the sequence moves on.

use std::fmt;

use clap::ValueEnum;
use serde::Serialize;

use crate::bridge::Bridge;
use crate::link::Link;
use crate::observation::{
    AppearanceMatch, Consistency, GncEvent, GncMode, LoopClosure, LoopClosureMethod,
    MedicalFinding, Modality,
};
use crate::protocol::{BeliefQuery, BeliefQueryResult, JustificationQuery, ObservationAck};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    Slam,
    Gnc,
    Medical,
    All,
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Slam => write!(f, "slam"),
            Self::Gnc => write!(f, "gnc"),
            Self::Medical => write!(f, "medical"),
            Self::All => write!(f, "all"),
        }
    }
}

/// One recorded step.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepOutcome {
    pub domain: Domain,
    pub step: String,
    pub success: bool,
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DemoSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub steps: Vec<StepOutcome>,
}

impl DemoSummary {
    /// Percentage of steps that succeeded; 0 when nothing ran.
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.succeeded as f64 * 100.0 / self.total as f64
        }
    }

    pub fn is_full_success(&self) -> bool {
        self.total > 0 && self.failed == 0
    }
}

impl fmt::Display for DemoSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} steps succeeded ({:.1}%)",
            self.succeeded,
            self.total,
            self.success_rate()
        )
    }
}

const QUERY_LIMIT: u32 = 5;

pub struct DemoRunner<L: Link> {
    bridge: Bridge<L>,
    steps: Vec<StepOutcome>,
}

impl<L: Link> DemoRunner<L> {
    pub fn new(bridge: Bridge<L>) -> Self {
        Self {
            bridge,
            steps: Vec::new(),
        }
    }

    /// Run one domain (or all of them) and summarize every step so far.
    pub async fn run(&mut self, domain: Domain) -> DemoSummary {
        match domain {
            Domain::Slam => self.run_slam().await,
            Domain::Gnc => self.run_gnc().await,
            Domain::Medical => self.run_medical().await,
            Domain::All => {
                self.run_slam().await;
                self.run_gnc().await;
                self.run_medical().await;
            }
        }
        self.summary()
    }

    pub fn summary(&self) -> DemoSummary {
        let succeeded = self.steps.iter().filter(|s| s.success).count();
        DemoSummary {
            total: self.steps.len(),
            succeeded,
            failed: self.steps.len() - succeeded,
            steps: self.steps.clone(),
        }
    }

    /// Loop closure → appearance match → landmarks → justification.
    pub async fn run_slam(&mut self) {
        tracing::info!("SLAM: loop closure to high-confidence landmark");

        let ack = self
            .bridge
            .send_loop_closure(LoopClosure::new(
                "L001",
                0.85,
                LoopClosureMethod::Visual,
                [10.5, 3.2, 0.0, 0.0, 0.0, 0.0, 1.0],
            ))
            .await;
        self.record_ack(Domain::Slam, "loop closure L001", &ack);

        let ack = self
            .bridge
            .send_appearance_match(AppearanceMatch::new("L001", Consistency::Consistent, 0.78))
            .await;
        self.record_ack(Domain::Slam, "appearance match L001", &ack);

        let landmarks = self
            .bridge
            .query_beliefs(BeliefQuery::new("HighConfidenceLandmark").with_limit(QUERY_LIMIT))
            .await;
        self.record_query(Domain::Slam, "query HighConfidenceLandmark", &landmarks);

        self.justify_first(Domain::Slam, &landmarks).await;
    }

    /// Two thruster anomalies → hypotheses and recommendations.
    pub async fn run_gnc(&mut self) {
        tracing::info!("GNC: thruster anomaly to hypothesis");

        let moderate = GncEvent::new("thruster_anomaly", GncMode::Burn, 0.65)
            .with_parameter("thrust_deviation", 0.15)
            .with_parameter("temperature_spike", 25.0)
            .with_parameter("vibration_amplitude", 2.3);
        let ack = self.bridge.send_gnc_event(moderate).await;
        self.record_ack(Domain::Gnc, "thruster anomaly (0.65)", &ack);

        let severe = GncEvent::new("thruster_anomaly", GncMode::Burn, 0.85)
            .with_parameter("thrust_deviation", 0.45)
            .with_parameter("temperature_spike", 75.0)
            .with_parameter("vibration_amplitude", 8.1);
        let ack = self.bridge.send_gnc_event(severe).await;
        self.record_ack(Domain::Gnc, "thruster anomaly (0.85)", &ack);

        for concept in ["Hypothesis", "Recommendation"] {
            let result = self
                .bridge
                .query_beliefs(BeliefQuery::new(concept).with_limit(QUERY_LIMIT))
                .await;
            self.record_query(Domain::Gnc, &format!("query {concept}"), &result);
        }
    }

    /// Two imaging findings → recommendations → justification.
    pub async fn run_medical(&mut self) {
        tracing::info!("Medical: finding to recommendation");

        let ack = self
            .bridge
            .send_medical_finding(MedicalFinding::new(
                "P001",
                "lesion",
                0.89,
                "liver_segment_4",
                12.5,
                Modality::Ct,
            ))
            .await;
        self.record_ack(Domain::Medical, "lesion P001", &ack);

        let ack = self
            .bridge
            .send_medical_finding(MedicalFinding::new(
                "P002",
                "calcification",
                0.76,
                "lung_upper_lobe",
                3.2,
                Modality::Ct,
            ))
            .await;
        self.record_ack(Domain::Medical, "calcification P002", &ack);

        let recommendations = self
            .bridge
            .query_beliefs(BeliefQuery::new("Recommendation").with_limit(QUERY_LIMIT))
            .await;
        self.record_query(Domain::Medical, "query Recommendation", &recommendations);

        self.justify_first(Domain::Medical, &recommendations).await;
    }

    async fn justify_first(&mut self, domain: Domain, result: &BeliefQueryResult) {
        let Some(belief) = result.beliefs.first() else {
            self.record(domain, "justification", false, "no belief to justify".into());
            return;
        };

        let justification = self
            .bridge
            .get_justification(JustificationQuery::new(belief.belief_id.clone()))
            .await;
        let step = format!("justification {}", belief.belief_id);
        if justification.accepted {
            let rule_path = justification
                .derivation
                .get("rule_path")
                .map(|p| p.to_string())
                .unwrap_or_default();
            let detail = format!(
                "depth {}, rule path {rule_path}",
                justification.declared_depth().unwrap_or(0)
            );
            self.record(domain, &step, true, detail);
        } else {
            self.record(domain, &step, false, justification.message);
        }
    }

    fn record_ack(&mut self, domain: Domain, step: &str, ack: &ObservationAck) {
        let detail = if ack.accepted {
            format!(
                "{} triggered [{}]",
                ack.observation_id.as_deref().unwrap_or_default(),
                ack.triggered_rule_ids.join(", ")
            )
        } else {
            ack.message.clone()
        };
        self.record(domain, step, ack.accepted, detail);
    }

    fn record_query(&mut self, domain: Domain, step: &str, result: &BeliefQueryResult) {
        let detail = if result.accepted {
            let ids: Vec<&str> = result.beliefs.iter().map(|b| b.belief_id.as_str()).collect();
            format!("{} belief(s) [{}]", ids.len(), ids.join(", "))
        } else {
            result.message.clone()
        };
        self.record(domain, step, result.accepted, detail);
    }

    fn record(&mut self, domain: Domain, step: &str, success: bool, detail: String) {
        if success {
            tracing::info!(%domain, step, %detail, "step succeeded");
        } else {
            tracing::warn!(%domain, step, %detail, "step failed");
        }
        self.steps.push(StepOutcome {
            domain,
            step: step.to_string(),
            success,
            detail,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BridgeConfig;
    use crate::link::memory::MemoryBackend;

    fn runner(backend: &MemoryBackend) -> DemoRunner<crate::link::memory::MemoryLink> {
        DemoRunner::new(Bridge::in_memory(backend, BridgeConfig::default()))
    }

    #[tokio::test]
    async fn full_run_against_memory_backend() {
        let backend = MemoryBackend::new();
        let summary = runner(&backend).run(Domain::All).await;
        assert!(summary.is_full_success(), "{:#?}", summary.steps);
        assert_eq!(summary.total, 12);
        assert_eq!(summary.success_rate(), 100.0);
    }

    #[tokio::test]
    async fn slam_justifies_the_landmark() {
        let backend = MemoryBackend::new();
        let summary = runner(&backend).run(Domain::Slam).await;
        let last = summary.steps.last().unwrap();
        assert_eq!(last.step, "justification landmark-1");
        assert!(last.success);
    }

    #[tokio::test]
    async fn failures_are_recorded_and_run_continues() {
        let backend = MemoryBackend::new();
        backend.set_unreachable(true);
        let config = BridgeConfig {
            retry: crate::config::RetryPolicy::no_retry(),
            ..BridgeConfig::default()
        };
        let mut runner = DemoRunner::new(Bridge::in_memory(&backend, config));

        let summary = runner.run(Domain::Gnc).await;
        assert_eq!(summary.total, 4);
        assert_eq!(summary.failed, 4);
        assert!(!summary.is_full_success());
        assert!(summary.steps[0].detail.starts_with("not connected"));
    }

    #[test]
    fn empty_summary() {
        let summary = DemoSummary {
            total: 0,
            succeeded: 0,
            failed: 0,
            steps: Vec::new(),
        };
        assert_eq!(summary.success_rate(), 0.0);
        assert!(!summary.is_full_success());
        assert_eq!(summary.to_string(), "0/0 steps succeeded (0.0%)");
    }
}
