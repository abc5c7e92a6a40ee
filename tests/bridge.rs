//! End-to-end tests for the bridge facade against the in-memory backend.
//!
//! These exercise the full path from a typed observation through the
//! transport and link into the rule table, and back out through belief and
//! justification queries.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use serde_json::json;

use csri_bridge::bridge::Bridge;
use csri_bridge::config::{BridgeConfig, RetryPolicy};
use csri_bridge::error::ObservationError;
use csri_bridge::link::memory::{MemoryBackend, MemoryLink};
use csri_bridge::observation::{
    AppearanceMatch, Consistency, GncEvent, GncMode, LoopClosure, LoopClosureMethod,
    MedicalFinding, Modality, Observation,
};
use csri_bridge::perception::{BoundingBox, DetectionResult};
use csri_bridge::protocol::{BeliefQuery, JustificationQuery};
use csri_bridge::transport::ConnectionState;

const POSE: [f64; 7] = [10.5, 3.2, 0.0, 0.0, 0.0, 0.0, 1.0];

fn test_config() -> BridgeConfig {
    BridgeConfig {
        retry: RetryPolicy {
            base_delay_ms: 1,
            max_delay_ms: 5,
            ..RetryPolicy::default()
        },
        ..BridgeConfig::default()
    }
}

fn test_bridge() -> (MemoryBackend, Bridge<MemoryLink>) {
    let backend = MemoryBackend::new();
    let bridge = Bridge::in_memory(&backend, test_config());
    (backend, bridge)
}

fn one_of_each() -> [Observation; 4] {
    [
        LoopClosure::new("L001", 0.85, LoopClosureMethod::Visual, POSE).into(),
        AppearanceMatch::new("L001", Consistency::Consistent, 0.78).into(),
        GncEvent::new("thruster_anomaly", GncMode::Burn, 0.65).into(),
        MedicalFinding::new("P001", "lesion", 0.89, "liver_segment_4", 12.5, Modality::Ct).into(),
    ]
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn slam_loop_closure_to_landmark_and_back() {
    let (_backend, bridge) = test_bridge();

    let ack = bridge
        .send_loop_closure(LoopClosure::new("L001", 0.85, LoopClosureMethod::Visual, POSE))
        .await;
    assert!(ack.accepted, "{}", ack.message);
    assert!(!ack.observation_id.as_deref().unwrap_or_default().is_empty());
    assert!(!ack.triggered_rule_ids.is_empty());

    let landmarks = bridge
        .query_beliefs(BeliefQuery::new("HighConfidenceLandmark").with_limit(5))
        .await;
    assert!(landmarks.accepted);
    assert!(!landmarks.beliefs.is_empty());
    assert!(
        landmarks
            .beliefs
            .iter()
            .all(|b| b.belief_type == "HighConfidenceLandmark")
    );

    let justification = bridge
        .get_justification(JustificationQuery::new("landmark-1").with_max_depth(5))
        .await;
    assert!(justification.accepted, "{}", justification.message);
    assert_eq!(justification.derivation["belief_id"], "landmark-1");
    assert!(justification.declared_depth().unwrap() <= 5);
}

#[tokio::test]
async fn gnc_severe_burn_anomaly_recommends() {
    let (_backend, bridge) = test_bridge();

    let ack = bridge
        .send_gnc_event(
            GncEvent::new("thruster_anomaly", GncMode::Burn, 0.85)
                .with_parameter("thrust_deviation", 0.45)
                .with_parameter("temperature_spike", 75.0),
        )
        .await;
    assert_eq!(ack.triggered_rule_ids, ["gnc-rule-1", "gnc-rule-2"]);

    let recs = bridge.query_beliefs(BeliefQuery::new("Recommendation")).await;
    assert_eq!(recs.beliefs.len(), 1);
    assert_eq!(recs.beliefs[0].content["action"], "abort_burn");

    let justification = bridge
        .get_justification(JustificationQuery::new(recs.beliefs[0].belief_id.clone()))
        .await;
    assert_eq!(justification.derivation["rule_path"], json!(["gnc-rule-1", "gnc-rule-2"]));
    assert_eq!(justification.declared_depth(), Some(2));
}

#[tokio::test]
async fn justification_depth_is_bounded() {
    let (_backend, bridge) = test_bridge();
    bridge
        .send_medical_finding(MedicalFinding::new(
            "P001",
            "lesion",
            0.89,
            "liver_segment_4",
            12.5,
            Modality::Ct,
        ))
        .await;

    let shallow = bridge
        .get_justification(JustificationQuery::new("recommendation-1").with_max_depth(1))
        .await;
    assert!(shallow.accepted);
    assert_eq!(shallow.declared_depth(), Some(1));
}

#[tokio::test]
async fn all_concepts_after_mixed_traffic() {
    let (_backend, bridge) = test_bridge();
    for obs in one_of_each() {
        assert!(bridge.submit(obs).await.accepted);
    }

    let all = bridge.query_all_concepts(10).await;
    assert_eq!(all["HighConfidenceLandmark"].beliefs.len(), 1);
    assert_eq!(all["Hypothesis"].beliefs.len(), 2);
    assert_eq!(all["Recommendation"].beliefs.len(), 1);
}

#[tokio::test]
async fn detection_becomes_appearance_match() {
    let (_backend, bridge) = test_bridge();
    let detection = DetectionResult::new("rock", 0.4, BoundingBox::new(10, 20, 30, 30), 42);

    let ack = bridge.send_appearance_match(detection.to_observation(0.5)).await;
    assert!(ack.accepted);
    assert_eq!(ack.triggered_rule_ids, ["slam-rule-3"]);

    let hyps = bridge.query_beliefs(BeliefQuery::new("Hypothesis")).await;
    assert_eq!(hyps.beliefs[0].content["landmark_id"], detection.object_id());
}

// ---------------------------------------------------------------------------
// Connection discipline
// ---------------------------------------------------------------------------

#[tokio::test]
async fn every_variant_connects_implicitly_once() {
    for obs in one_of_each() {
        let (backend, bridge) = test_bridge();
        let tag = obs.tag();
        assert!(!bridge.is_connected());

        let ack = bridge.submit(obs).await;
        assert!(ack.accepted, "{tag}: {}", ack.message);
        assert!(bridge.is_connected());
        assert_eq!(backend.connect_count(), 1, "{tag}");
        assert_eq!(backend.call_count(), 1, "{tag}");
    }
}

#[tokio::test]
async fn connect_twice_is_a_no_op() {
    let (backend, bridge) = test_bridge();
    assert!(bridge.connect().await);
    assert!(bridge.connect().await);
    assert_eq!(backend.connect_count(), 1);
}

#[tokio::test]
async fn connect_retries_transient_failures() {
    let (backend, bridge) = test_bridge();
    backend.fail_next_connects(2);
    assert!(bridge.connect().await);
    assert_eq!(backend.connect_count(), 3);
}

#[tokio::test]
async fn failed_connect_leaves_bridge_reusable() {
    let (backend, bridge) = test_bridge();
    backend.set_unreachable(true);
    assert!(!bridge.connect().await);
    assert!(!bridge.is_connected());

    let ack = bridge
        .send_gnc_event(GncEvent::new("drift", GncMode::Coast, 0.2))
        .await;
    assert!(!ack.accepted);
    assert!(ack.message.starts_with("not connected"), "{}", ack.message);

    backend.set_unreachable(false);
    assert!(bridge.connect().await);
    assert!(
        bridge
            .send_gnc_event(GncEvent::new("drift", GncMode::Coast, 0.2))
            .await
            .accepted
    );
}

#[tokio::test]
async fn auto_connect_disabled_reports_not_connected() {
    let backend = MemoryBackend::new();
    let config = BridgeConfig {
        auto_connect: false,
        ..test_config()
    };
    let bridge = Bridge::in_memory(&backend, config);

    let ack = bridge
        .send_gnc_event(GncEvent::new("drift", GncMode::Coast, 0.2))
        .await;
    assert!(!ack.accepted);
    assert_eq!(ack.message, "not connected to localhost:50051");
    assert_eq!(backend.connect_count(), 0);
    assert_eq!(backend.call_count(), 0);

    assert!(bridge.connect().await);
    assert!(
        bridge
            .send_gnc_event(GncEvent::new("drift", GncMode::Coast, 0.2))
            .await
            .accepted
    );
}

#[tokio::test]
async fn invalid_endpoint_fails_without_network() {
    let backend = MemoryBackend::new();
    let bridge = Bridge::in_memory(&backend, test_config().with_endpoint("http://host", 1));

    let ack = bridge
        .send_gnc_event(GncEvent::new("drift", GncMode::Coast, 0.2))
        .await;
    assert!(!ack.accepted);
    assert!(ack.message.contains("invalid endpoint"), "{}", ack.message);
    assert_eq!(backend.connect_count(), 0);
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

#[tokio::test]
async fn query_never_exceeds_limit() {
    let (backend, bridge) = test_bridge();
    backend.set_ignore_limit(true);
    for i in 0..8 {
        bridge
            .send_gnc_event(GncEvent::new(format!("event_{i}"), GncMode::Coast, 0.6))
            .await;
    }

    for n in 1..=10u32 {
        let result = bridge
            .query_beliefs(BeliefQuery::new("Hypothesis").with_limit(n))
            .await;
        assert!(result.accepted);
        assert_eq!(result.beliefs.len(), n.min(8) as usize);
        assert_eq!(result.beliefs[0].belief_id, "hypothesis-1");
    }
}

#[tokio::test]
async fn rejected_observation_keeps_backend_message() {
    let (_backend, bridge) = test_bridge();
    let ack = bridge
        .send_medical_finding(MedicalFinding::new(
            "P001",
            "lesion",
            0.9,
            "liver",
            -4.0,
            Modality::Mri,
        ))
        .await;
    assert!(!ack.accepted);
    assert!(ack.observation_id.is_none());
    assert!(ack.triggered_rule_ids.is_empty());
    assert!(ack.message.contains("size_mm"), "{}", ack.message);
}

#[tokio::test]
async fn malformed_replies_are_rejections() {
    let (backend, bridge) = test_bridge();
    backend.set_malformed(true);

    let ack = bridge
        .send_gnc_event(GncEvent::new("drift", GncMode::Coast, 0.2))
        .await;
    assert!(!ack.accepted);
    assert!(ack.message.contains("malformed response"), "{}", ack.message);

    let beliefs = bridge.query_beliefs(BeliefQuery::new("Hypothesis")).await;
    assert!(!beliefs.accepted);
    assert!(beliefs.beliefs.is_empty());

    let justification = bridge
        .get_justification(JustificationQuery::new("hypothesis-1"))
        .await;
    assert!(!justification.accepted);
}

#[tokio::test]
async fn concurrent_submissions_are_correlated() {
    let (backend, bridge) = test_bridge();
    let k = 32;

    let handles: Vec<_> = (0..k)
        .map(|i| {
            let bridge = bridge.clone();
            tokio::spawn(async move {
                let ack = bridge
                    .send_gnc_event(GncEvent::new(format!("event_{i}"), GncMode::Burn, 0.9))
                    .await;
                (i, ack)
            })
        })
        .collect();

    let mut acks = HashMap::new();
    for handle in handles {
        let (i, ack) = handle.await.unwrap();
        assert!(ack.accepted, "submission {i}: {}", ack.message);
        assert_eq!(ack.triggered_rule_ids, ["gnc-rule-1", "gnc-rule-2"], "submission {i}");
        let previous = acks.insert(ack.observation_id.clone().unwrap(), format!("event_{i}"));
        assert!(previous.is_none(), "duplicate observation id for submission {i}");
    }
    assert_eq!(acks.len(), k);
    assert_eq!(backend.connect_count(), 1);

    // Every hypothesis traces back to the observation its own ack named.
    let hyps = bridge
        .query_beliefs(BeliefQuery::new("Hypothesis").with_limit(k as u32))
        .await;
    assert_eq!(hyps.beliefs.len(), k);

    let mut traced = HashSet::new();
    for belief in &hyps.beliefs {
        let justification = bridge
            .get_justification(JustificationQuery::new(belief.belief_id.clone()))
            .await;
        assert!(justification.accepted, "{}", justification.message);

        let evidence = &justification.derivation["supports"][0]["premises"][0];
        let obs_id = evidence["observation_id"].as_str().unwrap();
        let subject = evidence["subject"].as_str().unwrap();
        assert_eq!(acks[obs_id], subject, "{obs_id} traced to the wrong event");
        assert_eq!(belief.content["event_type"], subject);
        assert!(traced.insert(obs_id.to_string()));
    }
    assert_eq!(traced.len(), k);
}

// ---------------------------------------------------------------------------
// Deadlines
// ---------------------------------------------------------------------------

#[tokio::test]
async fn timed_out_submission_has_no_effect() {
    let (backend, bridge) = test_bridge();
    assert!(bridge.connect().await);
    backend.set_latency(Duration::from_millis(150));

    let ack = bridge
        .submit_within(
            GncEvent::new("thruster_anomaly", GncMode::Burn, 0.9).into(),
            Duration::from_millis(20),
        )
        .await;
    assert!(!ack.accepted);
    assert_eq!(ack.message, "request timed out after 20 ms");

    // Give the abandoned call time to have landed if it were still running.
    backend.set_latency(Duration::ZERO);
    tokio::time::sleep(Duration::from_millis(200)).await;

    let hyps = bridge.query_beliefs(BeliefQuery::new("Hypothesis")).await;
    assert!(hyps.accepted);
    assert!(hyps.beliefs.is_empty());
    assert!(bridge.is_connected());
}

#[tokio::test]
async fn deadline_bounds_implicit_connect() {
    let backend = MemoryBackend::new().with_latency(Duration::from_millis(400));
    let bridge = Bridge::in_memory(&backend, test_config());

    let started = Instant::now();
    let ack = bridge
        .submit_within(
            GncEvent::new("thruster_anomaly", GncMode::Burn, 0.9).into(),
            Duration::from_millis(20),
        )
        .await;
    assert!(started.elapsed() < Duration::from_millis(200), "{:?}", started.elapsed());
    assert!(!ack.accepted);
    assert_eq!(ack.message, "request timed out after 20 ms");
    assert_eq!(bridge.state(), ConnectionState::Disconnected);
    assert_eq!(backend.call_count(), 0);

    // Without the slow connect the next request goes through.
    backend.set_latency(Duration::ZERO);
    let ack = bridge
        .send_gnc_event(GncEvent::new("thruster_anomaly", GncMode::Burn, 0.9))
        .await;
    assert!(ack.accepted, "{}", ack.message);
}

#[tokio::test]
async fn tagged_submission_honors_deadline() {
    let (backend, bridge) = test_bridge();
    assert!(bridge.connect().await);
    backend.set_latency(Duration::from_millis(150));

    let ack = bridge
        .submit_tagged_within(
            "gnc_event",
            json!({ "event_type": "drift", "mode": "coast", "severity": 0.6 }),
            Duration::from_millis(20),
        )
        .await
        .unwrap();
    assert!(!ack.accepted);
    assert_eq!(ack.message, "request timed out after 20 ms");
}

#[tokio::test]
async fn per_call_deadline_overrides_config() {
    let backend = MemoryBackend::new();
    let config = BridgeConfig {
        request_timeout_ms: 10,
        ..test_config()
    };
    let bridge = Bridge::in_memory(&backend, config);
    assert!(bridge.connect().await);
    backend.set_latency(Duration::from_millis(40));

    let quick = bridge.query_beliefs(BeliefQuery::new("Hypothesis")).await;
    assert_eq!(quick.message, "request timed out after 10 ms");

    let patient = bridge
        .query_beliefs_within(BeliefQuery::new("Hypothesis"), Duration::from_secs(2))
        .await;
    assert!(patient.accepted, "{}", patient.message);
}

// ---------------------------------------------------------------------------
// Untyped input
// ---------------------------------------------------------------------------

#[tokio::test]
async fn tagged_unknown_variant_is_a_hard_error() {
    let (backend, bridge) = test_bridge();

    let err = bridge
        .submit_tagged("thermal_anomaly", json!({ "temperature": 400.0 }))
        .await
        .unwrap_err();
    assert!(matches!(err, ObservationError::Unsupported { ref tag } if tag == "thermal_anomaly"));

    let err = bridge
        .submit_tagged("loop_closure", json!({ "landmark_id": "L001" }))
        .await
        .unwrap_err();
    assert!(matches!(err, ObservationError::MalformedFields { .. }));

    assert_eq!(backend.connect_count(), 0);
    assert_eq!(backend.call_count(), 0);
}

#[tokio::test]
async fn tagged_known_variant_is_submitted() {
    let (_backend, bridge) = test_bridge();
    let ack = bridge
        .submit_tagged(
            "medical_finding",
            json!({
                "patient_id": "P002",
                "finding_type": "calcification",
                "confidence": 0.76,
                "location": "lung_upper_lobe",
                "size_mm": 3.2,
                "modality": "CT",
            }),
        )
        .await
        .unwrap();
    assert!(ack.accepted);
    assert_eq!(ack.triggered_rule_ids, ["medical-rule-1"]);
}
