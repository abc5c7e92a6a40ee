//! Fixed forward-chaining rule table for the in-memory backend.
//!
//! | rule             | fires when                                   | effect                              |
//! |------------------|----------------------------------------------|-------------------------------------|
//! | `slam-rule-1`    | any loop closure                             | recorded as evidence                |
//! | `slam-rule-2`    | loop closure score ≥ 0.8                     | `HighConfidenceLandmark`            |
//! | `slam-rule-3`    | consistent match ≥ 0.7 on a known landmark   | extra support for that landmark     |
//! | `slam-rule-3`    | inconsistent match                           | `Hypothesis`                        |
//! | `gnc-rule-1`     | severity ≥ 0.5                               | `Hypothesis`                        |
//! | `gnc-rule-2`     | severity ≥ 0.8 during burn                   | `Recommendation` from the hypothesis|
//! | `medical-rule-1` | confidence ≥ 0.7                             | `Hypothesis`                        |
//! | `medical-rule-3` | confidence ≥ 0.8 and size ≥ 10 mm            | `Recommendation` from the hypothesis|

use serde_json::json;

use super::store::{BeliefStore, Concept, SupportSet};
use crate::observation::{
    AppearanceMatch, Consistency, GncEvent, GncMode, LoopClosure, MedicalFinding, Observation,
};

const LANDMARK_SCORE: f64 = 0.8;
const APPEARANCE_SCORE: f64 = 0.7;
const GNC_HYPOTHESIS_SEVERITY: f64 = 0.5;
const GNC_ACTION_SEVERITY: f64 = 0.8;
const MEDICAL_HYPOTHESIS_CONFIDENCE: f64 = 0.7;
const MEDICAL_ACTION_CONFIDENCE: f64 = 0.8;
const MEDICAL_ACTION_SIZE_MM: f64 = 10.0;

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn unit(name: &str, value: f64) -> Result<(), String> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(format!("{name} must be within [0, 1], got {value}"))
    }
}

fn non_empty(name: &str, value: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        Err(format!("{name} must not be empty"))
    } else {
        Ok(())
    }
}

/// Reject observations whose fields are out of range.
pub fn validate(observation: &Observation) -> Result<(), String> {
    match observation {
        Observation::LoopClosure(o) => {
            non_empty("landmark_id", &o.landmark_id)?;
            unit("score", o.score)?;
            if o.pose_estimate.iter().any(|v| !v.is_finite()) {
                return Err("pose_estimate must be finite".into());
            }
            let q = &o.pose_estimate[3..];
            if q.iter().map(|v| v * v).sum::<f64>() == 0.0 {
                return Err("pose_estimate orientation quaternion must be non-zero".into());
            }
            Ok(())
        }
        Observation::AppearanceMatch(o) => {
            non_empty("landmark_id", &o.landmark_id)?;
            unit("score", o.score)
        }
        Observation::GncEvent(o) => {
            non_empty("event_type", &o.event_type)?;
            unit("severity", o.severity)?;
            match o.parameters.iter().find(|(_, v)| !v.is_finite()) {
                Some((name, _)) => Err(format!("parameter {name} must be finite")),
                None => Ok(()),
            }
        }
        Observation::MedicalFinding(o) => {
            non_empty("patient_id", &o.patient_id)?;
            non_empty("finding_type", &o.finding_type)?;
            non_empty("location", &o.location)?;
            unit("confidence", o.confidence)?;
            if o.size_mm.is_finite() && o.size_mm >= 0.0 {
                Ok(())
            } else {
                Err(format!("size_mm must be a non-negative number, got {}", o.size_mm))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Rule application
// ---------------------------------------------------------------------------

/// Apply every matching rule for an observation already recorded as
/// `obs_id`. Returns the fired rule ids in firing order.
pub fn apply(store: &mut BeliefStore, obs_id: &str, observation: &Observation) -> Vec<&'static str> {
    match observation {
        Observation::LoopClosure(o) => loop_closure(store, obs_id, o),
        Observation::AppearanceMatch(o) => appearance_match(store, obs_id, o),
        Observation::GncEvent(o) => gnc_event(store, obs_id, o),
        Observation::MedicalFinding(o) => medical_finding(store, obs_id, o),
    }
}

fn loop_closure(store: &mut BeliefStore, obs_id: &str, o: &LoopClosure) -> Vec<&'static str> {
    let mut fired = vec!["slam-rule-1"];

    if o.score >= LANDMARK_SCORE {
        let support = SupportSet::new("slam-rule-2", vec![obs_id.to_string()], o.score);
        match store.landmark_belief(&o.landmark_id).map(str::to_string) {
            Some(existing) => {
                store.add_support(&existing, support);
            }
            None => {
                let id = store.derive(
                    Concept::HighConfidenceLandmark,
                    json!({
                        "landmark_id": o.landmark_id,
                        "confidence": o.score,
                        "method": o.method,
                        "pose_estimate": o.pose_estimate,
                    }),
                    support,
                );
                store.bind_landmark(&o.landmark_id, &id);
            }
        }
        fired.push("slam-rule-2");
    }

    fired
}

fn appearance_match(store: &mut BeliefStore, obs_id: &str, o: &AppearanceMatch) -> Vec<&'static str> {
    let landmark = store.landmark_belief(&o.landmark_id).map(str::to_string);

    match o.consistency {
        Consistency::Consistent => match landmark {
            Some(belief) if o.score >= APPEARANCE_SCORE => {
                store.add_support(
                    &belief,
                    SupportSet::new("slam-rule-3", vec![obs_id.to_string()], o.score),
                );
                vec!["slam-rule-3"]
            }
            _ => Vec::new(),
        },
        Consistency::Inconsistent => {
            let mut premises = vec![obs_id.to_string()];
            premises.extend(landmark);
            store.derive(
                Concept::Hypothesis,
                json!({
                    "landmark_id": o.landmark_id,
                    "hypothesis": "landmark_appearance_changed",
                }),
                SupportSet::new("slam-rule-3", premises, o.score),
            );
            vec!["slam-rule-3"]
        }
    }
}

fn gnc_event(store: &mut BeliefStore, obs_id: &str, o: &GncEvent) -> Vec<&'static str> {
    let mut fired = Vec::new();
    if o.severity < GNC_HYPOTHESIS_SEVERITY {
        return fired;
    }

    let hypothesis = store.derive(
        Concept::Hypothesis,
        json!({
            "event_type": o.event_type,
            "mode": o.mode,
            "severity": o.severity,
            "parameters": o.parameters,
            "hypothesis": "performance_degradation",
        }),
        SupportSet::new("gnc-rule-1", vec![obs_id.to_string()], o.severity),
    );
    fired.push("gnc-rule-1");

    if o.severity >= GNC_ACTION_SEVERITY && o.mode == GncMode::Burn {
        store.derive(
            Concept::Recommendation,
            json!({
                "event_type": o.event_type,
                "action": "abort_burn",
                "priority": "urgent",
                "hypothesis": hypothesis,
            }),
            SupportSet::new("gnc-rule-2", vec![hypothesis.clone()], o.severity),
        );
        fired.push("gnc-rule-2");
    }

    fired
}

fn medical_finding(store: &mut BeliefStore, obs_id: &str, o: &MedicalFinding) -> Vec<&'static str> {
    let mut fired = Vec::new();
    if o.confidence < MEDICAL_HYPOTHESIS_CONFIDENCE {
        return fired;
    }

    let hypothesis = store.derive(
        Concept::Hypothesis,
        json!({
            "patient_id": o.patient_id,
            "finding_type": o.finding_type,
            "location": o.location,
            "modality": o.modality,
            "hypothesis": format!("suspected_{}", o.finding_type),
        }),
        SupportSet::new("medical-rule-1", vec![obs_id.to_string()], o.confidence),
    );
    fired.push("medical-rule-1");

    if o.confidence >= MEDICAL_ACTION_CONFIDENCE && o.size_mm >= MEDICAL_ACTION_SIZE_MM {
        store.derive(
            Concept::Recommendation,
            json!({
                "patient_id": o.patient_id,
                "finding_type": o.finding_type,
                "action": "biopsy",
                "priority": "urgent",
                "hypothesis": hypothesis,
            }),
            SupportSet::new("medical-rule-3", vec![hypothesis.clone()], o.confidence),
        );
        fired.push("medical-rule-3");
    }

    fired
}
