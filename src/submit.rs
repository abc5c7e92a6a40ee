//! Observation submission.
//!
//! Every failure on this path is folded into a negative [`ObservationAck`];
//! only [`submit_tagged`] can fail outright, and it does so before touching
//! the transport.

use std::time::Duration;

use serde_json::Value;

use crate::error::ObservationResult;
use crate::link::Link;
use crate::observation::Observation;
use crate::protocol::{ObservationAck, WireRequest};
use crate::transport::Transport;

/// Submit one observation, connecting first if needed.
pub async fn submit<L: Link>(
    transport: &Transport<L>,
    observation: Observation,
    deadline: Option<Duration>,
) -> ObservationAck {
    let variant = observation.tag();
    tracing::info!(variant, subject = observation.subject(), "submitting observation");

    let request = WireRequest::SubmitObservation(observation);
    let result = transport
        .dispatch::<ObservationAck>(&request, deadline)
        .await
        .and_then(ObservationAck::validated);

    match result {
        Ok(ack) if ack.accepted => {
            tracing::info!(
                variant,
                observation_id = ack.observation_id.as_deref().unwrap_or_default(),
                rules = ?ack.triggered_rule_ids,
                "observation accepted"
            );
            ack
        }
        Ok(ack) => {
            tracing::info!(variant, message = %ack.message, "observation rejected by backend");
            ack
        }
        Err(e) => {
            tracing::warn!(variant, error = %e, "observation submission failed");
            ObservationAck::rejected(e.in_band_message())
        }
    }
}

/// Decode `(tag, fields)` into an observation and submit it.
///
/// Unknown tags and mismatched fields fail with an
/// [`ObservationError`](crate::error::ObservationError) and nothing is sent.
pub async fn submit_tagged<L: Link>(
    transport: &Transport<L>,
    tag: &str,
    fields: Value,
    deadline: Option<Duration>,
) -> ObservationResult<ObservationAck> {
    let observation = Observation::from_tagged(tag, fields).inspect_err(|e| {
        tracing::warn!(tag, error = %e, "refusing untyped observation");
    })?;
    Ok(submit(transport, observation, deadline).await)
}
