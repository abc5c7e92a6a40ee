//! Belief queries.

use std::collections::BTreeMap;
use std::time::Duration;

use crate::link::Link;
use crate::protocol::{BeliefQuery, BeliefQueryResult, WireRequest};
use crate::transport::Transport;

/// Concepts every reasoning service is expected to know.
pub const STANDARD_CONCEPTS: [&str; 3] = ["HighConfidenceLandmark", "Hypothesis", "Recommendation"];

/// Fetch beliefs for one concept.
///
/// The result never holds more than `query.limit` beliefs, whatever the
/// backend sends; backend order is kept. A negative reply holds none.
pub async fn query<L: Link>(
    transport: &Transport<L>,
    query: BeliefQuery,
    deadline: Option<Duration>,
) -> BeliefQueryResult {
    if query.limit == 0 {
        return BeliefQueryResult::rejected("limit must be positive");
    }

    let limit = query.limit as usize;
    tracing::info!(concept = %query.concept, limit, "querying beliefs");
    let request = WireRequest::QueryBeliefs(query);

    match transport.dispatch::<BeliefQueryResult>(&request, deadline).await {
        Ok(mut result) if result.accepted => {
            if result.beliefs.len() > limit {
                tracing::debug!(
                    returned = result.beliefs.len(),
                    limit,
                    "backend exceeded limit, truncating"
                );
                result.beliefs.truncate(limit);
            }
            tracing::info!(count = result.beliefs.len(), "beliefs received");
            result
        }
        Ok(mut result) => {
            result.beliefs.clear();
            tracing::info!(message = %result.message, "belief query rejected by backend");
            result
        }
        Err(e) => {
            tracing::warn!(error = %e, "belief query failed");
            BeliefQueryResult::rejected(e.in_band_message())
        }
    }
}

/// Query every standard concept, keyed by concept name.
pub async fn query_all_concepts<L: Link>(
    transport: &Transport<L>,
    limit: u32,
    deadline: Option<Duration>,
) -> BTreeMap<String, BeliefQueryResult> {
    let mut results = BTreeMap::new();
    for concept in STANDARD_CONCEPTS {
        let result = query(transport, BeliefQuery::new(concept).with_limit(limit), deadline).await;
        results.insert(concept.to_string(), result);
    }
    results
}
