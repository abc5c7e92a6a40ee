//! Justification lookups. One round-trip; the derivation is passed through
//! as the backend built it.

use std::time::Duration;

use crate::link::Link;
use crate::protocol::{JustificationQuery, JustificationResult, WireRequest};
use crate::transport::Transport;

pub async fn resolve<L: Link>(
    transport: &Transport<L>,
    query: JustificationQuery,
    deadline: Option<Duration>,
) -> JustificationResult {
    if query.max_depth == 0 {
        return JustificationResult::rejected("max_depth must be positive");
    }

    let max_depth = query.max_depth;
    tracing::info!(belief_id = %query.belief_id, max_depth, "resolving justification");
    let request = WireRequest::GetJustification(query);

    match transport.dispatch::<JustificationResult>(&request, deadline).await {
        Ok(result) if result.accepted => {
            if let Some(depth) = result.declared_depth() {
                if depth > u64::from(max_depth) {
                    tracing::warn!(depth, max_depth, "derivation deeper than requested");
                }
            }
            result
        }
        Ok(result) => {
            tracing::info!(message = %result.message, "justification rejected by backend");
            JustificationResult::rejected(result.message)
        }
        Err(e) => {
            tracing::warn!(error = %e, "justification lookup failed");
            JustificationResult::rejected(e.in_band_message())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BridgeConfig;
    use crate::link::memory::MemoryBackend;

    #[tokio::test]
    async fn zero_depth_is_local() {
        let backend = MemoryBackend::new();
        let t = Transport::new(backend.link(), BridgeConfig::default());
        let result = resolve(&t, JustificationQuery::new("landmark-1").with_max_depth(0), None).await;
        assert!(!result.accepted);
        assert_eq!(backend.call_count(), 0);
    }

    #[tokio::test]
    async fn unknown_belief_gets_empty_derivation() {
        let backend = MemoryBackend::new();
        let t = Transport::new(backend.link(), BridgeConfig::default());
        let result = resolve(&t, JustificationQuery::new("landmark-1"), None).await;
        assert!(!result.accepted);
        assert_eq!(result.derivation, serde_json::json!({}));
        assert_eq!(result.message, "unknown belief: landmark-1");
    }
}
