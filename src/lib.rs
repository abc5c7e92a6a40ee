// thiserror's #[error("...{field}...")] format strings reference struct fields,
// but the compiler doesn't see through the derive macro and reports false positives.
#![allow(unused_assignments)]

//! # csri-bridge
//!
//! Client bridge between perception/control adapters and a CSNePS-style
//! reasoning service. Adapters submit typed observations; the service fires
//! rules and derives beliefs, which the bridge can query together with the
//! derivation that justifies them.
//!
//! ## Architecture
//!
//! - **Facade** (`bridge`): cloneable handle; every request folds failures into the response
//! - **Requests** (`submit`, `beliefs`, `justification`): one round-trip each
//! - **Transport** (`transport`): session state, connect retry, deadlines, decoding
//! - **Links** (`link`): HTTP+JSON to a live service, or an in-memory backend
//! - **Contract** (`observation`, `protocol`): wire types shared by both ends
//!
//! ## Library usage
//!
//! ```no_run
//! use csri_bridge::bridge::Bridge;
//! use csri_bridge::config::BridgeConfig;
//! use csri_bridge::observation::{LoopClosure, LoopClosureMethod};
//! use csri_bridge::protocol::BeliefQuery;
//!
//! # async fn demo() -> csri_bridge::error::BridgeResult<()> {
//! let bridge = Bridge::remote(BridgeConfig::default())?;
//! let ack = bridge
//!     .send_loop_closure(LoopClosure::new(
//!         "L001",
//!         0.85,
//!         LoopClosureMethod::Visual,
//!         [10.5, 3.2, 0.0, 0.0, 0.0, 0.0, 1.0],
//!     ))
//!     .await;
//! println!("accepted={} rules={:?}", ack.accepted, ack.triggered_rule_ids);
//!
//! let landmarks = bridge
//!     .query_beliefs(BeliefQuery::new("HighConfidenceLandmark").with_limit(5))
//!     .await;
//! println!("{} landmark(s)", landmarks.beliefs.len());
//! # Ok(())
//! # }
//! ```

pub mod beliefs;
pub mod bridge;
pub mod config;
pub mod demo;
pub mod error;
pub mod justification;
pub mod link;
pub mod observation;
pub mod perception;
pub mod protocol;
pub mod submit;
pub mod transport;
