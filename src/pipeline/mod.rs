//! Pipeline stages for flowchart-to-IVR conversion.
//!
//! Each submodule implements one step; the two converters compose the
//! smaller ones.
//!
//! ## Data Flow
//!
//! ```text
//! image ──▶ encode ──▶ nodes ──▶ persist ──▶ actionable ──▶ persist
//! (PNG)    (base64)    (model)  (nodes.json)   (model)     (actionable.json)
//!                         │                       │
//!                         └──── fence ────────────┘
//! ```
//!
//! 1. [`encode`]     — load the image, sniff its media type, base64-encode it
//! 2. [`fence`]      — strip a markdown code fence wrapped around a reply
//! 3. [`persist`]    — read input JSON, write output JSON atomically
//! 4. [`nodes`]      — flowchart image → structured nodes
//! 5. [`actionable`] — structured nodes + template → actionable nodes

pub mod actionable;
pub mod encode;
pub mod fence;
pub mod nodes;
pub mod persist;

use crate::error::{excerpt, FlowError, Stage};
use serde_json::Value;
use tracing::error;

/// Longest slice of an unparsable reply kept in the error and the log.
const MAX_EXCERPT: usize = 500;

/// Strip fencing from a model reply and parse it as JSON.
///
/// On failure the offending text is logged (truncated) and returned as
/// [`FlowError::UnparsableModelOutput`].
pub(crate) fn parse_model_json(stage: Stage, reply: &str) -> Result<Value, FlowError> {
    let cleaned = fence::strip_code_fence(reply);
    serde_json::from_str(cleaned).map_err(|e| {
        let snippet = excerpt(cleaned, MAX_EXCERPT);
        error!("Failed to parse {} output as JSON: {}", stage, e);
        error!("Result content: {}", snippet);
        FlowError::UnparsableModelOutput {
            stage,
            detail: e.to_string(),
            excerpt: snippet,
        }
    })
}
