//! Progress-callback trait for per-stage pipeline events.
//!
//! Inject an [`Arc<dyn StageProgressCallback>`] via
//! [`crate::config::PipelineConfigBuilder::progress_callback`] to be told
//! when each model-backed stage starts, finishes or fails. The CLI uses this
//! to drive a spinner while a completion call is in flight.
//!
//! # Example
//!
//! ```rust
//! use edgequake_flow2ivr::{PipelineConfig, Stage, StageProgressCallback};
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! struct Printer;
//!
//! impl StageProgressCallback for Printer {
//!     fn on_stage_complete(&self, stage: Stage, output: &Path, items: usize) {
//!         eprintln!("{stage}: {items} items → {}", output.display());
//!     }
//! }
//!
//! let config = PipelineConfig::builder()
//!     .progress_callback(Arc::new(Printer) as Arc<dyn StageProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use crate::error::Stage;
use std::path::Path;
use std::sync::Arc;

/// Called by the pipeline around each stage.
///
/// All methods have default no-op implementations so callers only override
/// what they care about.
pub trait StageProgressCallback: Send + Sync {
    /// Called just before the stage reads its inputs.
    fn on_stage_start(&self, stage: Stage) {
        let _ = stage;
    }

    /// Called after the stage output has been written.
    ///
    /// # Arguments
    /// * `output` — path of the JSON file that was written
    /// * `items`  — number of nodes in the written document
    fn on_stage_complete(&self, stage: Stage, output: &Path, items: usize) {
        let _ = (stage, output, items);
    }

    /// Called when the stage fails; the error is propagated afterwards.
    fn on_stage_error(&self, stage: Stage, error: &str) {
        let _ = (stage, error);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl StageProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::PipelineConfig`].
pub type ProgressCallback = Arc<dyn StageProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_stage_start(Stage::ImageToNodes);
        cb.on_stage_complete(Stage::ImageToNodes, Path::new("nodes.json"), 3);
        cb.on_stage_error(Stage::NodesToActionable, "boom");
    }
}
