//! Error types for the edgequake-flow2ivr library.
//!
//! A single fatal error type, [`FlowError`], covers every way a run can
//! stop. The variants follow the four failure families of the pipeline:
//!
//! * **Missing input** — a referenced file does not exist
//!   ([`FlowError::InputNotFound`]); the message names the file and how to
//!   supply it.
//! * **Upstream service** — the completion call itself failed
//!   ([`FlowError::ServiceError`], [`FlowError::AuthError`],
//!   [`FlowError::RateLimited`], [`FlowError::ServiceTimeout`]).
//! * **Model output** — the reply was not JSON
//!   ([`FlowError::UnparsableModelOutput`]) or was JSON of the wrong shape
//!   ([`FlowError::SchemaViolation`]).
//! * **External tool** — the PDF rasteriser could not be run
//!   ([`FlowError::RasterizerUnavailable`]). The extractor degrades to an
//!   empty result instead of returning this to callers.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Which model-backed stage produced an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Stage {
    /// Flowchart image → structured nodes.
    ImageToNodes,
    /// Structured nodes + template → actionable nodes.
    NodesToActionable,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::ImageToNodes => f.write_str("image-to-nodes"),
            Stage::NodesToActionable => f.write_str("nodes-to-actionable"),
        }
    }
}

/// All fatal errors returned by the edgequake-flow2ivr library.
#[derive(Debug, Error)]
pub enum FlowError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// A required input file was not found.
    #[error("File not found: '{path}'\n{hint}")]
    InputNotFound { path: PathBuf, hint: String },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// A nodes or template file exists but is not valid JSON.
    #[error("'{path}' is not valid JSON: {detail}")]
    InvalidInputJson { path: PathBuf, detail: String },

    // ── Model output errors ───────────────────────────────────────────────
    /// The cleaned model reply could not be parsed as JSON.
    #[error("Model output for stage {stage} is not valid JSON: {detail}\nOutput starts with: {excerpt}")]
    UnparsableModelOutput {
        stage: Stage,
        detail: String,
        excerpt: String,
    },

    /// The model reply parsed, but lacks required fields or has the wrong shape.
    #[error("Model output for stage {stage} does not match the expected schema: {detail}")]
    SchemaViolation { stage: Stage, detail: String },

    // ── Completion service errors ─────────────────────────────────────────
    /// The completion service returned a non-retryable or unexpected error.
    #[error("Completion service error{}: {message}", http_status_suffix(.status))]
    ServiceError { status: Option<u16>, message: String },

    /// The completion service rejected the credentials (401/403).
    #[error("Authentication error from completion service: {detail}\nCheck AWS_BEARER_TOKEN_BEDROCK / --api-key.")]
    AuthError { detail: String },

    /// The completion service returned HTTP 429.
    #[error("Rate limit exceeded by completion service")]
    RateLimited { retry_after_secs: Option<u64> },

    /// A completion call did not finish within the configured timeout.
    #[error("Completion call timed out after {elapsed_ms}ms")]
    ServiceTimeout { elapsed_ms: u64 },

    // ── External tool errors ──────────────────────────────────────────────
    /// The PDF rasteriser (poppler's `pdftoppm`) could not be located or run.
    #[error(
        "PDF rasteriser unavailable: {detail}\n\n\
  1. Make sure poppler is installed (apt install poppler-utils, brew install poppler,\n     \
     or https://github.com/oschwartz10612/poppler-windows/releases/).\n\
  2. Add poppler's bin directory to your PATH.\n\
  3. Or pass the explicit poppler bin directory with --poppler-path."
    )]
    RasterizerUnavailable { detail: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write an output JSON file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

fn http_status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {s})")).unwrap_or_default()
}

/// Truncate `s` to at most `max` characters for inclusion in an error or
/// log line, appending an ellipsis when cut.
pub(crate) fn excerpt(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}\u{2026}", &s[..idx]),
        None => s.to_string(),
    }
}

impl FlowError {
    /// Whether retrying the same completion request could succeed.
    ///
    /// Timeouts, rate limits and 5xx responses are transient; everything
    /// else (bad credentials, 4xx, unparsable output) is not.
    pub fn is_transient(&self) -> bool {
        match self {
            FlowError::ServiceTimeout { .. } | FlowError::RateLimited { .. } => true,
            FlowError::ServiceError { status, .. } => match status {
                Some(code) => *code >= 500,
                // Connection-level failure: no status was received.
                None => true,
            },
            _ => false,
        }
    }

    /// Build the missing-input error with a remediation hint.
    pub fn input_not_found(path: impl Into<PathBuf>, what: &str) -> Self {
        let path = path.into();
        let hint = format!(
            "Make sure the {what} exists at '{}' or pass its location explicitly.",
            path.display()
        );
        FlowError::InputNotFound { path, hint }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_not_found_display_names_file() {
        let e = FlowError::input_not_found("data/flowchart.png", "flowchart image");
        let msg = e.to_string();
        assert!(msg.contains("data/flowchart.png"), "got: {msg}");
        assert!(msg.contains("flowchart image"), "got: {msg}");
    }

    #[test]
    fn service_error_display_with_status() {
        let e = FlowError::ServiceError {
            status: Some(503),
            message: "overloaded".into(),
        };
        assert!(e.to_string().contains("HTTP 503"));
        assert!(e.to_string().contains("overloaded"));
    }

    #[test]
    fn service_error_display_without_status() {
        let e = FlowError::ServiceError {
            status: None,
            message: "connection reset".into(),
        };
        assert!(!e.to_string().contains("HTTP"));
    }

    #[test]
    fn transient_classification() {
        assert!(FlowError::ServiceTimeout { elapsed_ms: 10 }.is_transient());
        assert!(FlowError::RateLimited {
            retry_after_secs: None
        }
        .is_transient());
        assert!(FlowError::ServiceError {
            status: Some(502),
            message: String::new()
        }
        .is_transient());
        assert!(!FlowError::ServiceError {
            status: Some(400),
            message: String::new()
        }
        .is_transient());
        assert!(!FlowError::AuthError {
            detail: "bad key".into()
        }
        .is_transient());
        assert!(!FlowError::SchemaViolation {
            stage: Stage::ImageToNodes,
            detail: "x".into()
        }
        .is_transient());
    }

    #[test]
    fn rasterizer_message_has_guidance() {
        let e = FlowError::RasterizerUnavailable {
            detail: "pdftoppm not found".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("poppler"));
        assert!(msg.contains("PATH"));
    }

    #[test]
    fn excerpt_respects_char_boundaries() {
        assert_eq!(excerpt("héllo", 2), "hé\u{2026}");
        assert_eq!(excerpt("hi", 5), "hi");
    }

    #[test]
    fn stage_display() {
        assert_eq!(Stage::ImageToNodes.to_string(), "image-to-nodes");
        assert_eq!(Stage::NodesToActionable.to_string(), "nodes-to-actionable");
    }
}
