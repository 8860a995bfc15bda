//! Configuration types for the flowchart pipeline.
//!
//! Every knob lives in [`PipelineConfig`], built via its
//! [`PipelineConfigBuilder`]. The model identifier, region and endpoint are
//! injected here instead of being baked into the stages, so tests can point
//! the pipeline at a stub client or a local mock endpoint.

use crate::client::CompletionClient;
use crate::error::FlowError;
use crate::progress::ProgressCallback;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Default Bedrock inference profile used for both stages.
pub const DEFAULT_MODEL_ID: &str = "global.anthropic.claude-opus-4-5-20251101-v1:0";

/// Default AWS region for the Bedrock runtime endpoint.
pub const DEFAULT_REGION: &str = "us-east-1";

/// Protocol version tag sent with every messages request.
pub const DEFAULT_ANTHROPIC_VERSION: &str = "bedrock-2023-05-31";

/// Configuration for a pipeline run.
///
/// Built via [`PipelineConfig::builder()`] or using
/// [`PipelineConfig::default()`].
///
/// # Example
/// ```rust
/// use edgequake_flow2ivr::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .region("eu-west-1")
///     .temperature(0.0)
///     .max_retries(2)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// Model identifier (Bedrock model id, inference profile id or ARN).
    pub model_id: String,

    /// AWS region used to derive the default endpoint. Default: `us-east-1`.
    pub region: String,

    /// Full URL of the messages endpoint. If None, derived from
    /// `region` and `model_id`.
    pub endpoint: Option<String>,

    /// Bearer token for the messages endpoint (e.g. a Bedrock API key).
    pub api_key: Option<String>,

    /// Protocol version tag. Default: `bedrock-2023-05-31`.
    pub anthropic_version: String,

    /// edgequake-llm provider name (e.g. "openai", "anthropic", "ollama").
    /// When set, stages are served by that provider instead of the messages
    /// endpoint.
    pub provider_name: Option<String>,

    /// Pre-constructed completion client. Takes precedence over everything else.
    pub client: Option<Arc<dyn CompletionClient>>,

    /// Sampling temperature for both stages. Default: 0.2.
    ///
    /// Low temperature keeps the structured output close to deterministic.
    pub temperature: f32,

    /// Output token budget for the image-to-nodes stage. Default: 2000.
    pub nodes_max_tokens: u32,

    /// Output token budget for the nodes-to-actionable stage. Default: 4000.
    ///
    /// Larger than the first stage because the reply is an array with one
    /// expanded record per node.
    pub actionable_max_tokens: u32,

    /// Per-call timeout in seconds. Default: None (block until the service answers).
    pub api_timeout_secs: Option<u64>,

    /// Retries on a transient service failure. Default: 0 (exactly one call).
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled after each attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// How to treat an actionable reply that is a single object instead of an array.
    pub shape_policy: ShapePolicy,

    /// Optional progress callback for stage events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            model_id: DEFAULT_MODEL_ID.to_string(),
            region: DEFAULT_REGION.to_string(),
            endpoint: None,
            api_key: None,
            anthropic_version: DEFAULT_ANTHROPIC_VERSION.to_string(),
            provider_name: None,
            client: None,
            temperature: 0.2,
            nodes_max_tokens: 2000,
            actionable_max_tokens: 4000,
            api_timeout_secs: None,
            max_retries: 0,
            retry_backoff_ms: 500,
            shape_policy: ShapePolicy::default(),
            progress_callback: None,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("model_id", &self.model_id)
            .field("region", &self.region)
            .field("endpoint", &self.endpoint)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("anthropic_version", &self.anthropic_version)
            .field("provider_name", &self.provider_name)
            .field("client", &self.client.as_ref().map(|_| "<dyn CompletionClient>"))
            .field("temperature", &self.temperature)
            .field("nodes_max_tokens", &self.nodes_max_tokens)
            .field("actionable_max_tokens", &self.actionable_max_tokens)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("max_retries", &self.max_retries)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("shape_policy", &self.shape_policy)
            .finish()
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }

    /// The messages endpoint URL: the explicit override, or the Bedrock
    /// runtime `invoke` URL for `region` and `model_id`, with the model id
    /// percent-encoded as a single path segment.
    pub fn resolved_endpoint(&self) -> Result<String, FlowError> {
        if let Some(ref url) = self.endpoint {
            return Ok(url.clone());
        }
        let base = format!("https://bedrock-runtime.{}.amazonaws.com", self.region);
        let mut url = Url::parse(&base).map_err(|e| {
            FlowError::InvalidConfig(format!("invalid region '{}': {e}", self.region))
        })?;
        url.path_segments_mut()
            .map_err(|_| FlowError::InvalidConfig(format!("'{base}' cannot hold a path")))?
            .clear()
            .extend(["model", self.model_id.as_str(), "invoke"]);
        Ok(url.into())
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn model_id(mut self, id: impl Into<String>) -> Self {
        self.config.model_id = id.into();
        self
    }

    pub fn region(mut self, region: impl Into<String>) -> Self {
        self.config.region = region.into();
        self
    }

    pub fn endpoint(mut self, url: impl Into<String>) -> Self {
        self.config.endpoint = Some(url.into());
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    pub fn anthropic_version(mut self, version: impl Into<String>) -> Self {
        self.config.anthropic_version = version.into();
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn client(mut self, client: Arc<dyn CompletionClient>) -> Self {
        self.config.client = Some(client);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 1.0);
        self
    }

    pub fn nodes_max_tokens(mut self, n: u32) -> Self {
        self.config.nodes_max_tokens = n;
        self
    }

    pub fn actionable_max_tokens(mut self, n: u32) -> Self {
        self.config.actionable_max_tokens = n;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = Some(secs);
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn shape_policy(mut self, policy: ShapePolicy) -> Self {
        self.config.shape_policy = policy;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, FlowError> {
        let c = &self.config;
        if c.model_id.trim().is_empty() {
            return Err(FlowError::InvalidConfig("model id must not be empty".into()));
        }
        if c.nodes_max_tokens == 0 || c.actionable_max_tokens == 0 {
            return Err(FlowError::InvalidConfig(
                "max token budgets must be ≥ 1".into(),
            ));
        }
        if c.api_timeout_secs == Some(0) {
            return Err(FlowError::InvalidConfig(
                "API timeout must be ≥ 1 second".into(),
            ));
        }
        if let Some(ref url) = c.endpoint {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(FlowError::InvalidConfig(format!(
                    "endpoint must be an HTTP/HTTPS URL, got '{url}'"
                )));
            }
        }
        c.resolved_endpoint()?;
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// What to do when the nodes-to-actionable stage returns a single JSON
/// object where an array of actionable nodes was asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ShapePolicy {
    /// Wrap the object into a one-element array. (default)
    #[default]
    Normalize,
    /// Reject the reply with a schema violation.
    Strict,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_stage_settings() {
        let c = PipelineConfig::default();
        assert_eq!(c.temperature, 0.2);
        assert_eq!(c.nodes_max_tokens, 2000);
        assert_eq!(c.actionable_max_tokens, 4000);
        assert_eq!(c.max_retries, 0);
        assert_eq!(c.api_timeout_secs, None);
        assert_eq!(c.anthropic_version, "bedrock-2023-05-31");
        assert_eq!(c.shape_policy, ShapePolicy::Normalize);
    }

    #[test]
    fn derived_endpoint_encodes_model_id() {
        let c = PipelineConfig::builder()
            .region("eu-west-1")
            .model_id("arn:aws:bedrock:eu-west-1:123:inference-profile/x")
            .build()
            .unwrap();
        assert_eq!(
            c.resolved_endpoint().unwrap(),
            "https://bedrock-runtime.eu-west-1.amazonaws.com/model/\
             arn:aws:bedrock:eu-west-1:123:inference-profile%2Fx/invoke"
        );
    }

    #[test]
    fn default_endpoint_keeps_model_id_in_one_segment() {
        let c = PipelineConfig::default();
        let url = Url::parse(&c.resolved_endpoint().unwrap()).unwrap();
        let segments: Vec<_> = url.path_segments().unwrap().collect();
        assert_eq!(segments, vec!["model", DEFAULT_MODEL_ID, "invoke"]);
        assert_eq!(url.host_str(), Some("bedrock-runtime.us-east-1.amazonaws.com"));
    }

    #[test]
    fn explicit_endpoint_wins() {
        let c = PipelineConfig::builder()
            .endpoint("http://127.0.0.1:9999/invoke")
            .build()
            .unwrap();
        assert_eq!(c.resolved_endpoint().unwrap(), "http://127.0.0.1:9999/invoke");
    }

    #[test]
    fn build_rejects_bad_values() {
        assert!(PipelineConfig::builder().model_id(" ").build().is_err());
        assert!(PipelineConfig::builder().nodes_max_tokens(0).build().is_err());
        assert!(PipelineConfig::builder().api_timeout_secs(0).build().is_err());
        assert!(PipelineConfig::builder().endpoint("ftp://x").build().is_err());
        assert!(PipelineConfig::builder().region("bad region").build().is_err());
    }

    #[test]
    fn temperature_is_clamped() {
        let c = PipelineConfig::builder().temperature(3.0).build().unwrap();
        assert_eq!(c.temperature, 1.0);
    }

    #[test]
    fn debug_redacts_api_key() {
        let c = PipelineConfig::builder().api_key("secret").build().unwrap();
        let dbg = format!("{c:?}");
        assert!(!dbg.contains("secret"));
        assert!(dbg.contains("<redacted>"));
    }
}
