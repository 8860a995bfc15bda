//! Pipeline entry points: run both stages back-to-back, or either alone.
//!
//! ```text
//! image ──▶ FlowchartProcessor ──▶ nodes.json ──▶ ActionableNodeConverter ──▶ actionable.json
//!                                      ▲                      ▲
//!                                      └── hand edits ────────┘ template.json
//! ```
//!
//! The intermediate nodes file is always written before stage 2 reads it
//! back, so the two partial operations compose into exactly the full run and
//! a user can correct the nodes between stages.

use crate::client::{
    CompletionClient, MessagesClient, ProviderClient, RetryPolicy, RetryingClient,
};
use crate::config::PipelineConfig;
use crate::error::{FlowError, Stage};
use crate::model::{ActionableDocument, NodeDocument};
use crate::pipeline::actionable::ActionableNodeConverter;
use crate::pipeline::nodes::FlowchartProcessor;
use crate::progress::ProgressCallback;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

/// Runs the flowchart-to-IVR stages against one completion client.
pub struct FlowchartPipeline {
    processor: FlowchartProcessor,
    converter: ActionableNodeConverter,
    progress: Option<ProgressCallback>,
}

impl FlowchartPipeline {
    /// Build a pipeline, resolving the completion client from `config`.
    ///
    /// # Errors
    /// [`FlowError::InvalidConfig`] when the named provider cannot be created
    /// or the HTTP client fails to initialise.
    pub fn new(config: &PipelineConfig) -> Result<Self, FlowError> {
        let client: Arc<dyn CompletionClient> = Arc::new(RetryingClient::new(
            resolve_client(config)?,
            RetryPolicy::from_config(config),
        ));
        Ok(Self {
            processor: FlowchartProcessor::from_config(Arc::clone(&client), config),
            converter: ActionableNodeConverter::from_config(client, config),
            progress: config.progress_callback.clone(),
        })
    }

    /// Image → nodes file → actionable file.
    ///
    /// Both the image and the template are checked before any model call,
    /// so a missing template does not waste a stage-1 request.
    pub async fn process_flowchart(
        &self,
        image_path: &Path,
        nodes_output: &Path,
        actionable_output: &Path,
        template_path: &Path,
    ) -> Result<ActionableDocument, FlowError> {
        let start = Instant::now();
        info!("Starting flowchart pipeline: {}", image_path.display());

        require_file(image_path, "flowchart image").await?;
        require_file(template_path, "template file").await?;

        self.process_flowchart_to_nodes_only(image_path, nodes_output)
            .await?;
        let actionable = self
            .process_nodes_to_actionable_only(nodes_output, template_path, actionable_output)
            .await?;

        info!(
            "Pipeline complete: {} actionable nodes in {}ms",
            actionable.len(),
            start.elapsed().as_millis()
        );
        Ok(actionable)
    }

    /// Stage 1 only: image → nodes file.
    pub async fn process_flowchart_to_nodes_only(
        &self,
        image_path: &Path,
        nodes_output: &Path,
    ) -> Result<NodeDocument, FlowError> {
        let stage = Stage::ImageToNodes;
        self.stage_started(stage);
        let result = async {
            let nodes = self.processor.image_to_nodes(image_path).await?;
            self.processor
                .save_nodes_to_file(&nodes, nodes_output)
                .await?;
            Ok::<_, FlowError>(nodes)
        }
        .await;
        self.stage_finished(stage, nodes_output, result.as_ref().map(NodeDocument::len));
        result
    }

    /// Stage 2 only: existing nodes file + template → actionable file.
    pub async fn process_nodes_to_actionable_only(
        &self,
        nodes_path: &Path,
        template_path: &Path,
        actionable_output: &Path,
    ) -> Result<ActionableDocument, FlowError> {
        let stage = Stage::NodesToActionable;
        self.stage_started(stage);
        let result = async {
            let actionable = self
                .converter
                .convert_nodes(nodes_path, template_path)
                .await?;
            self.converter
                .save_to_file(&actionable, actionable_output)
                .await?;
            Ok::<_, FlowError>(actionable)
        }
        .await;
        self.stage_finished(
            stage,
            actionable_output,
            result.as_ref().map(ActionableDocument::len),
        );
        result
    }

    fn stage_started(&self, stage: Stage) {
        info!("Stage {} started", stage);
        if let Some(ref cb) = self.progress {
            cb.on_stage_start(stage);
        }
    }

    /// Log a stage outcome and forward it to the progress callback.
    fn stage_finished(&self, stage: Stage, output: &Path, outcome: Result<usize, &FlowError>) {
        match outcome {
            Ok(items) => {
                if let Some(ref cb) = self.progress {
                    cb.on_stage_complete(stage, output, items);
                }
            }
            Err(e) => {
                error!("Stage {} failed: {}", stage, e);
                if let Some(ref cb) = self.progress {
                    cb.on_stage_error(stage, &e.to_string());
                }
            }
        }
    }
}

/// Synchronous wrapper around [`FlowchartPipeline::process_flowchart`].
///
/// Creates a temporary tokio runtime internally.
pub fn process_flowchart_sync(
    config: &PipelineConfig,
    image_path: &Path,
    nodes_output: &Path,
    actionable_output: &Path,
    template_path: &Path,
) -> Result<ActionableDocument, FlowError> {
    let runtime = tokio::runtime::Runtime::new()
        .map_err(|e| FlowError::Internal(format!("Failed to create tokio runtime: {}", e)))?;
    let pipeline = FlowchartPipeline::new(config)?;
    runtime.block_on(pipeline.process_flowchart(
        image_path,
        nodes_output,
        actionable_output,
        template_path,
    ))
}

// ── Internal helpers ─────────────────────────────────────────────────────

/// Fail with [`FlowError::InputNotFound`] unless `path` is an existing file.
async fn require_file(path: &Path, what: &str) -> Result<(), FlowError> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() => Ok(()),
        _ => {
            let e = FlowError::input_not_found(path, what);
            error!("{}", e);
            Err(e)
        }
    }
}

/// Pick the completion backend, from most-specific to least-specific:
///
/// 1. **Pre-built client** (`config.client`): used as-is. Tests inject a
///    scripted client here.
/// 2. **Named provider** (`config.provider_name`): any edgequake-llm
///    provider, created with `config.model_id`. The provider reads its own
///    API key from the environment.
/// 3. **Messages endpoint**: the Bedrock runtime (or `config.endpoint`)
///    spoken to directly over HTTP.
fn resolve_client(config: &PipelineConfig) -> Result<Arc<dyn CompletionClient>, FlowError> {
    if let Some(ref client) = config.client {
        return Ok(Arc::clone(client));
    }

    if let Some(ref name) = config.provider_name {
        info!("Using edgequake-llm provider '{}' ({})", name, config.model_id);
        return Ok(Arc::new(ProviderClient::from_name(name, &config.model_id)?));
    }

    let client = MessagesClient::from_config(config)?;
    info!("Using messages endpoint {}", client.endpoint());
    Ok(Arc::new(client))
}
