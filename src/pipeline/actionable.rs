//! Stage 2: structured nodes + template → actionable IVR nodes.
//!
//! The nodes file is re-read from disk, so it may come from an earlier run
//! or be hand-edited. It is validated leniently: if it no longer matches the
//! node schema, a warning is logged and the raw JSON is still forwarded to
//! the model, which only loses the consistency checks on the answer.

use super::{parse_model_json, persist};
use crate::client::{CompletionClient, CompletionRequest, ContentPart};
use crate::config::{PipelineConfig, ShapePolicy};
use crate::error::{FlowError, Stage};
use crate::model::{ActionableDocument, NodeDocument};
use crate::prompts::conversion_prompt;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Converts flowchart nodes into the actionable shape described by a template.
pub struct ActionableNodeConverter {
    client: Arc<dyn CompletionClient>,
    max_tokens: u32,
    temperature: f32,
    shape_policy: ShapePolicy,
}

impl ActionableNodeConverter {
    pub fn new(client: Arc<dyn CompletionClient>, max_tokens: u32, temperature: f32) -> Self {
        Self {
            client,
            max_tokens,
            temperature,
            shape_policy: ShapePolicy::default(),
        }
    }

    pub fn from_config(client: Arc<dyn CompletionClient>, config: &PipelineConfig) -> Self {
        Self::new(client, config.actionable_max_tokens, config.temperature)
            .with_shape_policy(config.shape_policy)
    }

    pub fn with_shape_policy(mut self, policy: ShapePolicy) -> Self {
        self.shape_policy = policy;
        self
    }

    /// Load both documents from disk and convert them.
    pub async fn convert_nodes(
        &self,
        nodes_path: &Path,
        template_path: &Path,
    ) -> Result<ActionableDocument, FlowError> {
        let nodes = persist::load_json(nodes_path, "nodes file").await?;
        let template = persist::load_json(template_path, "template file").await?;
        info!(
            "Converting {} using template {}",
            nodes_path.display(),
            template_path.display()
        );
        self.convert_documents(&nodes, &template).await
    }

    /// Convert already-loaded documents with one completion call.
    pub async fn convert_documents(
        &self,
        nodes: &Value,
        template: &Value,
    ) -> Result<ActionableDocument, FlowError> {
        let source = match NodeDocument::from_value(nodes.clone()) {
            Ok(doc) => Some(doc),
            Err(e) => {
                warn!("Nodes input does not match the node schema, forwarding as-is: {e}");
                None
            }
        };

        let request = CompletionRequest::single_turn(
            vec![ContentPart::text(conversion_prompt(template, nodes))],
            self.max_tokens,
            self.temperature,
        );
        let reply = self.client.complete(&request).await?;
        debug!("Conversion reply: {} chars", reply.len());

        let value = parse_model_json(Stage::NodesToActionable, &reply)?;
        let doc = ActionableDocument::from_value(value, self.shape_policy, source.as_ref())?;
        info!("Converted into {} actionable nodes", doc.len());
        Ok(doc)
    }

    /// Write the actionable array.
    pub async fn save_to_file(
        &self,
        actionable: &ActionableDocument,
        output_path: &Path,
    ) -> Result<(), FlowError> {
        persist::save_json(actionable.raw(), output_path).await?;
        info!("Actionable nodes saved to {}", output_path.display());
        Ok(())
    }
}
