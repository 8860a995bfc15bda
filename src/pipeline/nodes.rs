//! Stage 1: flowchart image → structured nodes.

use super::{encode, parse_model_json, persist};
use crate::client::{CompletionClient, CompletionRequest, ContentPart};
use crate::config::PipelineConfig;
use crate::error::{FlowError, Stage};
use crate::model::NodeDocument;
use crate::prompts::NODES_PROMPT;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Reads a flowchart image with a vision model and returns its nodes.
pub struct FlowchartProcessor {
    client: Arc<dyn CompletionClient>,
    max_tokens: u32,
    temperature: f32,
}

impl FlowchartProcessor {
    pub fn new(client: Arc<dyn CompletionClient>, max_tokens: u32, temperature: f32) -> Self {
        Self {
            client,
            max_tokens,
            temperature,
        }
    }

    pub fn from_config(client: Arc<dyn CompletionClient>, config: &PipelineConfig) -> Self {
        Self::new(client, config.nodes_max_tokens, config.temperature)
    }

    /// Send the image at `image_path` with the node-extraction prompt and
    /// validate the reply.
    pub async fn image_to_nodes(&self, image_path: &Path) -> Result<NodeDocument, FlowError> {
        let image = encode::load_image(image_path).await?;
        info!(
            "Sending {} ({}) to the model for node extraction",
            image_path.display(),
            image.media_type
        );

        let request = CompletionRequest::single_turn(
            vec![
                ContentPart::text(NODES_PROMPT),
                ContentPart::base64_image(image.media_type, image.data),
            ],
            self.max_tokens,
            self.temperature,
        );
        let reply = self.client.complete(&request).await?;
        debug!("Node extraction reply: {} chars", reply.len());

        let doc = NodeDocument::from_value(parse_model_json(Stage::ImageToNodes, &reply)?)?;
        for (from, to) in doc.dangling_references() {
            warn!("Node '{}' connects to unknown node '{}'", from, to);
        }
        info!("Extracted {} flowchart nodes", doc.len());
        Ok(doc)
    }

    /// Write the nodes exactly as the model returned them.
    pub async fn save_nodes_to_file(
        &self,
        nodes: &NodeDocument,
        output_path: &Path,
    ) -> Result<(), FlowError> {
        persist::save_json(nodes.raw(), output_path).await?;
        info!("Nodes saved to {}", output_path.display());
        Ok(())
    }
}
