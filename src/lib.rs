//! # edgequake-flow2ivr
//!
//! Turn a flowchart image of a phone-call flow into executable IVR nodes
//! using a multimodal LLM.
//!
//! ## Why this crate?
//!
//! Call flows are usually drawn, not written down: a whiteboard photo or a
//! diagram export is the only source of truth. Instead of transcribing them
//! by hand, this crate lets a vision model read the diagram into structured
//! nodes, then has a second model call rewrite those nodes into the record
//! shape an IVR runtime executes, following a user-supplied JSON template.
//!
//! ## Pipeline Overview
//!
//! ```text
//! flowchart.png
//!  │
//!  ├─ 1. Encode      image bytes → base64 + media type
//!  ├─ 2. Read        vision call: image + instructions → nodes JSON
//!  ├─ 3. Persist     output_jsons/flowchart_nodes.json (hand-editable)
//!  ├─ 4. Convert     text call: nodes + template.json → actionable JSON
//!  └─ 5. Persist     output_jsons/actionable_nodes.json
//! ```
//!
//! Each model reply is stripped of markdown code fences, parsed, and
//! checked against typed records ([`NodeDocument`], [`ActionableDocument`])
//! before it is written.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_flow2ivr::{FlowchartPipeline, PipelineConfig};
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Bedrock runtime in us-east-1, key from AWS_BEARER_TOKEN_BEDROCK
//!     let config = PipelineConfig::builder()
//!         .api_key(std::env::var("AWS_BEARER_TOKEN_BEDROCK")?)
//!         .build()?;
//!     let pipeline = FlowchartPipeline::new(&config)?;
//!     let actionable = pipeline
//!         .process_flowchart(
//!             Path::new("data/flowchart.png"),
//!             Path::new("output_jsons/flowchart_nodes.json"),
//!             Path::new("output_jsons/actionable_nodes.json"),
//!             Path::new("template.json"),
//!         )
//!         .await?;
//!     println!("{} actionable nodes", actionable.len());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `flow2ivr` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-flow2ivr = { version = "0.1", default-features = false }
//! ```
//!
//! ## Choosing a Backend
//!
//! | Config | Backend |
//! |--------|---------|
//! | default | Bedrock runtime messages endpoint (`region` + `model_id`) |
//! | `.endpoint(url)` | any endpoint accepting the same messages body |
//! | `.provider_name("openai")` | any edgequake-llm provider |
//! | `.client(Arc<dyn CompletionClient>)` | your own client (tests, middleware) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod client;
pub mod config;
pub mod convert;
pub mod error;
pub mod extract;
pub mod model;
pub mod pipeline;
pub mod progress;
pub mod prompts;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use client::{CompletionClient, CompletionRequest, ScriptedClient};
pub use config::{PipelineConfig, PipelineConfigBuilder, ShapePolicy};
pub use convert::{process_flowchart_sync, FlowchartPipeline};
pub use error::{FlowError, Stage};
pub use extract::{extract_images_from_pdf, PdfExtractOptions};
pub use model::{
    preview, ActionableDocument, ActionableKind, ActionableNode, Actor, Choice, FlowchartNode,
    NodeDocument, NodeId, NodeKind,
};
pub use progress::{NoopProgressCallback, ProgressCallback, StageProgressCallback};
