//! Typed records for flowchart nodes and actionable IVR nodes.
//!
//! Both stages get free-form JSON back from a model. Instead of forwarding
//! it uninspected, each reply is checked against these records at the
//! boundary: a reply that lacks a required field, or uses a value outside
//! the enumerated `type`/`actor` domains, is rejected with
//! [`FlowError::SchemaViolation`].
//!
//! The documents still keep the parsed JSON verbatim ([`NodeDocument::raw`],
//! [`ActionableDocument::raw`]). That is what gets written to disk, so
//! fields the template adds and the typed records do not know about
//! survive unchanged.
//!
//! Dangling `connections` (ids with no matching node) are tolerated and only
//! logged; the correctness of the graph is the model's job.

use crate::config::ShapePolicy;
use crate::error::{excerpt, FlowError, Stage};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::fmt;
use tracing::warn;

/// Longest serialisation shown by [`preview`] for non-array documents.
const PREVIEW_CHARS: usize = 500;

// ── Flowchart nodes ──────────────────────────────────────────────────────

/// Node identifier: models emit either strings or integers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NodeId {
    Int(i64),
    Text(String),
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeId::Int(n) => write!(f, "{n}"),
            NodeId::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        NodeId::Text(s.to_string())
    }
}

impl From<i64> for NodeId {
    fn from(n: i64) -> Self {
        NodeId::Int(n)
    }
}

/// Semantic type of a flowchart step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Start,
    Process,
    Decision,
    Api,
    End,
}

/// Who performs a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Actor {
    Caller,
    Agent,
    System,
}

/// One step of a flowchart, as read from the image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowchartNode {
    pub id: NodeId,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub description: String,
    #[serde(default)]
    pub connections: Vec<NodeId>,
    pub actor: Actor,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Locate the node array: a bare array, or an object holding `nodes`.
fn node_array(value: &Value) -> Option<&Vec<Value>> {
    match value {
        Value::Array(items) => Some(items),
        Value::Object(map) => map.get("nodes").and_then(Value::as_array),
        _ => None,
    }
}

fn describe_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Output of the image-to-nodes stage.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeDocument {
    raw: Value,
    nodes: Vec<FlowchartNode>,
}

impl NodeDocument {
    /// Validate a parsed reply.
    ///
    /// Accepts a bare array of nodes or an object with a `nodes` array;
    /// every element must carry `id`, `name`, `type` and `actor` with values
    /// from the enumerated domains.
    pub fn from_value(raw: Value) -> Result<Self, FlowError> {
        let stage = Stage::ImageToNodes;
        let items = node_array(&raw).ok_or_else(|| FlowError::SchemaViolation {
            stage,
            detail: format!(
                "expected an array of nodes or an object with a \"nodes\" array, got {}",
                describe_kind(&raw)
            ),
        })?;

        let nodes = items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                serde_json::from_value::<FlowchartNode>(item.clone()).map_err(|e| {
                    FlowError::SchemaViolation {
                        stage,
                        detail: format!("node #{}: {}", i + 1, e),
                    }
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut seen = HashSet::new();
        for node in &nodes {
            if !seen.insert(node.id.to_string()) {
                warn!("Duplicate node id '{}' in flowchart nodes", node.id);
            }
        }

        Ok(Self { raw, nodes })
    }

    /// The parsed JSON exactly as the model returned it.
    pub fn raw(&self) -> &Value {
        &self.raw
    }

    pub fn into_value(self) -> Value {
        self.raw
    }

    pub fn nodes(&self) -> &[FlowchartNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, id: &NodeId) -> Option<&FlowchartNode> {
        let key = id.to_string();
        self.nodes.iter().find(|n| n.id.to_string() == key)
    }

    /// `(from, to)` pairs whose target id names no node in this document.
    ///
    /// Ids compare by their textual form, so `1` and `"1"` match.
    pub fn dangling_references(&self) -> Vec<(NodeId, NodeId)> {
        let known: HashSet<String> = self.nodes.iter().map(|n| n.id.to_string()).collect();
        self.nodes
            .iter()
            .flat_map(|n| {
                n.connections
                    .iter()
                    .filter(|c| !known.contains(&c.to_string()))
                    .map(move |c| (n.id.clone(), c.clone()))
            })
            .collect()
    }
}

// ── Actionable nodes ─────────────────────────────────────────────────────

/// Execution type of an actionable node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionableKind {
    #[serde(rename = "agenticdecision")]
    AgenticDecision,
    #[serde(rename = "userInput")]
    UserInput,
    #[serde(rename = "predefined")]
    Predefined,
}

impl ActionableKind {
    /// The type a source node maps to: decisions become agentic decisions,
    /// caller-driven processes wait for user input, everything else is
    /// predefined.
    pub fn for_node(node: &FlowchartNode) -> Self {
        match (node.kind, node.actor) {
            (NodeKind::Decision, _) => ActionableKind::AgenticDecision,
            (NodeKind::Process, Actor::Caller) => ActionableKind::UserInput,
            _ => ActionableKind::Predefined,
        }
    }
}

/// Whether a node leads to one next step or several.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Choice {
    Single,
    Multiple,
}

impl Choice {
    /// Zero or one connection is `single`, two or more is `multiple`.
    pub fn for_connections(count: usize) -> Self {
        if count <= 1 {
            Choice::Single
        } else {
            Choice::Multiple
        }
    }
}

/// Command value every actionable node carries.
pub const CONNECT_COMMAND: &str = "connect";

/// One node in the shape the IVR runtime executes.
///
/// Fields beyond the required ones come from the template and are kept in
/// `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionableNode {
    pub id: NodeId,
    pub name: String,
    #[serde(default)]
    pub connections: Vec<NodeId>,
    pub actor: Actor,
    pub command: String,
    #[serde(rename = "type")]
    pub kind: ActionableKind,
    pub choice: Choice,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    #[serde(rename = "stopTime", default)]
    pub stop_time: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ActionableNode {
    /// Text spoken to the caller (`params.audio.text`), if the node has an audio block.
    pub fn audio_text(&self) -> Option<&str> {
        self.params
            .as_ref()
            .and_then(|p| p.get("audio"))
            .and_then(|a| a.get("text"))
            .and_then(Value::as_str)
    }
}

/// Set `params.audio.text` to `""` when an audio block exists but its text
/// is null or missing. Returns true when the object was changed.
fn fill_empty_audio_text(item: &mut Value) -> bool {
    let Some(audio) = item
        .get_mut("params")
        .and_then(|p| p.get_mut("audio"))
        .and_then(Value::as_object_mut)
    else {
        return false;
    };
    match audio.get("text") {
        Some(Value::String(_)) => false,
        _ => {
            audio.insert("text".to_string(), Value::String(String::new()));
            true
        }
    }
}

/// Output of the nodes-to-actionable stage. `raw` is always an array.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionableDocument {
    raw: Value,
    nodes: Vec<ActionableNode>,
}

impl ActionableDocument {
    /// Validate a parsed reply.
    ///
    /// A single object is wrapped into a one-element array under
    /// [`ShapePolicy::Normalize`] and rejected under [`ShapePolicy::Strict`].
    /// When `source` is given, disagreements with the source nodes
    /// (connection count vs. `choice`, decision vs. `type`, unknown ids) are
    /// logged as warnings; the model's answer is kept.
    pub fn from_value(
        raw: Value,
        policy: ShapePolicy,
        source: Option<&NodeDocument>,
    ) -> Result<Self, FlowError> {
        let stage = Stage::NodesToActionable;
        let mut items = match raw {
            Value::Array(items) => items,
            Value::Object(map) => match policy {
                ShapePolicy::Normalize => {
                    warn!("Actionable output is a single object; wrapping it into an array");
                    vec![Value::Object(map)]
                }
                ShapePolicy::Strict => {
                    return Err(FlowError::SchemaViolation {
                        stage,
                        detail: "expected an array of actionable nodes, got an object".into(),
                    })
                }
            },
            other => {
                return Err(FlowError::SchemaViolation {
                    stage,
                    detail: format!(
                        "expected an array of actionable nodes, got {}",
                        describe_kind(&other)
                    ),
                })
            }
        };

        let mut nodes = Vec::with_capacity(items.len());
        for (i, item) in items.iter_mut().enumerate() {
            if !item.is_object() {
                return Err(FlowError::SchemaViolation {
                    stage,
                    detail: format!("actionable node #{} is {}", i + 1, describe_kind(item)),
                });
            }
            if fill_empty_audio_text(item) {
                warn!("Actionable node #{}: empty audio text set to \"\"", i + 1);
            }
            let node = serde_json::from_value::<ActionableNode>(item.clone()).map_err(|e| {
                FlowError::SchemaViolation {
                    stage,
                    detail: format!("actionable node #{}: {}", i + 1, e),
                }
            })?;
            check_consistency(&node, source);
            nodes.push(node);
        }

        Ok(Self {
            raw: Value::Array(items),
            nodes,
        })
    }

    /// The validated JSON array written to disk.
    pub fn raw(&self) -> &Value {
        &self.raw
    }

    pub fn into_value(self) -> Value {
        self.raw
    }

    pub fn nodes(&self) -> &[ActionableNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

fn check_consistency(node: &ActionableNode, source: Option<&NodeDocument>) {
    if node.command != CONNECT_COMMAND {
        warn!(
            "Actionable node '{}': command is '{}', expected '{}'",
            node.id, node.command, CONNECT_COMMAND
        );
    }

    let expected_choice = Choice::for_connections(node.connections.len());
    if node.choice != expected_choice {
        warn!(
            "Actionable node '{}': choice {:?} disagrees with {} connection(s)",
            node.id,
            node.choice,
            node.connections.len()
        );
    }

    let Some(doc) = source else { return };
    match doc.get(&node.id) {
        Some(src) => {
            let is_decision = src.kind == NodeKind::Decision;
            if is_decision != (node.kind == ActionableKind::AgenticDecision) {
                warn!(
                    "Actionable node '{}': type {:?} but source node is {:?}",
                    node.id, node.kind, src.kind
                );
            }
        }
        None => warn!("Actionable node '{}' has no matching flowchart node", node.id),
    }
}

/// Short human-readable preview of a result document.
///
/// Arrays show their first element (as a one-element array); anything else
/// shows the first 500 characters of the pretty serialisation.
pub fn preview(value: &Value) -> String {
    match value {
        Value::Array(items) => {
            let head = Value::Array(items.iter().take(1).cloned().collect());
            serde_json::to_string_pretty(&head).unwrap_or_else(|_| head.to_string())
        }
        other => {
            let pretty = serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string());
            excerpt(&pretty, PREVIEW_CHARS)
        }
    }
}
