//! Instruction prompts for the two model-backed stages.
//!
//! Keeping every prompt here means changing what the model is asked to
//! produce touches exactly one file, and unit tests can inspect prompts
//! without calling a model.

use serde_json::Value;

/// Instruction sent alongside the flowchart image.
pub const NODES_PROMPT: &str = r#"
You are an expert system architect.

Read the flowchart in the image and convert it into structured nodes.

Each node must contain:
- id
- name
- type (start, process, decision, api, end)
- description
- connections (array of node ids)
- actor (caller, agent, system)

Output ONLY valid JSON with no markdown formatting, no code blocks, no explanations, no additional text.
Start your response with { and end with }
"#;

/// Field-by-field rules for turning flowchart nodes into actionable nodes.
const CONVERSION_RULES: &str = r#"Instructions:
- For each node in the flowchart, create a JSON object following the template structure
- Populate each field using the information from the node
- If the node contains speech (description), put it inside params.audio.text
- If the node is a decision, set type to "agenticdecision"
- If it requires caller input, set type to "userInput"
- If it is a normal message or system-driven process, set type to "predefined"
- If the node has only one connection, set choice to "single", otherwise "multiple"
- Always include the node's actual id, name, and connections
- Always include actor from the node
- Always set command to "connect"
- If the action involves no audio prompt (e.g., API node), leave text as an empty string
- If there is no stopTime provided, use null
- Return an array of transformed nodes
- The JSON must be strictly valid

Output ONLY valid JSON with no markdown formatting, no code blocks, no explanations.
Start with [ and end with ]"#;

/// Build the conversion prompt, embedding the template and the nodes as
/// 2-space indented JSON.
pub fn conversion_prompt(template: &Value, nodes: &Value) -> String {
    format!(
        "\nYou are an expert system architect. Convert the following IVR flowchart nodes \
into actionable JSON format.\n\n\
TEMPLATE (use this structure for each node):\n{}\n\n\
FLOWCHART NODES (convert these):\n{}\n\n{}\n",
        pretty(template),
        pretty(nodes),
        CONVERSION_RULES
    )
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn nodes_prompt_lists_every_field_and_domain() {
        for needle in [
            "id",
            "name",
            "start, process, decision, api, end",
            "description",
            "connections",
            "caller, agent, system",
        ] {
            assert!(NODES_PROMPT.contains(needle), "missing {needle:?}");
        }
    }

    #[test]
    fn conversion_prompt_embeds_both_documents() {
        let template = json!({"id": "", "command": "connect", "params": {"audio": {"text": ""}}});
        let nodes = json!({"nodes": [{"id": "n1", "name": "Welcome"}]});
        let prompt = conversion_prompt(&template, &nodes);

        assert!(prompt.contains("TEMPLATE (use this structure for each node):"));
        assert!(prompt.contains(&serde_json::to_string_pretty(&template).unwrap()));
        assert!(prompt.contains(&serde_json::to_string_pretty(&nodes).unwrap()));
        assert!(prompt.contains("\"Welcome\""));
        // template precedes the nodes
        assert!(prompt.find("TEMPLATE").unwrap() < prompt.find("FLOWCHART NODES").unwrap());
    }

    #[test]
    fn conversion_prompt_carries_mapping_rules() {
        let prompt = conversion_prompt(&json!({}), &json!([]));
        assert!(prompt.contains("\"agenticdecision\""));
        assert!(prompt.contains("\"userInput\""));
        assert!(prompt.contains("\"predefined\""));
        assert!(prompt.contains("set choice to \"single\", otherwise \"multiple\""));
        assert!(prompt.contains("params.audio.text"));
        assert!(prompt.contains("Start with [ and end with ]"));
    }
}
