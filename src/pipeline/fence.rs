//! Code-fence stripping for model replies.
//!
//! Models are told to answer with bare JSON but still sometimes wrap it in a
//! markdown block. Only the canonical fence forms are recognised, by exact
//! pattern match:
//!
//! ```text
//! ```json        ```          ```{"a": 1}```
//! {"a": 1}       {"a": 1}
//! ```            ```
//! ```
//!
//! A reply cut off before its closing fence still has the opening fence
//! removed. Nothing inside the fence is touched, so a payload that happens to start
//! with letters of the language tag (`"json_key"`, `null`, …) survives.

use once_cell::sync::Lazy;
use regex::Regex;

static RE_FENCED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)\A```(?:[A-Za-z0-9_+.\-]*[ \t]*\r?\n)?(.*?)(?:\r?\n?[ \t]*```)?\z").unwrap()
});

/// Return the content of a fenced reply, or the trimmed reply when it is not fenced.
pub fn strip_code_fence(reply: &str) -> &str {
    let trimmed = reply.trim();
    match RE_FENCED.captures(trimmed).and_then(|caps| caps.get(1)) {
        Some(inner) => inner.as_str().trim(),
        None => trimmed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn parse(s: &str) -> Value {
        serde_json::from_str(s).unwrap()
    }

    #[test]
    fn strips_language_tagged_fence() {
        assert_eq!(strip_code_fence("```json\n{\"a\": 1}\n```"), "{\"a\": 1}");
    }

    #[test]
    fn strips_plain_fence() {
        assert_eq!(strip_code_fence("```\n[1, 2]\n```"), "[1, 2]");
    }

    #[test]
    fn strips_inline_fence() {
        assert_eq!(strip_code_fence("```{\"a\": 1}```"), "{\"a\": 1}");
    }

    #[test]
    fn tolerates_surrounding_whitespace_and_crlf() {
        assert_eq!(
            strip_code_fence("  \n```json\r\n{\"a\": 1}\r\n```\n\n"),
            "{\"a\": 1}"
        );
    }

    #[test]
    fn unfenced_passthrough() {
        assert_eq!(strip_code_fence("{\"a\": 1}"), "{\"a\": 1}");
        assert_eq!(strip_code_fence("  [1]\n"), "[1]");
    }

    #[test]
    fn does_not_eat_leading_letters_of_payload() {
        assert_eq!(strip_code_fence("```\nnull\n```"), "null");
        assert_eq!(strip_code_fence("```\n\"json\"\n```"), "\"json\"");
        assert_eq!(strip_code_fence("```json\n\"son\"\n```"), "\"son\"");
    }

    #[test]
    fn inline_fence_around_bare_word() {
        assert_eq!(strip_code_fence("```true```"), "true");
    }

    #[test]
    fn unterminated_fence_loses_opening_fence() {
        assert_eq!(strip_code_fence("```json\n{\"a\": 1}"), "{\"a\": 1}");
        assert_eq!(strip_code_fence("```\n[1, 2]\n"), "[1, 2]");
    }

    #[test]
    fn fenced_json_parses_identically_to_unfenced() {
        let docs = [
            json!({"nodes": [{"id": "1", "connections": ["2"]}]}),
            json!([{"id": 1, "text": "```not a fence```"}, {"id": 2}]),
            json!("json"),
            json!(true),
            json!([]),
        ];
        for doc in docs {
            for text in [doc.to_string(), serde_json::to_string_pretty(&doc).unwrap()] {
                for wrapped in [
                    format!("```json\n{text}\n```"),
                    format!("```\n{text}\n```"),
                    format!("```JSON\n{text}\n```\n"),
                    text.clone(),
                ] {
                    assert_eq!(parse(strip_code_fence(&wrapped)), doc, "input: {wrapped:?}");
                }
            }
        }
    }
}
