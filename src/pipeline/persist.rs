//! JSON file I/O for stage inputs and outputs.
//!
//! Outputs are written with 2-space indentation and replace any existing
//! file at the same path. Writes go to a temporary sibling first and are
//! renamed into place, so an interrupted run never leaves a half-written
//! nodes file for the next stage to choke on.

use crate::error::FlowError;
use serde_json::Value;
use std::path::Path;
use tracing::debug;

/// Read and parse a JSON document.
///
/// `what` names the file in the missing-input hint ("template file", …).
pub async fn load_json(path: &Path, what: &str) -> Result<Value, FlowError> {
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => FlowError::input_not_found(path, what),
            std::io::ErrorKind::PermissionDenied => FlowError::PermissionDenied {
                path: path.to_path_buf(),
            },
            _ => FlowError::InvalidInputJson {
                path: path.to_path_buf(),
                detail: e.to_string(),
            },
        })?;

    serde_json::from_str(&text).map_err(|e| FlowError::InvalidInputJson {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })
}

/// Write `value` as 2-space indented JSON, creating parent directories and
/// overwriting any existing file.
pub async fn save_json(value: &Value, path: &Path) -> Result<(), FlowError> {
    let write_err = |source: std::io::Error| FlowError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }

    let text = serde_json::to_string_pretty(value)
        .map_err(|e| FlowError::Internal(format!("Failed to serialise JSON: {e}")))?;

    let tmp_path = path.with_extension("json.tmp");
    tokio::fs::write(&tmp_path, text.as_bytes())
        .await
        .map_err(write_err)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(write_err)?;

    debug!("Wrote {} bytes to {}", text.len(), path.display());
    Ok(())
}
