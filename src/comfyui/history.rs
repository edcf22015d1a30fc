//! Interpreting `/history/{id}` and `/queue` payloads.
//!
//! A history entry looks like
//! `{"<id>": {"outputs": {"<node>": {"gifs": [..]}}, "status": {"status_str": "success", "completed": true, "messages": [..]}}}`.
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::engine::JobStatus;

/// Output lists that carry video files.
const VIDEO_KEYS: &[&str] = &["gifs", "videos"];

/// Status recorded in history, or `None` when the job has no entry yet.
pub fn status_from_history(history: &Value, prompt_id: &str) -> Option<JobStatus> {
    let entry = history.get(prompt_id)?;
    let status = entry.get("status");
    let status_str = status.and_then(|s| s.get("status_str")).and_then(|s| s.as_str());
    let completed = status
        .and_then(|s| s.get("completed"))
        .and_then(|c| c.as_bool())
        .unwrap_or(false);

    Some(match status_str {
        Some("error") => JobStatus::Failed {
            detail: failure_detail(entry).unwrap_or_else(|| "execution failed".to_string()),
        },
        Some("success") if completed => JobStatus::Succeeded,
        // Older servers record no status block once finished.
        None if entry.get("outputs").map(|o| o.is_object()).unwrap_or(false) => JobStatus::Succeeded,
        _ => JobStatus::Running,
    })
}

fn failure_detail(entry: &Value) -> Option<String> {
    let messages = entry.get("status")?.get("messages")?.as_array()?;
    messages.iter().find_map(|msg| {
        let pair = msg.as_array()?;
        if pair.first()?.as_str()? != "execution_error" {
            return None;
        }
        let data = pair.get(1)?;
        let exception = data.get("exception_message").and_then(|m| m.as_str()).unwrap_or("").trim();
        match data.get("node_type").and_then(|n| n.as_str()) {
            Some(node) if !exception.is_empty() => Some(format!("{}: {}", node, exception)),
            _ if !exception.is_empty() => Some(exception.to_string()),
            _ => None,
        }
    })
}

/// Whether `/queue` lists the prompt under `list` (`queue_running` or `queue_pending`).
pub fn queue_contains(queue: &Value, list: &str, prompt_id: &str) -> bool {
    queue
        .get(list)
        .and_then(|l| l.as_array())
        .map(|items| {
            items.iter().any(|item| {
                item.as_array()
                    .and_then(|fields| fields.get(1))
                    .and_then(|id| id.as_str())
                    == Some(prompt_id)
            })
        })
        .unwrap_or(false)
}

/// Video files referenced by the job's outputs. `fullpath` wins when the
/// node reports one; otherwise the file is looked up under `output_dir`.
pub fn output_files(history: &Value, prompt_id: &str, output_dir: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    let Some(outputs) = history
        .get(prompt_id)
        .and_then(|e| e.get("outputs"))
        .and_then(|o| o.as_object())
    else {
        return files;
    };

    for node_output in outputs.values() {
        for key in VIDEO_KEYS {
            let Some(items) = node_output.get(*key).and_then(|v| v.as_array()) else { continue };
            for item in items {
                if let Some(full) = item.get("fullpath").and_then(|p| p.as_str()) {
                    files.push(PathBuf::from(full));
                } else if let Some(name) = item.get("filename").and_then(|f| f.as_str()) {
                    let subfolder = item.get("subfolder").and_then(|s| s.as_str()).unwrap_or("");
                    files.push(output_dir.join(subfolder).join(name));
                }
            }
        }
    }
    files
}
