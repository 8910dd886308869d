//! Assistant responses from agent session transcripts.
//!
//! A transcript is JSONL, one entry per line. Assistant entries look like
//! `{"type":"assistant","message":{"role":"assistant","content":[{"type":"text","text":"..."}]},"uuid":"...","timestamp":"..."}`.
//! Non-text content blocks (tool use, thinking) are ignored and malformed
//! lines are skipped.

use std::collections::hash_map::DefaultHasher;
use std::fs;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::Deserialize;
use smol_str::{SmolStr, format_smolstr};

use crate::error::RecurateError;
use crate::types::ResponseExtracted;

#[derive(Deserialize)]
struct Entry {
    #[serde(rename = "type")]
    kind: String,
    message: Option<EntryMessage>,
    timestamp: Option<String>,
    uuid: Option<String>,
}

#[derive(Deserialize)]
struct EntryMessage {
    role: String,
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    text: Option<String>,
}

/// The text of one assistant turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptResponse {
    /// Markdown, text blocks joined by a blank line.
    pub text: String,
    pub message_id: SmolStr,
    /// As written in the transcript, usually RFC 3339.
    pub timestamp: Option<String>,
}

impl TranscriptResponse {
    /// Pair with rendered markup for delivery to the panel.
    pub fn into_extracted(self, html: String) -> ResponseExtracted {
        ResponseExtracted {
            html,
            text: self.text,
            message_id: self.message_id,
        }
    }
}

fn hash_text(text: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    text.hash(&mut hasher);
    hasher.finish()
}

/// Parse one transcript line. `None` for anything but an assistant turn
/// with at least one non-empty text block.
pub fn parse_assistant_line(line: &str) -> Option<TranscriptResponse> {
    let entry: Entry = match serde_json::from_str(line) {
        Ok(entry) => entry,
        Err(err) => {
            if !line.trim().is_empty() {
                tracing::trace!(error = %err, "skipping malformed transcript line");
            }
            return None;
        }
    };
    if entry.kind != "assistant" {
        return None;
    }
    let message = entry.message?;
    if message.role != "assistant" {
        return None;
    }

    let parts: Vec<String> = message
        .content
        .into_iter()
        .filter(|block| block.kind == "text")
        .filter_map(|block| block.text)
        .filter(|text| !text.is_empty())
        .collect();
    if parts.is_empty() {
        return None;
    }
    let text = parts.join("\n\n");

    let message_id = match entry.uuid {
        Some(uuid) => SmolStr::from(uuid),
        None => format_smolstr!("h-{:016x}", hash_text(&text)),
    };
    Some(TranscriptResponse {
        text,
        message_id,
        timestamp: entry.timestamp,
    })
}

/// Most recent assistant response in `jsonl`.
pub fn latest_response(jsonl: &str) -> Option<TranscriptResponse> {
    jsonl.lines().rev().find_map(parse_assistant_line)
}

/// Up to `limit` assistant responses, newest first.
pub fn recent_responses(jsonl: &str, limit: usize) -> Vec<TranscriptResponse> {
    jsonl
        .lines()
        .rev()
        .filter_map(parse_assistant_line)
        .take(limit)
        .collect()
}

/// Read a transcript file and return up to `limit` responses, newest first.
///
/// Errors when the file cannot be read or holds no assistant text.
pub fn read_recent(path: &Path, limit: usize) -> Result<Vec<TranscriptResponse>, RecurateError> {
    let jsonl = fs::read_to_string(path)
        .map_err(|err| RecurateError::Transcript(format!("{}: {err}", path.display())))?;
    let responses = recent_responses(&jsonl, limit);
    if responses.is_empty() {
        return Err(RecurateError::Transcript(format!(
            "{}: no assistant responses",
            path.display()
        )));
    }
    Ok(responses)
}

/// Directory name the agent uses for a workspace path.
///
/// `/Users/foo/myproject` becomes `-Users-foo-myproject`.
pub fn encode_project_path(path: &Path) -> String {
    path.to_string_lossy().replace('/', "-")
}

/// Find the transcript directory for `workspace` under `projects_root`.
///
/// Walks up from `workspace` so a subfolder of the project still matches.
/// The filesystem root itself is never tried.
pub fn find_project_dir(projects_root: &Path, workspace: &Path) -> Option<PathBuf> {
    let mut current = Some(workspace);
    while let Some(dir) = current {
        if dir.parent().is_none() || dir.as_os_str().is_empty() {
            break;
        }
        let candidate = projects_root.join(encode_project_path(dir));
        if candidate.is_dir() {
            tracing::debug!(candidate = %candidate.display(), "found project directory");
            return Some(candidate);
        }
        current = dir.parent();
    }
    None
}

/// Most recently modified `.jsonl` file directly inside `project_dir`.
pub fn find_active_session(project_dir: &Path) -> Option<PathBuf> {
    let entries = fs::read_dir(project_dir).ok()?;
    entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "jsonl"))
        .map(|path| {
            let modified = fs::metadata(&path)
                .and_then(|m| m.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            (modified, path)
        })
        .max_by_key(|(modified, _)| *modified)
        .map(|(_, path)| path)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRANSCRIPT: &str = r#"{"type":"user","message":{"role":"user","content":"hi"},"uuid":"u1"}
{"type":"assistant","message":{"role":"assistant","content":[{"type":"text","text":"First answer."}]},"uuid":"a1","timestamp":"2025-06-01T10:00:00Z"}
not json at all
{"type":"assistant","message":{"role":"assistant","content":[{"type":"tool_use","id":"t1","name":"Read","input":{}}]},"uuid":"a2"}
{"type":"assistant","message":{"role":"assistant","content":[{"type":"thinking","thinking":"hmm"},{"type":"text","text":"Part one."},{"type":"text","text":"Part two."}]},"uuid":"a3"}
{"type":"user","message":{"role":"user","content":[{"type":"tool_result","content":"ok"}]}}
"#;

    #[test]
    fn test_latest_skips_non_text_turns() {
        let latest = latest_response(TRANSCRIPT).unwrap();
        assert_eq!(latest.message_id, "a3");
        assert_eq!(latest.text, "Part one.\n\nPart two.");
        assert_eq!(latest.timestamp, None);
    }

    #[test]
    fn test_recent_newest_first() {
        let recent = recent_responses(TRANSCRIPT, 5);
        let ids: Vec<_> = recent.iter().map(|r| r.message_id.as_str()).collect();
        assert_eq!(ids, vec!["a3", "a1"]);
        assert_eq!(recent_responses(TRANSCRIPT, 1).len(), 1);
        assert_eq!(recent[1].timestamp.as_deref(), Some("2025-06-01T10:00:00Z"));
    }

    #[test]
    fn test_empty_transcript() {
        assert!(latest_response("").is_none());
        assert!(recent_responses("\n\n", 3).is_empty());
    }

    #[test]
    fn test_missing_uuid_gets_stable_id() {
        let line = r#"{"type":"assistant","message":{"role":"assistant","content":[{"type":"text","text":"same"}]}}"#;
        let a = parse_assistant_line(line).unwrap();
        let b = parse_assistant_line(line).unwrap();
        assert!(a.message_id.starts_with("h-"));
        assert_eq!(a.message_id, b.message_id);
    }

    #[test]
    fn test_into_extracted() {
        let r = latest_response(TRANSCRIPT).unwrap();
        let extracted = r.into_extracted("<p>Part one.</p>".into());
        assert_eq!(extracted.message_id, "a3");
        assert_eq!(extracted.html, "<p>Part one.</p>");
    }

    #[test]
    fn test_encode_project_path() {
        assert_eq!(
            encode_project_path(Path::new("/Users/foo/myproject")),
            "-Users-foo-myproject"
        );
    }

    #[test]
    fn test_find_project_dir_walks_up() {
        let root = std::env::temp_dir().join(format!("recurate-projects-{}", std::process::id()));
        let workspace = Path::new("/work/repo/sub/dir");
        let expected = root.join("-work-repo");
        fs::create_dir_all(&expected).unwrap();
        fs::write(expected.join("session.jsonl"), TRANSCRIPT).unwrap();
        fs::write(expected.join("notes.txt"), "x").unwrap();

        assert_eq!(find_project_dir(&root, workspace), Some(expected.clone()));
        assert_eq!(find_project_dir(&root, Path::new("/elsewhere")), None);
        assert_eq!(
            find_active_session(&expected),
            Some(expected.join("session.jsonl"))
        );

        let limited = read_recent(&expected.join("session.jsonl"), 1).unwrap();
        assert_eq!(limited[0].message_id, "a3");
        assert!(matches!(
            read_recent(&expected.join("notes.txt"), 1),
            Err(RecurateError::Transcript(_))
        ));

        fs::remove_dir_all(&root).unwrap();
    }
}
