/// The transcript — the durable, ordered log of role-tagged entries.
///
/// The entry list is both the `messages` payload sent to the model and the
/// persisted conversation record, so there is exactly one representation to
/// keep correct. Entries are append-only, with one exception: reasoning
/// traces are stripped from assistant entries at the start of each new user
/// turn so only the most recent round's reasoning is ever resent.
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::project::ProjectState;

/// Marker line separating the project snapshot preface from the raw user
/// text inside a stored user entry.
pub const USER_MESSAGE_MARKER: &str = "=== USER MESSAGE ===";

// ── Entry types ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// One model-issued tool call as recorded in an assistant entry.
/// Array order equals invocation index order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallSpec {
    pub id: String,
    pub name: String,
    /// Serialized JSON arguments, kept verbatim as the model produced them.
    pub arguments: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptEntry {
    pub role: Role,
    /// Always serialized — the tool-call assistant entry carries an explicit
    /// JSON null here.
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub reasoning_trace: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub tool_calls: Option<Vec<ToolCallSpec>>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub tool_call_id: Option<String>,
}

impl TranscriptEntry {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: Some(content.into()),
            reasoning_trace: None,
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: Some(content.into()),
            reasoning_trace: None,
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn assistant_text(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: Some(content.into()),
            reasoning_trace: None,
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn assistant_tool_calls(
        reasoning_trace: Option<String>,
        tool_calls: Vec<ToolCallSpec>,
    ) -> Self {
        Self {
            role: Role::Assistant,
            content: None,
            reasoning_trace,
            tool_calls: Some(tool_calls),
            tool_call_id: None,
        }
    }

    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: Some(content.into()),
            reasoning_trace: None,
            tool_calls: None,
            tool_call_id: Some(tool_call_id.into()),
        }
    }
}

// ── Transcript store ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Transcript {
    entries: Vec<TranscriptEntry>,
}

impl Transcript {
    pub fn from_entries(entries: Vec<TranscriptEntry>) -> Self {
        Self { entries }
    }

    pub fn push(&mut self, entry: TranscriptEntry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Strip `reasoning_trace` from every assistant entry. Run at the start
    /// of each new user turn, before the new user entry is appended.
    pub fn redact_reasoning(&mut self) {
        for entry in &mut self.entries {
            if entry.role == Role::Assistant {
                entry.reasoning_trace = None;
            }
        }
    }

    /// The entry list as the wire `messages` array.
    pub fn wire_messages(&self) -> Value {
        serde_json::to_value(&self.entries).unwrap_or_else(|_| Value::Array(Vec::new()))
    }
}

// ── User-content wrapping ─────────────────────────────────────────────────────

/// Wrap raw user text with the current project snapshot and the fixed marker
/// line. This is the content stored in (and sent as) the user entry.
pub fn wrap_user_content(project: &ProjectState, raw: &str) -> String {
    format!("{}\n{}\n{}", project.snapshot(), USER_MESSAGE_MARKER, raw)
}

/// Recover the raw user text from a stored user entry: everything after the
/// first whole-line occurrence of the marker. Falls back to the verbatim
/// content when no marker is found. Heuristic: a project buffer whose
/// contents include the marker line will make this split too early.
pub fn extract_user_text(content: &str) -> &str {
    let bytes = content.as_bytes();
    for (pos, _) in content.match_indices(USER_MESSAGE_MARKER) {
        let at_line_start = pos == 0 || bytes[pos - 1] == b'\n';
        let after = pos + USER_MESSAGE_MARKER.len();
        let at_line_end = after == content.len() || bytes[after] == b'\n';
        if at_line_start && at_line_end {
            return if after < content.len() { &content[after + 1..] } else { "" };
        }
    }
    content
}

// ── Tests ─────────────────────────────────────────────────────────────────────
