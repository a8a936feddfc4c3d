/// Rebuilds the display model from a stored transcript.
///
/// This is the reload path: no network, no dispatch — just a deterministic
/// walk over the role-tagged entries that must produce the same structure
/// live construction would have, with two normalizations: tool results are
/// not persisted (they go to the model once), so every rebuilt `ToolCall`
/// has `result: None`; and every `Thinking` segment comes back inactive.
use crate::display::{DisplayMessage, MessageRole, Segment};
use crate::transcript::{Role, TranscriptEntry, extract_user_text};

pub fn rebuild(entries: &[TranscriptEntry]) -> Vec<DisplayMessage> {
    let mut messages: Vec<DisplayMessage> = Vec::new();
    let mut open: Option<DisplayMessage> = None;
    let mut next_id = 0u64;

    for entry in entries {
        match entry.role {
            Role::System => {}
            Role::User => {
                if let Some(message) = open.take() {
                    messages.push(message);
                }
                let raw = extract_user_text(entry.content.as_deref().unwrap_or(""));
                messages.push(DisplayMessage::user(next_id, raw));
                next_id += 1;
            }
            Role::Assistant => {
                let message = open.get_or_insert_with(|| {
                    let message = DisplayMessage {
                        id: next_id,
                        role: MessageRole::Assistant,
                        text: String::new(),
                        segments: Vec::new(),
                        is_streaming: false,
                    };
                    next_id += 1;
                    message
                });

                if let Some(trace) = &entry.reasoning_trace {
                    message.segments.push(Segment::Thinking {
                        content: trace.clone(),
                        is_active: false,
                    });
                }
                if let Some(calls) = &entry.tool_calls {
                    for call in calls {
                        message.segments.push(Segment::ToolCall {
                            id: call.id.clone(),
                            name: call.name.clone(),
                            arguments: call.arguments.clone(),
                            result: None,
                            is_streaming: false,
                        });
                    }
                }
                if let Some(content) = &entry.content {
                    if !content.is_empty() {
                        if let Some(Segment::Text { content: existing }) =
                            message.segments.last_mut()
                        {
                            existing.push_str(content);
                        } else {
                            message.segments.push(Segment::Text {
                                content: content.clone(),
                            });
                        }
                        message.text.push_str(content);
                    }
                }
            }
            // Tool results were consumed by the model; they render nothing
            // and never open or close a message.
            Role::Tool => {}
        }
    }

    if let Some(message) = open.take() {
        messages.push(message);
    }
    messages
}

// ── Tests ─────────────────────────────────────────────────────────────────────
