/// Display-side conversation model.
///
/// A `DisplayMessage` is one conversational turn as shown to the user. An
/// assistant message accumulates segments across every round of one send —
/// narrative text, reasoning traces, and tool calls stay interleaved in the
/// order they streamed in. Segments are mutated only by the round
/// accumulator while a round is in flight, or rebuilt wholesale from the
/// transcript on reload; the presentation layer treats them as read-only.
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::transcript::ToolCallSpec;

// ── Segments ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Segment {
    Text {
        content: String,
    },
    Thinking {
        content: String,
        is_active: bool,
    },
    ToolCall {
        id: String,
        name: String,
        arguments: String,
        result: Option<String>,
        is_streaming: bool,
    },
}

impl Segment {
    pub fn kind(&self) -> &'static str {
        match self {
            Segment::Text { .. } => "text",
            Segment::Thinking { .. } => "thinking",
            Segment::ToolCall { .. } => "tool_call",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayMessage {
    pub id: u64,
    pub role: MessageRole,
    /// Concatenated narrative text across all rounds.
    pub text: String,
    pub segments: Vec<Segment>,
    pub is_streaming: bool,
}

impl DisplayMessage {
    pub fn user(id: u64, text: &str) -> Self {
        Self {
            id,
            role: MessageRole::User,
            text: text.to_string(),
            segments: vec![Segment::Text {
                content: text.to_string(),
            }],
            is_streaming: false,
        }
    }

    pub fn assistant(id: u64) -> Self {
        Self {
            id,
            role: MessageRole::Assistant,
            text: String::new(),
            segments: Vec::new(),
            is_streaming: true,
        }
    }
}

// ── Round accumulation ────────────────────────────────────────────────────────

/// Where a streaming tool call landed in the segment list.
#[derive(Debug, Clone)]
pub struct ToolCallRecord {
    pub id: String,
    pub name: String,
    pub segment: usize,
}

/// A tool call that has been dispatched, with its result.
#[derive(Debug, Clone)]
pub struct CompletedCall {
    pub id: String,
    pub name: String,
    pub arguments: String,
    pub result: String,
}

/// Per-round mutable state, created fresh for each round and dropped when
/// the round's transcript entries are committed. Owning the open-segment
/// bookkeeping here keeps rounds from leaking state into each other.
#[derive(Debug, Default)]
pub struct RoundAccumulator {
    pub text: String,
    pub reasoning: String,
    /// Segment index where this round began; the round's `Thinking` segment
    /// is inserted here.
    round_start: usize,
    text_segment: Option<usize>,
    thinking_segment: Option<usize>,
    calls: BTreeMap<usize, ToolCallRecord>,
    /// Dispatched calls in completion (= index) order.
    pub completed: Vec<CompletedCall>,
}

impl RoundAccumulator {
    pub fn begin(message: &DisplayMessage) -> Self {
        Self {
            round_start: message.segments.len(),
            ..Self::default()
        }
    }

    /// Pre-open an active `Thinking` segment, for models that declare
    /// reasoning support.
    pub fn open_thinking(&mut self, message: &mut DisplayMessage) {
        if self.thinking_segment.is_some() {
            return;
        }
        message.segments.push(Segment::Thinking {
            content: String::new(),
            is_active: true,
        });
        self.thinking_segment = Some(message.segments.len() - 1);
    }

    pub fn reasoning_delta(&mut self, message: &mut DisplayMessage, delta: &str) {
        self.reasoning.push_str(delta);
        match self.thinking_segment {
            Some(i) => {
                if let Segment::Thinking { content, .. } = &mut message.segments[i] {
                    content.push_str(delta);
                }
            }
            None => {
                // The round's Thinking segment goes at the front of this
                // round's segments, even when other content arrived first.
                message.segments.insert(
                    self.round_start,
                    Segment::Thinking {
                        content: delta.to_string(),
                        is_active: true,
                    },
                );
                self.thinking_segment = Some(self.round_start);
                if let Some(i) = &mut self.text_segment {
                    if *i >= self.round_start {
                        *i += 1;
                    }
                }
                for record in self.calls.values_mut() {
                    if record.segment >= self.round_start {
                        record.segment += 1;
                    }
                }
            }
        }
    }

    pub fn content_delta(&mut self, message: &mut DisplayMessage, delta: &str) {
        self.text.push_str(delta);
        message.text.push_str(delta);
        match self.text_segment {
            Some(i) => {
                if let Segment::Text { content } = &mut message.segments[i] {
                    content.push_str(delta);
                }
            }
            None => {
                message.segments.push(Segment::Text {
                    content: delta.to_string(),
                });
                self.text_segment = Some(message.segments.len() - 1);
            }
        }
    }

    pub fn tool_call_start(
        &mut self,
        message: &mut DisplayMessage,
        index: usize,
        id: String,
        name: String,
    ) {
        message.segments.push(Segment::ToolCall {
            id: id.clone(),
            name: name.clone(),
            arguments: String::new(),
            result: None,
            is_streaming: true,
        });
        self.calls.insert(
            index,
            ToolCallRecord {
                id,
                name,
                segment: message.segments.len() - 1,
            },
        );
    }

    pub fn call_name(&self, index: usize) -> Option<&str> {
        self.calls.get(&index).map(|r| r.name.as_str())
    }

    /// Finalize a dispatched call: fill in the segment and record it for the
    /// transcript commit.
    pub fn tool_call_complete(
        &mut self,
        message: &mut DisplayMessage,
        index: usize,
        arguments: String,
        result: String,
    ) {
        let Some(record) = self.calls.get(&index) else {
            return; // completion for a call that never started — drop it
        };
        if let Segment::ToolCall {
            arguments: seg_args,
            result: seg_result,
            is_streaming,
            ..
        } = &mut message.segments[record.segment]
        {
            *seg_args = arguments.clone();
            *seg_result = Some(result.clone());
            *is_streaming = false;
        }
        self.completed.push(CompletedCall {
            id: record.id.clone(),
            name: record.name.clone(),
            arguments,
            result,
        });
    }

    /// `Done` arrived: every `Thinking` segment goes inactive.
    pub fn finish(&mut self, message: &mut DisplayMessage) {
        for segment in &mut message.segments {
            if let Segment::Thinking { is_active, .. } = segment {
                *is_active = false;
            }
        }
    }

    /// The round's tool calls as transcript specs, in invocation index order.
    pub fn tool_call_specs(&self) -> Vec<ToolCallSpec> {
        self.completed
            .iter()
            .map(|call| ToolCallSpec {
                id: call.id.clone(),
                name: call.name.clone(),
                arguments: call.arguments.clone(),
            })
            .collect()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
