/// Incremental SSE parser for the chat completion stream.
///
/// Fed raw text chunks as they arrive off the wire (possibly split
/// mid-line, mid-JSON, or mid-escape), it buffers to line boundaries and
/// emits typed events in strict arrival order. Lines that fail to parse are
/// skipped — some providers interleave keep-alive or comment lines and one
/// bad line must not kill the round.
use serde::Deserialize;

// ── Emitted events ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// A fragment of the model's reasoning trace.
    Reasoning(String),
    /// A fragment of the model's narrative text.
    Content(String),
    /// First sighting of a tool call: both id and name are now known.
    /// Emitted exactly once per index.
    ToolCallStart {
        index: usize,
        id: String,
        name: String,
    },
    /// A fragment of a tool call's serialized arguments.
    ToolCallArgumentsDelta { index: usize, fragment: String },
    /// The stream declared `finish_reason == "tool_calls"`: this call's
    /// arguments are complete. Emitted in ascending index order.
    ToolCallComplete { index: usize, arguments: String },
    Usage {
        prompt_tokens: u32,
        completion_tokens: u32,
        reasoning_tokens: u32,
    },
    /// Provider-reported in-stream error.
    Error(String),
    /// Transport stream ended.
    Done,
}

// ── Wire types ────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct StreamChunk {
    choices: Option<Vec<StreamChoice>>,
    usage: Option<UsageStats>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: Option<Delta>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Delta {
    content: Option<String>,
    /// Reasoning/thinking tokens from models that return them as a separate
    /// field (DeepSeek-R1, Qwen3 with thinking enabled, etc.)
    reasoning_content: Option<String>,
    tool_calls: Option<Vec<ToolCallDelta>>,
}

#[derive(Debug, Deserialize)]
struct ToolCallDelta {
    index: usize,
    id: Option<String>,
    function: Option<FunctionDelta>,
}

#[derive(Debug, Deserialize)]
struct FunctionDelta {
    name: Option<String>,
    arguments: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UsageStats {
    prompt_tokens: Option<u32>,
    completion_tokens: Option<u32>,
    completion_tokens_details: Option<CompletionDetails>,
}

#[derive(Debug, Deserialize)]
struct CompletionDetails {
    reasoning_tokens: Option<u32>,
}

// ── In-progress tool call accumulator ────────────────────────────────────────

#[derive(Default)]
struct PendingToolCall {
    id: String,
    name: String,
    arguments: String,
    started: bool,
}

// ── Parser ────────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct StreamParser {
    /// Partial line carried between chunks.
    line_buf: String,
    /// Index → accumulator. Cleared on every `finish_reason == "tool_calls"`,
    /// not on stream termination — one transport stream can carry several
    /// rounds of tool calls from some providers.
    pending: Vec<PendingToolCall>,
    done: bool,
}

impl StreamParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one transport chunk; returns the events completed by it.
    pub fn feed(&mut self, chunk: &str) -> Vec<StreamEvent> {
        self.line_buf.push_str(chunk);
        let mut events = Vec::new();
        while let Some(pos) = self.line_buf.find('\n') {
            let line: String = self.line_buf.drain(..=pos).collect();
            self.parse_line(line.trim(), &mut events);
        }
        events
    }

    /// Signal transport end: flush any held-back final line and emit `Done`.
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        if !self.line_buf.is_empty() {
            let line = std::mem::take(&mut self.line_buf);
            self.parse_line(line.trim(), &mut events);
        }
        if !self.done {
            self.done = true;
            events.push(StreamEvent::Done);
        }
        events
    }

    fn parse_line(&mut self, line: &str, out: &mut Vec<StreamEvent>) {
        if line.is_empty() || line == "data: [DONE]" {
            return;
        }
        let Some(json_str) = line.strip_prefix("data: ") else {
            return; // keep-alive / comment line
        };
        let chunk: StreamChunk = match serde_json::from_str(json_str) {
            Ok(v) => v,
            Err(_) => return, // tolerant: skip unparseable lines
        };

        if let Some(err) = chunk.error {
            out.push(StreamEvent::Error(
                err.message.unwrap_or_else(|| "unknown provider error".to_string()),
            ));
            return;
        }

        if let Some(usage) = chunk.usage {
            out.push(StreamEvent::Usage {
                prompt_tokens: usage.prompt_tokens.unwrap_or(0),
                completion_tokens: usage.completion_tokens.unwrap_or(0),
                reasoning_tokens: usage
                    .completion_tokens_details
                    .and_then(|d| d.reasoning_tokens)
                    .unwrap_or(0),
            });
        }

        for choice in chunk.choices.unwrap_or_default() {
            if let Some(delta) = choice.delta {
                if let Some(rc) = delta.reasoning_content {
                    if !rc.is_empty() {
                        out.push(StreamEvent::Reasoning(rc));
                    }
                }
                if let Some(text) = delta.content {
                    if !text.is_empty() {
                        out.push(StreamEvent::Content(text));
                    }
                }
                for tc_delta in delta.tool_calls.unwrap_or_default() {
                    self.apply_tool_call_delta(tc_delta, out);
                }
            }

            if choice.finish_reason.as_deref() == Some("tool_calls") {
                // Flush every index seen so far, ascending, and reset.
                for (index, call) in self.pending.drain(..).enumerate() {
                    if !call.name.is_empty() {
                        out.push(StreamEvent::ToolCallComplete {
                            index,
                            arguments: call.arguments,
                        });
                    }
                }
            }
        }
    }

    fn apply_tool_call_delta(&mut self, tc_delta: ToolCallDelta, out: &mut Vec<StreamEvent>) {
        let index = tc_delta.index;
        while self.pending.len() <= index {
            self.pending.push(PendingToolCall::default());
        }
        let entry = &mut self.pending[index];

        if let Some(id) = tc_delta.id {
            entry.id = id;
        }
        let mut fragment = None;
        if let Some(func) = tc_delta.function {
            if let Some(name) = func.name {
                entry.name.push_str(&name);
            }
            fragment = func.arguments;
        }

        if !entry.started && !entry.id.is_empty() && !entry.name.is_empty() {
            entry.started = true;
            out.push(StreamEvent::ToolCallStart {
                index,
                id: entry.id.clone(),
                name: entry.name.clone(),
            });
        }

        if let Some(args) = fragment {
            if !args.is_empty() {
                entry.arguments.push_str(&args);
                out.push(StreamEvent::ToolCallArgumentsDelta {
                    index,
                    fragment: args,
                });
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
