/// The round orchestrator.
///
/// One `send` covers a whole user turn: redact + append the user entry,
/// then loop request/response rounds until the model stops calling tools or
/// the round cap trips. Everything downstream of the socket — parsing,
/// segment mutation, tool dispatch — runs synchronously inside the stream
/// callback, so event arrival order is mutation order and no locking is
/// needed: the dispatcher is the only project writer while a round runs.
use anyhow::{Result, bail};
use tokio_util::sync::CancellationToken;

use crate::client::Client;
use crate::display::{DisplayMessage, RoundAccumulator};
use crate::project::ProjectState;
use crate::reconstruct;
use crate::stream::StreamEvent;
use crate::tools;
use crate::transcript::{Transcript, TranscriptEntry};

pub const DEFAULT_MAX_ROUNDS: usize = 12;

const SYSTEM_PROMPT: &str = r#"You are Pagecraft, an assistant that builds single-page web projects. A project is three buffers — index.html, styles.css, and script.js — plus a title, a description, and tags. You change the project only through the provided tools; every user message starts with a snapshot of the current buffers.

Guidelines:
- Use write_html / write_css / write_javascript to replace a whole buffer
- Use replace_in_* for targeted edits; the search string must match exactly once — if it matches nowhere or in several places the call fails and nothing changes
- Keep the three buffers consistent with each other after every change
- Update the title and description with update_metadata when the project's purpose changes
- When the requested change is complete, describe what you did and stop calling tools"#;

// ── Progress events (engine → caller) ─────────────────────────────────────────

/// Streaming notifications for callers that want to render progress live.
/// The display message list remains the canonical output; these are a
/// convenience mirror of it.
#[derive(Debug, Clone)]
pub enum Progress {
    /// A streamed narrative text chunk
    Text(String),
    /// A streamed reasoning chunk
    Reasoning(String),
    /// A tool call is about to stream its arguments
    ToolCallStarted { name: String },
    /// A tool call was dispatched
    ToolResult { name: String, result: String },
    /// A tool-call round was committed; another request follows
    RoundFinished { round: usize },
    /// Token usage reported by the provider for the current request
    Usage {
        prompt_tokens: u32,
        completion_tokens: u32,
        reasoning_tokens: u32,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UsageTotals {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub reasoning_tokens: u64,
}

// ── Engine ────────────────────────────────────────────────────────────────────

pub struct ChatEngine {
    client: Client,
    transcript: Transcript,
    project: ProjectState,
    messages: Vec<DisplayMessage>,
    usage: UsageTotals,
    busy: bool,
    next_message_id: u64,
    reasoning: bool,
    max_rounds: usize,
}

impl ChatEngine {
    pub fn new(client: Client, reasoning: bool, max_rounds: usize) -> Self {
        let mut transcript = Transcript::default();
        transcript.push(TranscriptEntry::system(SYSTEM_PROMPT));
        Self {
            client,
            transcript,
            project: ProjectState::default(),
            messages: Vec::new(),
            usage: UsageTotals::default(),
            busy: false,
            next_message_id: 0,
            reasoning,
            max_rounds,
        }
    }

    /// Resume from a saved record: restore the project and transcript, and
    /// rebuild the display list from the transcript.
    pub fn restore(
        client: Client,
        reasoning: bool,
        max_rounds: usize,
        project: ProjectState,
        transcript: Transcript,
    ) -> Self {
        let mut transcript = transcript;
        if transcript.is_empty() {
            transcript.push(TranscriptEntry::system(SYSTEM_PROMPT));
        }
        let messages = reconstruct::rebuild(transcript.entries());
        let next_message_id = messages.iter().map(|m| m.id + 1).max().unwrap_or(0);
        Self {
            client,
            transcript,
            project,
            messages,
            usage: UsageTotals::default(),
            busy: false,
            next_message_id,
            reasoning,
            max_rounds,
        }
    }

    pub fn messages(&self) -> &[DisplayMessage] {
        &self.messages
    }

    pub fn project(&self) -> &ProjectState {
        &self.project
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn usage(&self) -> UsageTotals {
        self.usage
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    /// Run one full user turn. Returns when the model finishes without tool
    /// calls, or with an error on transport failure, cancellation, missing
    /// credentials, or the round cap. On error the open display message is
    /// closed and the transcript keeps only fully committed rounds — the
    /// caller may retry the same turn.
    pub async fn send(
        &mut self,
        user_text: &str,
        cancel: &CancellationToken,
        mut on_progress: impl FnMut(Progress),
    ) -> Result<()> {
        if self.busy {
            bail!("a request is already in flight for this conversation");
        }
        self.busy = true;
        let result = self.run_rounds(user_text, cancel, &mut on_progress).await;
        if let Some(message) = self.messages.last_mut() {
            message.is_streaming = false;
        }
        self.busy = false;
        result
    }

    async fn run_rounds(
        &mut self,
        user_text: &str,
        cancel: &CancellationToken,
        on_progress: &mut impl FnMut(Progress),
    ) -> Result<()> {
        // Only the most recent round's reasoning is ever resent to the model
        self.transcript.redact_reasoning();
        let wrapped = crate::transcript::wrap_user_content(&self.project, user_text);
        self.transcript.push(TranscriptEntry::user(wrapped));

        let user_id = self.take_message_id();
        self.messages.push(DisplayMessage::user(user_id, user_text));
        let assistant_id = self.take_message_id();
        self.messages.push(DisplayMessage::assistant(assistant_id));

        let tool_definitions = tools::all_definitions();
        let thinking = self.reasoning;

        for round in 0..self.max_rounds {
            let wire = self.transcript.wire_messages();

            let client = &self.client;
            let message = self.messages.last_mut().expect("assistant message open");
            let project = &mut self.project;
            let usage = &mut self.usage;

            let mut acc = RoundAccumulator::begin(message);
            if thinking {
                acc.open_thinking(message);
            }

            client
                .chat(&wire, &tool_definitions, thinking, cancel, |event| {
                    apply_event(event, &mut acc, message, project, usage, on_progress);
                })
                .await?;

            if !self.commit_round(&acc) {
                return Ok(());
            }
            on_progress(Progress::RoundFinished { round });
        }

        // The model, not local logic, normally decides termination; the cap
        // bounds pathological tool-call loops.
        bail!("round limit ({}) reached without completion", self.max_rounds)
    }

    /// Append this round's transcript entries. Returns true when the round
    /// carried tool calls and another round must follow.
    fn commit_round(&mut self, acc: &RoundAccumulator) -> bool {
        if acc.completed.is_empty() {
            if !acc.text.is_empty() {
                self.transcript
                    .push(TranscriptEntry::assistant_text(acc.text.clone()));
            }
            return false;
        }

        let reasoning_trace = if acc.reasoning.is_empty() {
            None
        } else {
            Some(acc.reasoning.clone())
        };
        self.transcript.push(TranscriptEntry::assistant_tool_calls(
            reasoning_trace,
            acc.tool_call_specs(),
        ));
        for call in &acc.completed {
            self.transcript
                .push(TranscriptEntry::tool(call.id.clone(), call.result.clone()));
        }
        true
    }

    fn take_message_id(&mut self) -> u64 {
        let id = self.next_message_id;
        self.next_message_id += 1;
        id
    }
}

// ── Event application ─────────────────────────────────────────────────────────

/// Route one parser event into the round accumulator, dispatching tool
/// calls as they complete. Runs synchronously inside the stream callback.
fn apply_event(
    event: StreamEvent,
    acc: &mut RoundAccumulator,
    message: &mut DisplayMessage,
    project: &mut ProjectState,
    usage: &mut UsageTotals,
    on_progress: &mut impl FnMut(Progress),
) {
    match event {
        StreamEvent::Reasoning(delta) => {
            acc.reasoning_delta(message, &delta);
            on_progress(Progress::Reasoning(delta));
        }
        StreamEvent::Content(delta) => {
            acc.content_delta(message, &delta);
            on_progress(Progress::Text(delta));
        }
        StreamEvent::ToolCallStart { index, id, name } => {
            on_progress(Progress::ToolCallStarted { name: name.clone() });
            acc.tool_call_start(message, index, id, name);
        }
        // Arguments accumulate inside the parser; the segment gets the full
        // string on completion.
        StreamEvent::ToolCallArgumentsDelta { .. } => {}
        StreamEvent::ToolCallComplete { index, arguments } => {
            let Some(name) = acc.call_name(index).map(str::to_string) else {
                return;
            };
            let result = tools::dispatch(project, &name, &arguments);
            on_progress(Progress::ToolResult {
                name: name.clone(),
                result: result.clone(),
            });
            acc.tool_call_complete(message, index, arguments, result);
        }
        StreamEvent::Usage {
            prompt_tokens,
            completion_tokens,
            reasoning_tokens,
        } => {
            usage.prompt_tokens += u64::from(prompt_tokens);
            usage.completion_tokens += u64::from(completion_tokens);
            usage.reasoning_tokens += u64::from(reasoning_tokens);
            on_progress(Progress::Usage {
                prompt_tokens,
                completion_tokens,
                reasoning_tokens,
            });
        }
        // The client turns provider errors into transport failures before
        // the callback sees them.
        StreamEvent::Error(_) => {}
        StreamEvent::Done => acc.finish(message),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::Segment;
    use crate::transcript::Role;

    fn test_engine() -> ChatEngine {
        let client = Client::new("http://localhost:11434".to_string(), "test".to_string());
        ChatEngine::new(client, false, DEFAULT_MAX_ROUNDS)
    }

    /// Drive one round's events by hand, the way the stream callback would.
    fn play_round(
        engine: &mut ChatEngine,
        events: Vec<StreamEvent>,
    ) -> bool {
        let message = engine.messages.last_mut().unwrap();
        let mut acc = RoundAccumulator::begin(message);
        for event in events {
            apply_event(
                event,
                &mut acc,
                message,
                &mut engine.project,
                &mut engine.usage,
                &mut |_| {},
            );
        }
        engine.commit_round(&acc)
    }

    fn open_turn(engine: &mut ChatEngine, user_text: &str) {
        engine.transcript.redact_reasoning();
        let wrapped = crate::transcript::wrap_user_content(&engine.project, user_text);
        engine.transcript.push(TranscriptEntry::user(wrapped));
        let user_id = engine.take_message_id();
        engine
            .messages
            .push(DisplayMessage::user(user_id, user_text));
        let assistant_id = engine.take_message_id();
        engine.messages.push(DisplayMessage::assistant(assistant_id));
    }

    #[test]
    fn test_tool_call_round_commits_one_assistant_plus_tool_entries_in_order() {
        let mut engine = test_engine();
        open_turn(&mut engine, "build it");

        let more = play_round(
            &mut engine,
            vec![
                StreamEvent::ToolCallStart {
                    index: 0,
                    id: "c1".to_string(),
                    name: "write_css".to_string(),
                },
                StreamEvent::ToolCallStart {
                    index: 1,
                    id: "c2".to_string(),
                    name: "write_html".to_string(),
                },
                StreamEvent::ToolCallComplete {
                    index: 0,
                    arguments: r#"{"content":"button{color:red}"}"#.to_string(),
                },
                StreamEvent::ToolCallComplete {
                    index: 1,
                    arguments: r#"{"content":"<button>go</button>"}"#.to_string(),
                },
                StreamEvent::Done,
            ],
        );
        assert!(more);

        let entries = engine.transcript.entries();
        // system, user, assistant-with-tools, tool, tool
        assert_eq!(entries.len(), 5);
        assert_eq!(entries[2].role, Role::Assistant);
        assert!(entries[2].content.is_none());
        let calls = entries[2].tool_calls.as_ref().unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].id, "c1");
        assert_eq!(calls[1].id, "c2");
        assert_eq!(entries[3].role, Role::Tool);
        assert_eq!(entries[3].tool_call_id.as_deref(), Some("c1"));
        assert_eq!(entries[4].tool_call_id.as_deref(), Some("c2"));

        // Dispatch actually ran against the project
        assert_eq!(engine.project.css, "button{color:red}");
        assert_eq!(engine.project.html, "<button>go</button>");
    }

    #[test]
    fn test_text_only_round_terminates_with_single_entry() {
        let mut engine = test_engine();
        open_turn(&mut engine, "hi");
        let more = play_round(
            &mut engine,
            vec![
                StreamEvent::Content("Hello ".to_string()),
                StreamEvent::Content("there.".to_string()),
                StreamEvent::Done,
            ],
        );
        assert!(!more);
        let entries = engine.transcript.entries();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[2].content.as_deref(), Some("Hello there."));
        assert!(entries[2].tool_calls.is_none());
    }

    #[test]
    fn test_empty_final_round_appends_no_entry() {
        let mut engine = test_engine();
        open_turn(&mut engine, "hi");
        let more = play_round(&mut engine, vec![StreamEvent::Done]);
        assert!(!more);
        // system + user only
        assert_eq!(engine.transcript.len(), 2);
    }

    #[test]
    fn test_end_to_end_two_round_example() {
        // "make the button red": one tool round, then a plain-text round.
        let mut engine = test_engine();
        open_turn(&mut engine, "make the button red");

        let more = play_round(
            &mut engine,
            vec![
                StreamEvent::Content("I'll ".to_string()),
                StreamEvent::Content("update the CSS.".to_string()),
                StreamEvent::ToolCallStart {
                    index: 0,
                    id: "c1".to_string(),
                    name: "write_css".to_string(),
                },
                StreamEvent::ToolCallArgumentsDelta {
                    index: 0,
                    fragment: r#"{"content":"button{color:red}"}"#.to_string(),
                },
                StreamEvent::ToolCallComplete {
                    index: 0,
                    arguments: r#"{"content":"button{color:red}"}"#.to_string(),
                },
                StreamEvent::Done,
            ],
        );
        assert!(more);
        let more = play_round(
            &mut engine,
            vec![StreamEvent::Content("Done!".to_string()), StreamEvent::Done],
        );
        assert!(!more);

        // Four new entries beyond the system one
        let entries = engine.transcript.entries();
        assert_eq!(entries.len(), 5);
        let roles: Vec<Role> = entries.iter().map(|e| e.role).collect();
        assert_eq!(
            roles,
            vec![Role::System, Role::User, Role::Assistant, Role::Tool, Role::Assistant]
        );
        assert_eq!(
            entries[3].content.as_deref(),
            Some(r#"{"success":true,"lines":1}"#)
        );
        assert_eq!(entries[4].content.as_deref(), Some("Done!"));

        // The display message interleaved everything across both rounds
        let assistant = engine.messages.last().unwrap();
        let kinds: Vec<&str> = assistant.segments.iter().map(Segment::kind).collect();
        assert_eq!(kinds, vec!["text", "tool_call", "text"]);
        assert_eq!(assistant.text, "I'll update the CSS.Done!");
    }

    #[test]
    fn test_round_trip_against_reconstructor() {
        // Live: reasoning + tool round, then a text round; the rebuilt
        // message must have the same segment kinds and text, with results
        // and activity normalized away.
        let mut engine = test_engine();
        open_turn(&mut engine, "add a heading");

        play_round(
            &mut engine,
            vec![
                StreamEvent::Reasoning("the page needs an h1".to_string()),
                StreamEvent::ToolCallStart {
                    index: 0,
                    id: "c1".to_string(),
                    name: "write_html".to_string(),
                },
                StreamEvent::ToolCallComplete {
                    index: 0,
                    arguments: r#"{"content":"<h1>Hi</h1>"}"#.to_string(),
                },
                StreamEvent::Done,
            ],
        );
        play_round(
            &mut engine,
            vec![StreamEvent::Content("Added.".to_string()), StreamEvent::Done],
        );

        let rebuilt = reconstruct::rebuild(engine.transcript.entries());
        let live = engine.messages();

        assert_eq!(rebuilt.len(), live.len());
        for (a, b) in rebuilt.iter().zip(live) {
            assert_eq!(a.role, b.role);
            assert_eq!(a.text, b.text);
            let a_kinds: Vec<&str> = a.segments.iter().map(Segment::kind).collect();
            let b_kinds: Vec<&str> = b.segments.iter().map(Segment::kind).collect();
            assert_eq!(a_kinds, b_kinds);
        }
        // Normalizations: no results, nothing active
        for message in &rebuilt {
            for segment in &message.segments {
                match segment {
                    Segment::ToolCall { result, is_streaming, .. } => {
                        assert!(result.is_none());
                        assert!(!is_streaming);
                    }
                    Segment::Thinking { is_active, .. } => assert!(!is_active),
                    Segment::Text { .. } => {}
                }
            }
        }
    }

    #[test]
    fn test_reasoning_redacted_on_next_user_turn() {
        let mut engine = test_engine();
        open_turn(&mut engine, "first");
        play_round(
            &mut engine,
            vec![
                StreamEvent::Reasoning("private thoughts".to_string()),
                StreamEvent::ToolCallStart {
                    index: 0,
                    id: "c1".to_string(),
                    name: "update_metadata".to_string(),
                },
                StreamEvent::ToolCallComplete {
                    index: 0,
                    arguments: r#"{"title":"T"}"#.to_string(),
                },
                StreamEvent::Done,
            ],
        );
        assert_eq!(
            engine.transcript.entries()[2].reasoning_trace.as_deref(),
            Some("private thoughts")
        );

        // The next user turn strips it before anything is sent
        open_turn(&mut engine, "second");
        assert!(engine.transcript.entries()[2].reasoning_trace.is_none());
    }

    #[tokio::test]
    async fn test_busy_guard_rejects_concurrent_send() {
        let mut engine = test_engine();
        engine.busy = true;
        let cancel = CancellationToken::new();
        let err = engine.send("hi", &cancel, |_| {}).await.unwrap_err();
        assert!(err.to_string().contains("already in flight"));
        // The rejected send must not have touched the transcript
        assert_eq!(engine.transcript.len(), 1);
    }

    #[tokio::test]
    async fn test_round_cap_is_surfaced_as_an_error() {
        let client = Client::new("http://localhost:11434".to_string(), "test".to_string());
        let mut engine = ChatEngine::new(client, false, 0);
        let cancel = CancellationToken::new();
        let err = engine.send("hi", &cancel, |_| {}).await.unwrap_err();
        assert!(err.to_string().contains("round limit"));
        // The user entry from this turn is retained for retry
        assert_eq!(engine.transcript.len(), 2);
        assert!(!engine.messages.last().unwrap().is_streaming);
        assert!(!engine.is_busy());
    }

    #[test]
    fn test_restore_rebuilds_display_from_transcript() {
        let mut engine = test_engine();
        open_turn(&mut engine, "make a page");
        play_round(
            &mut engine,
            vec![StreamEvent::Content("Sure.".to_string()), StreamEvent::Done],
        );

        let client = Client::new("http://localhost:11434".to_string(), "test".to_string());
        let restored = ChatEngine::restore(
            client,
            false,
            DEFAULT_MAX_ROUNDS,
            engine.project.clone(),
            engine.transcript.clone(),
        );
        assert_eq!(restored.messages().len(), 2);
        assert_eq!(restored.messages()[1].text, "Sure.");
        assert!(!restored.is_busy());
    }
}
