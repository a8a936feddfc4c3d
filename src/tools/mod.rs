pub mod metadata;
pub mod replace;
pub mod summarize;
pub mod write;

use serde_json::{Value, json};

use crate::project::{Buffer, ProjectState};

/// All available tool definitions (sent to the model), in schema order.
pub fn all_definitions() -> Vec<Value> {
    vec![
        write::definition(Buffer::Html),
        write::definition(Buffer::Css),
        write::definition(Buffer::Js),
        replace::definition(Buffer::Html),
        replace::definition(Buffer::Css),
        replace::definition(Buffer::Js),
        metadata::definition(),
        summarize::definition(),
    ]
}

/// Execute a tool call against the project state. Never fails from the
/// caller's point of view: argument parse errors, missing fields, and
/// unknown tool names all come back as `{"success":false,"error":...}`
/// payloads, serialized for the tool-role transcript entry the model sees.
pub fn dispatch(project: &mut ProjectState, name: &str, raw_args: &str) -> String {
    let result = match serde_json::from_str::<Value>(raw_args) {
        Err(e) => json!({"success": false, "error": format!("invalid arguments: {e}")}),
        Ok(args) => match name {
            "write_html" => write::execute(project, Buffer::Html, &args),
            "write_css" => write::execute(project, Buffer::Css, &args),
            "write_javascript" => write::execute(project, Buffer::Js, &args),
            "replace_in_html" => replace::execute(project, Buffer::Html, &args),
            "replace_in_css" => replace::execute(project, Buffer::Css, &args),
            "replace_in_javascript" => replace::execute(project, Buffer::Js, &args),
            "update_metadata" => metadata::execute(project, &args),
            "summarize_conversation" => summarize::execute(&args),
            other => json!({"success": false, "error": format!("unknown tool '{other}'")}),
        },
    };
    result.to_string()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
