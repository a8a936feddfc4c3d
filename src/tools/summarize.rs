use serde_json::{Value, json};

pub fn definition() -> Value {
    json!({
        "name": "summarize_conversation",
        "description": "Record a summary of the conversation so far. Call this when asked to condense a long session; the summary is stored outside the conversation.",
        "parameters": {
            "type": "object",
            "properties": {
                "summary": {
                    "type": "string",
                    "description": "Concise summary of the conversation and project state"
                }
            },
            "required": ["summary"]
        }
    })
}

/// Acknowledge receipt. What to do with the summary (compacting the stored
/// transcript, surfacing it in a UI) is the embedding application's call,
/// not this engine's.
pub fn execute(args: &Value) -> Value {
    if args["summary"].as_str().is_none() {
        return json!({"success": false, "error": "missing 'summary'"});
    }
    json!({"success": true})
}

// ── Tests ─────────────────────────────────────────────────────────────────────
