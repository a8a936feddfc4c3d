use serde_json::{Value, json};

use crate::project::{Buffer, ProjectState};

pub fn definition(target: Buffer) -> Value {
    json!({
        "name": format!("write_{}", target.tool_suffix()),
        "description": format!(
            "Replace the entire contents of {} with new content. Use this for rewrites or first-time writes; for small edits prefer replace_in_{}.",
            target.file_name(),
            target.tool_suffix(),
        ),
        "parameters": {
            "type": "object",
            "properties": {
                "content": {
                    "type": "string",
                    "description": "Full new contents of the buffer"
                }
            },
            "required": ["content"]
        }
    })
}

/// Unconditional full-buffer replace.
pub fn execute(project: &mut ProjectState, target: Buffer, args: &Value) -> Value {
    let Some(content) = args["content"].as_str() else {
        return json!({"success": false, "error": "missing 'content'"});
    };
    let lines = content.lines().count();
    *project.buffer_mut(target) = content.to_string();
    json!({"success": true, "lines": lines})
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_replaces_buffer_and_reports_lines() {
        let mut project = ProjectState {
            css: "old".to_string(),
            ..Default::default()
        };
        let result = execute(
            &mut project,
            Buffer::Css,
            &json!({"content": "button {\n  color: red;\n}"}),
        );
        assert_eq!(result, json!({"success": true, "lines": 3}));
        assert_eq!(project.css, "button {\n  color: red;\n}");
    }

    #[test]
    fn test_write_empty_content_is_valid() {
        let mut project = ProjectState {
            js: "console.log(1);".to_string(),
            ..Default::default()
        };
        let result = execute(&mut project, Buffer::Js, &json!({"content": ""}));
        assert_eq!(result, json!({"success": true, "lines": 0}));
        assert!(project.js.is_empty());
    }

    #[test]
    fn test_missing_content_is_an_error_payload() {
        let mut project = ProjectState::default();
        let result = execute(&mut project, Buffer::Html, &json!({"contents": "typo"}));
        assert_eq!(result["success"], false);
        assert_eq!(result["error"], "missing 'content'");
    }
}
