use serde_json::{Value, json};

use crate::project::{Buffer, ProjectState};

pub fn definition(target: Buffer) -> Value {
    json!({
        "name": format!("replace_in_{}", target.tool_suffix()),
        "description": format!(
            "Replace an exact string in {}. The search string must match exactly once — zero matches or several matches fail and change nothing, so include enough surrounding context to pin down one location.",
            target.file_name(),
        ),
        "parameters": {
            "type": "object",
            "properties": {
                "search": {
                    "type": "string",
                    "description": "Exact string to find (whitespace included)"
                },
                "replace": {
                    "type": "string",
                    "description": "Replacement string"
                }
            },
            "required": ["search", "replace"]
        }
    })
}

/// Single-substitution replace. The search string must match exactly once;
/// zero or several matches fail and leave the buffer untouched.
pub fn execute(project: &mut ProjectState, target: Buffer, args: &Value) -> Value {
    let Some(search) = args["search"].as_str() else {
        return json!({"success": false, "error": "missing 'search'"});
    };
    let Some(replacement) = args["replace"].as_str() else {
        return json!({"success": false, "error": "missing 'replace'"});
    };

    let buffer = project.buffer_mut(target);
    let count = buffer.matches(search).count();
    if count == 0 {
        return json!({"success": false, "error": "not found"});
    }
    if count > 1 {
        return json!({"success": false, "error": format!("ambiguous ({count} matches)")});
    }

    *buffer = buffer.replacen(search, replacement, 1);
    json!({"success": true, "replaced": 1})
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn project_with_css(css: &str) -> ProjectState {
        ProjectState {
            css: css.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_unique_match_replaced() {
        let mut project = project_with_css("button { color: blue; }");
        let result = execute(
            &mut project,
            Buffer::Css,
            &json!({"search": "color: blue", "replace": "color: red"}),
        );
        assert_eq!(result, json!({"success": true, "replaced": 1}));
        assert_eq!(project.css, "button { color: red; }");
    }

    #[test]
    fn test_zero_matches_not_found() {
        let mut project = project_with_css("button { color: blue; }");
        let result = execute(
            &mut project,
            Buffer::Css,
            &json!({"search": "color: green", "replace": "color: red"}),
        );
        assert_eq!(result, json!({"success": false, "error": "not found"}));
        assert_eq!(project.css, "button { color: blue; }");
    }

    #[test]
    fn test_multiple_matches_ambiguous_and_untouched() {
        let mut project = project_with_css("a { margin: 0; }\nb { margin: 0; }");
        let result = execute(
            &mut project,
            Buffer::Css,
            &json!({"search": "margin: 0", "replace": "margin: 1em"}),
        );
        assert_eq!(
            result,
            json!({"success": false, "error": "ambiguous (2 matches)"})
        );
        assert_eq!(project.css, "a { margin: 0; }\nb { margin: 0; }");
    }

    #[test]
    fn test_same_replace_twice_is_not_idempotent() {
        // First call consumes the match; the identical second call must
        // report "not found" rather than quietly succeeding.
        let mut project = project_with_css("h1 { font-size: 2em; }");
        let args = json!({"search": "font-size: 2em", "replace": "font-size: 3em"});
        let first = execute(&mut project, Buffer::Css, &args);
        assert_eq!(first["success"], true);
        let second = execute(&mut project, Buffer::Css, &args);
        assert_eq!(second, json!({"success": false, "error": "not found"}));
    }

    #[test]
    fn test_missing_fields_are_error_payloads() {
        let mut project = project_with_css("x");
        let result = execute(&mut project, Buffer::Css, &json!({"search": "x"}));
        assert_eq!(result["error"], "missing 'replace'");
        let result = execute(&mut project, Buffer::Css, &json!({"replace": "y"}));
        assert_eq!(result["error"], "missing 'search'");
    }
}
