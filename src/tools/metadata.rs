use serde_json::{Value, json};

use crate::project::ProjectState;

pub fn definition() -> Value {
    json!({
        "name": "update_metadata",
        "description": "Update the project's title, description, and/or tags. Only the fields you pass are changed; the rest keep their current values.",
        "parameters": {
            "type": "object",
            "properties": {
                "title": {
                    "type": "string",
                    "description": "New project title"
                },
                "description": {
                    "type": "string",
                    "description": "New one-paragraph project description"
                },
                "tags": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "Replacement tag list"
                }
            },
            "required": []
        }
    })
}

/// Merge any subset of title/description/tags; unspecified fields are
/// untouched.
pub fn execute(project: &mut ProjectState, args: &Value) -> Value {
    let mut updated: Vec<&str> = Vec::new();

    if let Some(title) = args["title"].as_str() {
        project.title = title.to_string();
        updated.push("title");
    }
    if let Some(description) = args["description"].as_str() {
        project.description = description.to_string();
        updated.push("description");
    }
    if let Some(tags) = args["tags"].as_array() {
        project.tags = tags
            .iter()
            .filter_map(|t| t.as_str().map(str::to_string))
            .collect();
        updated.push("tags");
    }

    json!({"success": true, "updated": updated})
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_merge_leaves_other_fields_alone() {
        let mut project = ProjectState {
            title: "Old title".to_string(),
            description: "Old description".to_string(),
            tags: vec!["keep".to_string()],
            ..Default::default()
        };
        let result = execute(&mut project, &json!({"title": "New title"}));
        assert_eq!(result["success"], true);
        assert_eq!(project.title, "New title");
        assert_eq!(project.description, "Old description");
        assert_eq!(project.tags, vec!["keep"]);
    }

    #[test]
    fn test_tags_replaced_wholesale() {
        let mut project = ProjectState {
            tags: vec!["old".to_string()],
            ..Default::default()
        };
        execute(&mut project, &json!({"tags": ["game", "canvas"]}));
        assert_eq!(project.tags, vec!["game", "canvas"]);
    }

    #[test]
    fn test_empty_args_is_a_no_op_success() {
        let mut project = ProjectState {
            title: "Stays".to_string(),
            ..Default::default()
        };
        let result = execute(&mut project, &json!({}));
        assert_eq!(result["success"], true);
        assert_eq!(result["updated"].as_array().unwrap().len(), 0);
        assert_eq!(project.title, "Stays");
    }
}
