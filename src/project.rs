/// Mutable project state — the thing the model's tools edit.
///
/// A project is three text buffers (markup, styles, script) plus metadata.
/// During a round the tool dispatcher is the only writer; between rounds the
/// surrounding application may edit the buffers directly.
use serde::{Deserialize, Serialize};

// ── Buffer targeting ──────────────────────────────────────────────────────────

/// Which of the three project buffers a tool call targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Buffer {
    Html,
    Css,
    Js,
}

impl Buffer {
    /// Display name used in the snapshot preface.
    pub fn file_name(self) -> &'static str {
        match self {
            Buffer::Html => "index.html",
            Buffer::Css => "styles.css",
            Buffer::Js => "script.js",
        }
    }

    /// Fence language tag for the snapshot code blocks.
    pub fn fence(self) -> &'static str {
        match self {
            Buffer::Html => "html",
            Buffer::Css => "css",
            Buffer::Js => "js",
        }
    }

    /// Suffix used in tool names ("write_html", "replace_in_javascript", ...).
    pub fn tool_suffix(self) -> &'static str {
        match self {
            Buffer::Html => "html",
            Buffer::Css => "css",
            Buffer::Js => "javascript",
        }
    }
}

// ── Project state ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectState {
    #[serde(default)]
    pub html: String,
    #[serde(default)]
    pub css: String,
    #[serde(default)]
    pub js: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl ProjectState {
    pub fn buffer(&self, target: Buffer) -> &str {
        match target {
            Buffer::Html => &self.html,
            Buffer::Css => &self.css,
            Buffer::Js => &self.js,
        }
    }

    pub fn buffer_mut(&mut self, target: Buffer) -> &mut String {
        match target {
            Buffer::Html => &mut self.html,
            Buffer::Css => &mut self.css,
            Buffer::Js => &mut self.js,
        }
    }

    /// Render the context snapshot prefixed to every user turn: line counts
    /// and fenced contents of each buffer, then the metadata lines.
    pub fn snapshot(&self) -> String {
        let mut s = String::from("Current project snapshot:\n\n");

        for target in [Buffer::Html, Buffer::Css, Buffer::Js] {
            let content = self.buffer(target);
            s.push_str(&format!(
                "{} ({} lines):\n```{}\n",
                target.file_name(),
                content.lines().count(),
                target.fence(),
            ));
            s.push_str(content);
            if !content.is_empty() && !content.ends_with('\n') {
                s.push('\n');
            }
            s.push_str("```\n\n");
        }

        s.push_str(&format!("Title: {}\n", self.field_or(&self.title, "(untitled)")));
        s.push_str(&format!(
            "Description: {}\n",
            self.field_or(&self.description, "(none)")
        ));
        if self.tags.is_empty() {
            s.push_str("Tags: (none)\n");
        } else {
            s.push_str(&format!("Tags: {}\n", self.tags.join(", ")));
        }
        s
    }

    fn field_or<'a>(&self, value: &'a str, fallback: &'a str) -> &'a str {
        if value.is_empty() { fallback } else { value }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_targeting() {
        let mut project = ProjectState::default();
        *project.buffer_mut(Buffer::Css) = "body { margin: 0; }".to_string();
        assert_eq!(project.css, "body { margin: 0; }");
        assert_eq!(project.buffer(Buffer::Css), "body { margin: 0; }");
        assert!(project.html.is_empty());
        assert!(project.js.is_empty());
    }

    #[test]
    fn test_snapshot_line_counts_and_fences() {
        let project = ProjectState {
            html: "<h1>Hi</h1>\n<p>two lines</p>".to_string(),
            title: "Demo".to_string(),
            ..Default::default()
        };
        let snap = project.snapshot();
        assert!(snap.contains("index.html (2 lines):"));
        assert!(snap.contains("styles.css (0 lines):"));
        assert!(snap.contains("```html\n<h1>Hi</h1>\n<p>two lines</p>\n```"));
        assert!(snap.contains("Title: Demo"));
        assert!(snap.contains("Tags: (none)"));
    }

    #[test]
    fn test_snapshot_empty_buffer_fence_is_closed() {
        let snap = ProjectState::default().snapshot();
        assert!(snap.contains("```css\n```"));
    }
}
