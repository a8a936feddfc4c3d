/// Durable project records.
///
/// One record per project: the buffers/metadata plus the full transcript,
/// saved as a single JSON file in `~/.local/share/pagecraft/projects/`.
/// Loading goes back through the reconstructor; the engine itself never
/// touches the filesystem.
use std::cmp::Reverse;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::project::ProjectState;
use crate::transcript::{Transcript, TranscriptEntry};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectRecord {
    /// RFC 3339 timestamp of the save
    pub saved_at: String,
    pub project: ProjectState,
    pub transcript: Vec<TranscriptEntry>,
}

// ── Directory helpers ─────────────────────────────────────────────────────────

pub fn records_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .ok()
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            PathBuf::from(std::env::var("HOME").unwrap_or_default()).join(".local/share")
        })
        .join("pagecraft/projects")
}

// ── Save / load ───────────────────────────────────────────────────────────────

/// Save under the records directory; returns the written path.
pub fn save(name: &str, project: &ProjectState, transcript: &Transcript) -> Result<PathBuf> {
    let dir = records_dir();
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("cannot create records dir {}", dir.display()))?;
    let path = dir.join(format!("{name}.json"));
    save_to(&path, project, transcript)?;
    Ok(path)
}

pub fn save_to(path: &Path, project: &ProjectState, transcript: &Transcript) -> Result<()> {
    let record = ProjectRecord {
        saved_at: chrono::Utc::now().to_rfc3339(),
        project: project.clone(),
        transcript: transcript.entries().to_vec(),
    };
    let json = serde_json::to_string_pretty(&record)?;
    std::fs::write(path, json)
        .with_context(|| format!("cannot write record to {}", path.display()))?;
    Ok(())
}

pub fn load(path: &Path) -> Result<ProjectRecord> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read record at {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("cannot parse record at {}", path.display()))
}

/// All saved records, newest first. Returns (name, path) pairs.
pub fn list_records() -> Result<Vec<(String, PathBuf)>> {
    let dir = records_dir();
    if !dir.exists() {
        return Ok(vec![]);
    }
    let mut entries: Vec<_> = std::fs::read_dir(&dir)?
        .flatten()
        .filter(|e| e.path().extension().map(|x| x == "json").unwrap_or(false))
        .collect();
    entries.sort_by_key(|e| Reverse(e.metadata().and_then(|m| m.modified()).ok()));
    Ok(entries
        .iter()
        .map(|e| {
            let name = e
                .file_name()
                .to_string_lossy()
                .trim_end_matches(".json")
                .to_string();
            (name, e.path())
        })
        .collect())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
