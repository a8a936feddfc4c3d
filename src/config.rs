use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use crate::engine::DEFAULT_MAX_ROUNDS;

// ── Profile ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    /// OpenAI-compatible endpoint URL
    pub endpoint: String,
    /// Model identifier
    pub model: String,
    /// Optional API key (sent as Bearer token)
    pub api_key: Option<String>,
    /// Refuse to send requests without an API key. Leave false for local
    /// endpoints that don't need one.
    #[serde(default)]
    pub auth_required: bool,
    /// The model streams a separate reasoning trace; pre-opens a thinking
    /// segment and requests thinking mode.
    #[serde(default)]
    pub reasoning: bool,
    /// Upper bound on tool-call rounds per user turn.
    #[serde(default = "default_max_rounds")]
    pub max_rounds: usize,
}

fn default_max_rounds() -> usize {
    DEFAULT_MAX_ROUNDS
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:11434".to_string(),
            model: "qwen3:14b".to_string(),
            api_key: None,
            auth_required: false,
            reasoning: false,
            max_rounds: default_max_rounds(),
        }
    }
}

// ── Config file ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ConfigFile {
    /// Which profile to use when none is specified
    #[serde(default = "default_profile_name")]
    pub default_profile: String,

    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

fn default_profile_name() -> String {
    "default".to_string()
}

impl ConfigFile {
    /// Load from disk, or return a default config if the file doesn't exist yet.
    pub fn load() -> Result<Self> {
        let path = config_path();
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file at {}", path.display()))?;
        toml::from_str(&raw)
            .with_context(|| format!("Failed to parse config file at {}", path.display()))
    }

    /// Write a starter config file to disk (only if it doesn't exist).
    pub fn write_default_if_missing() -> Result<PathBuf> {
        let path = config_path();
        if path.exists() {
            return Ok(path);
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, DEFAULT_CONFIG_TOML)?;
        Ok(path)
    }

    /// Resolve the active profile given an optional override name.
    pub fn resolve_profile(&self, name: Option<&str>) -> Option<&Profile> {
        let key = name.unwrap_or(&self.default_profile);
        self.profiles.get(key)
    }
}

// ── Resolved runtime config (after merging file + CLI overrides) ──────────────

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub endpoint: String,
    pub model: String,
    pub api_key: Option<String>,
    pub auth_required: bool,
    pub reasoning: bool,
    pub max_rounds: usize,
    /// Profile name that was resolved (for display)
    pub profile_name: String,
}

impl ResolvedConfig {
    /// Merge config file profile with CLI overrides.
    /// Priority: CLI args > env vars (handled by clap) > config file profile > built-in defaults
    pub fn resolve(
        file: &ConfigFile,
        profile_override: Option<&str>,
        endpoint_override: Option<&str>,
        model_override: Option<&str>,
        api_key_override: Option<&str>,
    ) -> Self {
        let profile_name = profile_override
            .unwrap_or(&file.default_profile)
            .to_string();

        let base = file
            .resolve_profile(profile_override)
            .cloned()
            .unwrap_or_default();

        Self {
            endpoint: endpoint_override
                .map(str::to_string)
                .unwrap_or(base.endpoint),
            model: model_override.map(str::to_string).unwrap_or(base.model),
            api_key: api_key_override.map(str::to_string).or(base.api_key),
            auth_required: base.auth_required,
            reasoning: base.reasoning,
            max_rounds: base.max_rounds,
            profile_name,
        }
    }
}

// ── Paths ─────────────────────────────────────────────────────────────────────

pub fn config_path() -> PathBuf {
    dirs_config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("pagecraft")
        .join("config.toml")
}

fn dirs_config_dir() -> Option<PathBuf> {
    // XDG_CONFIG_HOME or ~/.config on Linux/macOS
    std::env::var("XDG_CONFIG_HOME")
        .ok()
        .map(PathBuf::from)
        .or_else(|| {
            std::env::var("HOME")
                .ok()
                .map(|h| PathBuf::from(h).join(".config"))
        })
}

// ── Default config template written on first run ──────────────────────────────

const DEFAULT_CONFIG_TOML: &str = r#"# Pagecraft configuration
# Run `pagecraft --init` to regenerate this file.

default_profile = "local"

# ── Local Ollama (default) ────────────────────────────────────────────────────
[profiles.local]
endpoint = "http://localhost:11434"
model    = "qwen3:14b"
# api_key is not needed for Ollama

# ── DeepSeek reasoner — streams a separate reasoning trace ───────────────────
# [profiles.deepseek]
# endpoint      = "https://api.deepseek.com"
# model         = "deepseek-reasoner"
# api_key       = "sk-..."
# auth_required = true
# reasoning     = true

# ── OpenAI ───────────────────────────────────────────────────────────────────
# [profiles.openai]
# endpoint      = "https://api.openai.com/v1"
# model         = "gpt-4o"
# api_key       = "sk-..."
# auth_required = true

# ── Per-profile knobs ─────────────────────────────────────────────────────────
# max_rounds = 12   # tool-call rounds allowed per user turn
"#;

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_template_parses() {
        let file: ConfigFile = toml::from_str(DEFAULT_CONFIG_TOML).unwrap();
        assert_eq!(file.default_profile, "local");
        let local = file.profiles.get("local").unwrap();
        assert_eq!(local.endpoint, "http://localhost:11434");
        assert!(!local.auth_required);
        assert_eq!(local.max_rounds, DEFAULT_MAX_ROUNDS);
    }

    #[test]
    fn test_cli_overrides_beat_profile_values() {
        let mut file = ConfigFile::default();
        file.profiles.insert(
            "cloud".to_string(),
            Profile {
                endpoint: "https://api.example.com".to_string(),
                model: "big-model".to_string(),
                api_key: Some("from-file".to_string()),
                auth_required: true,
                reasoning: true,
                max_rounds: 5,
            },
        );
        let resolved = ResolvedConfig::resolve(
            &file,
            Some("cloud"),
            Some("http://localhost:9999"),
            None,
            Some("from-cli"),
        );
        assert_eq!(resolved.endpoint, "http://localhost:9999");
        assert_eq!(resolved.model, "big-model");
        assert_eq!(resolved.api_key.as_deref(), Some("from-cli"));
        assert!(resolved.auth_required);
        assert!(resolved.reasoning);
        assert_eq!(resolved.max_rounds, 5);
    }

    #[test]
    fn test_unknown_profile_falls_back_to_defaults() {
        let file = ConfigFile::default();
        let resolved = ResolvedConfig::resolve(&file, Some("missing"), None, None, None);
        assert_eq!(resolved.endpoint, "http://localhost:11434");
        assert_eq!(resolved.profile_name, "missing");
    }
}
