//! Configuration: daemon paths plus the externally-owned persona file
//!
//! The persona file (config.json) is written by the reviewer UI and re-read
//! on every poll cycle, so edits take effect without a restart.

use crate::error::{Error, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// All configurable paths and constants
#[derive(Debug, Clone)]
pub struct Config {
    pub home: PathBuf,
    pub messages_db: PathBuf,
    pub base_dir: PathBuf,
    pub state_dir: PathBuf,
    pub logs_dir: PathBuf,
    pub persona_file: PathBuf,
    pub handoff_file: PathBuf,
    pub osascript: PathBuf,
    pub send_script: PathBuf,
    pub ollama_url: String,
    pub ollama_model: String,
    pub poll_interval_ms: u64,
    pub decision_poll_ms: u64,
    pub skip_own_messages: bool,
}

impl Default for Config {
    fn default() -> Self {
        let home = dirs::home_dir().expect("Could not find home directory");
        let base_dir = home.join("iMessageAI");

        Self {
            messages_db: home.join("Library/Messages/chat.db"),
            state_dir: base_dir.join("state"),
            logs_dir: base_dir.join("logs"),
            persona_file: base_dir.join("config.json"),
            handoff_file: base_dir.join("replies.json"),
            osascript: PathBuf::from("/usr/bin/osascript"),
            send_script: base_dir.join("send_imessage.applescript"),
            ollama_url: "http://localhost:11434".to_string(),
            ollama_model: "llama3.1:8b".to_string(),
            poll_interval_ms: 1000,
            decision_poll_ms: 1000,
            skip_own_messages: false,
            base_dir,
            home,
        }
    }
}

impl Config {
    /// Create config for testing with custom paths
    pub fn for_test(temp_dir: &Path) -> Self {
        Self {
            home: temp_dir.to_path_buf(),
            messages_db: temp_dir.join("chat.db"),
            base_dir: temp_dir.to_path_buf(),
            state_dir: temp_dir.join("state"),
            logs_dir: temp_dir.join("logs"),
            persona_file: temp_dir.join("config.json"),
            handoff_file: temp_dir.join("replies.json"),
            osascript: PathBuf::from("/usr/bin/osascript"),
            send_script: temp_dir.join("send_imessage.applescript"),
            ollama_url: "http://localhost:11434".to_string(),
            ollama_model: "llama3.1:8b".to_string(),
            poll_interval_ms: 10,
            decision_poll_ms: 10,
            skip_own_messages: false,
        }
    }
}

/// macOS epoch offset (2001-01-01 to 1970-01-01 in seconds)
pub const MACOS_EPOCH_OFFSET: i64 = 978307200;

/// Recipient list policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum PhoneListMode {
    Include,
    /// Everyone is eligible except listed identifiers
    #[default]
    Exclude,
}

/// Persona settings owned by the reviewer UI (config.json)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonaConfig {
    pub name: String,
    pub personal_description: String,
    /// Mood name -> behavioral description; insertion order drives display order
    pub moods: IndexMap<String, String>,
    #[serde(default)]
    pub phone_list_mode: PhoneListMode,
    #[serde(default)]
    pub phone_numbers: Vec<String>,
}

impl PersonaConfig {
    /// Load from disk, rejecting configs that cannot produce a valid reply set
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let persona: PersonaConfig = serde_json::from_str(&content)?;
        if persona.moods.is_empty() {
            return Err(Error::Config("no moods configured".to_string()));
        }
        Ok(persona)
    }
}
