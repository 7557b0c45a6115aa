//! Hand-off record shared with the reviewer UI
//!
//! replies.json is a single-writer/single-reader mailbox: the daemon writes
//! candidates with the Reply field pending, the reviewer UI overwrites Reply
//! with its decision. Last write wins; no locking. The mood candidates sit at
//! the top level of the JSON object next to the metadata fields, which is the
//! shape the UI expects.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::generator::MoodReplies;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::NamedTempFile;
use tracing::debug;

/// Reviewer decision carried in the `Reply` field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(from = "String", into = "String")]
pub enum Decision {
    /// Awaiting reviewer input (serialized as "")
    #[default]
    Pending,
    /// Discard candidates and regenerate
    Refresh,
    /// Suppress sending entirely
    Ignore,
    /// Send this mood's candidate
    Mood(String),
}

impl Decision {
    pub fn as_str(&self) -> &str {
        match self {
            Decision::Pending => "",
            Decision::Refresh => "Refresh",
            Decision::Ignore => "Ignore",
            Decision::Mood(mood) => mood,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Decision::Pending)
    }
}

impl From<String> for Decision {
    fn from(value: String) -> Self {
        match value.as_str() {
            "" => Decision::Pending,
            "Refresh" => Decision::Refresh,
            "Ignore" => Decision::Ignore,
            _ => Decision::Mood(value),
        }
    }
}

impl From<Decision> for String {
    fn from(value: Decision) -> Self {
        value.as_str().to_string()
    }
}

/// Candidate replies plus metadata, as stored in replies.json
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandoffRecord {
    #[serde(rename = "Reply", default)]
    pub decision: Decision,
    #[serde(default)]
    pub sender: String,
    #[serde(default)]
    pub message: String,
    /// Generation duration in seconds, stringly typed for the UI
    #[serde(default)]
    pub time: String,
    #[serde(flatten)]
    pub replies: MoodReplies,
}

impl HandoffRecord {
    pub fn new(replies: MoodReplies, sender: &str, message: &str, elapsed: Duration) -> Self {
        Self {
            decision: Decision::Pending,
            sender: sender.to_string(),
            message: message.to_string(),
            time: elapsed.as_secs_f64().to_string(),
            replies,
        }
    }
}

/// File-backed mailbox for hand-off records
#[derive(Clone)]
pub struct HandoffStore {
    path: PathBuf,
    poll_interval: Duration,
}

impl HandoffStore {
    pub fn new(config: &Config) -> Self {
        Self {
            path: config.handoff_file.clone(),
            poll_interval: Duration::from_millis(config.decision_poll_ms),
        }
    }

    /// Atomically overwrite the record with the decision forced to pending
    pub fn publish(&self, record: &HandoffRecord) -> Result<()> {
        let mut record = record.clone();
        record.decision = Decision::Pending;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        // Temp file in the same directory so the rename stays atomic
        let parent = self.path.parent().unwrap_or(std::path::Path::new("."));
        let mut temp = NamedTempFile::new_in(parent)?;

        let json = serde_json::to_string_pretty(&record)?;
        temp.write_all(json.as_bytes())?;
        temp.as_file().sync_all()?;

        temp.persist(&self.path).map_err(|e| Error::Io(e.error))?;

        Ok(())
    }

    pub fn read(&self) -> Result<HandoffRecord> {
        let content = fs::read_to_string(&self.path)?;
        let mut record: HandoffRecord = serde_json::from_str(&content)?;
        // The UI also writes the chosen text under a lowercase "reply" key;
        // the flatten collector would mistake it for a mood
        record.replies.shift_remove("reply");
        Ok(record)
    }

    /// Poll the record until the reviewer sets a non-pending decision.
    ///
    /// Read failures are tolerated: the UI replaces the file atomically, but
    /// a partially-synced read or a deleted file just means "poll again".
    pub async fn await_decision(&self) -> HandoffRecord {
        loop {
            match self.read() {
                Ok(record) if !record.decision.is_pending() => return record,
                Ok(_) => {}
                Err(e) => debug!("Hand-off record unreadable, will re-poll: {}", e),
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}
