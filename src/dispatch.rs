//! Outbound dispatch via AppleScript
//!
//! Sends the chosen candidate with `osascript send_imessage.applescript
//! <recipient> <body>`. Failures are surfaced to the caller instead of being
//! swallowed; the daemon loop logs them and moves on.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::handoff::{Decision, HandoffRecord};
use std::path::PathBuf;
use std::process::Command;
use tracing::info;

pub struct Dispatcher {
    osascript: PathBuf,
    send_script: PathBuf,
}

impl Dispatcher {
    pub fn new(config: &Config) -> Self {
        Self {
            osascript: config.osascript.clone(),
            send_script: config.send_script.clone(),
        }
    }

    /// Act on a decided record. Returns true iff a send went out.
    pub fn dispatch(&self, record: &HandoffRecord) -> Result<bool> {
        match &record.decision {
            Decision::Ignore => {
                info!("Not sending reply to {}", record.sender);
                Ok(false)
            }
            // Nothing actionable; Refresh is handled before dispatch
            Decision::Pending | Decision::Refresh => Ok(false),
            Decision::Mood(mood) => {
                let body = record.replies.get(mood).ok_or_else(|| {
                    Error::Parse(format!("decision names unknown mood {:?}", mood))
                })?;
                self.send(&record.sender, body)?;
                Ok(true)
            }
        }
    }

    /// Fire one outbound message through the AppleScript hook
    pub fn send(&self, recipient: &str, body: &str) -> Result<()> {
        let output = Command::new(&self.osascript)
            .arg(&self.send_script)
            .arg(recipient)
            .arg(body)
            .output()?;

        if !output.status.success() {
            return Err(Error::SendFailed(format!(
                "osascript exited {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;
    use std::time::Duration;
    use tempfile::TempDir;

    fn record(decision: Decision) -> HandoffRecord {
        let mut replies = IndexMap::new();
        replies.insert("Happy".to_string(), "Hi! All good?".to_string());
        let mut record =
            HandoffRecord::new(replies, "+16175551234", "Hi", Duration::from_secs(1));
        record.decision = decision;
        record
    }

    /// Dispatcher whose "osascript" is /bin/sh running a capture script
    fn capturing_dispatcher(temp: &TempDir) -> (Dispatcher, std::path::PathBuf) {
        let sent_log = temp.path().join("sent.txt");
        let script = temp.path().join("send_imessage.sh");
        std::fs::write(&script, format!("echo \"$1|$2\" >> {}\n", sent_log.display())).unwrap();

        let mut config = Config::for_test(temp.path());
        config.osascript = PathBuf::from("/bin/sh");
        config.send_script = script;
        (Dispatcher::new(&config), sent_log)
    }

    #[test]
    fn test_ignore_sends_nothing() {
        let temp = TempDir::new().unwrap();
        let (dispatcher, sent_log) = capturing_dispatcher(&temp);

        let sent = dispatcher.dispatch(&record(Decision::Ignore)).unwrap();
        assert!(!sent);
        assert!(!sent_log.exists());
    }

    #[test]
    fn test_pending_and_refresh_send_nothing() {
        let temp = TempDir::new().unwrap();
        let (dispatcher, sent_log) = capturing_dispatcher(&temp);

        assert!(!dispatcher.dispatch(&record(Decision::Pending)).unwrap());
        assert!(!dispatcher.dispatch(&record(Decision::Refresh)).unwrap());
        assert!(!sent_log.exists());
    }

    #[test]
    fn test_mood_decision_sends_that_candidate_once() {
        let temp = TempDir::new().unwrap();
        let (dispatcher, sent_log) = capturing_dispatcher(&temp);

        let sent = dispatcher
            .dispatch(&record(Decision::Mood("Happy".to_string())))
            .unwrap();
        assert!(sent);

        let log = std::fs::read_to_string(&sent_log).unwrap();
        assert_eq!(log.lines().count(), 1);
        assert_eq!(log.trim(), "+16175551234|Hi! All good?");
    }

    #[test]
    fn test_unknown_mood_is_an_error() {
        let temp = TempDir::new().unwrap();
        let (dispatcher, sent_log) = capturing_dispatcher(&temp);

        let err = dispatcher
            .dispatch(&record(Decision::Mood("Nostalgic".to_string())))
            .unwrap_err();
        assert!(matches!(err, Error::Parse(_)));
        assert!(!sent_log.exists());
    }

    #[test]
    fn test_failing_send_surfaces_error() {
        let temp = TempDir::new().unwrap();
        let mut config = Config::for_test(temp.path());
        config.osascript = PathBuf::from("/bin/sh");
        let script = temp.path().join("fail.sh");
        std::fs::write(&script, "exit 7\n").unwrap();
        config.send_script = script;

        let dispatcher = Dispatcher::new(&config);
        let err = dispatcher
            .dispatch(&record(Decision::Mood("Happy".to_string())))
            .unwrap_err();
        assert!(matches!(err, Error::SendFailed(_)));
    }
}
