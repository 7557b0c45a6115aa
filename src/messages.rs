//! Messages.app database reader
//!
//! Reads the most recent message from ~/Library/Messages/chat.db. Newer
//! macOS versions leave the `text` column NULL and store the body inside the
//! `attributedBody` NSArchiver blob, so we fall back to scanning that.

use crate::config::{Config, MACOS_EPOCH_OFFSET};
use crate::error::Result;
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{Connection, OpenFlags, OptionalExtension};
use std::path::PathBuf;

/// The most recent inbound message
#[derive(Debug, Clone, PartialEq)]
pub struct IncomingMessage {
    pub text: String,
    /// Handle identifier of the sender (phone number or email); empty when
    /// the row has no handle (e.g. sent from this machine)
    pub sender: String,
    pub timestamp: DateTime<Utc>,
    pub is_from_me: bool,
}

/// Reader for the Messages.app database
pub struct MessagesReader {
    db_path: PathBuf,
}

impl MessagesReader {
    pub fn new(config: &Config) -> Self {
        Self {
            db_path: config.messages_db.clone(),
        }
    }

    /// Open database connection (read-only to avoid lock contention)
    fn open_db(&self) -> Result<Connection> {
        let conn = Connection::open_with_flags(
            &self.db_path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Ok(conn)
    }

    /// Fetch the most recent message with a non-empty body.
    ///
    /// Returns `Ok(None)` when the store is empty or the latest row carries
    /// no extractable text; callers poll until something arrives.
    pub fn latest(&self) -> Result<Option<IncomingMessage>> {
        let conn = self.open_db()?;

        let row = conn
            .query_row(
                r#"
                SELECT
                    message.date,
                    message.text,
                    message.attributedBody,
                    message.is_from_me,
                    (SELECT handle.id FROM handle WHERE handle.ROWID = message.handle_id)
                FROM message
                ORDER BY message.date DESC
                LIMIT 1
                "#,
                [],
                |row| {
                    let date: i64 = row.get(0)?;
                    let text: Option<String> = row.get(1)?;
                    let attributed_body: Option<Vec<u8>> = row.get(2)?;
                    let is_from_me: bool = row.get::<_, i32>(3)? != 0;
                    let sender: Option<String> = row.get(4)?;
                    Ok((date, text, attributed_body, is_from_me, sender))
                },
            )
            .optional()?;

        let (date, text, attributed_body, is_from_me, sender) = match row {
            Some(r) => r,
            None => return Ok(None),
        };

        // Prefer the plain text column; "\u{fffc}" is the attachment placeholder
        let body = match text {
            Some(t) if !t.trim().is_empty() && t != "\u{fffc}" => Some(t),
            _ => attributed_body.as_deref().and_then(extract_message_text),
        };

        let body = match body {
            Some(b) => b,
            None => return Ok(None),
        };

        Ok(Some(IncomingMessage {
            text: body,
            sender: sender.unwrap_or_default(),
            timestamp: macos_to_datetime(date),
            is_from_me,
        }))
    }
}

/// Convert macOS nanosecond timestamp to DateTime<Utc>
fn macos_to_datetime(ts: i64) -> DateTime<Utc> {
    let unix_ts = ts / 1_000_000_000 + MACOS_EPOCH_OFFSET;
    Utc.timestamp_opt(unix_ts, 0).single().unwrap_or_default()
}

/// Extract the message body from an NSAttributedString archive blob.
///
/// The archive stores the string shortly after an NSString/NSMutableString
/// class marker as 0x2B followed by a length-prefixed UTF-8 run.
pub fn extract_message_text(data: &[u8]) -> Option<String> {
    let markers: &[&[u8]] = &[b"NSString", b"NSMutableString"];

    for marker in markers {
        if let Some(pos) = find_subsequence(data, marker) {
            let after = &data[pos + marker.len()..];
            if let Some(text) = scan_for_string(after) {
                return Some(text);
            }
        }
    }

    None
}

fn scan_for_string(data: &[u8]) -> Option<String> {
    for i in 0..data.len().saturating_sub(2) {
        if data[i] != 0x2B {
            continue;
        }
        if let Some((len, header)) = decode_length(&data[i + 1..]) {
            let start = i + 1 + header;
            if len > 0 && len < 100_000 && data.len() > start + len {
                if let Ok(text) = std::str::from_utf8(&data[start..start + len]) {
                    if is_plausible_text(text) {
                        return Some(text.to_string());
                    }
                }
            }
        }
    }
    None
}

/// Decode the archiver's variable-width length prefix.
///
/// Returns (payload length, prefix width). Single bytes below 0x80 are the
/// length itself; 0x81 and 0x82 introduce little-endian u16/u32 lengths.
fn decode_length(data: &[u8]) -> Option<(usize, usize)> {
    match *data.first()? {
        0x81 if data.len() >= 3 => Some((u16::from_le_bytes([data[1], data[2]]) as usize, 3)),
        0x82 if data.len() >= 5 => Some((
            u32::from_le_bytes([data[1], data[2], data[3], data[4]]) as usize,
            5,
        )),
        b if b > 0 && b < 0x80 => Some((b as usize, 1)),
        _ => None,
    }
}

fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

fn is_plausible_text(text: &str) -> bool {
    text.len() > 1 && text.chars().any(|c| c.is_alphabetic())
}
