//! Recipient filter - Include/Exclude policy over sender identifiers
//!
//! Rebuilt from the freshly loaded persona config every cycle, so list edits
//! in the reviewer UI apply to the next poll.

use crate::config::{PersonaConfig, PhoneListMode};
use std::collections::HashSet;

pub struct RecipientFilter {
    mode: PhoneListMode,
    identifiers: HashSet<String>,
}

impl RecipientFilter {
    pub fn from_config(persona: &PersonaConfig) -> Self {
        let identifiers = persona
            .phone_numbers
            .iter()
            .map(|id| normalize_identifier(id))
            .collect();
        Self {
            mode: persona.phone_list_mode,
            identifiers,
        }
    }

    /// True iff a message from `sender` should enter the reply pipeline
    pub fn is_eligible(&self, sender: &str) -> bool {
        let listed = self.identifiers.contains(&normalize_identifier(sender));
        match self.mode {
            PhoneListMode::Include => listed,
            PhoneListMode::Exclude => !listed,
        }
    }
}

/// Normalize a Messages.app identifier for comparison.
///
/// Handles are either email addresses or phone numbers; the UI lets users
/// type numbers with dashes and spaces, chat.db stores E.164.
pub fn normalize_identifier(id: &str) -> String {
    if id.contains('@') {
        id.trim().to_lowercase()
    } else {
        normalize_phone(id)
    }
}

/// Normalize phone number to E.164 format
pub fn normalize_phone(phone: &str) -> String {
    let digits: String = phone.chars().filter(|c| c.is_ascii_digit()).collect();

    if phone.starts_with('+') {
        format!("+{}", digits)
    } else if digits.len() == 10 {
        // Assume US number
        format!("+1{}", digits)
    } else {
        format!("+{}", digits)
    }
}
