//! Reply generation - mood-conditioned prompting with bounded retry
//!
//! The model must return one reply per configured mood, keyed by mood name.
//! Anything else is retried; after MAX_ATTEMPTS the generator degrades to an
//! all-empty mapping instead of failing, so the hand-off stage still runs.

use crate::config::PersonaConfig;
use crate::ollama::ReplyBackend;
use indexmap::IndexMap;
use tracing::warn;

/// Mood name -> generated candidate reply, in configured mood order
pub type MoodReplies = IndexMap<String, String>;

/// Total backend attempts before falling back to empty replies
pub const MAX_ATTEMPTS: u32 = 5;

pub struct ReplyGenerator<B> {
    backend: B,
}

impl<B: ReplyBackend> ReplyGenerator<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    /// Generate one candidate reply per configured mood. Never fails: an
    /// uncooperative or unreachable backend yields empty candidates.
    pub async fn generate(&self, message_text: &str, persona: &PersonaConfig) -> MoodReplies {
        let system_prompt = build_system_prompt(persona);

        for attempt in 1..=MAX_ATTEMPTS {
            match self.backend.chat(&system_prompt, message_text).await {
                Ok(raw) => {
                    if let Some(replies) = parse_replies(&raw, persona) {
                        return replies;
                    }
                    warn!(
                        "Attempt {}/{}: response did not match the mood set, retrying",
                        attempt, MAX_ATTEMPTS
                    );
                }
                Err(e) => {
                    warn!("Attempt {}/{}: backend call failed: {}", attempt, MAX_ATTEMPTS, e);
                }
            }
        }

        fallback_replies(persona)
    }
}

/// Instruction prompt embedding the persona and the full mood map, with a
/// worked example so the model sees the exact output shape.
pub fn build_system_prompt(persona: &PersonaConfig) -> String {
    let mood_count = persona.moods.len();
    let mood_list = persona
        .moods
        .iter()
        .map(|(name, desc)| format!("\"{}\": \"{}\"", name, desc))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "You are {name}. {name} was asked about their personality so take notes and form \
         a base tone of {name}: \"{description}\" You have {mood_count} moods. Your moods \
         are: {{{mood_list}}}. As {name}, you will be given new texts from a sender. You \
         MUST output **EXACTLY {mood_count} RESPONSES**. Each text response should be a \
         response as though you were in the given mood. If moods were {{\"Happy\": \"Very \
         nice and upbeat.\", \"Sad\": \"Very short and pessimistic\", \"Angry\": \"Quick \
         to snap and not very nice\"}} and the text was \"Hi\", you respond with \
         {{\"Happy\": \"Hi! How are you, is everything good?\", \"Sad\": \"Hey, how are \
         you? I'm hanging in there...\", \"Angry\": \"Yeah, what do you need?\"}}. The \
         goal is to always return a dictionary and the dictionary must have {mood_count} \
         entries.",
        name = persona.name,
        description = persona.personal_description,
    )
}

/// Parse and validate one backend response: the key set must equal the
/// configured mood set exactly. Valid responses are reordered to match the
/// persona's mood order.
fn parse_replies(raw: &str, persona: &PersonaConfig) -> Option<MoodReplies> {
    let parsed: IndexMap<String, String> = serde_json::from_str(raw).ok()?;

    let mut got: Vec<&String> = parsed.keys().collect();
    got.sort();
    let mut want: Vec<&String> = persona.moods.keys().collect();
    want.sort();
    if got != want {
        return None;
    }

    Some(
        persona
            .moods
            .keys()
            .map(|mood| (mood.clone(), parsed[mood].clone()))
            .collect(),
    )
}

/// Every configured mood mapped to an empty reply
fn fallback_replies(persona: &PersonaConfig) -> MoodReplies {
    persona
        .moods
        .keys()
        .map(|mood| (mood.clone(), String::new()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, Result};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Scripted backend: pops responses in order, errors once exhausted
    struct MockBackend {
        responses: Mutex<Vec<Result<String>>>,
        calls: AtomicUsize,
    }

    impl MockBackend {
        fn new(responses: Vec<Result<String>>) -> Self {
            let mut responses = responses;
            responses.reverse();
            Self {
                responses: Mutex::new(responses),
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ReplyBackend for MockBackend {
        async fn chat(&self, _system_prompt: &str, _message: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut responses = self.responses.lock().unwrap();
            match responses.pop() {
                Some(r) => r,
                None => Err(Error::Backend("script exhausted".to_string())),
            }
        }
    }

    fn persona() -> PersonaConfig {
        let mut moods = IndexMap::new();
        moods.insert("Happy".to_string(), "Very nice and upbeat.".to_string());
        moods.insert("Sad".to_string(), "Very short and pessimistic".to_string());
        PersonaConfig {
            name: "Alex".to_string(),
            personal_description: "Casual CS student.".to_string(),
            moods,
            phone_list_mode: Default::default(),
            phone_numbers: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_valid_response_first_try() {
        let backend = MockBackend::new(vec![Ok(
            r#"{"Happy":"Hi there!","Sad":"hey..."}"#.to_string()
        )]);
        let generator = ReplyGenerator::new(backend);
        let replies = generator.generate("Hi", &persona()).await;

        assert_eq!(replies["Happy"], "Hi there!");
        assert_eq!(replies["Sad"], "hey...");
        assert_eq!(generator.backend.calls(), 1);
    }

    #[tokio::test]
    async fn test_retries_on_wrong_key_set() {
        let backend = MockBackend::new(vec![
            Ok(r#"{"Happy":"Hi"}"#.to_string()),
            Ok(r#"{"Happy":"Hi","Sad":"hey","Angry":"what"}"#.to_string()),
            Ok(r#"{"Happy":"Hi!","Sad":"hey..."}"#.to_string()),
        ]);
        let generator = ReplyGenerator::new(backend);
        let replies = generator.generate("Hi", &persona()).await;

        assert_eq!(generator.backend.calls(), 3);
        assert_eq!(replies["Happy"], "Hi!");
    }

    #[tokio::test]
    async fn test_retries_on_unparseable_output() {
        let backend = MockBackend::new(vec![
            Ok("definitely not json".to_string()),
            Ok(r#"{"Happy": 42, "Sad": true}"#.to_string()),
            Ok(r#"{"Happy":"Hi!","Sad":"hey..."}"#.to_string()),
        ]);
        let generator = ReplyGenerator::new(backend);
        let replies = generator.generate("Hi", &persona()).await;

        assert_eq!(generator.backend.calls(), 3);
        assert_eq!(replies.len(), 2);
    }

    #[tokio::test]
    async fn test_falls_back_to_empty_after_max_attempts() {
        let backend = MockBackend::new(vec![]);
        let generator = ReplyGenerator::new(backend);
        let replies = generator.generate("Hi", &persona()).await;

        assert_eq!(generator.backend.calls(), MAX_ATTEMPTS as usize);
        assert_eq!(replies.len(), 2);
        assert_eq!(replies["Happy"], "");
        assert_eq!(replies["Sad"], "");
    }

    #[tokio::test]
    async fn test_replies_follow_configured_mood_order() {
        // Model returns keys in a different order than the config
        let backend = MockBackend::new(vec![Ok(
            r#"{"Sad":"hey...","Happy":"Hi!"}"#.to_string()
        )]);
        let generator = ReplyGenerator::new(backend);
        let replies = generator.generate("Hi", &persona()).await;

        let keys: Vec<&String> = replies.keys().collect();
        assert_eq!(keys, vec!["Happy", "Sad"]);
    }

    #[test]
    fn test_system_prompt_embeds_persona_and_moods() {
        let prompt = build_system_prompt(&persona());
        assert!(prompt.contains("You are Alex."));
        assert!(prompt.contains("Casual CS student."));
        assert!(prompt.contains("\"Happy\": \"Very nice and upbeat.\""));
        assert!(prompt.contains("EXACTLY 2 RESPONSES"));
    }

    #[test]
    fn test_parse_rejects_subset_and_superset() {
        let p = persona();
        assert!(parse_replies(r#"{"Happy":"x"}"#, &p).is_none());
        assert!(parse_replies(r#"{"Happy":"x","Sad":"y","Extra":"z"}"#, &p).is_none());
        assert!(parse_replies(r#"{"Happy":"x","Sad":"y"}"#, &p).is_some());
    }
}
