//! Daemon orchestration loop
//!
//! Idle -> NewMessageDetected -> Generating -> AwaitingDecision -> Dispatched
//! -> Idle. One cycle per qualifying inbound message; the last processed
//! (text, sender) pair suppresses reprocessing until something new arrives.

use crate::config::{Config, PersonaConfig};
use crate::dispatch::Dispatcher;
use crate::filter::RecipientFilter;
use crate::generator::ReplyGenerator;
use crate::handoff::{Decision, HandoffRecord, HandoffStore};
use crate::messages::{IncomingMessage, MessagesReader};
use crate::ollama::ReplyBackend;
use crate::Result;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

pub struct Daemon<B> {
    config: Config,
    messages: MessagesReader,
    generator: ReplyGenerator<B>,
    store: HandoffStore,
    dispatcher: Dispatcher,
    last_seen: Option<(String, String)>,
}

impl<B: ReplyBackend> Daemon<B> {
    pub fn new(config: &Config, backend: B) -> Self {
        Self {
            messages: MessagesReader::new(config),
            generator: ReplyGenerator::new(backend),
            store: HandoffStore::new(config),
            dispatcher: Dispatcher::new(config),
            config: config.clone(),
            last_seen: None,
        }
    }

    /// Run the poll loop until the process is terminated
    pub async fn run(mut self) -> Result<()> {
        info!("Mood reply daemon starting");
        let poll = Duration::from_millis(self.config.poll_interval_ms);

        loop {
            self.tick().await;
            tokio::time::sleep(poll).await;
        }
    }

    /// One Idle-state iteration: check for a new qualifying message and, if
    /// found, drive it through generation, review, and dispatch. All failures
    /// are logged and leave the loop polling.
    pub async fn tick(&mut self) {
        let persona = match PersonaConfig::load(&self.config.persona_file) {
            Ok(p) => p,
            Err(e) => {
                warn!("Failed to load persona config: {}", e);
                return;
            }
        };

        let incoming = match self.messages.latest() {
            Ok(Some(msg)) => msg,
            Ok(None) => return,
            Err(e) => {
                error!("Failed to read message store: {}", e);
                return;
            }
        };

        if self.config.skip_own_messages && incoming.is_from_me {
            debug!("Most recent message is from this account, waiting");
            return;
        }

        let pair = (incoming.text.clone(), incoming.sender.clone());
        if self.last_seen.as_ref() == Some(&pair) {
            return;
        }

        let filter = RecipientFilter::from_config(&persona);
        if !filter.is_eligible(&incoming.sender) {
            debug!("Sender {} filtered out", incoming.sender);
            return;
        }

        info!("New text from {}", incoming.sender);
        self.last_seen = Some(pair);

        let record = match self.decision_cycle(&incoming).await {
            Ok(record) => record,
            Err(e) => {
                error!("Reply cycle failed: {}", e);
                return;
            }
        };

        match self.dispatcher.dispatch(&record) {
            Ok(true) => info!("Sent {} reply to {}", record.decision.as_str(), record.sender),
            Ok(false) => info!("No reply sent"),
            Err(e) => error!("Dispatch failed: {}", e),
        }
    }

    /// Generate, publish, and wait for the reviewer; repeat while the
    /// decision is Refresh. The persona config is reloaded before each
    /// generation so mood edits apply to the regenerated set.
    pub async fn decision_cycle(&self, incoming: &IncomingMessage) -> Result<HandoffRecord> {
        loop {
            let persona = PersonaConfig::load(&self.config.persona_file)?;
            info!("Generating {} candidate replies", persona.moods.len());

            let start = Instant::now();
            let replies = self.generator.generate(&incoming.text, &persona).await;
            let elapsed = start.elapsed();
            info!("Done generating in {:.1}s", elapsed.as_secs_f64());

            let record = HandoffRecord::new(replies, &incoming.sender, &incoming.text, elapsed);
            self.store.publish(&record)?;

            let decided = self.store.await_decision().await;
            if decided.decision != Decision::Refresh {
                return Ok(decided);
            }
            info!("Refresh requested, regenerating");
        }
    }
}
