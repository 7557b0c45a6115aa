//! Mood Reply - iMessage auto-reply daemon
//!
//! Polls the Messages database for new inbound texts, generates one candidate
//! reply per configured persona mood through a local Ollama model, and hands
//! the candidates to an external reviewer UI through a shared replies.json.

pub mod config;
pub mod daemon;
pub mod dispatch;
pub mod error;
pub mod filter;
pub mod generator;
pub mod handoff;
pub mod messages;
pub mod ollama;

pub use error::{Error, Result};
