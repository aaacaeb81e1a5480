//! Murmur - Voice conversation agent
//!
//! This library provides the core functionality for the murmur agent:
//! - Voice capture with silence-based end-of-turn detection
//! - Speech-to-text and text-to-speech via OpenAI
//! - Conversational reply generation with history
//! - Regex/keyword extraction of facts from each turn
//! - Durable JSON session storage
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                    Pipeline                           │
//! │   Record → Transcribe → Print → Branch               │
//! │                               ├─ exit: Farewell/Speak│
//! │                               └─ Generate → Extract  │
//! │                                         → Speak       │
//! └──────────────────────────────────────────────────────┘
//! ```

pub mod agent;
pub mod config;
pub mod error;
pub mod extract;
pub mod pipeline;
pub mod store;
pub mod voice;

pub use agent::ConversationEngine;
pub use config::Config;
pub use error::{Error, Result};
pub use extract::{ExtractedInfo, ExtractionConfig, TurnExtractor};
pub use pipeline::{Branch, Pipeline, Stage, StageOutput, Value};
pub use store::{ConversationTurn, SearchHit, SessionStore};
