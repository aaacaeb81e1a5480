//! Concrete pipeline stages for the conversation loop

use std::sync::Arc;

use crate::agent::generator::{FALLBACK_REPLY, ReplyGenerator};
use crate::extract::TurnExtractor;
use crate::pipeline::{Stage, StageOutput, Value};
use crate::store::SessionStore;
use crate::voice::{AudioPlayback, Transcriber, VoiceActivityRecorder};
use crate::Result;

/// Fixed farewell spoken on the exit branch
pub const FAREWELL: &str = "Goodbye! It was nice talking to you.";

/// Closing words that end the conversation
const CLOSING_WORDS: &[&str] = &["exit", "quit", "goodbye", "bye"];

/// Whether a transcript is a closing word
///
/// Case-insensitive, whitespace-trimmed exact match; trailing sentence
/// punctuation from the transcriber is tolerated.
#[must_use]
pub fn is_exit_phrase(text: &str) -> bool {
    let normalized = text
        .trim()
        .trim_end_matches(['.', ',', '!', '?'])
        .to_lowercase();
    CLOSING_WORDS.contains(&normalized.as_str())
}

/// Records one utterance from the microphone
pub struct RecordStage {
    recorder: VoiceActivityRecorder,
    silence_duration_s: f64,
    max_record_time_s: f64,
}

impl RecordStage {
    /// Create a recording stage with the given end-of-turn tuning
    #[must_use]
    pub fn new(
        recorder: VoiceActivityRecorder,
        silence_duration_s: f64,
        max_record_time_s: f64,
    ) -> Self {
        Self {
            recorder,
            silence_duration_s,
            max_record_time_s,
        }
    }
}

#[async_trait::async_trait(?Send)]
impl Stage for RecordStage {
    fn name(&self) -> &'static str {
        "record"
    }

    async fn run(&mut self, _input: Value) -> Result<StageOutput> {
        println!("\nListening...");
        let audio = self
            .recorder
            .record(self.silence_duration_s, self.max_record_time_s)
            .await?;
        Ok(StageOutput::Continue(Value::Audio(audio)))
    }
}

/// Transcribes recorded audio to text
pub struct TranscribeStage {
    transcriber: Arc<Transcriber>,
}

impl TranscribeStage {
    /// Create a transcription stage
    #[must_use]
    pub fn new(transcriber: Arc<Transcriber>) -> Self {
        Self { transcriber }
    }
}

#[async_trait::async_trait(?Send)]
impl Stage for TranscribeStage {
    fn name(&self) -> &'static str {
        "transcribe"
    }

    async fn run(&mut self, input: Value) -> Result<StageOutput> {
        let Value::Audio(audio) = input else {
            tracing::warn!("transcribe stage expected audio input");
            return Ok(StageOutput::Stop);
        };

        let text = self.transcriber.transcribe(&audio).await?;
        if text.trim().is_empty() {
            tracing::debug!("empty transcript, aborting iteration");
            return Ok(StageOutput::Stop);
        }

        Ok(StageOutput::Continue(Value::Text(text)))
    }
}

/// Prints the carried text with a prefix, passing the value through
pub struct PrintStage {
    prefix: &'static str,
}

impl PrintStage {
    /// Create a printing stage
    #[must_use]
    pub fn new(prefix: &'static str) -> Self {
        Self { prefix }
    }
}

#[async_trait::async_trait(?Send)]
impl Stage for PrintStage {
    fn name(&self) -> &'static str {
        "print"
    }

    async fn run(&mut self, input: Value) -> Result<StageOutput> {
        if let Some(text) = input.as_text() {
            println!("{}{text}", self.prefix);
        }
        Ok(StageOutput::Continue(input))
    }
}

/// Generates the assistant reply, pairing it with the user text
///
/// A generation failure is recovered locally: the apologetic fallback is
/// used as the reply so the turn still completes and gets spoken.
pub struct GenerateStage {
    generator: ReplyGenerator,
}

impl GenerateStage {
    /// Create a generation stage
    #[must_use]
    pub fn new(generator: ReplyGenerator) -> Self {
        Self { generator }
    }
}

#[async_trait::async_trait(?Send)]
impl Stage for GenerateStage {
    fn name(&self) -> &'static str {
        "generate"
    }

    async fn run(&mut self, input: Value) -> Result<StageOutput> {
        let Value::Text(user) = input else {
            tracing::warn!("generate stage expected text input");
            return Ok(StageOutput::Stop);
        };

        let assistant = match self.generator.generate(&user).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::error!(error = %e, "reply generation failed, using fallback");
                FALLBACK_REPLY.to_string()
            }
        };

        Ok(StageOutput::Continue(Value::Turn { user, assistant }))
    }
}

/// Extracts structured facts from the turn and records it in the store
pub struct ExtractStage {
    extractor: TurnExtractor,
    store: SessionStore,
}

impl ExtractStage {
    /// Create an extraction stage owning the session store
    #[must_use]
    pub fn new(extractor: TurnExtractor, store: SessionStore) -> Self {
        Self { extractor, store }
    }
}

#[async_trait::async_trait(?Send)]
impl Stage for ExtractStage {
    fn name(&self) -> &'static str {
        "extract"
    }

    async fn run(&mut self, input: Value) -> Result<StageOutput> {
        let Value::Turn { user, assistant } = &input else {
            tracing::warn!("extract stage expected a turn");
            return Ok(StageOutput::Stop);
        };

        let extracted = self.extractor.extract(user, assistant);
        if !extracted.is_empty() {
            println!("\n[Important information extracted]");
            tracing::info!(
                session = self.store.current_session(),
                categories = ?extracted.keys().collect::<Vec<_>>(),
                "turn information extracted"
            );
        }
        self.store.record_turn(user, assistant, extracted);

        Ok(StageOutput::Continue(input))
    }
}

/// Synthesizes the carried text and plays it back
///
/// The output device is opened inside the call and released before it
/// returns. The input passes through unchanged for chaining.
pub struct SpeakStage {
    tts: Arc<crate::voice::TextToSpeech>,
}

impl SpeakStage {
    /// Create a speaking stage
    #[must_use]
    pub fn new(tts: Arc<crate::voice::TextToSpeech>) -> Self {
        Self { tts }
    }
}

#[async_trait::async_trait(?Send)]
impl Stage for SpeakStage {
    fn name(&self) -> &'static str {
        "speak"
    }

    async fn run(&mut self, input: Value) -> Result<StageOutput> {
        let Some(text) = input.as_text() else {
            tracing::warn!("speak stage expected text input");
            return Ok(StageOutput::Stop);
        };

        let audio = self.tts.synthesize(text).await?;
        AudioPlayback::new()?.play_mp3(&audio).await?;

        Ok(StageOutput::Continue(input))
    }
}

/// Replaces any input with the fixed farewell text
pub struct FarewellStage;

#[async_trait::async_trait(?Send)]
impl Stage for FarewellStage {
    fn name(&self) -> &'static str {
        "farewell"
    }

    async fn run(&mut self, _input: Value) -> Result<StageOutput> {
        Ok(StageOutput::Continue(Value::Text(FAREWELL.to_string())))
    }
}

/// Terminal stage of the exit branch: signals the loop to stop
pub struct ShutdownStage;

#[async_trait::async_trait(?Send)]
impl Stage for ShutdownStage {
    fn name(&self) -> &'static str {
        "shutdown"
    }

    async fn run(&mut self, _input: Value) -> Result<StageOutput> {
        Ok(StageOutput::Continue(Value::Shutdown))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_phrases_match_exactly() {
        assert!(is_exit_phrase("exit"));
        assert!(is_exit_phrase("QUIT"));
        assert!(is_exit_phrase("  Goodbye  "));
        assert!(is_exit_phrase("Bye."));
        assert!(is_exit_phrase("bye!"));

        assert!(!is_exit_phrase("exit the building"));
        assert!(!is_exit_phrase("say goodbye to Jim"));
        assert!(!is_exit_phrase(""));
    }

    #[tokio::test]
    async fn farewell_replaces_input() {
        let mut stage = FarewellStage;
        let out = stage
            .run(Value::Text("bye".to_string()))
            .await
            .unwrap();
        assert_eq!(out, StageOutput::Continue(Value::Text(FAREWELL.to_string())));
    }

    #[tokio::test]
    async fn shutdown_yields_marker() {
        let mut stage = ShutdownStage;
        let out = stage.run(Value::Empty).await.unwrap();
        assert_eq!(out, StageOutput::Continue(Value::Shutdown));
    }

    #[tokio::test]
    async fn print_passes_turn_through() {
        let mut stage = PrintStage::new("Assistant: ");
        let turn = Value::Turn {
            user: "hi".to_string(),
            assistant: "hello".to_string(),
        };
        let out = stage.run(turn.clone()).await.unwrap();
        assert_eq!(out, StageOutput::Continue(turn));
    }
}
