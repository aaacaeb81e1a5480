//! Conversation engine: pipeline wiring and the turn loop

pub mod generator;
pub mod stages;

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::config::Config;
use crate::pipeline::{Branch, Pipeline, StageOutput, Value};
use crate::voice::{AudioPlayback, TextToSpeech, Transcriber, VoiceActivityRecorder};
use crate::{extract::TurnExtractor, store::SessionStore, Result};

pub use generator::ReplyGenerator;
pub use stages::{is_exit_phrase, FAREWELL};

/// Spoken once when the engine starts
pub const GREETING: &str = "Hello! I'm your AI voice assistant. How can I help you today?";

/// Runs the record / transcribe / reply / speak loop until a closing word
pub struct ConversationEngine {
    pipeline: Pipeline,
    tts: Arc<TextToSpeech>,
}

impl ConversationEngine {
    /// Wire the full conversation pipeline from configuration
    ///
    /// Fails if a required credential is missing or no output device is
    /// available.
    pub fn new(config: &Config) -> Result<Self> {
        let transcriber = Arc::new(Transcriber::new(
            config.openai_api_key.clone(),
            config.voice.stt_model.clone(),
        )?);
        let tts = Arc::new(TextToSpeech::new(
            config.openai_api_key.clone(),
            config.voice.tts_model.clone(),
            config.voice.tts_voice.clone(),
            config.voice.tts_speed,
        )?);
        let generator = ReplyGenerator::new(config.openai_api_key.clone(), config.llm_model.clone())?;
        let store = SessionStore::open(&config.store_path);
        tracing::info!(session = store.current_session(), "session started");

        let recorder = VoiceActivityRecorder::new(&config.voice);

        let exit_branch = Pipeline::new()
            .stage(stages::FarewellStage)
            .stage(stages::PrintStage::new("Assistant: "))
            .stage(stages::SpeakStage::new(Arc::clone(&tts)))
            .stage(stages::ShutdownStage);

        let converse_branch = Pipeline::new()
            .stage(stages::GenerateStage::new(generator))
            .stage(stages::PrintStage::new("Assistant: "))
            .stage(stages::ExtractStage::new(TurnExtractor::default(), store))
            .stage(stages::SpeakStage::new(Arc::clone(&tts)));

        let pipeline = Pipeline::new()
            .stage(stages::RecordStage::new(
                recorder,
                config.voice.silence_duration_s,
                config.voice.max_record_time_s,
            ))
            .stage(stages::TranscribeStage::new(transcriber))
            .stage(stages::PrintStage::new("You: "))
            .branch(Branch::new(
                |value| matches!(value, Value::Text(text) if is_exit_phrase(text)),
                exit_branch,
                converse_branch,
            ));

        Ok(Self { pipeline, tts })
    }

    /// Speak the greeting and run turns until shutdown or ctrl-c
    pub async fn run(mut self) -> Result<()> {
        // Latch the interrupt on a channel: a SIGINT delivered while a
        // stage holds the thread (playback, a network call) stays queued
        // and is honored at the next stage boundary.
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                let _ = shutdown_tx.send(()).await;
            }
        });

        println!("Assistant: {GREETING}");
        if let Err(e) = speak(&self.tts, GREETING).await {
            tracing::warn!(error = %e, "greeting playback failed");
        }

        run_loop(&mut self.pipeline, &mut shutdown_rx).await;
        Ok(())
    }
}

/// Run pipeline iterations until the exit branch or an interrupt
async fn run_loop(pipeline: &mut Pipeline, shutdown: &mut mpsc::Receiver<()>) {
    loop {
        // Biased so a queued interrupt wins over starting another turn
        tokio::select! {
            biased;

            _ = shutdown.recv() => {
                tracing::info!("interrupted, shutting down");
                break;
            }
            outcome = pipeline.run(Value::Empty) => {
                if matches!(outcome, StageOutput::Continue(Value::Shutdown)) {
                    tracing::info!("conversation ended");
                    break;
                }
            }
        }
    }
}

/// Synthesize one line of text and play it to completion
pub async fn speak(tts: &TextToSpeech, text: &str) -> Result<()> {
    let audio = tts.synthesize(text).await?;
    AudioPlayback::new()?.play_mp3(&audio).await
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::pipeline::{Stage, StageOutput};

    /// Stage that queues an interrupt mid-run while holding the thread,
    /// the way a signal lands during blocking playback
    struct InterruptedStage {
        tx: mpsc::Sender<()>,
        runs: Rc<RefCell<usize>>,
    }

    #[async_trait::async_trait(?Send)]
    impl Stage for InterruptedStage {
        fn name(&self) -> &'static str {
            "interrupted"
        }

        async fn run(&mut self, _input: Value) -> Result<StageOutput> {
            *self.runs.borrow_mut() += 1;
            let _ = self.tx.send(()).await;
            std::thread::sleep(std::time::Duration::from_millis(10));
            Ok(StageOutput::Continue(Value::Empty))
        }
    }

    #[tokio::test]
    async fn interrupt_during_a_stage_stops_at_the_next_boundary() {
        let (tx, mut rx) = mpsc::channel::<()>(1);
        let runs = Rc::new(RefCell::new(0));

        let mut pipeline = Pipeline::new().stage(InterruptedStage {
            tx,
            runs: runs.clone(),
        });

        run_loop(&mut pipeline, &mut rx).await;

        // The interrupt arrived while the stage held the thread; it must
        // still end the loop instead of being dropped with the iteration.
        assert_eq!(*runs.borrow(), 1);
    }

    #[tokio::test]
    async fn pending_interrupt_ends_the_loop_before_the_next_iteration() {
        let (tx, mut rx) = mpsc::channel::<()>(1);
        tx.send(()).await.unwrap();

        let runs = Rc::new(RefCell::new(0));
        let mut pipeline = Pipeline::new().stage(InterruptedStage {
            tx: mpsc::channel::<()>(1).0,
            runs: runs.clone(),
        });

        run_loop(&mut pipeline, &mut rx).await;
        assert_eq!(*runs.borrow(), 0);
    }
}
