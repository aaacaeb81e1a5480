//! Voice processing: capture, silence-detected recording, STT, TTS, playback

pub mod capture;
pub mod playback;
pub mod recorder;
pub mod stt;
pub mod tts;

pub use capture::{AudioCapture, SAMPLE_RATE};
pub use playback::AudioPlayback;
pub use recorder::{AudioBuffer, SampleSource, VoiceActivityRecorder};
pub use stt::Transcriber;
pub use tts::TextToSpeech;
