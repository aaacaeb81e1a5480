//! Configuration for the murmur agent
//!
//! Layering is env > `~/.config/omni/murmur/config.toml` > defaults. The
//! TOML file is a partial overlay; every field is optional.

use std::path::PathBuf;

use serde::Deserialize;

use crate::{Error, Result};

/// Agent configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// `OpenAI` API key, required at startup
    pub openai_api_key: String,

    /// Voice capture and synthesis configuration
    pub voice: VoiceConfig,

    /// LLM model identifier for chat completions
    pub llm_model: String,

    /// Path to the session store JSON document
    pub store_path: PathBuf,
}

/// Voice processing configuration
///
/// The silence threshold and frame size are tuned heuristics carried over
/// from field testing; they are configuration rather than constants.
#[derive(Debug, Clone)]
pub struct VoiceConfig {
    /// STT model (e.g. "whisper-1")
    pub stt_model: String,

    /// TTS model (e.g. "tts-1")
    pub tts_model: String,

    /// TTS voice identifier (e.g. "nova")
    pub tts_voice: String,

    /// TTS speed multiplier (0.25 to 4.0)
    pub tts_speed: f64,

    /// Seconds of sustained silence that end a recording
    pub silence_duration_s: f64,

    /// Hard cap on a single recording, in seconds
    pub max_record_time_s: f64,

    /// Mean-absolute-amplitude threshold below which a frame counts as
    /// silent, on the i16 scale (0..32768)
    pub silence_threshold: f32,

    /// Samples per analysis frame
    pub frame_size: usize,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            stt_model: "whisper-1".to_string(),
            tts_model: "tts-1".to_string(),
            tts_voice: "nova".to_string(),
            tts_speed: 1.0,
            silence_duration_s: 4.0,
            max_record_time_s: 30.0,
            silence_threshold: 500.0,
            frame_size: 1024,
        }
    }
}

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    llm: LlmFileConfig,

    #[serde(default)]
    voice: VoiceFileConfig,

    #[serde(default)]
    store: StoreFileConfig,
}

/// LLM-related configuration
#[derive(Debug, Default, Deserialize)]
struct LlmFileConfig {
    /// Model identifier (e.g. "gpt-4.1-mini")
    model: Option<String>,
}

/// Voice processing configuration overlay
#[derive(Debug, Default, Deserialize)]
struct VoiceFileConfig {
    stt_model: Option<String>,
    tts_model: Option<String>,
    tts_voice: Option<String>,
    tts_speed: Option<f64>,
    silence_duration_s: Option<f64>,
    max_record_time_s: Option<f64>,
    silence_threshold: Option<f32>,
    frame_size: Option<usize>,
}

/// Session store configuration overlay
#[derive(Debug, Default, Deserialize)]
struct StoreFileConfig {
    path: Option<String>,
}

impl Config {
    /// Load configuration from environment, config file, and defaults
    ///
    /// # Errors
    ///
    /// Returns error if `OPENAI_API_KEY` is absent; a missing credential
    /// is a startup failure, not a per-call one.
    pub fn load() -> Result<Self> {
        let fc = load_config_file();
        let defaults = VoiceConfig::default();

        let openai_api_key = std::env::var("OPENAI_API_KEY")
            .ok()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| Error::Config("OPENAI_API_KEY is required".to_string()))?;

        let voice = VoiceConfig {
            stt_model: std::env::var("MURMUR_STT_MODEL")
                .ok()
                .or(fc.voice.stt_model)
                .unwrap_or(defaults.stt_model),
            tts_model: std::env::var("MURMUR_TTS_MODEL")
                .ok()
                .or(fc.voice.tts_model)
                .unwrap_or(defaults.tts_model),
            tts_voice: std::env::var("MURMUR_TTS_VOICE")
                .ok()
                .or(fc.voice.tts_voice)
                .unwrap_or(defaults.tts_voice),
            tts_speed: fc.voice.tts_speed.unwrap_or(defaults.tts_speed),
            silence_duration_s: std::env::var("MURMUR_SILENCE_DURATION")
                .ok()
                .and_then(|s| s.parse().ok())
                .or(fc.voice.silence_duration_s)
                .unwrap_or(defaults.silence_duration_s),
            max_record_time_s: std::env::var("MURMUR_MAX_RECORD_TIME")
                .ok()
                .and_then(|s| s.parse().ok())
                .or(fc.voice.max_record_time_s)
                .unwrap_or(defaults.max_record_time_s),
            silence_threshold: fc
                .voice
                .silence_threshold
                .unwrap_or(defaults.silence_threshold),
            frame_size: fc.voice.frame_size.unwrap_or(defaults.frame_size),
        };

        let llm_model = std::env::var("MURMUR_LLM_MODEL")
            .ok()
            .or(fc.llm.model)
            .unwrap_or_else(|| "gpt-4.1-mini".to_string());

        let store_path = std::env::var("MURMUR_STORE_PATH")
            .ok()
            .or(fc.store.path)
            .map_or_else(default_store_path, PathBuf::from);

        Ok(Self {
            openai_api_key,
            voice,
            llm_model,
            store_path,
        })
    }
}

/// Default session store path: `~/.local/share/omni/murmur/conversation_data.json`
fn default_store_path() -> PathBuf {
    let data_dir = directories::BaseDirs::new().map_or_else(
        || PathBuf::from("."),
        |d| d.data_dir().join("omni").join("murmur"),
    );

    if let Err(e) = std::fs::create_dir_all(&data_dir) {
        tracing::warn!(
            path = %data_dir.display(),
            error = %e,
            "failed to create data directory"
        );
    }

    data_dir.join("conversation_data.json")
}

/// Load the TOML config file from the standard path
///
/// Returns defaults if the file doesn't exist or can't be parsed.
fn load_config_file() -> ConfigFile {
    let Some(path) = config_file_path() else {
        return ConfigFile::default();
    };

    if !path.exists() {
        return ConfigFile::default();
    }

    match std::fs::read_to_string(&path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                ConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            ConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/omni/murmur/config.toml`
fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| {
        d.config_dir()
            .join("omni")
            .join("murmur")
            .join("config.toml")
    })
}
