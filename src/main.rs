use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use murmur_agent::voice::{AudioCapture, AudioPlayback};
use murmur_agent::{Config, ConversationEngine, SessionStore};

/// Murmur - Voice conversation agent
#[derive(Parser)]
#[command(name = "murmur", version, about)]
struct Cli {
    /// Seconds of continuous silence that end an utterance
    #[arg(long, env = "MURMUR_SILENCE_DURATION")]
    silence_duration: Option<f64>,

    /// Hard cap in seconds on a single recording
    #[arg(long, env = "MURMUR_MAX_RECORD_TIME")]
    max_record_time: Option<f64>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Test speaker output
    TestSpeaker,
    /// Print the merged extracted information for a session
    Summary {
        /// Session ID; defaults to the most recent session
        session: Option<String>,
    },
    /// Search stored turns for a substring
    Search {
        /// Text to look for (case-insensitive)
        query: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,murmur_agent=info",
        1 => "info,murmur_agent=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

#[allow(clippy::future_not_send)]
async fn run(cli: Cli) -> anyhow::Result<()> {
    // Handle subcommands
    if let Some(cmd) = cli.command {
        return match cmd {
            Command::TestMic { duration } => test_mic(duration).await,
            Command::TestSpeaker => test_speaker().await,
            Command::Summary { session } => cmd_summary(session.as_deref()),
            Command::Search { query } => cmd_search(&query),
        };
    }

    let mut config = Config::load()?;
    if let Some(s) = cli.silence_duration {
        config.voice.silence_duration_s = s;
    }
    if let Some(m) = cli.max_record_time {
        config.voice.max_record_time_s = m;
    }
    tracing::debug!(
        silence_duration_s = config.voice.silence_duration_s,
        max_record_time_s = config.voice.max_record_time_s,
        "loaded configuration"
    );

    let engine = ConversationEngine::new(&config)?;
    tracing::info!("murmur ready - speak after the greeting");

    engine.run().await?;

    Ok(())
}

/// Test microphone input
#[allow(clippy::future_not_send)]
async fn test_mic(duration: u64) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let capture = AudioCapture::open()?;
    println!("Sample rate: {} Hz", murmur_agent::voice::SAMPLE_RATE);
    println!("---");

    for i in 0..duration {
        tokio::time::sleep(Duration::from_secs(1)).await;

        let samples = capture.drain();
        let energy = calculate_rms(&samples);
        let peak = samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);

        // Visual meter
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (energy * 100.0).min(50.0) as usize;
        let meter: String = "█".repeat(meter_len) + &" ".repeat(50 - meter_len);

        println!(
            "[{:2}s] RMS: {:.4} | Peak: {:.4} | [{}]",
            i + 1,
            energy,
            peak,
            meter
        );
    }

    println!("\n---");
    println!("If you saw movement in the meter, your mic is working!");
    println!("If RMS stayed near 0, check:");
    println!("  1. Is your mic plugged in?");
    println!("  2. Run: pactl info | grep 'Default Source'");
    println!("  3. Run: arecord -l (to list devices)");

    Ok(())
}

/// Calculate RMS energy
#[allow(clippy::cast_precision_loss)]
fn calculate_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}

/// Test speaker output with a sine wave
async fn test_speaker() -> anyhow::Result<()> {
    println!("Testing speaker output...");
    println!("You should hear a 440Hz tone for 2 seconds\n");

    let playback = AudioPlayback::new()?;

    // Generate 2 seconds of 440Hz sine wave at 24kHz sample rate
    let sample_rate = 24000_i32;
    let frequency = 440.0_f32;
    let duration_secs = 2.0_f32;
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    let num_samples = (sample_rate as f32 * duration_secs) as usize;

    #[allow(clippy::cast_precision_loss)]
    let samples: Vec<f32> = (0..num_samples)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            (2.0 * std::f32::consts::PI * frequency * t).sin() * 0.3 // 30% volume
        })
        .collect();

    println!("Playing {} samples at {} Hz...", samples.len(), sample_rate);

    playback.play(samples).await?;

    println!("\n---");
    println!("If you heard the tone, your speakers are working!");
    println!("If you didn't hear anything, check:");
    println!("  1. Run: pactl info | grep 'Default Sink'");
    println!("  2. Run: pactl list sinks short");

    Ok(())
}

/// Print the merged extracted information for a session
fn cmd_summary(session: Option<&str>) -> anyhow::Result<()> {
    let config = Config::load()?;
    let store = SessionStore::open(&config.store_path);

    let id = match session {
        Some(id) => id.to_string(),
        None => store
            .session_ids()
            .last()
            .map(ToString::to_string)
            .ok_or_else(|| anyhow::anyhow!("no sessions recorded yet"))?,
    };

    let summary = store.summarize(&id)?;
    if summary.is_empty() {
        println!("Session {id}: nothing extracted");
        return Ok(());
    }

    println!("Session {id}:");
    for (category, values) in &summary {
        println!("  {category}:");
        for value in values {
            println!("    - {value}");
        }
    }

    Ok(())
}

/// Search stored turns for a substring
fn cmd_search(query: &str) -> anyhow::Result<()> {
    let config = Config::load()?;
    let store = SessionStore::open(&config.store_path);

    let hits = store.search(query);
    if hits.is_empty() {
        println!("No turns matched \"{query}\"");
        return Ok(());
    }

    for hit in hits {
        println!(
            "[{} #{}] {}",
            hit.session_id, hit.turn_index, hit.turn.timestamp
        );
        println!("  You: {}", hit.turn.user_text);
        println!("  Assistant: {}", hit.turn.assistant_text);
    }

    Ok(())
}
