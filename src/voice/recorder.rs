//! Voice-activity recording
//!
//! Records from the microphone until the speaker has been quiet long
//! enough, or until a hard time cap is hit, whichever comes first. The
//! silence decision works on fixed-size frames: a frame whose mean
//! absolute amplitude falls below the threshold counts toward a
//! consecutive-silence total, and any louder frame resets it.

use std::time::Duration;

use tokio::time::Instant;

use crate::config::VoiceConfig;
use crate::voice::capture::{AudioCapture, SAMPLE_RATE, samples_to_wav};
use crate::{Error, Result};

/// Interval between capture buffer polls (one ~2-frame slice at 16kHz)
const POLL_INTERVAL: Duration = Duration::from_millis(64);

/// A finished recording: raw PCM plus the format it was captured in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioBuffer {
    /// Raw PCM samples
    pub samples: Vec<i16>,
    /// Samples per second
    pub sample_rate: u32,
    /// Channel count
    pub channels: u16,
    /// Bits per sample
    pub bits_per_sample: u16,
}

impl AudioBuffer {
    /// Encode as a WAV container matching the capture format
    ///
    /// # Errors
    ///
    /// Returns error if WAV encoding fails
    pub fn to_wav(&self) -> Result<Vec<u8>> {
        samples_to_wav(&self.samples, self.sample_rate)
    }

    /// Recording length in seconds
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / f64::from(self.sample_rate)
    }
}

/// Tracks consecutive sub-threshold frames
///
/// Pure frame arithmetic, separated from the device so the end-of-turn
/// decision can be exercised without audio hardware.
#[derive(Debug)]
pub struct SilenceTracker {
    threshold: f32,
    frame_limit: usize,
    silent_frames: usize,
}

impl SilenceTracker {
    /// Build a tracker for the given silence duration
    ///
    /// The duration converts to a frame count as
    /// `silence_duration_s * sample_rate / frame_size`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn new(threshold: f32, silence_duration_s: f64, frame_size: usize) -> Self {
        let frame_limit =
            (silence_duration_s * f64::from(SAMPLE_RATE) / frame_size as f64) as usize;
        Self {
            threshold,
            frame_limit,
            silent_frames: 0,
        }
    }

    /// Feed one frame; returns true once silence has lasted long enough
    ///
    /// Leading silence accumulates like any other: a short utterance
    /// surrounded by quiet still terminates.
    pub fn observe(&mut self, frame: &[i16]) -> bool {
        if mean_abs(frame) < self.threshold {
            self.silent_frames += 1;
        } else {
            self.silent_frames = 0;
        }
        self.silent_frames > self.frame_limit
    }
}

/// Mean absolute amplitude of a frame, on the i16 scale
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn mean_abs(frame: &[i16]) -> f32 {
    if frame.is_empty() {
        return 0.0;
    }
    let sum: f64 = frame.iter().map(|&s| f64::from(s).abs()).sum();
    (sum / frame.len() as f64) as f32
}

/// Source of captured samples, polled by the recorder
///
/// [`AudioCapture`] is the production implementation; the seam exists so
/// the recording loop can be exercised without audio hardware.
pub trait SampleSource {
    /// Take all samples produced since the last call
    fn drain(&mut self) -> Vec<f32>;
}

impl SampleSource for AudioCapture {
    fn drain(&mut self) -> Vec<f32> {
        Self::drain(self)
    }
}

/// Records one utterance, detecting end-of-turn from sustained silence
pub struct VoiceActivityRecorder {
    silence_threshold: f32,
    frame_size: usize,
}

impl VoiceActivityRecorder {
    /// Create a recorder with the configured silence tuning
    #[must_use]
    pub fn new(config: &VoiceConfig) -> Self {
        Self {
            silence_threshold: config.silence_threshold,
            frame_size: config.frame_size,
        }
    }

    /// Record until silence or the time cap, whichever comes first
    ///
    /// The input device is opened at the start of this call and released
    /// on every exit path, including errors. The time cap is a hard
    /// fail-safe: even if the stream never goes quiet (or never produces
    /// data at all), the call returns within one poll interval of
    /// `max_record_time_s`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Audio`] if the device cannot be opened or nothing
    /// was captured
    pub async fn record(
        &self,
        silence_duration_s: f64,
        max_record_time_s: f64,
    ) -> Result<AudioBuffer> {
        let mut capture = AudioCapture::open()?;
        self.record_from(&mut capture, silence_duration_s, max_record_time_s)
            .await
    }

    /// Record from an explicit sample source
    ///
    /// # Errors
    ///
    /// Returns [`Error::Audio`] if nothing was captured by the time the
    /// recording ends
    pub async fn record_from(
        &self,
        source: &mut impl SampleSource,
        silence_duration_s: f64,
        max_record_time_s: f64,
    ) -> Result<AudioBuffer> {
        let mut tracker =
            SilenceTracker::new(self.silence_threshold, silence_duration_s, self.frame_size);

        let max_duration = Duration::from_secs_f64(max_record_time_s);
        let started = Instant::now();

        let mut samples: Vec<i16> = Vec::new();
        let mut pending: Vec<f32> = Vec::new();

        'capture: loop {
            tokio::time::sleep(POLL_INTERVAL).await;
            pending.extend(source.drain());

            while pending.len() >= self.frame_size {
                let frame: Vec<i16> = pending
                    .drain(..self.frame_size)
                    .map(f32_to_i16)
                    .collect();
                let done = tracker.observe(&frame);
                samples.extend_from_slice(&frame);

                if done {
                    tracing::debug!(
                        samples = samples.len(),
                        elapsed_s = started.elapsed().as_secs_f64(),
                        "silence detected, stopping recording"
                    );
                    break 'capture;
                }
            }

            if started.elapsed() >= max_duration {
                samples.extend(pending.drain(..).map(f32_to_i16));
                tracing::debug!(
                    samples = samples.len(),
                    "max record time reached, stopping recording"
                );
                break;
            }
        }

        if samples.is_empty() {
            return Err(Error::Audio("no audio captured".to_string()));
        }

        Ok(AudioBuffer {
            samples,
            sample_rate: SAMPLE_RATE,
            channels: 1,
            bits_per_sample: 16,
        })
    }
}

/// Convert an f32 sample in [-1.0, 1.0] to i16
#[allow(clippy::cast_possible_truncation)]
fn f32_to_i16(sample: f32) -> i16 {
    (sample * 32767.0).clamp(-32768.0, 32767.0) as i16
}
