//! Single-slot text-to-speech playback
//!
//! Only one message plays at a time. Playback failures are logged and
//! otherwise invisible: nothing is added to the transcript.

use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use thiserror::Error;
use tokio::io::AsyncWriteExt;

use crate::llm::LLMError;
use crate::view::ViewState;

/// Speech output format: 16-bit signed little-endian PCM, mono
pub const SAMPLE_RATE: u32 = 24_000;
pub const CHANNELS: u16 = 1;

pub const DEFAULT_PLAYER_COMMAND: &str = "aplay";

#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("Speech synthesis failed: {0}")]
    Synthesis(#[from] LLMError),

    #[error("Invalid audio data: {0}")]
    Decode(String),

    #[error("Audio output failed: {0}")]
    Sink(String),
}

#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Base64-encoded PCM audio for `text`
    async fn synthesize(&self, text: &str) -> Result<String, LLMError>;
}

#[async_trait]
pub trait AudioSink: Send + Sync {
    /// Resolves once playback has finished
    async fn play(&self, buffer: &AudioBuffer) -> Result<(), PlaybackError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    pub sample_rate: u32,
    pub channels: u16,
    /// Normalized to [-1.0, 1.0)
    pub samples: Vec<f32>,
}

impl AudioBuffer {
    pub fn duration_secs(&self) -> f32 {
        self.samples.len() as f32 / (self.sample_rate as f32 * self.channels as f32)
    }

    fn to_le_bytes(&self) -> Vec<u8> {
        self.samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }
}

/// Decode base64 16-bit PCM into float samples at 24 kHz mono
pub fn decode_pcm16(encoded: &str) -> Result<AudioBuffer, PlaybackError> {
    let bytes = STANDARD
        .decode(encoded.trim())
        .map_err(|e| PlaybackError::Decode(e.to_string()))?;
    if bytes.len() % 2 != 0 {
        return Err(PlaybackError::Decode(format!(
            "odd byte count {} for 16-bit samples",
            bytes.len()
        )));
    }

    let samples = bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32768.0)
        .collect();

    Ok(AudioBuffer {
        sample_rate: SAMPLE_RATE,
        channels: CHANNELS,
        samples,
    })
}

/// Plays raw float samples through an external player reading stdin
pub struct ProcessSink {
    command: String,
    args: Vec<String>,
}

impl ProcessSink {
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
        }
    }

    pub fn default_args() -> Vec<String> {
        [
            "-q",
            "-t",
            "raw",
            "-f",
            "FLOAT_LE",
            "-r",
            "24000",
            "-c",
            "1",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }
}

impl Default for ProcessSink {
    fn default() -> Self {
        Self::new(DEFAULT_PLAYER_COMMAND, Self::default_args())
    }
}

#[async_trait]
impl AudioSink for ProcessSink {
    async fn play(&self, buffer: &AudioBuffer) -> Result<(), PlaybackError> {
        let mut child = tokio::process::Command::new(&self.command)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| PlaybackError::Sink(format!("{}: {}", self.command, e)))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(&buffer.to_le_bytes())
                .await
                .map_err(|e| PlaybackError::Sink(e.to_string()))?;
            // Closing stdin lets the player drain and exit
            drop(stdin);
        }

        let status = child
            .wait()
            .await
            .map_err(|e| PlaybackError::Sink(e.to_string()))?;
        if !status.success() {
            return Err(PlaybackError::Sink(format!(
                "{} exited with {}",
                self.command, status
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackOutcome {
    Played,
    /// Another message is playing; nothing was done
    Busy,
    Failed,
}

/// Frees the playback slot however `speak` exits
struct PlaybackSlot<'a> {
    view: &'a ViewState,
}

impl Drop for PlaybackSlot<'_> {
    fn drop(&mut self) {
        self.view.end_playback();
    }
}

pub struct PlaybackController {
    view: Arc<ViewState>,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    sink: Arc<dyn AudioSink>,
}

impl PlaybackController {
    pub fn new(
        view: Arc<ViewState>,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        sink: Arc<dyn AudioSink>,
    ) -> Self {
        Self {
            view,
            synthesizer,
            sink,
        }
    }

    /// Read `text` aloud on behalf of message `id`
    pub async fn speak(&self, id: &str, text: &str) -> PlaybackOutcome {
        if !self.view.try_begin_playback(id) {
            tracing::debug!(%id, "Playback busy, ignoring request");
            return PlaybackOutcome::Busy;
        }
        let _slot = PlaybackSlot { view: &self.view };

        match self.play(text).await {
            Ok(()) => PlaybackOutcome::Played,
            Err(e) => {
                tracing::warn!(%id, error = %e, "Playback failed");
                PlaybackOutcome::Failed
            }
        }
    }

    async fn play(&self, text: &str) -> Result<(), PlaybackError> {
        let encoded = self.synthesizer.synthesize(text).await?;
        let buffer = decode_pcm16(&encoded)?;
        tracing::debug!(seconds = buffer.duration_secs(), "Playing speech");
        self.sink.play(&buffer).await
    }
}
