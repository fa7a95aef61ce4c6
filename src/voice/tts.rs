//! Text-to-speech (TTS) processing

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::capture::wall_clock;
use super::playback::AudioPlayback;
use crate::config::SpeechConfig;
use crate::{Error, Result};

/// Speaks text aloud
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Synthesize `text` to an audio file and return its path
    ///
    /// # Errors
    ///
    /// Returns error if synthesis fails
    async fn synthesize(&self, text: &str) -> Result<PathBuf>;

    /// Play an audio file, returning once playback completes
    ///
    /// # Errors
    ///
    /// Returns error if playback fails
    async fn play(&self, audio_path: &Path) -> Result<()>;
}

/// Synthesizes through an HTTP service returning WAV audio
pub struct HttpSynthesizer {
    client: reqwest::Client,
    url: String,
    voice: String,
    speed: f32,
    voices_dir: PathBuf,
}

impl HttpSynthesizer {
    /// Create a synthesizer from speech settings
    ///
    /// # Errors
    ///
    /// Returns error if the endpoint is missing
    pub fn new(config: &SpeechConfig) -> Result<Self> {
        if config.tts_url.trim().is_empty() {
            return Err(Error::Config("speech.tts_url is required".to_string()));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            url: config.tts_url.clone(),
            voice: config.tts_voice.clone(),
            speed: config.tts_speed,
            voices_dir: config.voices_dir.clone(),
        })
    }
}

#[async_trait]
impl Synthesizer for HttpSynthesizer {
    async fn synthesize(&self, text: &str) -> Result<PathBuf> {
        #[derive(serde::Serialize)]
        struct TtsRequest<'a> {
            text: &'a str,
            voice: &'a str,
            speed: f32,
        }

        let request = TtsRequest {
            text,
            voice: &self.voice,
            speed: self.speed,
        };

        let response = self.client.post(&self.url).json(&request).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Tts(format!("synthesis service error {status}: {body}")));
        }

        let audio = response.bytes().await?;
        tokio::fs::create_dir_all(&self.voices_dir).await?;
        let path = self
            .voices_dir
            .join(format!("{}.wav", wall_clock().as_millis()));
        tokio::fs::write(&path, &audio).await?;

        tracing::debug!(path = %path.display(), bytes = audio.len(), "speech synthesized");
        Ok(path)
    }

    async fn play(&self, audio_path: &Path) -> Result<()> {
        let path = audio_path.to_path_buf();
        tokio::task::spawn_blocking(move || AudioPlayback::new().play_wav(&path))
            .await
            .map_err(|e| Error::Audio(format!("playback task failed: {e}")))?
    }
}
