//! Speech-to-text (STT) processing

use std::path::Path;
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;

use crate::{Error, Result};

/// Recogniser control tags such as `<|zh|><|NEUTRAL|><|Speech|>`
static CONTROL_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<\|[^|>]*\|>").expect("valid regex"));

/// Turns a recorded utterance into text
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe the WAV file at `audio_path`
    ///
    /// # Errors
    ///
    /// Returns error if transcription fails
    async fn transcribe(&self, audio_path: &Path) -> Result<String>;
}

/// Strip recogniser control tags and surrounding whitespace
#[must_use]
pub fn postprocess_transcript(text: &str) -> String {
    CONTROL_TAG.replace_all(text, "").trim().to_string()
}

/// Response from the transcription service
#[derive(serde::Deserialize)]
struct TranscriptionResponse {
    text: String,
}

/// Transcribes through an HTTP service accepting a multipart WAV upload
pub struct HttpTranscriber {
    client: reqwest::Client,
    url: String,
}

impl HttpTranscriber {
    /// Create a transcriber posting to `url`
    ///
    /// # Errors
    ///
    /// Returns error if the URL is empty
    pub fn new(url: String) -> Result<Self> {
        if url.trim().is_empty() {
            return Err(Error::Config("speech.stt_url is required".to_string()));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            url,
        })
    }
}

#[async_trait]
impl Transcriber for HttpTranscriber {
    async fn transcribe(&self, audio_path: &Path) -> Result<String> {
        let audio = tokio::fs::read(audio_path).await?;
        tracing::debug!(
            audio_bytes = audio.len(),
            path = %audio_path.display(),
            "starting transcription"
        );

        let file_name = audio_path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("audio.wav")
            .to_string();
        let form = reqwest::multipart::Form::new().part(
            "file",
            reqwest::multipart::Part::bytes(audio)
                .file_name(file_name)
                .mime_str("audio/wav")
                .map_err(|e| Error::Stt(e.to_string()))?,
        );

        let response = self
            .client
            .post(&self.url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "transcription request failed");
                e
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "transcription service error");
            return Err(Error::Stt(format!("transcription service error {status}: {body}")));
        }

        let result: TranscriptionResponse = response.json().await.map_err(|e| {
            tracing::error!(error = %e, "failed to parse transcription response");
            e
        })?;

        let text = postprocess_transcript(&result.text);
        tracing::info!(transcript = %text, "transcription complete");
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_control_tags() {
        assert_eq!(
            postprocess_transcript("<|zh|><|NEUTRAL|><|Speech|><|withitn|>前走三米。 "),
            "前走三米。"
        );
    }

    #[test]
    fn rejects_empty_url() {
        assert!(HttpTranscriber::new(String::new()).is_err());
    }
}
