//! Error types for the voice command pipeline

use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the voice command pipeline
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Audio capture or playback error
    #[error("audio error: {0}")]
    Audio(String),

    /// Speech-to-text error
    #[error("STT error: {0}")]
    Stt(String),

    /// Text-to-speech error
    #[error("TTS error: {0}")]
    Tts(String),

    /// Cloud link error
    #[error("network error: {0}")]
    Network(String),

    /// Motion execution error
    #[error("motion error: {0}")]
    Motion(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),

    /// WAV encoding or decoding error
    #[error("wav error: {0}")]
    Wav(#[from] hound::Error),
}

impl Error {
    /// Short category name, used as the `kind` field when a failure is logged
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::Audio(_) => "audio",
            Self::Stt(_) => "stt",
            Self::Tts(_) => "tts",
            Self::Network(_) => "network",
            Self::Motion(_) => "motion",
            Self::Io(_) => "io",
            Self::Http(_) => "http",
            Self::Serialization(_) => "serialization",
            Self::Toml(_) => "toml",
            Self::Wav(_) => "wav",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_names_match_variant() {
        assert_eq!(Error::Stt("boom".into()).kind(), "stt");
        let io = Error::from(std::io::Error::other("disk"));
        assert_eq!(io.kind(), "io");
        assert_eq!(io.to_string(), "io error: disk");
    }
}
