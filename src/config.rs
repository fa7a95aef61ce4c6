//! Configuration management for the voice pipeline
//!
//! Defaults are overridden by an optional TOML file, then by environment
//! variables for the values that differ per robot.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Microphone capture and recording detection
    pub audio: AudioConfig,

    /// Cloud command/telemetry server link
    pub network: NetworkConfig,

    /// Remote language model service
    pub llm: LlmConfig,

    /// Speech-to-text and text-to-speech services
    pub speech: SpeechConfig,

    /// Wake words and command defaults
    pub command: CommandConfig,

    /// Battery status source
    pub battery: BatteryConfig,
}

/// Audio capture and detector configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Capture sample rate in Hz
    pub sample_rate: u32,

    /// Samples per frame handed to the detector
    pub block_size: usize,

    /// Volume percent that marks voice activity
    pub low_threshold: f32,

    /// Volume percent that starts (and sustains) a recording
    pub high_threshold: f32,

    /// Seconds of audio kept before the trigger frame
    pub pre_roll_secs: f32,

    /// Seconds of quiet that end a recording; trimmed from the tail
    pub silence_cut_secs: f32,

    /// Multiplier applied to RMS before conversion to percent
    pub gain: f32,

    /// Where finalized utterances are written as WAV
    pub recordings_dir: PathBuf,

    /// Finalized utterances allowed to wait for the coordinator
    pub max_pending_utterances: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            block_size: 1024,
            low_threshold: 15.0,
            high_threshold: 20.0,
            pre_roll_secs: 1.0,
            silence_cut_secs: 1.0,
            gain: 2.0,
            recordings_dir: PathBuf::from("recordings"),
            max_pending_utterances: 1,
        }
    }
}

/// Cloud server link configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Enable the cloud link
    pub enabled: bool,

    /// Server address (`host:port`)
    pub server_addr: String,

    /// Robot identifier sent with every telemetry frame
    pub device_id: String,

    /// Pause between connection attempts
    pub reconnect_interval_secs: f64,

    /// Timeout for a single connection attempt
    pub connect_timeout_secs: f64,

    /// Bytes requested per socket read
    pub read_chunk_size: usize,

    /// Pause between telemetry frames
    pub telemetry_interval_secs: f64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            server_addr: "127.0.0.1:9000".to_string(),
            device_id: "1001".to_string(),
            reconnect_interval_secs: 5.0,
            connect_timeout_secs: 10.0,
            read_chunk_size: 256,
            telemetry_interval_secs: 10.0,
        }
    }
}

impl NetworkConfig {
    /// Reconnect pause as a `Duration`
    #[must_use]
    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_secs_f64(self.reconnect_interval_secs.max(0.0))
    }

    /// Connect timeout as a `Duration`
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.connect_timeout_secs.max(0.001))
    }

    /// Telemetry period as a `Duration`
    #[must_use]
    pub fn telemetry_interval(&self) -> Duration {
        Duration::from_secs_f64(self.telemetry_interval_secs.max(0.001))
    }
}

/// Language model service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Service root URL
    pub base_url: String,

    /// Route appended to `base_url` for chat requests
    pub chat_route: String,

    /// Request timeout in seconds
    pub timeout_secs: f64,

    /// Use the streaming endpoint behaviour
    pub streaming: bool,

    /// Optional project identifier forwarded to the service
    pub project_id: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000".to_string(),
            chat_route: "/ChatMessages".to_string(),
            timeout_secs: 10.0,
            streaming: false,
            project_id: None,
        }
    }
}

impl LlmConfig {
    /// Full chat endpoint URL
    #[must_use]
    pub fn chat_url(&self) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), self.chat_route)
    }

    /// Request timeout as a `Duration`
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs_f64(self.timeout_secs.max(0.001))
    }
}

/// Speech services configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    /// Transcription endpoint (multipart WAV upload, JSON `{text}` reply)
    pub stt_url: String,

    /// Synthesis endpoint (JSON request, WAV reply)
    pub tts_url: String,

    /// Voice identifier passed to the synthesis service
    pub tts_voice: String,

    /// Speech speed multiplier
    pub tts_speed: f32,

    /// Where synthesized replies are written
    pub voices_dir: PathBuf,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            stt_url: "http://127.0.0.1:8001/transcribe".to_string(),
            tts_url: "http://127.0.0.1:8002/synthesize".to_string(),
            tts_voice: "zm_014".to_string(),
            tts_speed: 1.1,
            voices_dir: PathBuf::from("voices"),
        }
    }
}

/// Wake word and command defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandConfig {
    /// Romanised wake phrases (tone numbers allowed, e.g. `xiao3gou3`)
    pub wake_words: Vec<String>,

    /// Utterances accepted after a wake word
    pub validity_turns: u32,

    /// Forward speed per speed index, in m/s
    pub speed_levels: Vec<f32>,

    /// Starting speed index
    pub default_speed_index: usize,

    /// Starting distance in meters when none is spoken
    pub default_distance: u32,

    /// Turn angle in degrees when none is spoken
    pub default_angle: f32,

    /// Pause after each move step
    pub step_interval_ms: u64,

    /// Pause after each turn step
    pub turn_interval_ms: u64,

    /// Pause between stand-up and balance-stand
    pub stand_settle_ms: u64,
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            wake_words: vec!["xiao3gou3".to_string()],
            validity_turns: 6,
            speed_levels: vec![0.3, 0.6, 0.9],
            default_speed_index: 1,
            default_distance: 2,
            default_angle: 45.0,
            step_interval_ms: 1000,
            turn_interval_ms: 500,
            stand_settle_ms: 500,
        }
    }
}

/// Battery status source
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatteryConfig {
    /// Root of the sysfs tree
    pub sysfs_root: PathBuf,

    /// Entry under `class/power_supply`
    pub power_supply: String,

    /// Entry under `class/thermal` read as the mainboard temperature
    pub thermal_zone: String,
}

impl Default for BatteryConfig {
    fn default() -> Self {
        Self {
            sysfs_root: PathBuf::from("/sys"),
            power_supply: "BAT0".to_string(),
            thermal_zone: "thermal_zone0".to_string(),
        }
    }
}

/// Return the default config file location
///
/// Uses `~/.config/go2-voice/config.toml` on Linux
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("dev", "go2", "go2-voice")
        .map(|d| d.config_dir().join("config.toml"))
}

impl Config {
    /// Load configuration: defaults, then TOML file, then environment
    ///
    /// An explicit `path` must exist; the default location is skipped when
    /// missing.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or parsed, or the result
    /// fails validation
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match default_config_path() {
                Some(path) if path.exists() => Self::from_file(&path)?,
                _ => {
                    tracing::debug!("no config file found, using defaults");
                    Self::default()
                }
            },
        };

        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML config file
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or parsed
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read {}: {e}", path.display())))?;
        let config: Self = toml::from_str(&content)?;
        tracing::info!(path = %path.display(), "loaded config file");
        Ok(config)
    }

    /// Apply environment variable overrides
    pub fn apply_env(&mut self) {
        if let Ok(addr) = std::env::var("GO2_SERVER_ADDR") {
            self.network.server_addr = addr;
        }
        if let Ok(id) = std::env::var("GO2_DEVICE_ID") {
            self.network.device_id = id;
        }
        if let Ok(url) = std::env::var("GO2_LLM_URL") {
            self.llm.base_url = url;
        }
        if let Ok(url) = std::env::var("GO2_STT_URL") {
            self.speech.stt_url = url;
        }
        if let Ok(url) = std::env::var("GO2_TTS_URL") {
            self.speech.tts_url = url;
        }
        if let Ok(words) = std::env::var("GO2_WAKE_WORDS") {
            let words: Vec<String> = words
                .split(',')
                .map(str::trim)
                .filter(|w| !w.is_empty())
                .map(ToString::to_string)
                .collect();
            if !words.is_empty() {
                self.command.wake_words = words;
            }
        }
    }

    /// Check value ranges the pipeline relies on
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` describing the first invalid value
    pub fn validate(&self) -> Result<()> {
        let audio = &self.audio;
        if audio.sample_rate == 0 || audio.block_size == 0 {
            return Err(Error::Config(
                "audio.sample_rate and audio.block_size must be non-zero".to_string(),
            ));
        }
        if audio.low_threshold > audio.high_threshold {
            return Err(Error::Config(format!(
                "audio.low_threshold ({}) exceeds audio.high_threshold ({})",
                audio.low_threshold, audio.high_threshold
            )));
        }
        if audio.max_pending_utterances == 0 {
            return Err(Error::Config(
                "audio.max_pending_utterances must be at least 1".to_string(),
            ));
        }

        let command = &self.command;
        if command.speed_levels.is_empty() {
            return Err(Error::Config("command.speed_levels is empty".to_string()));
        }
        if let Some(speed) = command
            .speed_levels
            .iter()
            .find(|speed| !speed.is_finite() || **speed <= 0.0)
        {
            return Err(Error::Config(format!(
                "command.speed_levels entry {speed} must be a positive speed in m/s"
            )));
        }
        if command.default_speed_index >= command.speed_levels.len()
            || command.default_speed_index > crate::command::MAX_SPEED_INDEX
        {
            return Err(Error::Config(format!(
                "command.default_speed_index {} out of range",
                command.default_speed_index
            )));
        }
        if !crate::command::DISTANCE_RANGE.contains(&command.default_distance) {
            return Err(Error::Config(format!(
                "command.default_distance {} out of range",
                command.default_distance
            )));
        }
        if command.wake_words.is_empty() {
            tracing::warn!("no wake words configured, no command will be admitted");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
            [audio]
            high_threshold = 30.0

            [network]
            server_addr = "10.0.0.2:9000"
            "#,
        )
        .unwrap();

        assert!((config.audio.high_threshold - 30.0).abs() < f32::EPSILON);
        assert_eq!(config.audio.block_size, 1024);
        assert_eq!(config.network.server_addr, "10.0.0.2:9000");
        assert_eq!(config.command.validity_turns, 6);
    }

    #[test]
    fn rejects_inverted_thresholds() {
        let mut config = Config::default();
        config.audio.low_threshold = 50.0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn rejects_distance_out_of_range() {
        let mut config = Config::default();
        config.command.default_distance = 9;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_non_positive_speed_levels() {
        for bad in [0.0, -0.3, f32::NAN, f32::INFINITY] {
            let mut config = Config::default();
            config.command.speed_levels = vec![0.3, bad, 0.9];
            assert!(
                matches!(config.validate(), Err(Error::Config(_))),
                "speed {bad} accepted"
            );
        }
    }

    #[test]
    fn chat_url_joins_route() {
        let llm = LlmConfig {
            base_url: "http://host:8000/".to_string(),
            ..LlmConfig::default()
        };
        assert_eq!(llm.chat_url(), "http://host:8000/ChatMessages");
    }

    #[test]
    fn loads_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[command]\ndefault_distance = 3\n").unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.command.default_distance, 3);
    }
}
