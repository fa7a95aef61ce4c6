//! Volume-threshold recording detector
//!
//! A frame at or above the high threshold starts a recording seeded with the
//! pre-roll buffer. The recording ends once no loud frame has been seen for
//! the silence-cut interval; that quiet tail is trimmed before hand-off.

use std::path::{Path, PathBuf};
use std::time::Duration;

use super::activity::{ActivityBuffer, AudioFrame};
use crate::Result;
use crate::config::AudioConfig;

/// Detector state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderState {
    /// Waiting for a loud frame
    Idle,
    /// Assembling an utterance
    Recording,
}

/// Thresholds and timing for the detector
#[derive(Debug, Clone)]
pub struct DetectorSettings {
    /// Sample rate of incoming frames
    pub sample_rate: u32,
    /// Samples per frame
    pub frame_size: usize,
    /// Volume percent marking voice activity
    pub low_threshold: f32,
    /// Volume percent that starts and sustains a recording
    pub high_threshold: f32,
    /// Seconds of pre-roll kept before the trigger
    pub pre_roll_secs: f32,
    /// Seconds of quiet that end a recording
    pub silence_cut_secs: f32,
}

impl DetectorSettings {
    /// Quiet interval that ends a recording
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn silence_cut(&self) -> Duration {
        let millis = (f64::from(self.silence_cut_secs.max(0.0)) * 1000.0).round();
        Duration::from_millis(millis as u64)
    }

    /// Samples removed from the end of every finalized utterance
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn silence_cut_samples(&self) -> usize {
        (f64::from(self.silence_cut_secs.max(0.0)) * f64::from(self.sample_rate)).round() as usize
    }
}

impl From<&AudioConfig> for DetectorSettings {
    fn from(config: &AudioConfig) -> Self {
        Self {
            sample_rate: config.sample_rate,
            frame_size: config.block_size,
            low_threshold: config.low_threshold,
            high_threshold: config.high_threshold,
            pre_roll_secs: config.pre_roll_secs,
            silence_cut_secs: config.silence_cut_secs,
        }
    }
}

/// One contiguous speech segment
#[derive(Debug, Clone)]
pub struct Utterance {
    frames: Vec<AudioFrame>,
    started_at: Duration,
    last_loud_at: Duration,
    sample_rate: u32,
}

impl Utterance {
    /// Start an utterance from pre-roll frames
    #[must_use]
    pub const fn new(frames: Vec<AudioFrame>, started_at: Duration, sample_rate: u32) -> Self {
        Self {
            frames,
            started_at,
            last_loud_at: started_at,
            sample_rate,
        }
    }

    /// Frames in capture order
    #[must_use]
    pub fn frames(&self) -> &[AudioFrame] {
        &self.frames
    }

    /// All samples, concatenated
    #[must_use]
    pub fn samples(&self) -> Vec<i16> {
        self.frames
            .iter()
            .flat_map(|f| f.samples().iter().copied())
            .collect()
    }

    /// Total sample count
    #[must_use]
    pub fn total_samples(&self) -> usize {
        self.frames.iter().map(AudioFrame::len).sum()
    }

    /// Wall-clock time of the trigger frame (since the Unix epoch)
    #[must_use]
    pub const fn started_at(&self) -> Duration {
        self.started_at
    }

    /// Wall-clock time of the last loud frame
    #[must_use]
    pub const fn last_loud_at(&self) -> Duration {
        self.last_loud_at
    }

    /// Sample rate of the audio
    #[must_use]
    pub const fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Length in seconds
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn duration_secs(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.total_samples() as f32 / self.sample_rate as f32
    }

    /// Remove `remove` samples from the end
    ///
    /// Returns `None` when nothing would remain. A frame straddling the cut
    /// is truncated at sample granularity.
    #[must_use]
    pub fn trim_tail(self, remove: usize) -> Option<Self> {
        let total = self.total_samples();
        if total <= remove {
            return None;
        }

        let mut remaining = total - remove;
        let mut frames = Vec::with_capacity(self.frames.len());
        for mut frame in self.frames {
            if remaining == 0 {
                break;
            }
            if frame.len() > remaining {
                frame.truncate(remaining);
            }
            remaining -= frame.len();
            frames.push(frame);
        }

        Some(Self { frames, ..self })
    }

    /// File name encoding the trigger time
    #[must_use]
    pub fn file_name(&self) -> String {
        format!("recording_{}.wav", self.started_at.as_millis())
    }

    /// Write the utterance as 16-bit mono WAV into `dir`
    ///
    /// # Errors
    ///
    /// Returns error if the directory or file cannot be written
    pub fn write_wav(&self, dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(self.file_name());

        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec)?;
        for frame in &self.frames {
            for &sample in frame.samples() {
                writer.write_sample(sample)?;
            }
        }
        writer.finalize()?;

        tracing::debug!(path = %path.display(), samples = self.total_samples(), "utterance saved");
        Ok(path)
    }
}

/// Dual-threshold recording state machine over per-frame volume
#[derive(Debug)]
pub struct RecordingDetector {
    settings: DetectorSettings,
    buffer: ActivityBuffer,
    current: Option<Utterance>,
    last_activity_at: Option<Duration>,
}

impl RecordingDetector {
    /// Create a detector in the idle state
    #[must_use]
    pub fn new(settings: DetectorSettings) -> Self {
        let buffer = ActivityBuffer::for_duration(
            settings.pre_roll_secs,
            settings.sample_rate,
            settings.frame_size,
        );
        Self {
            settings,
            buffer,
            current: None,
            last_activity_at: None,
        }
    }

    /// Feed one frame with its volume at wall-clock time `now`
    ///
    /// Returns a finalized utterance, already tail-trimmed, when this frame
    /// completes one. Utterances too short to survive the trim are dropped.
    pub fn on_frame(
        &mut self,
        frame: AudioFrame,
        volume_percent: f32,
        now: Duration,
    ) -> Option<Utterance> {
        self.mark_activity(volume_percent, now);

        let loud = volume_percent >= self.settings.high_threshold;
        let Some(utterance) = self.current.as_mut() else {
            self.buffer.push(frame);
            if loud {
                tracing::trace!(volume_percent, "recording started");
                self.current = Some(Utterance::new(
                    self.buffer.snapshot(),
                    now,
                    self.settings.sample_rate,
                ));
            }
            return None;
        };

        self.buffer.push(frame.clone());
        utterance.frames.push(frame);

        if loud {
            utterance.last_loud_at = now;
            return None;
        }
        if now.saturating_sub(utterance.last_loud_at) < self.settings.silence_cut() {
            return None;
        }

        let utterance = self.current.take()?;
        let trimmed = utterance.trim_tail(self.settings.silence_cut_samples());
        match &trimmed {
            Some(u) => tracing::trace!(samples = u.total_samples(), "recording finalized"),
            None => tracing::trace!("recording too short, discarded"),
        }
        trimmed
    }

    /// Current state
    #[must_use]
    pub const fn state(&self) -> RecorderState {
        if self.current.is_some() {
            RecorderState::Recording
        } else {
            RecorderState::Idle
        }
    }

    /// Last time volume crossed the low threshold
    #[must_use]
    pub const fn last_activity_at(&self) -> Option<Duration> {
        self.last_activity_at
    }

    /// Pre-roll buffer
    #[must_use]
    pub const fn activity_buffer(&self) -> &ActivityBuffer {
        &self.buffer
    }

    fn mark_activity(&mut self, volume_percent: f32, now: Duration) {
        if volume_percent < self.settings.low_threshold {
            return;
        }
        let half_cut = self.settings.silence_cut() / 2;
        let due = self
            .last_activity_at
            .is_none_or(|last| now.saturating_sub(last) > half_cut);
        if due {
            self.last_activity_at = Some(now);
            tracing::trace!(volume_percent, "voice activity");
        }
    }
}
