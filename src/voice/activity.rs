//! Audio frames and the pre-roll ring buffer

use std::collections::VecDeque;

/// A fixed-length block of signed 16-bit mono samples
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AudioFrame {
    samples: Vec<i16>,
}

impl AudioFrame {
    /// Wrap a block of samples
    #[must_use]
    pub const fn new(samples: Vec<i16>) -> Self {
        Self { samples }
    }

    /// Frame filled with a single sample value
    #[must_use]
    pub fn constant(value: i16, len: usize) -> Self {
        Self::new(vec![value; len])
    }

    /// The samples in this frame
    #[must_use]
    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    /// Number of samples
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the frame holds no samples
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Keep only the first `len` samples
    pub fn truncate(&mut self, len: usize) {
        self.samples.truncate(len);
    }

    /// Loudness in percent of full scale: `rms * gain / 32767 * 100`
    #[must_use]
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
    pub fn volume_percent(&self, gain: f32) -> f32 {
        if self.samples.is_empty() {
            return 0.0;
        }

        let sum_squares: f64 = self
            .samples
            .iter()
            .map(|&s| {
                let s = f64::from(s);
                s * s
            })
            .sum();
        let rms = (sum_squares / self.samples.len() as f64).sqrt();
        (rms * f64::from(gain) / 32767.0 * 100.0) as f32
    }
}

impl From<Vec<i16>> for AudioFrame {
    fn from(samples: Vec<i16>) -> Self {
        Self::new(samples)
    }
}

/// Bounded ring of the most recent frames, used as recording pre-roll
#[derive(Debug, Clone)]
pub struct ActivityBuffer {
    frames: VecDeque<AudioFrame>,
    capacity: usize,
}

impl ActivityBuffer {
    /// Create a buffer holding at most `capacity` frames
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            frames: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Capacity for `pre_roll_secs` of audio at `sample_rate` in frames of
    /// `frame_size` samples
    ///
    /// Partial frames are dropped; a small tolerance absorbs `f32` error so
    /// that 0.7 s of 100-sample frames at 1 kHz is 7 frames, not 6.
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn for_duration(pre_roll_secs: f32, sample_rate: u32, frame_size: usize) -> Self {
        let frames = if frame_size == 0 {
            0
        } else {
            let exact =
                f64::from(pre_roll_secs.max(0.0)) * f64::from(sample_rate) / frame_size as f64;
            (exact + 1e-6).floor() as usize
        };
        Self::new(frames)
    }

    /// Append a frame, evicting the oldest beyond capacity
    pub fn push(&mut self, frame: AudioFrame) {
        self.frames.push_back(frame);
        while self.frames.len() > self.capacity {
            self.frames.pop_front();
        }
    }

    /// Copy of the buffered frames, oldest first
    #[must_use]
    pub fn snapshot(&self) -> Vec<AudioFrame> {
        self.frames.iter().cloned().collect()
    }

    /// Number of buffered frames
    #[must_use]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Whether no frames are buffered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Maximum number of frames retained
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }
}
