//! Audio playback to speakers

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, StreamConfig};

use crate::{Error, Result};

/// Plays WAV files on the default output device
#[derive(Debug, Default, Clone, Copy)]
pub struct AudioPlayback;

impl AudioPlayback {
    /// Create a playback handle
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Play a WAV file, blocking until it finishes
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be decoded or no output device fits
    pub fn play_wav(&self, path: &Path) -> Result<()> {
        let (samples, sample_rate) = read_wav_mono(path)?;
        self.play_samples_blocking(samples, sample_rate)
    }

    /// Play mono f32 samples at `sample_rate`
    fn play_samples_blocking(&self, samples: Vec<f32>, sample_rate: u32) -> Result<()> {
        if samples.is_empty() {
            return Ok(());
        }

        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| Error::Audio("no output device".to_string()))?;

        let supports = |channels: u16| {
            move |c: &cpal::SupportedStreamConfigRange| {
                c.channels() == channels
                    && c.min_sample_rate() <= SampleRate(sample_rate)
                    && c.max_sample_rate() >= SampleRate(sample_rate)
            }
        };
        let supported = device
            .supported_output_configs()
            .map_err(|e| Error::Audio(e.to_string()))?
            .find(supports(1))
            .or_else(|| {
                // Fallback: try stereo
                device.supported_output_configs().ok()?.find(supports(2))
            })
            .ok_or_else(|| Error::Audio(format!("no output config for {sample_rate} Hz")))?;

        let config: StreamConfig = supported.with_sample_rate(SampleRate(sample_rate)).config();
        let channels = usize::from(config.channels);

        let sample_count = samples.len();
        let samples = Arc::new(samples);
        let position = Arc::new(AtomicUsize::new(0));
        let finished = Arc::new(AtomicBool::new(false));

        let stream = {
            let samples = Arc::clone(&samples);
            let position = Arc::clone(&position);
            let finished = Arc::clone(&finished);
            device
                .build_output_stream(
                    &config,
                    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                        let mut pos = position.load(Ordering::Relaxed);
                        for frame in data.chunks_mut(channels) {
                            let sample = samples.get(pos).copied().unwrap_or_else(|| {
                                finished.store(true, Ordering::Relaxed);
                                0.0
                            });
                            frame.fill(sample);
                            if pos < samples.len() {
                                pos += 1;
                            }
                        }
                        position.store(pos, Ordering::Relaxed);
                    },
                    |err| {
                        tracing::error!(error = %err, "audio playback error");
                    },
                    None,
                )
                .map_err(|e| Error::Audio(e.to_string()))?
        };

        stream.play().map_err(|e| Error::Audio(e.to_string()))?;

        let duration_ms = (sample_count as u64 * 1000) / u64::from(sample_rate.max(1));
        let start = Instant::now();
        let timeout = Duration::from_millis(duration_ms + 500);

        while !finished.load(Ordering::Relaxed) {
            if start.elapsed() > timeout {
                break;
            }
            std::thread::sleep(Duration::from_millis(50));
        }

        // Let the device drain its last buffer
        std::thread::sleep(Duration::from_millis(100));

        drop(stream);
        tracing::debug!(samples = sample_count, "playback complete");

        Ok(())
    }
}

/// Decode a WAV file to mono f32 samples and its sample rate
///
/// # Errors
///
/// Returns error if the file is not a readable WAV
#[allow(clippy::cast_precision_loss)]
pub fn read_wav_mono(path: &Path) -> Result<(Vec<f32>, u32)> {
    let mut reader = hound::WavReader::open(path)?;
    let spec = reader.spec();

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader.samples::<f32>().collect::<hound::Result<_>>()?,
        hound::SampleFormat::Int if spec.bits_per_sample > 16 => {
            let scale = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<hound::Result<_>>()?
        }
        hound::SampleFormat::Int => {
            let scale = f32::from(1u16 << (spec.bits_per_sample.clamp(1, 16) - 1));
            reader
                .samples::<i16>()
                .map(|s| s.map(|v| f32::from(v) / scale))
                .collect::<hound::Result<_>>()?
        }
    };

    let channels = usize::from(spec.channels.max(1));
    let mono = if channels == 1 {
        interleaved
    } else {
        let divisor = channels as f32;
        interleaved
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / divisor)
            .collect()
    };

    Ok((mono, spec.sample_rate))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_stereo_wav_as_mono() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stereo.wav");
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 24000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for s in [16384i16, 0, -16384, -16384] {
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();

        let (samples, rate) = read_wav_mono(&path).unwrap();
        assert_eq!(rate, 24000);
        assert_eq!(samples.len(), 2);
        assert!((samples[0] - 0.25).abs() < 1e-4);
        assert!((samples[1] + 0.5).abs() < 1e-4);
    }
}
