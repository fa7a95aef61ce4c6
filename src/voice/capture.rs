//! Microphone capture feeding the recording detector

use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, Stream, StreamConfig};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use super::activity::AudioFrame;
use super::detector::{DetectorSettings, RecordingDetector, Utterance};
use crate::config::AudioConfig;
use crate::{Error, Result};

/// Hardware-free half of the capture path
///
/// Re-blocks arbitrary sample chunks into fixed-size frames, runs them
/// through the detector and hands finalized utterances to the coordinator
/// queue without ever waiting on it.
pub struct CaptureSink {
    detector: RecordingDetector,
    pending: Vec<i16>,
    frame_size: usize,
    gain: f32,
    peak_volume: f32,
    dropped: u64,
    tx: mpsc::Sender<Utterance>,
}

impl CaptureSink {
    /// Create a sink delivering utterances to `tx`
    #[must_use]
    pub fn new(config: &AudioConfig, tx: mpsc::Sender<Utterance>) -> Self {
        Self {
            detector: RecordingDetector::new(DetectorSettings::from(config)),
            pending: Vec::with_capacity(config.block_size * 2),
            frame_size: config.block_size.max(1),
            gain: config.gain,
            peak_volume: 0.0,
            dropped: 0,
            tx,
        }
    }

    /// Feed captured samples observed at wall-clock time `now`
    pub fn push_samples(&mut self, samples: &[i16], now: Duration) {
        self.pending.extend_from_slice(samples);

        while self.pending.len() >= self.frame_size {
            let rest = self.pending.split_off(self.frame_size);
            let frame = AudioFrame::new(std::mem::replace(&mut self.pending, rest));
            let volume = frame.volume_percent(self.gain);
            self.peak_volume = self.peak_volume.max(volume);

            if let Some(utterance) = self.detector.on_frame(frame, volume, now) {
                self.deliver(utterance);
            }
        }
    }

    fn deliver(&mut self, utterance: Utterance) {
        match self.tx.try_send(utterance) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                self.dropped += 1;
                tracing::warn!(
                    dropped = self.dropped,
                    "utterance queue full, dropping utterance"
                );
            }
            Err(TrySendError::Closed(_)) => {
                tracing::debug!("utterance queue closed");
            }
        }
    }

    /// Loudest frame volume since the last call, then reset
    pub fn take_peak_volume(&mut self) -> f32 {
        std::mem::take(&mut self.peak_volume)
    }

    /// Utterances dropped because the queue was full
    #[must_use]
    pub const fn dropped(&self) -> u64 {
        self.dropped
    }

    /// The underlying detector
    #[must_use]
    pub const fn detector(&self) -> &RecordingDetector {
        &self.detector
    }
}

struct RecorderShared {
    sink: CaptureSink,
    listening: bool,
}

/// Flip the listening flag, returning its previous value
///
/// The lock is held only for the flip, never across stream calls.
fn set_listening(shared: &Mutex<RecorderShared>, listening: bool) -> Result<bool> {
    let mut guard = shared
        .lock()
        .map_err(|_| Error::Audio("recorder lock poisoned".to_string()))?;
    Ok(std::mem::replace(&mut guard.listening, listening))
}

/// Input callback body
fn feed_input(shared: &Mutex<RecorderShared>, data: &[f32]) {
    let Ok(mut shared) = shared.lock() else {
        return;
    };
    if !shared.listening {
        return;
    }
    let samples: Vec<i16> = data.iter().map(|&s| f32_to_i16(s)).collect();
    shared.sink.push_samples(&samples, wall_clock());
}

/// Captures microphone audio into the detector
///
/// Detector state is guarded by one mutex per recorder; the audio callback
/// and the start/stop entry points all take it.
pub struct AudioRecorder {
    shared: Arc<Mutex<RecorderShared>>,
    config: StreamConfig,
    stream: Option<Stream>,
}

impl AudioRecorder {
    /// Open the default input device at the configured sample rate
    ///
    /// # Errors
    ///
    /// Returns error if no suitable input device is available
    pub fn new(config: &AudioConfig, tx: mpsc::Sender<Utterance>) -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| Error::Audio("no input device available".to_string()))?;

        let supported_config = device
            .supported_input_configs()
            .map_err(|e| Error::Audio(e.to_string()))?
            .find(|c| {
                c.channels() == 1
                    && c.min_sample_rate() <= SampleRate(config.sample_rate)
                    && c.max_sample_rate() >= SampleRate(config.sample_rate)
            })
            .ok_or_else(|| Error::Audio("no suitable audio config found".to_string()))?;

        let stream_config = supported_config
            .with_sample_rate(SampleRate(config.sample_rate))
            .config();

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = config.sample_rate,
            block_size = config.block_size,
            "audio capture initialized"
        );

        Ok(Self {
            shared: Arc::new(Mutex::new(RecorderShared {
                sink: CaptureSink::new(config, tx),
                listening: false,
            })),
            config: stream_config,
            stream: None,
        })
    }

    /// Start delivering microphone audio to the detector
    ///
    /// # Errors
    ///
    /// Returns error if the input stream cannot be started
    pub fn start_listening(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let device = cpal::default_host()
            .default_input_device()
            .ok_or_else(|| Error::Audio("no input device".to_string()))?;

        let shared = Arc::clone(&self.shared);
        let stream = device
            .build_input_stream(
                &self.config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| feed_input(&shared, data),
                |err| {
                    tracing::error!(error = %err, "audio capture error");
                },
                None,
            )
            .map_err(|e| Error::Audio(e.to_string()))?;

        // The callback takes the recorder lock, so none is held while playing
        set_listening(&self.shared, true)?;
        if let Err(e) = stream.play() {
            set_listening(&self.shared, false)?;
            return Err(Error::Audio(e.to_string()));
        }
        self.stream = Some(stream);

        tracing::info!("listening on microphone");
        Ok(())
    }

    /// Stop the input stream
    pub fn stop_listening(&mut self) {
        if matches!(set_listening(&self.shared, false), Ok(false)) && self.stream.is_none() {
            return;
        }
        if let Some(stream) = self.stream.take() {
            drop(stream);
            tracing::info!("stopped listening");
        }
    }

    /// Whether the stream is running
    #[must_use]
    pub fn is_listening(&self) -> bool {
        self.shared.lock().is_ok_and(|g| g.listening)
    }

    /// Loudest frame volume since the last call
    #[must_use]
    pub fn take_peak_volume(&self) -> f32 {
        self.shared
            .lock()
            .map(|mut g| g.sink.take_peak_volume())
            .unwrap_or_default()
    }
}

impl Drop for AudioRecorder {
    fn drop(&mut self) {
        self.stop_listening();
    }
}

/// Time since the Unix epoch
#[must_use]
pub fn wall_clock() -> Duration {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
}

/// Convert an f32 sample in [-1.0, 1.0] to i16
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn f32_to_i16(sample: f32) -> i16 {
    (sample * 32767.0).clamp(-32768.0, 32767.0) as i16
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> AudioConfig {
        AudioConfig {
            sample_rate: 1000,
            block_size: 100,
            pre_roll_secs: 0.2,
            silence_cut_secs: 0.2,
            gain: 1.0,
            ..AudioConfig::default()
        }
    }

    #[test]
    fn reblocks_uneven_chunks() {
        let (tx, _rx) = mpsc::channel(1);
        let mut sink = CaptureSink::new(&config(), tx);

        sink.push_samples(&[0; 150], Duration::ZERO);
        assert_eq!(sink.detector().activity_buffer().len(), 1);

        sink.push_samples(&[0; 50], Duration::ZERO);
        assert_eq!(sink.detector().activity_buffer().len(), 2);
    }

    #[test]
    fn full_queue_drops_without_blocking() {
        let (tx, mut rx) = mpsc::channel(1);
        let mut sink = CaptureSink::new(&config(), tx);
        let loud = vec![i16::MAX; 100];
        let quiet = vec![0i16; 100];

        for round in 0..2u64 {
            let base = round * 10_000;
            for i in 0..5 {
                sink.push_samples(&loud, Duration::from_millis(base + i * 100));
            }
            for i in 5..9 {
                sink.push_samples(&quiet, Duration::from_millis(base + i * 100));
            }
        }

        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
        assert_eq!(sink.dropped(), 1);
    }

    #[test]
    fn peak_volume_resets() {
        let (tx, _rx) = mpsc::channel(1);
        let mut sink = CaptureSink::new(&config(), tx);
        sink.push_samples(&[i16::MAX; 100], Duration::ZERO);

        assert!(sink.take_peak_volume() > 99.0);
        assert!(sink.take_peak_volume() < f32::EPSILON);
    }

    #[test]
    fn listening_flag_gates_input_without_holding_lock() {
        let (tx, mut rx) = mpsc::channel(1);
        let shared = Mutex::new(RecorderShared {
            sink: CaptureSink::new(&config(), tx),
            listening: false,
        });

        feed_input(&shared, &[1.0; 100]);
        {
            let guard = shared.try_lock().unwrap();
            assert!(guard.sink.detector().activity_buffer().is_empty());
        }

        assert!(!set_listening(&shared, true).unwrap());
        feed_input(&shared, &[1.0; 100]);
        let mut guard = shared.try_lock().unwrap();
        assert!(guard.sink.take_peak_volume() > 99.0);
        drop(guard);

        assert!(set_listening(&shared, false).unwrap());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn converts_float_samples() {
        assert_eq!(f32_to_i16(0.0), 0);
        assert_eq!(f32_to_i16(1.0), 32767);
        assert_eq!(f32_to_i16(-2.0), -32768);
    }
}
