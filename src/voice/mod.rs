//! Voice processing module
//!
//! Handles microphone capture, recording detection, wake word matching,
//! and the speech collaborators (STT, TTS, playback).

mod activity;
mod capture;
mod detector;
mod playback;
pub mod stt;
pub mod tts;
mod wake_word;

pub use activity::{ActivityBuffer, AudioFrame};
pub use capture::{AudioRecorder, CaptureSink, f32_to_i16, wall_clock};
pub use detector::{DetectorSettings, RecorderState, RecordingDetector, Utterance};
pub use playback::{AudioPlayback, read_wav_mono};
pub use stt::{HttpTranscriber, Transcriber, postprocess_transcript};
pub use tts::{HttpSynthesizer, Synthesizer};
pub use wake_word::{WakeWordMatcher, romanize};
