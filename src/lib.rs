//! Go2 Voice - voice command pipeline for a quadruped robot
//!
//! This library provides the pieces the `go2-voice` daemon is built from:
//! - Recording detection with pre-roll and tail trim
//! - Phonetic wake word gating with a validity window
//! - Natural-language command parsing (interactive and planning modes)
//! - Paced motion execution
//! - A self-healing TCP link for remote commands and telemetry
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  utterance   ┌──────────────────────┐  intents  ┌────────────┐
//! │ AudioRecorder├─────────────►│ PipelineCoordinator  ├──────────►│  Motion    │
//! │  (detector)  │  bounded mpsc│ STT → CommandRouter  │           │  Executor  │
//! └──────────────┘              │      └► LLM → TTS    │           └─────▲──────┘
//!                               └──────────────────────┘                 │
//! ┌──────────────┐  commands                                             │
//! │NetworkChannel├───────────────────────────────────────────────────────┘
//! │              │◄── telemetry (TelemetryReporter)
//! └──────────────┘
//! ```

pub mod agent;
pub mod command;
pub mod config;
pub mod daemon;
pub mod error;
pub mod motion;
pub mod net;
pub mod pipeline;
pub mod telemetry;
pub mod voice;

pub use agent::{LanguageModel, LlmClient};
pub use command::{CommandRouter, Intent, RouteDecision, SessionConfig, SessionGate};
pub use config::Config;
pub use daemon::Daemon;
pub use error::{Error, Result};
pub use motion::{DryRunMotion, MotionControl, MotionExecutor, MotionPacing};
pub use net::{NetworkChannel, RemoteCommand};
pub use pipeline::{Outcome, PipelineCoordinator};
pub use telemetry::{BatteryInfo, BatteryMonitor, SysfsBattery, TelemetryReporter};
