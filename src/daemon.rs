//! Daemon - the robot's voice and cloud link service
//!
//! Wires microphone capture, the utterance pipeline, the cloud command
//! channel and telemetry together, and runs them until interrupted.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::agent::LlmClient;
use crate::command::CommandRouter;
use crate::motion::{DryRunMotion, MotionControl, MotionExecutor, MotionPacing};
use crate::net::{NetworkChannel, RemoteCommand};
use crate::pipeline::PipelineCoordinator;
use crate::telemetry::{BatteryMonitor, SysfsBattery, TelemetryReporter};
use crate::voice::{AudioRecorder, HttpSynthesizer, HttpTranscriber};
use crate::{Config, Result};

/// How long shutdown waits for in-flight work
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// The daemon - owns configuration and the robot-facing backends
pub struct Daemon {
    config: Config,
    motion: Arc<dyn MotionControl>,
    battery: Arc<dyn BatteryMonitor>,
}

impl Daemon {
    /// Create a daemon with the dry-run motion backend and sysfs battery
    #[must_use]
    pub fn new(config: Config) -> Self {
        let battery = Arc::new(SysfsBattery::new(&config.battery));
        Self {
            config,
            motion: Arc::new(DryRunMotion),
            battery,
        }
    }

    /// Use a different motion backend
    #[must_use]
    pub fn with_motion(mut self, motion: Arc<dyn MotionControl>) -> Self {
        self.motion = motion;
        self
    }

    /// Use a different battery source
    #[must_use]
    pub fn with_battery(mut self, battery: Arc<dyn BatteryMonitor>) -> Self {
        self.battery = battery;
        self
    }

    /// Run until Ctrl-C
    ///
    /// # Errors
    ///
    /// Returns error if a collaborator cannot be set up or audio capture
    /// cannot start
    #[allow(clippy::future_not_send)]
    pub async fn run(self) -> Result<()> {
        let config = &self.config;

        let executor = Arc::new(MotionExecutor::new(
            Arc::clone(&self.motion),
            MotionPacing::from(&config.command),
        ));
        let transcriber = Arc::new(HttpTranscriber::new(config.speech.stt_url.clone())?);
        let synthesizer = Arc::new(HttpSynthesizer::new(&config.speech)?);
        let llm = Arc::new(LlmClient::new(&config.llm, &config.network.device_id)?);

        tracing::info!(
            url = %llm.url(),
            streaming = config.llm.streaming,
            "language model client ready"
        );

        // Utterance queue between the capture callback and the coordinator
        let (utterance_tx, utterance_rx) = mpsc::channel(config.audio.max_pending_utterances);
        let coordinator = PipelineCoordinator::new(
            CommandRouter::new(&config.command),
            transcriber,
            llm,
            synthesizer,
            Arc::clone(&executor),
            config.audio.recordings_dir.clone(),
        );
        let pipeline = tokio::spawn(coordinator.run(utterance_rx));

        let mut recorder = AudioRecorder::new(&config.audio, utterance_tx)?;
        recorder.start_listening()?;

        let channel = config
            .network
            .enabled
            .then(|| Arc::new(NetworkChannel::new(&config.network)));

        let receiver = channel.as_ref().map(|channel| {
            let channel = Arc::clone(channel);
            let executor = Arc::clone(&executor);
            tokio::spawn(async move {
                channel
                    .receive_loop(move |message| dispatch_remote(&executor, &message))
                    .await;
            })
        });

        let reporter = channel.as_ref().map(|channel| {
            TelemetryReporter::new(
                Arc::clone(channel),
                Arc::clone(&self.battery),
                config.network.device_id.clone(),
                config.network.telemetry_interval(),
            )
        });

        match &channel {
            Some(channel) => tracing::info!(addr = channel.addr(), "voice daemon running"),
            None => tracing::info!("voice daemon running (network disabled)"),
        }

        let telemetry = async {
            match &reporter {
                Some(reporter) => reporter.run().await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    tracing::warn!(error = %e, "failed to listen for Ctrl-C");
                }
                tracing::info!("shutdown requested");
            }
            () = telemetry => {}
        }

        // Dropping the recorder closes the utterance queue
        recorder.stop_listening();
        drop(recorder);

        if let Some(channel) = &channel {
            channel.close().await;
        }
        if let Some(receiver) = receiver {
            let stopped = tokio::time::timeout(SHUTDOWN_GRACE, receiver).await;
            if stopped.is_err() {
                tracing::warn!("receive loop did not stop in time");
            }
        }
        let drained = tokio::time::timeout(SHUTDOWN_GRACE, pipeline).await;
        if drained.is_err() {
            tracing::warn!("pipeline did not drain in time");
        }

        tracing::info!("daemon stopped");
        Ok(())
    }
}

/// Execute one message from the cloud server on the blocking pool
fn dispatch_remote(executor: &Arc<MotionExecutor>, message: &str) {
    let command = match message.parse::<RemoteCommand>() {
        Ok(command) => command,
        Err(e) => {
            tracing::warn!(text = message, error = %e, "ignoring unknown remote command");
            return;
        }
    };

    let executor = Arc::clone(executor);
    tokio::task::spawn_blocking(move || {
        if let Err(e) = executor.execute_remote(command) {
            tracing::error!(kind = e.kind(), error = %e, "remote command failed");
        }
    });
}
