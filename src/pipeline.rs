//! Utterance pipeline
//!
//! A single coordinator task drains the utterance queue: save the audio,
//! transcribe, route, then either drive the robot or ask the language model
//! and speak its reply. One utterance is processed at a time, and a failure
//! ends only that utterance.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::agent::LanguageModel;
use crate::command::{CommandRouter, Intent, RouteDecision};
use crate::motion::MotionExecutor;
use crate::voice::{Synthesizer, Transcriber, Utterance, postprocess_transcript};
use crate::{Error, Result};

/// What happened to one utterance
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Nothing was recognised in the audio
    Empty,
    /// Outside the validity window
    Dropped,
    /// Commands were applied and executed
    Handled(Vec<Intent>),
    /// Forwarded to the language model; carries the spoken answer
    Answered(String),
}

/// Owns the router and its collaborators
pub struct PipelineCoordinator {
    router: CommandRouter,
    transcriber: Arc<dyn Transcriber>,
    llm: Arc<dyn LanguageModel>,
    synthesizer: Arc<dyn Synthesizer>,
    motion: Arc<MotionExecutor>,
    recordings_dir: PathBuf,
}

impl PipelineCoordinator {
    /// Create a coordinator
    #[must_use]
    pub fn new(
        router: CommandRouter,
        transcriber: Arc<dyn Transcriber>,
        llm: Arc<dyn LanguageModel>,
        synthesizer: Arc<dyn Synthesizer>,
        motion: Arc<MotionExecutor>,
        recordings_dir: PathBuf,
    ) -> Self {
        Self {
            router,
            transcriber,
            llm,
            synthesizer,
            motion,
            recordings_dir,
        }
    }

    /// Process queued utterances until every sender is dropped
    pub async fn run(mut self, mut utterances: mpsc::Receiver<Utterance>) {
        tracing::info!("pipeline coordinator started");
        while let Some(utterance) = utterances.recv().await {
            match self.process_utterance(utterance).await {
                Ok(outcome) => tracing::debug!(?outcome, "utterance done"),
                Err(e) => {
                    tracing::error!(kind = e.kind(), error = %e, "utterance pipeline failed");
                }
            }
        }
        tracing::info!("pipeline coordinator stopped");
    }

    /// Save, transcribe and handle one utterance
    ///
    /// # Errors
    ///
    /// Returns error if saving, transcription, motion or speech fails
    pub async fn process_utterance(&mut self, utterance: Utterance) -> Result<Outcome> {
        tracing::info!(
            duration_secs = utterance.duration_secs(),
            file = %utterance.file_name(),
            "utterance finalized"
        );

        let dir = self.recordings_dir.clone();
        let path = tokio::task::spawn_blocking(move || utterance.write_wav(&dir))
            .await
            .map_err(|e| Error::Audio(format!("recording task failed: {e}")))??;

        let transcript = self.transcriber.transcribe(&path).await?;
        self.process_transcript(&transcript).await
    }

    /// Route a raw transcript and act on the decision
    ///
    /// # Errors
    ///
    /// Returns error if motion execution or speech output fails
    pub async fn process_transcript(&mut self, raw: &str) -> Result<Outcome> {
        let text = postprocess_transcript(raw);
        if text.is_empty() {
            tracing::debug!("empty transcript");
            return Ok(Outcome::Empty);
        }
        tracing::info!(transcript = %text, "transcribed");

        match self.router.route(&text) {
            RouteDecision::Dropped => Ok(Outcome::Dropped),
            RouteDecision::Handled(intents) => {
                if intents.iter().any(Intent::is_motion) {
                    let motion = Arc::clone(&self.motion);
                    let plan = intents.clone();
                    tokio::task::spawn_blocking(move || motion.execute_all(&plan))
                        .await
                        .map_err(|e| Error::Motion(format!("motion task failed: {e}")))??;
                }
                Ok(Outcome::Handled(intents))
            }
            RouteDecision::Unhandled => {
                let answer = self.llm.ask(&text).await;
                if answer.trim().is_empty() {
                    tracing::warn!("language model returned nothing to say");
                    return Ok(Outcome::Answered(answer));
                }
                tracing::info!(answer = %answer, "speaking reply");
                let audio = self.synthesizer.synthesize(&answer).await?;
                self.synthesizer.play(&audio).await?;
                Ok(Outcome::Answered(answer))
            }
        }
    }

    /// The command router
    #[must_use]
    pub const fn router(&self) -> &CommandRouter {
        &self.router
    }
}
