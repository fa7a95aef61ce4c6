//! Wake gating and command routing

use super::parser::{Intent, parse_utterance};
use super::session::{SessionConfig, SessionGate};
use crate::config::CommandConfig;
use crate::voice::WakeWordMatcher;

/// Outcome of routing one transcript
#[derive(Debug, Clone, PartialEq)]
pub enum RouteDecision {
    /// Outside the validity window; nothing downstream runs
    Dropped,
    /// Recognised commands, in execution order
    Handled(Vec<Intent>),
    /// No command matched; forward the text to the language model
    Unhandled,
}

/// Decides what happens to each transcript
///
/// Owns the wake gate and the session defaults, so it must live on a single
/// task.
#[derive(Debug)]
pub struct CommandRouter {
    matcher: WakeWordMatcher,
    gate: SessionGate,
    session: SessionConfig,
}

impl CommandRouter {
    /// Create a dormant router from command settings
    #[must_use]
    pub fn new(config: &CommandConfig) -> Self {
        Self {
            matcher: WakeWordMatcher::new(config.wake_words.clone()),
            gate: SessionGate::new(config.validity_turns),
            session: SessionConfig::new(config),
        }
    }

    /// Route one transcript
    ///
    /// Mode switches and setting adjustments are applied to the session
    /// here; motion intents are returned for the caller to execute.
    pub fn route(&mut self, text: &str) -> RouteDecision {
        self.gate.begin_turn();

        if let Some(word) = self.matcher.find(text) {
            tracing::info!(wake_word = word, "wake word detected");
            self.gate.wake();
        }

        if !self.gate.admit() {
            tracing::debug!(text, "outside validity window, dropping");
            return RouteDecision::Dropped;
        }

        let intents = parse_utterance(text, &self.session);
        if intents.is_empty() {
            return RouteDecision::Unhandled;
        }

        for intent in &intents {
            self.apply(intent);
        }

        RouteDecision::Handled(intents)
    }

    fn apply(&mut self, intent: &Intent) {
        match intent {
            Intent::SetMode(mode) => {
                tracing::info!(?mode, "command mode changed");
                self.session.mode = *mode;
            }
            Intent::AdjustSetting { target, delta } => {
                if self.session.adjust(*target, *delta) {
                    tracing::info!(
                        ?target,
                        speed_index = self.session.speed_index,
                        distance = self.session.default_distance,
                        "default adjusted"
                    );
                } else {
                    tracing::debug!(?target, delta, "adjustment out of range, ignored");
                }
            }
            _ => {}
        }
    }

    /// Current session defaults
    #[must_use]
    pub const fn session(&self) -> &SessionConfig {
        &self.session
    }

    /// Wake gate state
    #[must_use]
    pub const fn gate(&self) -> &SessionGate {
        &self.gate
    }

    /// Mutable wake gate state
    pub const fn gate_mut(&mut self) -> &mut SessionGate {
        &mut self.gate
    }
}
