//! Spoken command handling
//!
//! Turns transcripts into robot intents: numeral normalisation, the
//! interactive and planning parsers, session defaults, and the wake gated
//! router that ties them together.

pub mod numeral;
mod parser;
mod router;
mod session;

pub use parser::{Intent, MAX_MOVE_STEPS, parse, parse_plan, parse_utterance, quantize_turn};
pub use router::{CommandRouter, RouteDecision};
pub use session::{
    CommandMode, DISTANCE_RANGE, MAX_SPEED_INDEX, SessionConfig, SessionGate, SettingTarget,
};
