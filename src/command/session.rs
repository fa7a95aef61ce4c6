//! Per-session command state: mode, motion defaults and the wake window

use std::ops::RangeInclusive;

use crate::config::CommandConfig;

/// Highest selectable speed index
pub const MAX_SPEED_INDEX: usize = 2;

/// Allowed default distance in meters
pub const DISTANCE_RANGE: RangeInclusive<u32> = 1..=5;

/// How utterances are interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommandMode {
    /// One command per utterance, including stance and setting commands
    #[default]
    Interactive,
    /// A comma/period separated sequence of movement clauses
    Planning,
}

/// Which default an adjustment changes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingTarget {
    /// Speed index
    Speed,
    /// Default distance
    Distance,
}

/// Mutable command defaults, owned by whoever routes commands
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// Current interpretation mode
    pub mode: CommandMode,
    /// Index into `speed_levels`
    pub speed_index: usize,
    /// Meters moved when none are spoken
    pub default_distance: u32,
    /// Degrees turned when none are spoken
    pub default_angle: f32,
    speed_levels: Vec<f32>,
}

impl SessionConfig {
    /// Build from configured defaults
    #[must_use]
    pub fn new(config: &CommandConfig) -> Self {
        let speed_levels = if config.speed_levels.is_empty() {
            vec![0.6]
        } else {
            config.speed_levels.clone()
        };
        let mut session = Self {
            mode: CommandMode::Interactive,
            speed_index: 0,
            default_distance: *DISTANCE_RANGE.start(),
            default_angle: config.default_angle,
            speed_levels,
        };
        if config.default_speed_index <= session.max_speed_index() {
            session.speed_index = config.default_speed_index;
        }
        if DISTANCE_RANGE.contains(&config.default_distance) {
            session.default_distance = config.default_distance;
        }
        session
    }

    /// Current speed in m/s
    #[must_use]
    pub fn speed(&self) -> f32 {
        self.speed_levels
            .get(self.speed_index)
            .or_else(|| self.speed_levels.last())
            .copied()
            .unwrap_or(0.6)
    }

    /// Highest usable speed index
    #[must_use]
    pub fn max_speed_index(&self) -> usize {
        MAX_SPEED_INDEX.min(self.speed_levels.len().saturating_sub(1))
    }

    /// Apply a ±1 adjustment; out-of-range results are ignored
    ///
    /// Returns whether the setting changed.
    pub fn adjust(&mut self, target: SettingTarget, delta: i8) -> bool {
        match target {
            SettingTarget::Speed => {
                let Some(next) = self.speed_index.checked_add_signed(isize::from(delta)) else {
                    return false;
                };
                if next > self.max_speed_index() {
                    return false;
                }
                self.speed_index = next;
            }
            SettingTarget::Distance => {
                let Some(next) = self.default_distance.checked_add_signed(i32::from(delta)) else {
                    return false;
                };
                if !DISTANCE_RANGE.contains(&next) {
                    return false;
                }
                self.default_distance = next;
            }
        }
        true
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::new(&CommandConfig::default())
    }
}

/// Wake word gate and validity window
#[derive(Debug, Clone)]
pub struct SessionGate {
    is_woken: bool,
    validity_remaining: u32,
    window: u32,
}

impl SessionGate {
    /// Create a closed gate that a wake word refills to `window` turns
    #[must_use]
    pub const fn new(window: u32) -> Self {
        Self {
            is_woken: false,
            validity_remaining: 0,
            window,
        }
    }

    /// Clear the per-turn wake flag
    pub const fn begin_turn(&mut self) {
        self.is_woken = false;
    }

    /// Record a wake word on this turn and refill the window
    pub const fn wake(&mut self) {
        self.is_woken = true;
        self.validity_remaining = self.window;
    }

    /// Whether this turn's utterance may be processed
    ///
    /// A non-wake turn consumes one unit of the window.
    pub const fn admit(&mut self) -> bool {
        if self.is_woken {
            return true;
        }
        if self.validity_remaining == 0 {
            return false;
        }
        self.validity_remaining -= 1;
        true
    }

    /// Whether a wake word was heard this turn
    #[must_use]
    pub const fn is_woken(&self) -> bool {
        self.is_woken
    }

    /// Turns left in the window
    #[must_use]
    pub const fn validity_remaining(&self) -> u32 {
        self.validity_remaining
    }

    /// Set the remaining turns directly
    pub const fn set_validity_remaining(&mut self, remaining: u32) {
        self.validity_remaining = remaining;
    }
}
