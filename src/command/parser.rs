//! Natural-language command parsing
//!
//! Interactive utterances yield one [`Intent`]; planning utterances are split
//! into clauses and yield an ordered list of movement intents.

use std::fmt;
use std::sync::LazyLock;

use regex::{Captures, Regex};

use super::numeral::longest_numeral_prefix;
use super::session::{CommandMode, SessionConfig, SettingTarget};

/// Largest angle a single turn command may request
const MAX_TURN_DEGREES: f64 = 180.0;

/// Most paced steps a single move command may plan
pub const MAX_MOVE_STEPS: u32 = 100;

/// Band upper bounds; band `i` (1-based) splits the turn into `3 * i` steps
const TURN_BANDS: [f64; 4] = [45.0, 90.0, 135.0, 180.0];

/// Clause separators in planning mode
const CLAUSE_SEPARATORS: [char; 3] = ['，', '。', ','];

/// Arabic or Chinese numeral run, capture group 4 of the motion patterns
const NUMERAL: &str = "([0-9.零〇一二两三四五六七八九十百千万点]*)";

static MOVE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    let pattern = format!("([向往朝])?([前后])([进走退移]*){NUMERAL}(米|步|m)?");
    Regex::new(&pattern).expect("valid regex")
});

static TURN_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    let pattern = format!("([向往朝])?([左右])([转拐]*){NUMERAL}(度|°)?");
    Regex::new(&pattern).expect("valid regex")
});

static ADJUST_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(上调|增大|减小|下调)默认(速度|距离)").expect("valid regex"));

/// A parsed command
#[derive(Debug, Clone, PartialEq)]
pub enum Intent {
    /// Walk forward (+1) or backward (-1) for `steps` paced steps at `speed` m/s
    Move {
        direction: i8,
        steps: u32,
        speed: f32,
    },
    /// Turn left (+1) or right (-1) by `angle_deg` per step, `repeat` times
    Turn {
        direction: i8,
        angle_deg: f32,
        repeat: u32,
    },
    /// Stand up and balance
    StandUp,
    /// Lie down
    SitDown,
    /// Nudge a session default by one
    AdjustSetting { target: SettingTarget, delta: i8 },
    /// Switch interpretation mode
    SetMode(CommandMode),
    /// Nothing recognised
    Unmatched,
}

impl Intent {
    /// Whether this intent drives the robot
    #[must_use]
    pub const fn is_motion(&self) -> bool {
        matches!(
            self,
            Self::Move { .. } | Self::Turn { .. } | Self::StandUp | Self::SitDown
        )
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Move {
                direction,
                steps,
                speed,
            } => {
                let way = if *direction >= 0 { "forward" } else { "backward" };
                write!(f, "move {way} {steps} steps at {speed} m/s")
            }
            Self::Turn {
                direction,
                angle_deg,
                repeat,
            } => {
                let way = if *direction >= 0 { "left" } else { "right" };
                write!(f, "turn {way} {angle_deg}° x{repeat}")
            }
            Self::StandUp => f.write_str("stand up"),
            Self::SitDown => f.write_str("sit down"),
            Self::AdjustSetting { target, delta } => {
                let sign = if *delta >= 0 { "+" } else { "-" };
                write!(f, "adjust {target:?} {sign}{}", delta.unsigned_abs())
            }
            Self::SetMode(mode) => write!(f, "set mode {mode:?}"),
            Self::Unmatched => f.write_str("unmatched"),
        }
    }
}

/// Parse one interactive utterance
///
/// Rules apply in priority order: mode switch, move, turn, stance, then
/// setting adjustment.
#[must_use]
pub fn parse(text: &str, session: &SessionConfig) -> Intent {
    if let Some(mode) = parse_mode_switch(text) {
        return Intent::SetMode(mode);
    }
    if let Some(intent) = parse_move(text, session) {
        return intent;
    }
    if let Some(intent) = parse_turn(text, session) {
        return intent;
    }
    if text.contains("站起") {
        return Intent::StandUp;
    }
    if text.contains("坐下") {
        return Intent::SitDown;
    }
    if let Some(intent) = parse_adjustment(text) {
        return intent;
    }
    Intent::Unmatched
}

/// Parse a planning utterance into its ordered movement clauses
///
/// Clauses that are neither a move nor a turn are skipped. A mode switch
/// phrase overrides the plan so planning mode can always be left.
#[must_use]
pub fn parse_plan(text: &str, session: &SessionConfig) -> Vec<Intent> {
    if let Some(mode) = parse_mode_switch(text) {
        return vec![Intent::SetMode(mode)];
    }

    text.split(CLAUSE_SEPARATORS)
        .map(str::trim)
        .filter(|clause| !clause.is_empty())
        .filter_map(|clause| parse_move(clause, session).or_else(|| parse_turn(clause, session)))
        .collect()
}

/// Parse according to the session's current mode
///
/// An empty result means nothing matched.
#[must_use]
pub fn parse_utterance(text: &str, session: &SessionConfig) -> Vec<Intent> {
    match session.mode {
        CommandMode::Interactive => match parse(text, session) {
            Intent::Unmatched => Vec::new(),
            intent => vec![intent],
        },
        CommandMode::Planning => parse_plan(text, session),
    }
}

fn parse_mode_switch(text: &str) -> Option<CommandMode> {
    if !text.contains("设置模式") {
        return None;
    }
    if text.contains("计划模式") {
        Some(CommandMode::Planning)
    } else if text.contains("交互模式") {
        Some(CommandMode::Interactive)
    } else {
        None
    }
}

/// First match that carries a prefix, a verb, or a numeral
///
/// A bare marker character such as the 后 in 然后 is not a command.
fn first_qualifying<'t>(pattern: &Regex, text: &'t str) -> Option<(Captures<'t>, Option<f64>)> {
    pattern.captures_iter(text).find_map(|caps| {
        let amount = caps
            .get(4)
            .and_then(|m| longest_numeral_prefix(m.as_str()))
            .map(|(value, _)| value);
        let has_prefix = caps.get(1).is_some();
        let has_verb = caps.get(3).is_some_and(|m| !m.as_str().is_empty());
        (has_prefix || has_verb || amount.is_some()).then_some((caps, amount))
    })
}

fn parse_move(text: &str, session: &SessionConfig) -> Option<Intent> {
    let (caps, meters) = first_qualifying(&MOVE_PATTERN, text)?;
    let direction = if caps.get(2)?.as_str() == "前" { 1 } else { -1 };
    let speed = session.speed();
    if !speed.is_finite() || speed <= 0.0 {
        tracing::warn!(speed, "move ignored, speed is not positive");
        return None;
    }

    let meters = meters
        .unwrap_or_else(|| f64::from(session.default_distance))
        .max(0.0);
    let steps = if meters > 0.0 {
        // Any non-zero distance takes at least one step
        (meters / f64::from(speed))
            .round()
            .clamp(1.0, f64::from(MAX_MOVE_STEPS))
    } else {
        0.0
    };

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let steps = steps as u32;

    Some(Intent::Move {
        direction,
        steps,
        speed,
    })
}

fn parse_turn(text: &str, session: &SessionConfig) -> Option<Intent> {
    let (caps, degrees) = first_qualifying(&TURN_PATTERN, text)?;
    let direction = if caps.get(2)?.as_str() == "左" { 1 } else { -1 };
    let angle = degrees
        .unwrap_or_else(|| f64::from(session.default_angle))
        .clamp(0.0, MAX_TURN_DEGREES);
    let (angle_deg, repeat) = quantize_turn(angle);

    Some(Intent::Turn {
        direction,
        angle_deg,
        repeat,
    })
}

/// Split a turn into `3 * band` steps of `angle / band` degrees
#[must_use]
pub fn quantize_turn(angle: f64) -> (f32, u32) {
    let band = TURN_BANDS
        .iter()
        .position(|&upper| angle <= upper)
        .unwrap_or(TURN_BANDS.len() - 1)
        + 1;
    #[allow(clippy::cast_possible_truncation)]
    let band = band as u32;
    #[allow(clippy::cast_possible_truncation)]
    let per_step = (angle / f64::from(band)) as f32;
    (per_step, 3 * band)
}

fn parse_adjustment(text: &str) -> Option<Intent> {
    let caps = ADJUST_PATTERN.captures(text)?;
    let delta = match caps.get(1)?.as_str() {
        "上调" | "增大" => 1,
        _ => -1,
    };
    let target = if caps.get(2)?.as_str() == "速度" {
        SettingTarget::Speed
    } else {
        SettingTarget::Distance
    };
    Some(Intent::AdjustSetting { target, delta })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CommandConfig;

    fn session() -> SessionConfig {
        SessionConfig::default()
    }

    #[test]
    fn move_with_meters() {
        let s = session();
        assert_eq!(
            parse("前走3米", &s),
            Intent::Move {
                direction: 1,
                steps: 5,
                speed: 0.6
            }
        );
    }

    #[test]
    fn move_backward_uses_default_distance() {
        let s = session();
        let Intent::Move {
            direction, steps, ..
        } = parse("后退", &s)
        else {
            panic!("expected move");
        };
        assert_eq!(direction, -1);
        // 2 m at 0.6 m/s
        assert_eq!(steps, 3);
    }

    #[test]
    fn move_with_chinese_numeral() {
        let mut s = session();
        s.speed_index = 2;
        let Intent::Move { steps, .. } = parse("向前走两米", &s) else {
            panic!("expected move");
        };
        // 2 m at 0.9 m/s
        assert_eq!(steps, 2);
    }

    #[test]
    fn move_steps_are_bounded() {
        let s = session();
        let Intent::Move { steps, .. } = parse("前进一百米", &s) else {
            panic!("expected move");
        };
        assert_eq!(steps, MAX_MOVE_STEPS);

        // 0.1 m at 0.6 m/s still moves once
        let Intent::Move { steps, .. } = parse("前进零点一米", &s) else {
            panic!("expected move");
        };
        assert_eq!(steps, 1);
    }

    #[test]
    fn zero_speed_never_plans_a_move() {
        let s = SessionConfig::new(&CommandConfig {
            speed_levels: vec![0.0, 0.0, 0.0],
            ..CommandConfig::default()
        });
        assert_eq!(parse("前进一米", &s), Intent::Unmatched);
        let plan = parse_plan("前进一米，左转", &s);
        assert_eq!(plan.len(), 1);
        assert!(matches!(plan[0], Intent::Turn { .. }));
    }

    #[test]
    fn bare_marker_is_not_a_move() {
        assert_eq!(parse("然后呢", &session()), Intent::Unmatched);
    }

    #[test]
    fn turn_bands() {
        let s = session();
        assert_eq!(
            parse("左转90度", &s),
            Intent::Turn {
                direction: 1,
                angle_deg: 45.0,
                repeat: 6
            }
        );
        assert_eq!(
            parse("右转", &s),
            Intent::Turn {
                direction: -1,
                angle_deg: 45.0,
                repeat: 3
            }
        );
        assert_eq!(quantize_turn(120.0), (40.0, 9));
        assert_eq!(quantize_turn(180.0), (45.0, 12));
    }

    #[test]
    fn turn_angle_is_clamped() {
        let Intent::Turn {
            angle_deg, repeat, ..
        } = parse("左转三百六十度", &session())
        else {
            panic!("expected turn");
        };
        assert!((angle_deg - 45.0).abs() < f32::EPSILON);
        assert_eq!(repeat, 12);
    }

    #[test]
    fn stance_and_settings() {
        let s = session();
        assert_eq!(parse("站起来", &s), Intent::StandUp);
        assert_eq!(parse("坐下吧", &s), Intent::SitDown);
        assert_eq!(
            parse("上调默认速度", &s),
            Intent::AdjustSetting {
                target: SettingTarget::Speed,
                delta: 1
            }
        );
        assert_eq!(
            parse("减小默认距离", &s),
            Intent::AdjustSetting {
                target: SettingTarget::Distance,
                delta: -1
            }
        );
    }

    #[test]
    fn mode_switch_has_priority() {
        let s = session();
        assert_eq!(
            parse("设置模式为计划模式，前进", &s),
            Intent::SetMode(CommandMode::Planning)
        );
        assert_eq!(
            parse("设置模式 交互模式", &s),
            Intent::SetMode(CommandMode::Interactive)
        );
        assert_eq!(parse("计划模式", &s), Intent::Unmatched);
    }

    #[test]
    fn plan_splits_clauses_in_order() {
        let s = session();
        let plan = parse_plan("前进一米，左转九十度。后退", &s);
        assert_eq!(plan.len(), 3);
        assert!(matches!(
            plan[0],
            Intent::Move {
                direction: 1,
                steps: 2,
                ..
            }
        ));
        assert!(matches!(
            plan[1],
            Intent::Turn {
                direction: 1,
                repeat: 6,
                ..
            }
        ));
        assert!(matches!(plan[2], Intent::Move { direction: -1, .. }));
    }

    #[test]
    fn plan_ignores_stance_commands() {
        let s = session();
        assert!(parse_plan("站起来，坐下", &s).is_empty());
    }

    #[test]
    fn utterance_follows_mode() {
        let mut s = session();
        assert!(parse_utterance("你好", &s).is_empty());
        assert_eq!(parse_utterance("坐下", &s), vec![Intent::SitDown]);

        s.mode = CommandMode::Planning;
        assert!(parse_utterance("坐下", &s).is_empty());
        assert_eq!(parse_utterance("前进，右转", &s).len(), 2);
    }
}
