//! Command parsing and routing integration tests

use go2_voice::command::{
    CommandMode, CommandRouter, DISTANCE_RANGE, Intent, RouteDecision, SessionConfig,
    SettingTarget, parse, parse_plan, quantize_turn,
};

mod common;

fn awake_router() -> CommandRouter {
    let mut router = CommandRouter::new(&common::command_config("gou3"));
    router.route("狗");
    router
}

#[test]
fn test_move_defaults_to_session_distance() {
    let session = SessionConfig::default();

    // 2 m at 0.6 m/s rounds to 3 steps
    assert_eq!(
        parse("往前走", &session),
        Intent::Move {
            direction: 1,
            steps: 3,
            speed: 0.6
        }
    );
    assert_eq!(
        parse("后退一米", &session),
        Intent::Move {
            direction: -1,
            steps: 2,
            speed: 0.6
        }
    );
}

#[test]
fn test_turn_angles_are_banded() {
    let session = SessionConfig::default();

    assert_eq!(quantize_turn(30.0), (30.0, 3));
    assert_eq!(quantize_turn(180.0), (45.0, 12));
    assert_eq!(
        parse("右转一百二十度", &session),
        Intent::Turn {
            direction: -1,
            angle_deg: 40.0,
            repeat: 9
        }
    );

    // Requests past half a turn are clamped
    let Intent::Turn {
        angle_deg, repeat, ..
    } = parse("左转三百六十度", &session)
    else {
        panic!("expected a turn");
    };
    assert!((angle_deg - 45.0).abs() < f32::EPSILON);
    assert_eq!(repeat, 12);
}

#[test]
fn test_filler_words_are_not_commands() {
    let session = SessionConfig::default();

    assert_eq!(parse("然后呢", &session), Intent::Unmatched);
    assert_eq!(parse("今天天气怎么样", &session), Intent::Unmatched);
    assert_eq!(parse("请站起来", &session), Intent::StandUp);
    assert_eq!(parse("坐下吧", &session), Intent::SitDown);
}

#[test]
fn test_mode_switch_wins_over_motion() {
    let session = SessionConfig::default();
    assert_eq!(
        parse("设置模式为计划模式然后前进", &session),
        Intent::SetMode(CommandMode::Planning)
    );
    assert_eq!(
        parse_plan("设置模式为交互模式", &session),
        vec![Intent::SetMode(CommandMode::Interactive)]
    );
}

#[test]
fn test_plan_keeps_clause_order_and_skips_noise() {
    let session = SessionConfig::default();
    let plan = parse_plan("前进两米，然后呢，左转九十度。后退", &session);

    assert_eq!(plan.len(), 3);
    assert!(matches!(plan[0], Intent::Move { direction: 1, .. }));
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
fn test_dormant_router_drops_commands() {
    let mut router = CommandRouter::new(&common::command_config("gou3"));
    assert_eq!(router.route("前进三米"), RouteDecision::Dropped);
    assert_eq!(router.gate().validity_remaining(), 0);
}

#[test]
fn test_wake_then_command_consumes_window() {
    let mut router = awake_router();
    assert_eq!(router.gate().validity_remaining(), 6);

    let RouteDecision::Handled(intents) = router.route("前进") else {
        panic!("expected a command");
    };
    assert_eq!(intents.len(), 1);
    assert_eq!(router.gate().validity_remaining(), 5);
}

#[test]
fn test_wake_word_and_command_in_one_utterance() {
    let mut router = CommandRouter::new(&common::command_config("gou3"));
    let decision = router.route("小狗前进");

    assert!(matches!(decision, RouteDecision::Handled(_)));
    assert!(router.gate().is_woken());
    assert_eq!(router.gate().validity_remaining(), 6);
}

#[test]
fn test_distance_adjustment_is_clamped() {
    let mut router = awake_router();

    for _ in 0..10 {
        router.route("减小默认距离");
    }
    assert_eq!(router.session().default_distance, *DISTANCE_RANGE.start());

    for _ in 0..10 {
        router.route("狗");
        router.route("增大默认距离");
    }
    assert_eq!(router.session().default_distance, *DISTANCE_RANGE.end());
}

#[test]
fn test_speed_adjustment_changes_step_count() {
    let mut router = awake_router();
    router.route("下调默认速度");
    assert!((router.session().speed() - 0.3).abs() < f32::EPSILON);

    let decision = router.route("前进");
    assert_eq!(
        decision,
        RouteDecision::Handled(vec![Intent::Move {
            direction: 1,
            steps: 7,
            speed: 0.3
        }])
    );
}

#[test]
fn test_planning_mode_round_trip() {
    let mut router = awake_router();

    router.route("设置模式为计划模式");
    assert_eq!(router.session().mode, CommandMode::Planning);

    // Stance and adjustment phrases are not plan steps
    assert_eq!(router.route("站起来"), RouteDecision::Unhandled);
    assert_eq!(router.route("上调默认速度"), RouteDecision::Unhandled);
    assert_eq!(router.session().speed_index, 1);

    router.route("设置模式为交互模式");
    assert_eq!(router.session().mode, CommandMode::Interactive);
    assert_eq!(
        router.route("上调默认速度"),
        RouteDecision::Handled(vec![Intent::AdjustSetting {
            target: SettingTarget::Speed,
            delta: 1
        }])
    );
}
